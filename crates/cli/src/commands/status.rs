//! `folio status`: Show the resolved configuration.

use folio_config::AppConfig;
use std::path::Path;

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    println!("Folio Status");
    println!("============");
    println!(
        "  API key:      {}",
        if config.require_api_key().is_ok() { "configured" } else { "MISSING" }
    );
    println!("  Upstream:     {}", config.api_base_url);
    println!("  Models:       {}", config.models.join(", "));
    println!("  Timeout:      {}s per model", config.dispatch_timeout_secs);
    println!("  Gateway:      {}:{}", config.gateway.host, config.gateway.port);
    println!(
        "  Rate limit:   {}",
        match config.gateway.rate_limit_per_minute {
            0 => "disabled".to_string(),
            n => format!("{n}/min per caller"),
        }
    );
    println!("  Max upload:   {} bytes", config.gateway.max_upload_bytes);
    println!(
        "  Images:       ≤{}px wide, JPEG q{}",
        config.media.max_width, config.media.jpeg_quality
    );
    println!(
        "  Usage log:    {}",
        if config.usage.enabled { config.usage.log_dir.as_str() } else { "disabled" }
    );
    if let Some(file) = &config.persona.knowledge_file {
        println!("  Knowledge:    {file}");
    }

    Ok(())
}
