//! `folio serve`: Start the HTTP server.

use folio_config::AppConfig;
use std::path::Path;

pub async fn run(
    config_path: Option<&Path>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config =
        AppConfig::load(config_path).map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    // Refuse to start without a credential rather than failing per request.
    config.require_api_key()?;

    println!("Folio");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Models:    {}", config.models.join(" → "));

    folio_gateway::start(config).await?;

    Ok(())
}
