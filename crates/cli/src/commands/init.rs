//! `folio init`: Write a default config file.

use folio_config::{AppConfig, DEFAULT_CONFIG_FILE};
use std::path::Path;

pub fn run(config_path: Option<&Path>, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path.unwrap_or(Path::new(DEFAULT_CONFIG_FILE));

    if path.exists() && !force {
        println!("Config already exists at: {}", path.display());
        println!("   Edit it manually or re-run with --force.");
        return Ok(());
    }

    std::fs::write(path, AppConfig::default_toml())?;
    println!("Created {}", path.display());
    println!("\nNext steps:");
    println!("   1. Set GEMINI_API_KEY (or api_key in {})", path.display());
    println!("   2. Run: folio serve");

    Ok(())
}
