//! `palaver init` — write a starter configuration file.

use std::path::Path;

use palaver_config::{AppConfig, DEFAULT_CONFIG_FILE};

pub fn run(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(DEFAULT_CONFIG_FILE);
    if path.exists() && !force {
        println!("⚠️  {} already exists.", path.display());
        println!("   Run with --force to overwrite it.");
        return Ok(());
    }

    std::fs::write(path, AppConfig::default_toml())?;
    println!("✅ Wrote {}", path.display());
    println!("   Set PALAVER_API_KEY or fill in [backend] api_key to get started.");

    Ok(())
}
