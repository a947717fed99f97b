//! `palaver memory` — memory store management.

use std::path::Path;
use std::sync::Arc;

use palaver_config::AppConfig;
use palaver_core::EmbeddingBackend;

pub async fn stats(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;

    println!("🧠 Memory");
    println!("=========");
    println!("  Kind:   {}", config.memory.kind);
    if config.memory.kind == "sqlite" {
        println!("  Path:   {}", config.memory.path);
    }

    let backend = super::build_backend(&config)?;
    let Some(store) = super::build_store(&config, backend as Arc<dyn EmbeddingBackend>).await?
    else {
        println!("  Memory is disabled.");
        return Ok(());
    };
    println!("  Notes:  {}", store.count().await?);

    Ok(())
}

pub async fn search(
    config_path: Option<&Path>,
    query: &str,
    limit: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(config_path)?;
    let backend = super::build_backend(&config)?;
    let Some(store) = super::build_store(&config, backend as Arc<dyn EmbeddingBackend>).await?
    else {
        println!("Memory is disabled; nothing to search.");
        return Ok(());
    };

    println!("🔍 Searching memories for: \"{query}\"");
    println!();

    let notes = store.get(query, limit).await?;
    if notes.is_empty() {
        println!("   No memories found.");
    } else {
        for (i, note) in notes.iter().enumerate() {
            println!("  {:>2}. {note}", i + 1);
        }
    }

    Ok(())
}

pub async fn clear(config_path: Option<&Path>, yes: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !yes {
        println!("⚠️  This will delete ALL stored memories permanently.");
        println!("   Run with --yes to proceed:");
        println!("   palaver memory clear --yes");
        return Ok(());
    }

    let config = AppConfig::load(config_path)?;
    let backend = super::build_backend(&config)?;
    let Some(store) = super::build_store(&config, backend as Arc<dyn EmbeddingBackend>).await?
    else {
        println!("Memory is disabled; nothing to clear.");
        return Ok(());
    };

    store.clear().await?;
    println!("🗑️  All memories cleared.");

    Ok(())
}
