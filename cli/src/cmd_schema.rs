//! `rttprof schema`: parse event descriptions and print the type table.

use anyhow::{Context, Result};
use rttprof_core::EventTypeRegistry;
use std::path::Path;

pub fn load_registry(info: &Path) -> Result<EventTypeRegistry> {
    let bytes = std::fs::read(info)
        .with_context(|| format!("cannot read info capture '{}'", info.display()))?;
    let text = String::from_utf8(bytes).context("info capture is not valid UTF-8")?;
    EventTypeRegistry::from_descriptions(&text)
        .with_context(|| format!("invalid event descriptions in '{}'", info.display()))
}

pub fn run(info: &Path, as_json: bool) -> Result<()> {
    let registry = load_registry(info)?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&registry)?);
        return Ok(());
    }

    println!("✓ {} event types", registry.len());
    for event_type in registry.iter() {
        println!("  [{:>3}] {}", event_type.id, event_type.name);
        for (label, kind) in event_type.fields() {
            println!("        - {}: {}", label, kind);
        }
    }
    Ok(())
}
