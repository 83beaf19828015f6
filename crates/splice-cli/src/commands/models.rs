//! Model catalog commands

use super::load_catalog;
use anyhow::Result;
use splice_gen::{ModelCapabilities, SpliceConfig};
use std::collections::BTreeSet;
use std::fmt::Display;

pub fn run(select: &[String], format: &str) -> Result<()> {
    let config = SpliceConfig::load()?;
    let catalog = load_catalog(&config)?;

    if select.is_empty() {
        if format == "json" {
            println!("{}", serde_json::to_string_pretty(catalog.models())?);
            return Ok(());
        }

        println!("{} model(s):\n", catalog.models().len());
        for model in catalog.models() {
            let state = if config.is_enabled(&model.provider) { "" } else { " [disabled]" };
            println!("  {} ({}, {}) {}{}", model.id, model.provider, model.media, model.name, state);
        }
        return Ok(());
    }

    let combined = catalog.combined(select)?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&combined)?);
        return Ok(());
    }

    println!("Selection: {}", select.join(", "));
    if !combined.generation_enabled {
        println!("  Generation disabled: no models selected");
        return Ok(());
    }
    print_capabilities(&combined.capabilities);
    Ok(())
}

fn print_capabilities(caps: &ModelCapabilities) {
    print_axis("Aspect ratio", caps.supports_aspect_ratio, &caps.supported_aspect_ratios, &caps.default_aspect_ratio);
    print_axis("Resolution", caps.supports_resolution, &caps.supported_resolutions, &caps.default_resolution);
    print_axis("Duration", caps.supports_duration, &caps.supported_durations, &caps.default_duration);

    let flags = [
        ("Negative prompt", caps.supports_negative_prompt),
        ("Prompt expansion", caps.supports_prompt_expansion),
        ("Seed", caps.supports_seed),
        ("Safety checker", caps.supports_safety_checker),
    ];
    for (label, on) in flags {
        println!("  {}: {}", label, if on { "yes" } else { "no" });
    }
}

fn print_axis<T: Display>(label: &str, supported: bool, values: &BTreeSet<T>, default: &Option<T>) {
    if !supported {
        println!("  {}: no", label);
        return;
    }
    let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    match default {
        Some(d) => println!("  {}: {} (default {})", label, values.join(", "), d),
        None => println!("  {}: {}", label, values.join(", ")),
    }
}
