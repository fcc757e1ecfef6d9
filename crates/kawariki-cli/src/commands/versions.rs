use super::{colorize_installed, json_pretty, CommandResult, EXIT_SUCCESS};
use kawariki_core::Engine;

pub fn run(engine: &Engine, component: &str, json: bool) -> CommandResult {
    let catalog = engine.catalog(component)?;
    if json {
        let rows: Vec<serde_json::Value> = catalog
            .distributions()
            .iter()
            .map(|d| {
                serde_json::json!({
                    "slug": d.slug(),
                    "name": d.name(),
                    "version": d.version_str(),
                    "platform": d.platform(),
                    "installed": d.available(),
                    "sdk": d.is_sdk(),
                    "aliases": d.aliases(),
                })
            })
            .collect();
        println!("{}", json_pretty(&rows)?);
    } else if catalog.is_empty() {
        println!(
            "no {component} distributions for {}",
            engine.app().platform()
        );
    } else {
        println!(
            "{:<36} {:<12} {:<14} {:<10} ALIASES",
            "SLUG", "VERSION", "PLATFORM", "STATE"
        );
        for d in catalog.distributions() {
            println!(
                "{:<36} {:<12} {:<14} {:<10} {}",
                d.slug(),
                d.version_str(),
                d.platform(),
                colorize_installed(d.available()),
                d.aliases().join(", ")
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
