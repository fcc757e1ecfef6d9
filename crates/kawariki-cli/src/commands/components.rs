use super::{json_pretty, CommandResult, EXIT_SUCCESS};
use kawariki_core::{Catalog, Engine};

pub fn run(engine: &Engine, json: bool) -> CommandResult {
    let app = engine.app();
    let rows: Vec<serde_json::Value> = app
        .components()
        .into_iter()
        .map(|name| match Catalog::load(app, &name) {
            Ok(catalog) => serde_json::json!({
                "component": name,
                "distributions": catalog.distributions().len(),
                "installed": catalog.distributions().iter().filter(|d| d.available()).count(),
            }),
            Err(e) => serde_json::json!({ "component": name, "error": e.to_string() }),
        })
        .collect();

    if json {
        println!("{}", json_pretty(&rows)?);
    } else if rows.is_empty() {
        println!("no components found in {}", app.root().display());
    } else {
        println!("{:<12} {:>8} {:>10}", "COMPONENT", "VERSIONS", "INSTALLED");
        for row in &rows {
            if let Some(err) = row["error"].as_str() {
                println!("{:<12} error: {err}", row["component"].as_str().unwrap_or(""));
            } else {
                println!(
                    "{:<12} {:>8} {:>10}",
                    row["component"].as_str().unwrap_or(""),
                    row["distributions"],
                    row["installed"]
                );
            }
        }
    }
    Ok(EXIT_SUCCESS)
}
