use super::{colorize_installed, json_pretty, CommandResult, EXIT_SUCCESS};
use kawariki_core::{exit, CoreError, Engine};
use kawariki_schema::display_value;

pub fn run(engine: &Engine, component: &str, alias: &str, json: bool) -> CommandResult {
    let catalog = engine.catalog(component)?;
    let dist = catalog.find(alias).ok_or_else(|| {
        CoreError::exit(
            exit::UNKNOWN_DISTRIBUTION,
            format!("unknown {component} distribution '{alias}'"),
        )
    })?;

    if json {
        let value = serde_json::json!({
            "path": dist.path(),
            "installed": dist.available(),
            "fields": dist.fields(),
        });
        println!("{}", json_pretty(&value)?);
    } else {
        println!("name:        {}", dist.name());
        println!("path:        {}", dist.path().display());
        println!("state:       {}", colorize_installed(dist.available()));
        println!();
        for (key, value) in dist.fields() {
            println!("{key:<20} {}", display_value(value));
        }
    }
    Ok(EXIT_SUCCESS)
}
