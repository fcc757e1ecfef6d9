use super::{json_pretty, CommandResult, EXIT_FAILURE, EXIT_SUCCESS};
use kawariki_core::{App, Catalog};

pub fn run(app: &App, json_output: bool) -> CommandResult {
    let mut checks: Vec<Check> = Vec::new();

    checks.push(Check::info(
        "platform",
        &format!("Host platform: {}", app.platform()),
    ));
    check_overlays(app, &mut checks);
    check_components(app, &mut checks);

    print_results(&checks, json_output)
}

fn check_overlays(app: &App, checks: &mut Vec<Check>) {
    let missing = kawariki_runtime::check_overlay_prereqs(app.overlay_helper());
    if missing.is_empty() {
        checks.push(Check::pass("overlays", "Namespace file overlays available"));
    } else {
        // Replacements still work by renaming files in place.
        checks.push(Check::warn(
            "overlays",
            &kawariki_runtime::format_missing(&missing),
        ));
    }
}

fn check_components(app: &App, checks: &mut Vec<Check>) {
    let components = app.components();
    if components.is_empty() {
        checks.push(Check::fail(
            "components",
            &format!("No component manifests in {}", app.root().display()),
        ));
        return;
    }
    for name in components {
        let check_name = format!("manifest_{name}");
        match Catalog::load(app, &name) {
            Ok(catalog) if catalog.warnings().is_empty() => {
                let installed = catalog
                    .distributions()
                    .iter()
                    .filter(|d| d.available())
                    .count();
                checks.push(Check::pass(
                    &check_name,
                    &format!(
                        "{name}: {} distributions ({installed} installed)",
                        catalog.distributions().len()
                    ),
                ));
            }
            Ok(catalog) => {
                let warnings: Vec<String> =
                    catalog.warnings().iter().map(ToString::to_string).collect();
                checks.push(Check::warn(
                    &check_name,
                    &format!("{name}: {}", warnings.join("; ")),
                ));
            }
            Err(e) => checks.push(Check::fail(&check_name, &format!("{name}: {e}"))),
        }
    }
}

fn print_results(checks: &[Check], json_output: bool) -> CommandResult {
    let all_pass = checks.iter().all(|c| c.status != "fail");
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&json)?);
    } else {
        println!("Kawariki Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                "warn" => "⚠",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn warn(name: &str, message: &str) -> Self {
        Self::new(name, "warn", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}
