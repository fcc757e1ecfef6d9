use super::{CommandError, CommandResult, EXIT_FAILURE, EXIT_SUCCESS, EXIT_USAGE};
use crate::config::LaunchDefaults;
use clap::Args;
use kawariki_core::{install_signal_handler, Engine, LaunchOutcome, LaunchRequest, Selector};
use kawariki_schema::Version;
use std::ffi::OsString;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Runtime component to launch with (defaults to $KAWARIKI_RUNTIME).
    pub component: Option<String>,
    /// Distribution slug or alias.
    #[arg(long, conflicts_with_all = ["min_version", "max_version", "closest"])]
    pub dist: Option<String>,
    /// Only consider SDK builds.
    #[arg(long, default_value_t = false)]
    pub sdk: bool,
    /// Oldest acceptable version.
    #[arg(long, value_parser = parse_version)]
    pub min_version: Option<Version>,
    /// Newest acceptable version.
    #[arg(long, value_parser = parse_version)]
    pub max_version: Option<Version>,
    /// Pick the distribution nearest to this version.
    #[arg(long, value_parser = parse_version, conflicts_with_all = ["min_version", "max_version"])]
    pub closest: Option<Version>,
    /// File of raw overlay directives, one per line.
    #[arg(long)]
    pub overlay_file: Option<PathBuf>,
    /// Show SOURCE's content at TARGET for the game's lifetime.
    #[arg(long = "replace", value_name = "TARGET=SOURCE", value_parser = parse_replacement)]
    pub replacements: Vec<(PathBuf, PathBuf)>,
    /// Working directory of the game.
    #[arg(long)]
    pub workdir: Option<PathBuf>,
    /// Only print the resulting command, don't run the game.
    #[arg(long, default_value_t = false)]
    pub dry: bool,
    /// Patch files in place instead of using namespace overlays.
    #[arg(long, default_value_t = false)]
    pub no_overlayns: bool,
    /// Arguments passed to the runtime binary (after --).
    #[arg(last = true)]
    pub args: Vec<OsString>,
}

fn parse_version(s: &str) -> Result<Version, String> {
    Version::parse(s).ok_or_else(|| format!("invalid version '{s}'"))
}

fn parse_replacement(s: &str) -> Result<(PathBuf, PathBuf), String> {
    match s.split_once('=') {
        Some((target, source)) if !target.is_empty() && !source.is_empty() => {
            Ok((PathBuf::from(target), PathBuf::from(source)))
        }
        _ => Err(format!("expected TARGET=SOURCE, got '{s}'")),
    }
}

/// Turn command-line arguments and environment defaults into a request.
pub fn build_request(args: RunArgs, defaults: &LaunchDefaults) -> Result<LaunchRequest, CommandError> {
    let component = args
        .component
        .or_else(|| defaults.runtime.clone())
        .ok_or_else(|| {
            CommandError::new(
                EXIT_USAGE,
                "no runtime component given (pass one or set KAWARIKI_RUNTIME)",
            )
        })?;

    let ranged = args.min_version.is_some() || args.max_version.is_some();
    let default_alias = (component == "nwjs" && !ranged)
        .then(|| defaults.nwjs.clone())
        .flatten();
    let selector = match (args.closest, args.dist.or(default_alias)) {
        (Some(version), _) => Selector::Closest(version),
        (None, Some(alias)) => Selector::Alias(alias),
        (None, None) => Selector::Latest {
            min: args.min_version,
            max: args.max_version,
            sdk: args.sdk || defaults.sdk,
        },
    };

    let mut request = LaunchRequest::new(component, selector);
    request.args = args.args;
    request.working_dir = args.workdir;
    request.overlay_file = args.overlay_file;
    request.replacements = args.replacements;
    request.no_overlayns = args.no_overlayns || defaults.no_overlayns;
    request.dry = args.dry;
    Ok(request)
}

pub fn run(engine: &Engine, defaults: &LaunchDefaults, args: RunArgs) -> CommandResult {
    let request = build_request(args, defaults)?;
    info!(
        "kawariki v{}: {} {:?}",
        env!("CARGO_PKG_VERSION"),
        request.component,
        request.selector
    );
    if !request.dry {
        install_signal_handler();
    }
    match engine.launch(&request)? {
        LaunchOutcome::DryRun(line) => {
            println!("{line}");
            Ok(EXIT_SUCCESS)
        }
        LaunchOutcome::Exited(code) => Ok(u8::try_from(code).unwrap_or(EXIT_FAILURE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Debug, Parser)]
    struct Harness {
        #[command(flatten)]
        run: RunArgs,
    }

    fn request(argv: &[&str], defaults: &LaunchDefaults) -> LaunchRequest {
        let harness = Harness::try_parse_from(std::iter::once("run").chain(argv.iter().copied()))
            .expect("should parse");
        build_request(harness.run, defaults).expect("should build")
    }

    #[test]
    fn defaults_to_latest() {
        let r = request(&["renpy"], &LaunchDefaults::default());
        assert_eq!(r.component, "renpy");
        assert_eq!(r.selector, Selector::default());
        assert!(!r.no_overlayns);
    }

    #[test]
    fn range_and_sdk() {
        let r = request(
            &["nwjs", "--min-version", "0.50", "--max-version", "0.72.1", "--sdk"],
            &LaunchDefaults::default(),
        );
        assert_eq!(
            r.selector,
            Selector::Latest {
                min: Some(Version::from([0, 50])),
                max: Some(Version::from([0, 72, 1])),
                sdk: true,
            }
        );
    }

    #[test]
    fn environment_defaults_apply() {
        let defaults = LaunchDefaults {
            runtime: Some("nwjs".to_owned()),
            nwjs: Some("0.72-sdk".to_owned()),
            no_overlayns: true,
            ..LaunchDefaults::default()
        };
        let r = request(&[], &defaults);
        assert_eq!(r.component, "nwjs");
        assert_eq!(r.selector, Selector::Alias("0.72-sdk".to_owned()));
        assert!(r.no_overlayns);

        let r = request(&["--min-version", "0.80"], &defaults);
        assert!(matches!(r.selector, Selector::Latest { .. }));

        let r = request(&["--dist", "0.50"], &defaults);
        assert_eq!(r.selector, Selector::Alias("0.50".to_owned()));
    }

    #[test]
    fn replacements_and_game_args() {
        let r = request(
            &[
                "nwjs",
                "--replace",
                "www/js/main.js=/tmp/main.js",
                "--dry",
                "--",
                "--nwapp",
                "/games/title",
            ],
            &LaunchDefaults::default(),
        );
        assert_eq!(
            r.replacements,
            [(PathBuf::from("www/js/main.js"), PathBuf::from("/tmp/main.js"))]
        );
        assert_eq!(r.args, [OsString::from("--nwapp"), OsString::from("/games/title")]);
        assert!(r.dry);
    }

    #[test]
    fn closest_selector() {
        let r = request(&["godot", "--closest", "3.5.2"], &LaunchDefaults::default());
        assert_eq!(r.selector, Selector::Closest(Version::from([3, 5, 2])));
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        assert!(parse_replacement("no-equals").is_err());
        assert!(parse_replacement("=source").is_err());
        assert!(parse_version("").is_err());
        assert!(
            Harness::try_parse_from(["run", "nwjs", "--dist", "a", "--min-version", "1"]).is_err()
        );
    }

    #[test]
    fn missing_component_is_usage_error() {
        let harness = Harness::try_parse_from(["run"]).expect("should parse");
        let err = build_request(harness.run, &LaunchDefaults::default()).unwrap_err();
        assert_eq!(err.code, EXIT_USAGE);
    }
}
