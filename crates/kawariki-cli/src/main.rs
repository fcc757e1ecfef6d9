mod commands;
mod config;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{run::RunArgs, CommandError, EXIT_USAGE};
use config::LaunchDefaults;
use kawariki_core::{host_platform, App, Engine};
use kawariki_schema::PlatformId;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "kawariki",
    version,
    about = "Run games on different builds of the engine runtime they shipped with"
)]
struct Cli {
    /// Application root holding the component manifests (defaults to
    /// $KAWARIKI_ROOT, then the directory of this executable).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Host platform id such as linux-x86_64.
    #[arg(long, global = true)]
    platform: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Launch a game with a runtime distribution.
    Run(RunArgs),
    /// List runtime components that ship a manifest.
    Components,
    /// List the distributions of a component available on this host.
    Versions {
        /// Runtime component (defaults to $KAWARIKI_RUNTIME).
        component: Option<String>,
    },
    /// Show the resolved fields of one distribution.
    Show {
        /// Runtime component.
        component: String,
        /// Distribution slug or alias.
        alias: String,
    },
    /// Print a Windows-style path with forward slashes.
    Fixpath {
        path: String,
    },
    /// Check whether file overlays and component manifests are usable.
    Doctor,
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KAWARIKI_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let defaults = LaunchDefaults::from_env();
    let root = cli
        .root
        .clone()
        .or_else(|| defaults.root.clone())
        .unwrap_or_else(default_root);
    let platform = cli.platform.clone().map_or_else(host_platform, PlatformId::new);
    let app = App::with_platform(root, platform);
    let engine = Engine::new(&app);
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Run(args) => commands::run::run(&engine, &defaults, args),
        Commands::Components => commands::components::run(&engine, json_output),
        Commands::Versions { component } => component
            .or_else(|| defaults.runtime.clone())
            .ok_or_else(|| {
                CommandError::new(
                    EXIT_USAGE,
                    "no runtime component given (pass one or set KAWARIKI_RUNTIME)",
                )
            })
            .and_then(|c| commands::versions::run(&engine, &c, json_output)),
        Commands::Show { component, alias } => {
            commands::show::run(&engine, &component, &alias, json_output)
        }
        Commands::Fixpath { path } => commands::fixpath::run(&path),
        Commands::Doctor => commands::doctor::run(&app, json_output),
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            app.show_error(&err.message);
            ExitCode::from(err.code)
        }
    }
}

/// Directory of the running executable, or the current directory.
fn default_root() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."))
}
