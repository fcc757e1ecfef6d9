//! Launch orchestration for Kawariki.
//!
//! This crate ties the schema and runtime layers together: the application
//! layout (`App`), per-component distribution catalogs with their selection
//! policies (`Catalog`), and the `Engine` that loads a manifest, selects and
//! installs a distribution, stages file replacements and launches the game.
//! Failures that should become a specific process exit status are reported as
//! `CoreError::Exit`.

pub mod app;
pub mod catalog;
pub mod concurrency;
pub mod engine;

pub use app::{host_platform, App, MessageSink};
pub use catalog::{synthesizer_for, Catalog};
pub use concurrency::{install_signal_handler, interrupt_requested};
pub use engine::{Engine, Installer, LaunchOutcome, LaunchRequest, PreparedLaunch, Selector};

use thiserror::Error;

/// Process exit statuses assigned to launch failures.
pub mod exit {
    pub const INTERNAL: u8 = 1;
    pub const MANIFEST: u8 = 2;
    pub const UNKNOWN_DISTRIBUTION: u8 = 5;
    pub const NO_SUITABLE_DISTRIBUTION: u8 = 6;
    pub const PATCH_FAILED: u8 = 7;
    pub const INSTALL_FAILED: u8 = 10;
    pub const NO_COMPATIBLE_VERSION: u8 = 11;
    pub const UNKNOWN_COMPONENT: u8 = 22;
    pub const INTERRUPTED: u8 = 130;
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] kawariki_schema::ManifestError),
    #[error("runtime error: {0}")]
    Runtime(#[from] kawariki_runtime::RuntimeError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{message}")]
    Exit { code: u8, message: String },
}

impl CoreError {
    pub fn exit(code: u8, message: impl Into<String>) -> Self {
        Self::Exit {
            code,
            message: message.into(),
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Exit { code, .. } => *code,
            Self::Manifest(_) => exit::MANIFEST,
            Self::Runtime(_) | Self::Io(_) => exit::INTERNAL,
        }
    }
}
