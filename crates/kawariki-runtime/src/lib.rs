//! Process launch infrastructure for Kawariki.
//!
//! This crate implements the execution layer: the per-launch
//! `ProcessEnvironment` (scratch space, cleanup stack, environment table,
//! overlay queue), scoped file replacement through namespace bind overlays
//! or rename/restore, the `LaunchInfo` exec driver, prerequisite checking,
//! and terminal message reporting.

pub mod environment;
pub mod launch;
pub mod overlay;
pub mod prereq;
pub mod terminal;

pub use environment::ProcessEnvironment;
pub use launch::{LaunchInfo, PreparedCommand};
pub use overlay::{backup_path, ReplaceMode};
pub use prereq::{check_overlay_prereqs, format_missing, is_executable, MissingPrereq};
pub use terminal::{format_message, is_interactive_terminal, print_message, MessageKind};

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("comma in paths is not supported by the overlay helper: {}", .0.display())]
    ReservedDelimiter(PathBuf),
    #[error("namespace overlays are not available")]
    OverlayUnavailable,
    #[error("backup file already exists: {}", .0.display())]
    BackupAlreadyExists(PathBuf),
    #[error("nothing to execute: empty argument list")]
    EmptyArgv,
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
    #[error(transparent)]
    Cleanup(CleanupErrors),
}

/// Every failure collected by one `ProcessEnvironment::cleanup` run.
#[derive(Debug, Default)]
pub struct CleanupErrors(pub Vec<RuntimeError>);

impl CleanupErrors {
    pub fn errors(&self) -> &[RuntimeError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for CleanupErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errors cleaning up process environment:")?;
        for e in &self.0 {
            write!(f, "\n  - {e}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CleanupErrors {}
