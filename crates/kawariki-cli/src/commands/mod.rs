pub mod completions;
pub mod components;
pub mod doctor;
pub mod fixpath;
pub mod man_pages;
pub mod run;
pub mod show;
pub mod versions;

use kawariki_core::{exit, CoreError};
use std::fmt;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = exit::INTERNAL;
pub const EXIT_USAGE: u8 = 64;

/// A failed command and the process exit status it maps to.
#[derive(Debug)]
pub struct CommandError {
    pub code: u8,
    pub message: String,
}

impl CommandError {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<CoreError> for CommandError {
    fn from(err: CoreError) -> Self {
        Self::new(err.exit_code(), err.to_string())
    }
}

impl From<String> for CommandError {
    fn from(message: String) -> Self {
        Self::new(EXIT_FAILURE, message)
    }
}

pub type CommandResult = Result<u8, CommandError>;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn colorize_installed(installed: bool) -> String {
    use console::Style;
    if installed {
        Style::new().green().apply_to("installed").to_string()
    } else {
        Style::new().dim().apply_to("-").to_string()
    }
}
