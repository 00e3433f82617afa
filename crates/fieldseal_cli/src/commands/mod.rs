//! CLI command implementations.

pub mod classify;
pub mod cutover;
pub mod migrate;
mod output;
pub mod rotate;
mod settings;
pub mod verify;

pub use settings::Settings;

use fieldseal_core::RunSummary;
use std::process::ExitCode;

/// How a command ended, mapped onto the process exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Everything succeeded, or there was nothing to do.
    Success,
    /// At least one record failed, or the run was interrupted.
    RecordsFailed,
    /// Configuration or store error.
    Aborted,
}

impl CommandStatus {
    /// Derives the status of a finished run.
    pub fn of(summary: &RunSummary) -> Self {
        if summary.abort_reason.is_some() {
            Self::Aborted
        } else if summary.is_success() {
            Self::Success
        } else {
            Self::RecordsFailed
        }
    }

    /// Returns the process exit code.
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Success => ExitCode::SUCCESS,
            Self::RecordsFailed => ExitCode::from(1),
            Self::Aborted => ExitCode::from(2),
        }
    }
}

/// Result type shared by the command entry points.
pub type CommandResult = Result<CommandStatus, Box<dyn std::error::Error>>;
