//! Error types for the admin tool.

use std::fmt;

/// Failures surfaced to the operator.
#[derive(Debug)]
pub enum AdminError {
    /// Configuration could not be loaded or is incomplete.
    Config { details: String },
    /// A subcommand failed.
    Command { command: &'static str },
    /// Output could not be rendered.
    Output { details: String },
}

impl fmt::Display for AdminError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "invalid configuration: {details}"),
            Self::Command { command } => write!(f, "'{command}' failed"),
            Self::Output { details } => write!(f, "failed to render output: {details}"),
        }
    }
}

impl std::error::Error for AdminError {}
