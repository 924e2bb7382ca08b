//! CLI error types.

use csb_config::ConfigError;
use csb_sandbox::{SandboxError, UnknownMode};

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Mode(#[from] UnknownMode),

    #[error("{path}: {source}")]
    Sandbox {
        path: String,
        #[source]
        source: SandboxError,
    },

    #[error("{0}")]
    Validation(String),
}
