//! CLI error types.

use ars_config::ConfigError;
use ars_server::StartupError;

/// CLI error type.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Startup(#[from] StartupError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Validation(String),
}
