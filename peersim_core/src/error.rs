//! Error types for the core engines.

use peersim_env::EnvError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::directory::DirectoryError;

/// Errors surfaced by bootstrap and by individual actions.
///
/// Inside the scheduler every variant is logged and dropped; only
/// `Config` and `Registration` ever stop the process.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Initial directory registration failed
    #[error("Failed to register with directory: {0}")]
    Registration(#[source] DirectoryError),

    /// Any other directory call failed
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Substrate or record store call failed
    #[error(transparent)]
    Env(#[from] EnvError),
}
