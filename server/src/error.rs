//! Server error types
//!
//! Request-time failures never show up here: the dispatcher resolves them
//! into responses. These are the errors that stop a service from starting
//! or end its accept loop.

use std::io;

use routem_core::RouteError;
use thiserror::Error;

/// Error type covering the service lifecycle
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding, accepting or reading the config file failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration values
    #[error("Configuration error: {0}")]
    Config(String),

    /// The route set could not be built into a trie
    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    /// Config file was not valid JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The accept loop task failed to complete
    #[error("Task error: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}

/// Convenient Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;
