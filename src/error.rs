//! Error types for the margarine client.
//!
//! Errors are organized by subsystem: the language client and the
//! activation shim. The crate-level [`Error`] unifies them.

use thiserror::Error;

use crate::lsp::ClientState;

/// Errors related to the language client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The language server process failed to start.
    #[error("failed to start language server: {0}")]
    ServerStartFailed(String),

    /// Failed to initialize the language server.
    #[error("language server initialization failed: {0}")]
    InitializationFailed(String),

    /// A request to the language server timed out.
    #[error("language server request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Failed to send a request or notification to the language server.
    #[error("failed to send request to language server: {0}")]
    RequestFailed(String),

    /// The client is not in a state that accepts document traffic.
    #[error("language client is not running (state: {0})")]
    NotRunning(ClientState),

    /// `start` was called on a client that was already started.
    #[error("language client already started")]
    AlreadyStarted,

    /// Document not found or not open.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The file system watcher could not be set up.
    #[error("file watcher error: {0}")]
    Watcher(String),

    /// The document selector or watched glob is invalid.
    #[error("invalid glob pattern '{pattern}': {reason}")]
    InvalidGlob {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The server process could not be terminated.
    #[error("failed to terminate language server: {0}")]
    KillFailed(#[source] std::io::Error),
}

/// A unified error type for the entire crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Language client error.
    #[error("language client error: {0}")]
    Client(#[from] ClientError),

    /// Generic IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized Result type for margarine-client operations.
pub type Result<T> = std::result::Result<T, Error>;
