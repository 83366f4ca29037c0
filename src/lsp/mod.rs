//! Language client module.
//!
//! The client manages one session with an external language server:
//! process spawning, the JSON-RPC main loop, the initialize handshake,
//! document synchronization and shutdown.
//!
//! # Architecture
//!
//! - `client`: the language client and its lifecycle
//! - `selector`: document selector and synchronization options
//! - `watcher`: workspace file watcher for synchronized files
//! - `trace`: trace output for server notifications
//! - `types`: path and language id helpers

pub mod client;
pub mod selector;
pub mod trace;
pub mod types;
pub mod watcher;

use std::fmt;

use crate::error::ClientError;

pub use client::{ClientTimeouts, LanguageClient};
pub use selector::{ClientOptions, DocumentFilter, DocumentSelector, FileEvents};

/// Result type for language client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Lifecycle state of a [`LanguageClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Created, not started.
    Idle,
    /// Process spawned, handshake in progress.
    Starting,
    /// Handshake completed.
    Running,
    /// Handshake failed or the connection dropped.
    Failed,
    /// Stopped by the host.
    Stopped,
}

impl ClientState {
    /// Whether the server process is expected to be alive.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}
