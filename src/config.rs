//! Launcher configuration.
//!
//! Everything the activation shim needs to know about the Margarine
//! language server lives here: the binary name, the environment override,
//! the document selector and the synchronized config-file glob.

use std::time::Duration;

/// Environment variable that overrides the server executable path.
pub const SERVER_PATH_ENV: &str = "SERVER_PATH";

/// Name of the language server executable.
pub const SERVER_BINARY: &str = "margarine-lsp";

/// Language identifier handled by the server.
pub const LANGUAGE_ID: &str = "margarine";

/// Static configuration for launching the Margarine language server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LauncherConfig {
    /// Environment variable consulted for an absolute server path.
    pub server_path_env: String,
    /// Executable name used for build-output lookups and the PATH fallback.
    pub server_binary: String,
    /// Client identifier (also reported as `clientInfo.name`).
    pub client_id: String,
    /// Human readable client name.
    pub client_name: String,
    /// URI scheme of documents forwarded to the server.
    pub document_scheme: String,
    /// Language identifier of documents forwarded to the server.
    pub language_id: String,
    /// Glob for workspace files whose changes are synchronized to the server.
    pub watched_glob: String,
    /// Environment variable set on the spawned server.
    pub log_env: String,
    /// Value of [`LauncherConfig::log_env`] for the spawned server.
    pub log_level: String,
    /// Timeout for the initialize handshake.
    pub init_timeout: Duration,
    /// Timeout for each stop step (shutdown request, process exit).
    pub stop_timeout: Duration,
    /// Timeout for requests sent through the client.
    pub request_timeout: Duration,
    /// Debounce window for watched-file events.
    pub watch_debounce: Duration,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            server_path_env: SERVER_PATH_ENV.to_string(),
            server_binary: SERVER_BINARY.to_string(),
            client_id: "margarine-lsp".to_string(),
            client_name: "Margarine language server".to_string(),
            document_scheme: "file".to_string(),
            language_id: LANGUAGE_ID.to_string(),
            watched_glob: "**/.clientrc".to_string(),
            log_env: "RUST_LOG".to_string(),
            log_level: "debug".to_string(),
            init_timeout: Duration::from_secs(30),
            stop_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            watch_debounce: Duration::from_millis(200),
        }
    }
}

impl LauncherConfig {
    /// Server binary name with the platform executable suffix.
    pub fn server_file_name(&self) -> String {
        format!("{}{}", self.server_binary, std::env::consts::EXE_SUFFIX)
    }
}
