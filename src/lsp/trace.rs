//! Trace output for server-to-client notifications.
//!
//! Plays the role of the editor's trace channel: server log messages,
//! window messages and diagnostics summaries are emitted as `tracing`
//! events under [`TRACE_TARGET`].

use lsp_types::{LogMessageParams, MessageType, ProgressParams, PublishDiagnosticsParams};
use tracing::{debug, error, info, trace, warn};

/// Target used for all trace output events.
pub const TRACE_TARGET: &str = "margarine_client::trace";

/// Router state that receives server notifications.
#[derive(Debug, Clone)]
pub struct TraceOutput {
    server: String,
    enabled: bool,
}

impl TraceOutput {
    /// Creates trace output for the named server.
    pub fn new(server: impl Into<String>, enabled: bool) -> Self {
        Self {
            server: server.into(),
            enabled,
        }
    }

    /// Handles `window/logMessage` and `window/showMessage`.
    pub fn message(&self, params: &LogMessageParams) {
        if !self.enabled {
            trace!(target: TRACE_TARGET, server = %self.server, message = %params.message);
            return;
        }
        let server = self.server.as_str();
        let message = params.message.as_str();
        match params.typ {
            MessageType::ERROR => error!(target: TRACE_TARGET, server, "{message}"),
            MessageType::WARNING => warn!(target: TRACE_TARGET, server, "{message}"),
            MessageType::INFO => info!(target: TRACE_TARGET, server, "{message}"),
            _ => debug!(target: TRACE_TARGET, server, "{message}"),
        }
    }

    /// Handles `textDocument/publishDiagnostics`.
    pub fn diagnostics(&self, params: &PublishDiagnosticsParams) {
        debug!(
            target: TRACE_TARGET,
            server = %self.server,
            uri = %params.uri,
            count = params.diagnostics.len(),
            version = ?params.version,
            "diagnostics published"
        );
    }

    /// Handles `$/progress`.
    pub fn progress(&self, params: &ProgressParams) {
        trace!(target: TRACE_TARGET, server = %self.server, token = ?params.token, "progress");
    }
}
