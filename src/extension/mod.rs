//! Activation shim.
//!
//! [`activate`] resolves the language server executable, builds the client
//! configuration and starts the client. The returned [`Session`] owns the
//! client; hand it back to [`deactivate`] to stop the server.

pub mod resolve;
pub mod server;

use std::path::PathBuf;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::info;

use crate::config::LauncherConfig;
use crate::error::Result;
use crate::lsp::{
    ClientOptions, ClientTimeouts, DocumentFilter, DocumentSelector, FileEvents, LanguageClient,
};

pub use resolve::{ServerLocator, resolve_command};
pub use server::{Executable, ServerOptions};

/// What the host knows about the extension being activated.
#[derive(Debug, Clone)]
pub struct ExtensionContext {
    /// Directory the extension is installed in.
    pub extension_path: PathBuf,
    /// Workspace opened in the editor.
    pub workspace_root: PathBuf,
    /// Whether the host runs the extension in debug mode.
    pub debug: bool,
}

impl ExtensionContext {
    /// Creates a context for a non-debug session.
    pub fn new(extension_path: impl Into<PathBuf>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            extension_path: extension_path.into(),
            workspace_root: workspace_root.into(),
            debug: false,
        }
    }
}

/// A live client session created by [`activate`].
#[derive(Debug)]
pub struct Session {
    client: LanguageClient,
}

impl Session {
    /// The session's language client.
    pub fn client(&self) -> &LanguageClient {
        &self.client
    }
}

/// Client options for Margarine documents.
pub fn client_options(config: &LauncherConfig) -> ClientOptions {
    ClientOptions {
        document_selector: DocumentSelector::new([DocumentFilter::new()
            .scheme(&config.document_scheme)
            .language(&config.language_id)]),
        synchronize: Some(FileEvents::new(&config.watched_glob).debounce(config.watch_debounce)),
        trace_output: true,
    }
}

/// Server options for a resolved command.
pub fn server_options(command: impl Into<String>, config: &LauncherConfig) -> ServerOptions {
    ServerOptions::new(Executable::inherited(command, config))
}

/// Activates the integration with the default configuration.
///
/// Must be called within a tokio runtime. Returns once the server process is
/// spawned; the handshake continues in the background.
/// ## Errors
pub fn activate(ctx: &ExtensionContext) -> Result<Session> {
    activate_with(ctx, &LauncherConfig::default())
}

/// Activates the integration with an explicit configuration.
/// ## Errors
pub fn activate_with(ctx: &ExtensionContext, config: &LauncherConfig) -> Result<Session> {
    let command = ServerLocator::new(&ctx.extension_path, config).resolve();

    let mut client = LanguageClient::new(
        &config.client_id,
        &config.client_name,
        server_options(command, config),
        client_options(config),
    )
    .debug_mode(ctx.debug)
    .timeouts(ClientTimeouts {
        init: config.init_timeout,
        stop: config.stop_timeout,
        request: config.request_timeout,
    });

    client.start(&ctx.workspace_root)?;
    info!(client = %config.client_id, "extension activated");

    Ok(Session { client })
}

/// Deactivates the integration.
///
/// Returns `None` when no session was ever created, otherwise the future
/// that completes once the client has stopped.
pub fn deactivate(session: Option<Session>) -> Option<BoxFuture<'static, Result<()>>> {
    let session = session?;
    let stop = session.client.stop();
    Some(async move { Ok(stop.await?) }.boxed())
}
