//! Language client for the Margarine language server.
//!
//! The client spawns the server, runs the JSON-RPC main loop and performs
//! the initialize handshake in the background so that `start` returns as
//! soon as the process is running. Document notifications wait until the
//! handshake has completed.
//!
//! [`LanguageClient::start_with_io`] runs the same session over an existing
//! transport instead of a spawned process.
//!
//! # Example
//!
//! ```ignore
//! use margarine_client::lsp::{ClientOptions, LanguageClient};
//! use margarine_client::extension::{Executable, ServerOptions};
//!
//! let mut client = LanguageClient::new(
//!     "margarine-lsp",
//!     "Margarine language server",
//!     ServerOptions::new(Executable::new("margarine-lsp")),
//!     ClientOptions::default(),
//! );
//! client.start(Path::new("."))?;
//! client.open_path(Path::new("src/main.mar")).await?;
//! client.stop().await?;
//! ```

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_lsp::concurrency::ConcurrencyLayer;
use async_lsp::panic::CatchUnwindLayer;
use async_lsp::router::Router;
use async_lsp::tracing::TracingLayer;
use async_lsp::{LanguageServer, ServerSocket};
use lsp_types::{
    ClientCapabilities, ClientInfo, DidChangeTextDocumentParams,
    DidChangeWatchedFilesClientCapabilities, DidChangeWatchedFilesParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DynamicRegistrationClientCapabilities,
    FileEvent, HoverClientCapabilities, InitializeParams, InitializedParams, LogMessageParams,
    MarkupKind, PublishDiagnosticsClientCapabilities, ServerCapabilities,
    TextDocumentClientCapabilities, TextDocumentContentChangeEvent, TextDocumentIdentifier,
    TextDocumentItem, TextDocumentSyncClientCapabilities, TraceValue, Url,
    VersionedTextDocumentIdentifier, WindowClientCapabilities, WorkDoneProgressParams,
    WorkspaceClientCapabilities, WorkspaceFolder, notification, request,
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tracing::{debug, info, warn};

use crate::error::ClientError;
use crate::extension::ServerOptions;

use super::selector::ClientOptions;
use super::trace::TraceOutput;
use super::types::{language_id_for, path_to_url};
use super::watcher::{FileSystemWatcher, coalesce};
use super::{ClientResult, ClientState};

type FileEventBatches = UnboundedReceiver<Vec<FileEvent>>;

/// Timeouts applied by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTimeouts {
    /// Timeout for the initialize request.
    pub init: Duration,
    /// Timeout for the shutdown request and for process exit.
    pub stop: Duration,
    /// Timeout for requests sent through [`LanguageClient::request`].
    pub request: Duration,
}

impl Default for ClientTimeouts {
    fn default() -> Self {
        Self {
            init: Duration::from_secs(30),
            stop: Duration::from_secs(2),
            request: Duration::from_secs(10),
        }
    }
}

/// Resources that exist only while a session is running.
struct Running {
    server: ServerSocket,
    /// `None` when the session runs over a caller-provided transport.
    child: Option<async_process::Child>,
    mainloop: JoinHandle<()>,
    handshake: JoinHandle<()>,
    watcher: Option<FileSystemWatcher>,
}

/// Language client bound to one server process.
pub struct LanguageClient {
    id: String,
    name: String,
    server_options: ServerOptions,
    client_options: ClientOptions,
    debug: bool,
    timeouts: ClientTimeouts,
    state_tx: Arc<watch::Sender<ClientState>>,
    state_rx: watch::Receiver<ClientState>,
    capabilities: Arc<OnceLock<ServerCapabilities>>,
    documents: Arc<Mutex<HashMap<Url, i32>>>,
    running: Option<Running>,
}

impl std::fmt::Debug for LanguageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanguageClient")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("state", &self.state())
            .field("server_options", &self.server_options)
            .finish_non_exhaustive()
    }
}

impl LanguageClient {
    /// Creates a client. Nothing is spawned until [`LanguageClient::start`].
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        server_options: ServerOptions,
        client_options: ClientOptions,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(ClientState::Idle);
        Self {
            id: id.into(),
            name: name.into(),
            server_options,
            client_options,
            debug: false,
            timeouts: ClientTimeouts::default(),
            state_tx: Arc::new(state_tx),
            state_rx,
            capabilities: Arc::new(OnceLock::new()),
            documents: Arc::new(Mutex::new(HashMap::new())),
            running: None,
        }
    }

    /// Uses the debug executable from the server options.
    #[must_use]
    pub fn debug_mode(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the client timeouts.
    #[must_use]
    pub fn timeouts(mut self, timeouts: ClientTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Client identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human readable client name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        *self.state_rx.borrow()
    }

    /// Server capabilities, once the handshake has completed.
    pub fn capabilities(&self) -> Option<&ServerCapabilities> {
        self.capabilities.get()
    }

    /// Process id of the spawned server.
    pub fn server_pid(&self) -> Option<u32> {
        self.running
            .as_ref()
            .and_then(|r| r.child.as_ref())
            .map(async_process::Child::id)
    }

    /// Spawns the server and begins the session.
    ///
    /// Returns once the process is running; the initialize handshake
    /// continues in the background. Must be called within a tokio runtime.
    /// ## Errors
    pub fn start(&mut self, workspace_root: &Path) -> ClientResult<()> {
        let (workspace_root, workspace_uri) = self.prepare(workspace_root)?;
        let (watcher, file_events) = self.spawn_watcher(&workspace_root)?;

        let executable = self.server_options.select(self.debug);
        let mut child = executable.command(&workspace_root).spawn().map_err(|e| {
            ClientError::ServerStartFailed(format!("failed to spawn '{}': {e}", executable.command))
        })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            ClientError::ServerStartFailed("failed to capture stdout".to_string())
        })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            ClientError::ServerStartFailed("failed to capture stdin".to_string())
        })?;

        info!(
            client = %self.id,
            command = %executable.command,
            pid = child.id(),
            workspace = %workspace_root.display(),
            "language server spawned"
        );

        self.connect(
            &workspace_root,
            workspace_uri,
            stdout,
            stdin,
            Some(child),
            watcher,
            file_events,
        );
        Ok(())
    }

    /// Begins the session over an already connected transport.
    ///
    /// `input` carries messages from the server and `output` carries
    /// messages to it. No process is spawned, so stopping only closes the
    /// session. Must be called within a tokio runtime.
    /// ## Errors
    pub fn start_with_io<I, O>(
        &mut self,
        workspace_root: &Path,
        input: I,
        output: O,
    ) -> ClientResult<()>
    where
        I: futures::AsyncRead + Send + 'static,
        O: futures::AsyncWrite + Send + 'static,
    {
        let (workspace_root, workspace_uri) = self.prepare(workspace_root)?;
        let (watcher, file_events) = self.spawn_watcher(&workspace_root)?;
        debug!(client = %self.id, workspace = %workspace_root.display(), "connecting over transport");
        self.connect(
            &workspace_root,
            workspace_uri,
            input,
            output,
            None,
            watcher,
            file_events,
        );
        Ok(())
    }

    fn prepare(&self, workspace_root: &Path) -> ClientResult<(PathBuf, Url)> {
        if self.running.is_some() || self.state() != ClientState::Idle {
            return Err(ClientError::AlreadyStarted);
        }

        let workspace_root = workspace_root.canonicalize().map_err(|e| {
            ClientError::InitializationFailed(format!("failed to canonicalize workspace root: {e}"))
        })?;
        let workspace_uri = Url::from_file_path(&workspace_root).map_err(|()| {
            ClientError::InitializationFailed(format!(
                "invalid workspace root path: {}",
                workspace_root.display()
            ))
        })?;
        Ok((workspace_root, workspace_uri))
    }

    fn spawn_watcher(
        &self,
        workspace_root: &Path,
    ) -> ClientResult<(Option<FileSystemWatcher>, Option<FileEventBatches>)> {
        match &self.client_options.synchronize {
            Some(events) => {
                let (watcher, rx) =
                    FileSystemWatcher::spawn(workspace_root, &events.glob, events.debounce)?;
                Ok((Some(watcher), Some(rx)))
            }
            None => Ok((None, None)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn connect<I, O>(
        &mut self,
        workspace_root: &Path,
        workspace_uri: Url,
        input: I,
        output: O,
        child: Option<async_process::Child>,
        watcher: Option<FileSystemWatcher>,
        file_events: Option<FileEventBatches>,
    ) where
        I: futures::AsyncRead + Send + 'static,
        O: futures::AsyncWrite + Send + 'static,
    {
        let trace = TraceOutput::new(&self.name, self.client_options.trace_output);
        let (mainloop, server) = async_lsp::MainLoop::new_client(|_server| {
            let mut router = Router::new(trace);

            router.notification::<notification::LogMessage>(|this, params| {
                this.message(&params);
                ControlFlow::Continue(())
            });
            router.notification::<notification::ShowMessage>(|this, params| {
                this.message(&LogMessageParams {
                    typ: params.typ,
                    message: params.message,
                });
                ControlFlow::Continue(())
            });
            router.notification::<notification::PublishDiagnostics>(|this, params| {
                this.diagnostics(&params);
                ControlFlow::Continue(())
            });
            router.notification::<notification::Progress>(|this, params| {
                this.progress(&params);
                ControlFlow::Continue(())
            });
            router.request::<request::WorkDoneProgressCreate, _>(|_, _| async { Ok(()) });
            router.unhandled_notification(|_, notif| {
                debug!(method = %notif.method, "ignoring server notification");
                ControlFlow::Continue(())
            });

            ServiceBuilder::new()
                .layer(TracingLayer::default())
                .layer(CatchUnwindLayer::default())
                .layer(ConcurrencyLayer::default())
                .service(router)
        });

        self.state_tx.send_replace(ClientState::Starting);

        let state = Arc::clone(&self.state_tx);
        let client_id = self.id.clone();
        let mainloop = tokio::spawn(async move {
            if let Err(e) = mainloop.run_buffered(input, output).await {
                warn!(client = %client_id, error = ?e, "language server connection closed");
            }
            state.send_if_modified(|s| {
                if s.is_active() {
                    *s = ClientState::Failed;
                    true
                } else {
                    false
                }
            });
        });

        let handshake = tokio::spawn(handshake(
            server.clone(),
            self.initialize_params(workspace_root, workspace_uri),
            self.timeouts.init,
            Arc::clone(&self.state_tx),
            Arc::clone(&self.capabilities),
            file_events,
        ));

        self.running = Some(Running {
            server,
            child,
            mainloop,
            handshake,
            watcher,
        });
    }

    /// Waits until the initialize handshake has completed.
    /// ## Errors
    /// Returns [`ClientError::NotRunning`] if the client never started, failed
    /// or was stopped.
    pub async fn wait_ready(&self) -> ClientResult<()> {
        let mut rx = self.state_rx.clone();
        let state = *rx
            .wait_for(|s| *s != ClientState::Starting)
            .await
            .map_err(|_| ClientError::NotRunning(ClientState::Stopped))?;
        match state {
            ClientState::Running => Ok(()),
            other => Err(ClientError::NotRunning(other)),
        }
    }

    /// Opens a document in the language server.
    ///
    /// Returns `Ok(false)` when the document selector does not select it.
    /// Opening a document that is already open sends its new text as a
    /// change with the next version.
    /// ## Errors
    pub async fn did_open(&self, uri: Url, language_id: &str, text: String) -> ClientResult<bool> {
        if !self.is_selected(&uri, language_id) {
            return Ok(false);
        }
        let mut server = self.ready_server().await?;

        let mut documents = self.documents.lock().await;
        if let Some(version) = documents.get_mut(&uri) {
            debug!(%uri, "document already open, sending change");
            *version += 1;
            send_change(&mut server, &uri, *version, text)?;
            return Ok(true);
        }

        let version = 1;
        server
            .did_open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri: uri.clone(),
                    language_id: language_id.to_string(),
                    version,
                    text,
                },
            })
            .map_err(|e| ClientError::RequestFailed(format!("didOpen notification failed: {e}")))?;

        documents.insert(uri, version);
        Ok(true)
    }

    /// Reads a file from disk and opens it.
    /// ## Errors
    pub async fn open_path(&self, path: &Path) -> ClientResult<bool> {
        let uri = path_to_url(path)?;
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            ClientError::DocumentNotFound(format!("failed to read '{}': {e}", path.display()))
        })?;
        self.did_open(uri, language_id_for(path), text).await
    }

    /// Sends the full new content of an open document.
    /// ## Errors
    pub async fn did_change(&self, uri: &Url, text: String) -> ClientResult<()> {
        let mut server = self.ready_server().await?;

        let mut documents = self.documents.lock().await;
        let version = documents
            .get_mut(uri)
            .ok_or_else(|| ClientError::DocumentNotFound(format!("document not open: {uri}")))?;
        *version += 1;
        send_change(&mut server, uri, *version, text)
    }

    /// Closes an open document.
    /// ## Errors
    pub async fn did_close(&self, uri: &Url) -> ClientResult<()> {
        let mut server = self.ready_server().await?;

        if self.documents.lock().await.remove(uri).is_none() {
            return Err(ClientError::DocumentNotFound(format!(
                "document not open: {uri}"
            )));
        }

        server
            .did_close(DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri: uri.clone() },
            })
            .map_err(|e| {
                ClientError::RequestFailed(format!("didClose notification failed: {e}"))
            })?;

        Ok(())
    }

    /// Version of an open document.
    pub async fn document_version(&self, uri: &Url) -> Option<i32> {
        self.documents.lock().await.get(uri).copied()
    }

    /// Sends any LSP request to the server and waits for its response.
    /// ## Errors
    /// Returns [`ClientError::Timeout`] if no response arrives within the
    /// request timeout, [`ClientError::RequestFailed`] if the server answers
    /// with an error.
    pub async fn request<R>(&self, params: R::Params) -> ClientResult<R::Result>
    where
        R: request::Request,
    {
        let server = self.ready_server().await?;
        let timeout = self.timeouts.request;
        match tokio::time::timeout(timeout, server.request::<R>(params)).await {
            Err(_) => Err(ClientError::Timeout(timeout)),
            Ok(Err(e)) => Err(ClientError::RequestFailed(format!("{} failed: {e}", R::METHOD))),
            Ok(Ok(result)) => Ok(result),
        }
    }

    /// Stops the client and the server process.
    ///
    /// The returned future sends `shutdown` (if the handshake completed) and
    /// `exit`, then waits for the process, killing it after the stop timeout.
    /// An unresponsive server does not make the stop fail.
    pub fn stop(mut self) -> impl Future<Output = ClientResult<()>> + Send + 'static {
        let running = self.running.take();
        let state = Arc::clone(&self.state_tx);
        let timeout = self.timeouts.stop;
        let client_id = self.id.clone();

        async move {
            let was_running = state.send_replace(ClientState::Stopped) == ClientState::Running;
            let Some(mut running) = running else {
                return Ok(());
            };
            running.handshake.abort();
            drop(running.watcher.take());

            if was_running {
                match tokio::time::timeout(timeout, running.server.shutdown(())).await {
                    Ok(Ok(())) => debug!(client = %client_id, "shutdown acknowledged"),
                    Ok(Err(e)) => warn!(client = %client_id, error = %e, "shutdown request failed"),
                    Err(_) => warn!(client = %client_id, ?timeout, "shutdown request timed out"),
                }
            }
            if let Err(e) = running.server.exit(()) {
                debug!(client = %client_id, error = %e, "exit notification not sent");
            }

            if let Some(mut child) = running.child.take() {
                match tokio::time::timeout(timeout, child.status()).await {
                    Ok(Ok(status)) => debug!(client = %client_id, %status, "language server exited"),
                    Ok(Err(e)) => warn!(client = %client_id, error = %e, "failed to wait for language server"),
                    Err(_) => {
                        warn!(client = %client_id, "language server did not exit, killing it");
                        child.kill().map_err(ClientError::KillFailed)?;
                        let _ = child.status().await;
                    }
                }
            }

            // Lets the main loop flush `exit` before the connection is dropped.
            if tokio::time::timeout(timeout, &mut running.mainloop).await.is_err() {
                running.mainloop.abort();
            }
            info!(client = %client_id, "language client stopped");
            Ok(())
        }
    }

    fn is_selected(&self, uri: &Url, language_id: &str) -> bool {
        let selected = self
            .client_options
            .document_selector
            .matches(uri, language_id);
        if !selected {
            debug!(%uri, language_id, "document not selected");
        }
        selected
    }

    async fn ready_server(&self) -> ClientResult<ServerSocket> {
        self.wait_ready().await?;
        self.running
            .as_ref()
            .map(|r| r.server.clone())
            .ok_or(ClientError::NotRunning(self.state()))
    }

    fn initialize_params(&self, workspace_root: &Path, workspace_uri: Url) -> InitializeParams {
        InitializeParams {
            process_id: Some(std::process::id()),
            workspace_folders: Some(vec![WorkspaceFolder {
                uri: workspace_uri,
                name: workspace_root
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("workspace")
                    .to_string(),
            }]),
            capabilities: ClientCapabilities {
                workspace: Some(WorkspaceClientCapabilities {
                    did_change_configuration: Some(DynamicRegistrationClientCapabilities {
                        dynamic_registration: Some(false),
                    }),
                    did_change_watched_files: Some(DidChangeWatchedFilesClientCapabilities {
                        dynamic_registration: Some(false),
                        relative_pattern_support: None,
                    }),
                    ..Default::default()
                }),
                text_document: Some(TextDocumentClientCapabilities {
                    synchronization: Some(TextDocumentSyncClientCapabilities {
                        dynamic_registration: Some(false),
                        will_save: Some(false),
                        will_save_wait_until: Some(false),
                        did_save: Some(false),
                    }),
                    hover: Some(HoverClientCapabilities {
                        dynamic_registration: Some(false),
                        content_format: Some(vec![MarkupKind::Markdown, MarkupKind::PlainText]),
                    }),
                    publish_diagnostics: Some(PublishDiagnosticsClientCapabilities {
                        version_support: Some(true),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                window: Some(WindowClientCapabilities {
                    work_done_progress: Some(true),
                    ..Default::default()
                }),
                ..Default::default()
            },
            trace: Some(if self.client_options.trace_output {
                TraceValue::Verbose
            } else {
                TraceValue::Off
            }),
            client_info: Some(ClientInfo {
                name: self.id.clone(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            work_done_progress_params: WorkDoneProgressParams::default(),
            ..Default::default()
        }
    }
}

/// Runs the initialize handshake and then forwards watched-file events.
async fn handshake(
    mut server: ServerSocket,
    params: InitializeParams,
    timeout: Duration,
    state: Arc<watch::Sender<ClientState>>,
    capabilities: Arc<OnceLock<ServerCapabilities>>,
    file_events: Option<FileEventBatches>,
) {
    let result = match tokio::time::timeout(timeout, server.initialize(params)).await {
        Err(_) => Err(ClientError::Timeout(timeout)),
        Ok(Err(e)) => Err(ClientError::InitializationFailed(format!(
            "initialize request failed: {e}"
        ))),
        Ok(Ok(result)) => server
            .initialized(InitializedParams {})
            .map(|()| result)
            .map_err(|e| {
                ClientError::InitializationFailed(format!("initialized notification failed: {e}"))
            }),
    };

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "language server handshake failed");
            state.send_if_modified(|s| {
                if *s == ClientState::Starting {
                    *s = ClientState::Failed;
                    true
                } else {
                    false
                }
            });
            return;
        }
    };

    if let Some(info) = &result.server_info {
        info!(server = %info.name, version = ?info.version, "language server initialized");
    }
    let _ = capabilities.set(result.capabilities);

    let promoted = state.send_if_modified(|s| {
        if *s == ClientState::Starting {
            *s = ClientState::Running;
            true
        } else {
            false
        }
    });
    if !promoted {
        return;
    }

    if let Some(events) = file_events {
        forward_file_events(server, events).await;
    }
}

/// Sends the full text of an open document as a versioned change.
fn send_change(server: &mut ServerSocket, uri: &Url, version: i32, text: String) -> ClientResult<()> {
    server
        .did_change(DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier {
                uri: uri.clone(),
                version,
            },
            content_changes: vec![TextDocumentContentChangeEvent {
                range: None,
                range_length: None,
                text,
            }],
        })
        .map_err(|e| ClientError::RequestFailed(format!("didChange notification failed: {e}")))
}

/// Forwards watcher batches as `workspace/didChangeWatchedFiles`.
///
/// Batches that queued up while the previous one was sent are merged.
async fn forward_file_events(mut server: ServerSocket, mut events: FileEventBatches) {
    while let Some(first) = events.recv().await {
        let mut pending = first;
        while let Ok(next) = events.try_recv() {
            pending.extend(next);
        }
        let changes = coalesce(pending);
        if changes.is_empty() {
            continue;
        }
        debug!(count = changes.len(), "forwarding watched file changes");
        if let Err(e) = server.did_change_watched_files(DidChangeWatchedFilesParams { changes }) {
            warn!(error = %e, "didChangeWatchedFiles notification failed");
            break;
        }
    }
}
