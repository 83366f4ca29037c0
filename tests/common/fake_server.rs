//! In-process language server that records what the client sends.
//!
//! Connected to the client through an in-memory duplex pipe, so tests can
//! drive a full session without spawning a process.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_lsp::router::Router;
use futures::{AsyncRead, AsyncWrite};
use lsp_types::{
    FileEvent, Hover, HoverContents, HoverProviderCapability, InitializeResult, MarkedString,
    ServerCapabilities, ServerInfo, TextDocumentSyncCapability, TextDocumentSyncKind, Url,
    notification, request,
};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt, TokioAsyncWriteCompatExt};

/// Hover text returned for every hover request.
pub const HOVER_TEXT: &str = "margarine hover";

/// A message received by the fake server.
#[derive(Debug, Clone, PartialEq)]
pub enum Received {
    Initialize,
    Initialized,
    DidOpen { uri: Url, version: i32, text: String },
    DidChange { uri: Url, version: i32, text: String },
    DidClose { uri: Url },
    WatchedFiles(Vec<FileEvent>),
    Hover,
    Shutdown,
    Exit,
}

/// Shared log of received messages.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    log: Arc<Mutex<Vec<Received>>>,
}

impl Recorder {
    fn push(&self, message: Received) {
        self.log.lock().expect("recorder poisoned").push(message);
    }

    /// Snapshot of everything received so far.
    pub fn messages(&self) -> Vec<Received> {
        self.log.lock().expect("recorder poisoned").clone()
    }

    /// Polls until `pred` holds for the log or five seconds pass.
    pub async fn wait_for(&self, pred: impl Fn(&[Received]) -> bool) -> bool {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if pred(&self.messages()) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// All watched-file events received so far, flattened.
    pub fn file_events(&self) -> Vec<FileEvent> {
        self.messages()
            .into_iter()
            .filter_map(|m| match m {
                Received::WatchedFiles(changes) => Some(changes),
                _ => None,
            })
            .flatten()
            .collect()
    }
}

/// Client side of the pipe, ready for `LanguageClient::start_with_io`.
pub struct ClientIo {
    pub input: Compat<ReadHalf<DuplexStream>>,
    pub output: Compat<WriteHalf<DuplexStream>>,
}

/// Starts the fake server on the current runtime.
pub fn spawn_fake_server() -> (Recorder, ClientIo) {
    let (client_end, server_end) = tokio::io::duplex(64 * 1024);
    let (client_read, client_write) = tokio::io::split(client_end);
    let (server_read, server_write) = tokio::io::split(server_end);

    let recorder = Recorder::default();
    tokio::spawn(serve(
        recorder.clone(),
        server_read.compat(),
        server_write.compat_write(),
    ));

    (
        recorder,
        ClientIo {
            input: client_read.compat(),
            output: client_write.compat_write(),
        },
    )
}

async fn serve(
    recorder: Recorder,
    input: impl AsyncRead + Send + 'static,
    output: impl AsyncWrite + Send + 'static,
) {
    let (mainloop, _client) = async_lsp::MainLoop::new_server(|_client| {
        let mut router = Router::new(recorder);
        router
            .request::<request::Initialize, _>(|st, _| {
                st.push(Received::Initialize);
                async move {
                    Ok(InitializeResult {
                        capabilities: ServerCapabilities {
                            hover_provider: Some(HoverProviderCapability::Simple(true)),
                            text_document_sync: Some(TextDocumentSyncCapability::Kind(
                                TextDocumentSyncKind::FULL,
                            )),
                            ..ServerCapabilities::default()
                        },
                        server_info: Some(ServerInfo {
                            name: "fake-margarine-lsp".to_string(),
                            version: None,
                        }),
                    })
                }
            })
            .request::<request::HoverRequest, _>(|st, _| {
                st.push(Received::Hover);
                async move {
                    Ok(Some(Hover {
                        contents: HoverContents::Scalar(MarkedString::String(
                            HOVER_TEXT.to_string(),
                        )),
                        range: None,
                    }))
                }
            })
            .request::<request::Shutdown, _>(|st, ()| {
                st.push(Received::Shutdown);
                async move { Ok(()) }
            })
            .notification::<notification::Initialized>(|st, _| {
                st.push(Received::Initialized);
                ControlFlow::Continue(())
            })
            .notification::<notification::DidOpenTextDocument>(|st, params| {
                let doc = params.text_document;
                st.push(Received::DidOpen {
                    uri: doc.uri,
                    version: doc.version,
                    text: doc.text,
                });
                ControlFlow::Continue(())
            })
            .notification::<notification::DidChangeTextDocument>(|st, params| {
                let text = params
                    .content_changes
                    .into_iter()
                    .map(|c| c.text)
                    .collect::<String>();
                st.push(Received::DidChange {
                    uri: params.text_document.uri,
                    version: params.text_document.version,
                    text,
                });
                ControlFlow::Continue(())
            })
            .notification::<notification::DidCloseTextDocument>(|st, params| {
                st.push(Received::DidClose {
                    uri: params.text_document.uri,
                });
                ControlFlow::Continue(())
            })
            .notification::<notification::DidChangeWatchedFiles>(|st, params| {
                st.push(Received::WatchedFiles(params.changes));
                ControlFlow::Continue(())
            })
            .notification::<notification::Exit>(|st, ()| {
                st.push(Received::Exit);
                ControlFlow::Break(Ok(()))
            });
        router
    });

    let _ = mainloop.run_buffered(input, output).await;
}
