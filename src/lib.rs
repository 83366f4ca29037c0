//! Margarine language client
//!
//! Wires an editor to the external `margarine-lsp` language server. The
//! crate locates the server executable, spawns it, and runs a language
//! client that forwards document events to it. All analysis happens in
//! the server.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  activate/deactivate  ┌──────────────────┐
//! │    Editor    │──────────────────────►│  Activation Shim │
//! │    (host)    │                       │   (extension)    │
//! └──────┬───────┘                       └────────┬─────────┘
//!        │ documents                              │ resolve + start
//!        │                                ┌───────▼───────┐
//!        └───────────────────────────────►│ LanguageClient│
//!                                         └───────┬───────┘
//!                                                 │ JSON-RPC (stdio)
//!                                         ┌───────▼───────┐
//!                                         │ margarine-lsp │
//!                                         └───────────────┘
//! ```
//!
//! # Modules
//!
//! - [`extension`] - Activation shim, executable resolution, run configuration
//! - [`lsp`] - Language client, document selector, file watcher, trace output
//! - [`config`] - Launcher constants and defaults
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```ignore
//! use margarine_client::extension::{ExtensionContext, activate, deactivate};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let ctx = ExtensionContext::new("editors/vscode", ".");
//!     let session = activate(&ctx)?;
//!     session.client().open_path("src/main.mar".as_ref()).await?;
//!
//!     if let Some(stopped) = deactivate(Some(session)) {
//!         stopped.await?;
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod extension;
pub mod lsp;

pub use error::{Error, Result};
pub use extension::{ExtensionContext, Session, activate, deactivate};
