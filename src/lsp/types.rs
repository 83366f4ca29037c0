//! Helper conversions for documents sent to the language server.

use lsp_types::Url;
use std::path::Path;

use crate::config::LANGUAGE_ID;
use crate::error::ClientError;

use super::ClientResult;

/// Converts a path to an LSP file:// URI.
///
/// Relative paths are resolved against the current directory and the
/// result is canonicalized.
/// ## Errors
pub fn path_to_url(path: &Path) -> ClientResult<Url> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| {
                ClientError::DocumentNotFound(format!("failed to get current directory: {e}"))
            })?
            .join(path)
    };

    let canonical = absolute.canonicalize().map_err(|e| {
        ClientError::DocumentNotFound(format!(
            "failed to canonicalize path '{}': {}",
            path.display(),
            e
        ))
    })?;

    Url::from_file_path(&canonical).map_err(|()| {
        ClientError::DocumentNotFound(format!("invalid path: {}", canonical.display()))
    })
}

/// Determines the language identifier from a file extension.
pub fn language_id_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("mar") => LANGUAGE_ID,
        _ => "plaintext",
    }
}
