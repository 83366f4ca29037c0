//! Language server executable resolution.
//!
//! Resolution order: an explicit override, then a release build next to
//! the extension, then a debug build, then the bare binary name left to
//! the system search path.

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::config::LauncherConfig;

/// Resolves the server command from an override and two candidate paths.
///
/// `exists` is consulted for `release` and then `debug`. An error from
/// `exists` ends the search and the bare `fallback` name is returned.
pub fn resolve_command<F>(
    override_path: Option<&str>,
    release: &Path,
    debug: &Path,
    fallback: &str,
    exists: F,
) -> String
where
    F: Fn(&Path) -> io::Result<bool>,
{
    if let Some(path) = override_path {
        return path.to_string();
    }

    for candidate in [release, debug] {
        match exists(candidate) {
            Ok(true) => return candidate.to_string_lossy().into_owned(),
            Ok(false) => {}
            Err(e) => {
                debug!(candidate = %candidate.display(), error = %e, "existence check failed, using PATH");
                return fallback.to_string();
            }
        }
    }

    fallback.to_string()
}

/// Locates the language server relative to an extension install directory.
#[derive(Debug, Clone)]
pub struct ServerLocator {
    release: PathBuf,
    debug: PathBuf,
    fallback: String,
    override_env: String,
}

impl ServerLocator {
    /// Creates a locator for an extension installed at `extension_path`.
    ///
    /// Build outputs are expected two levels up, under `target/`.
    pub fn new(extension_path: &Path, config: &LauncherConfig) -> Self {
        let target = normalize(&extension_path.join("..").join("..")).join("target");
        let file_name = config.server_file_name();
        Self {
            release: target.join("release").join(&file_name),
            debug: target.join("debug").join(&file_name),
            fallback: config.server_binary.clone(),
            override_env: config.server_path_env.clone(),
        }
    }

    /// Path of the release build candidate.
    pub fn release_path(&self) -> &Path {
        &self.release
    }

    /// Path of the debug build candidate.
    pub fn debug_path(&self) -> &Path {
        &self.debug
    }

    /// Reads the override from the environment and checks the filesystem.
    pub fn resolve(&self) -> String {
        let override_path = std::env::var(&self.override_env)
            .ok()
            .filter(|value| !value.is_empty());
        let command = self.resolve_with(override_path.as_deref(), |p| p.try_exists());
        debug!(command = %command, "resolved language server command");
        command
    }

    /// Resolves against an explicit override and existence predicate.
    pub fn resolve_with<F>(&self, override_path: Option<&str>, exists: F) -> String
    where
        F: Fn(&Path) -> io::Result<bool>,
    {
        resolve_command(
            override_path,
            &self.release,
            &self.debug,
            &self.fallback,
            exists,
        )
    }
}

/// Lexically folds `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}
