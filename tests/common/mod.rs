//! Common test helpers and utilities.

#![allow(dead_code)]

pub mod fake_server;

use std::path::{Path, PathBuf};
use std::time::Duration;

use margarine_client::config::LauncherConfig;
use tempfile::TempDir;

/// A fake checkout: `<root>/editors/vscode` is the extension directory and
/// build outputs live under `<root>/target`.
#[derive(Debug)]
pub struct FakeInstall {
    pub dir: TempDir,
}

impl FakeInstall {
    /// Creates the layout without any build outputs.
    /// ## Panics
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        std::fs::create_dir_all(dir.path().join("editors/vscode"))
            .expect("failed to create extension dir");
        Self { dir }
    }

    /// Root of the fake checkout.
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Extension install directory.
    pub fn extension_path(&self) -> PathBuf {
        self.root().join("editors/vscode")
    }

    /// Path of the server binary for a build profile.
    pub fn artifact(&self, profile: &str) -> PathBuf {
        self.root()
            .join("target")
            .join(profile)
            .join(LauncherConfig::default().server_file_name())
    }

    /// Writes an empty placeholder server binary for a build profile.
    /// ## Panics
    pub fn add_artifact(&self, profile: &str) -> PathBuf {
        let path = self.artifact(profile);
        std::fs::create_dir_all(path.parent().unwrap()).expect("failed to create target dir");
        std::fs::write(&path, b"").expect("failed to write artifact");
        path
    }

    /// Installs `program` as the server binary for a build profile.
    /// ## Panics
    #[cfg(unix)]
    pub fn link_artifact(&self, profile: &str, program: &Path) -> PathBuf {
        let path = self.artifact(profile);
        std::fs::create_dir_all(path.parent().unwrap()).expect("failed to create target dir");
        std::os::unix::fs::symlink(program, &path).expect("failed to link artifact");
        path
    }
}

/// Clears the server path override for the current process.
pub fn clear_server_path() {
    // SAFETY: callers are #[serial], no other thread touches the environment.
    unsafe { std::env::remove_var(margarine_client::config::SERVER_PATH_ENV) };
}

/// Sets the server path override for the current process.
pub fn set_server_path(value: &str) {
    // SAFETY: callers are #[serial], no other thread touches the environment.
    unsafe { std::env::set_var(margarine_client::config::SERVER_PATH_ENV, value) };
}

/// Launcher configuration with short timeouts for tests.
pub fn fast_config() -> LauncherConfig {
    LauncherConfig {
        init_timeout: Duration::from_secs(2),
        stop_timeout: Duration::from_millis(200),
        request_timeout: Duration::from_secs(2),
        watch_debounce: Duration::from_millis(100),
        ..LauncherConfig::default()
    }
}

/// A program that keeps stdin/stdout open but never speaks LSP.
pub fn echo_program() -> Option<PathBuf> {
    let cat = PathBuf::from("/bin/cat");
    cat.exists().then_some(cat)
}
