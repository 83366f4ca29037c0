//! Run configuration for the language server process.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use serde::Serialize;

use crate::config::LauncherConfig;

/// A command line and environment used to spawn the language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Executable {
    /// Program to run, either a path or a name looked up on `PATH`.
    pub command: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Variables set on top of the base environment.
    pub env: BTreeMap<String, String>,
    /// Whether the host environment is passed through to the child.
    pub inherit_env: bool,
}

impl Executable {
    /// Creates an executable with an empty environment.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            inherit_env: false,
        }
    }

    /// Creates an executable that inherits the host environment and turns
    /// on the server's diagnostic logging.
    pub fn inherited(command: impl Into<String>, config: &LauncherConfig) -> Self {
        Self::new(command)
            .inherit_env(true)
            .env(&config.log_env, &config.log_level)
    }

    /// Adds arguments.
    #[must_use]
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets one environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Controls host environment inheritance.
    #[must_use]
    pub fn inherit_env(mut self, inherit: bool) -> Self {
        self.inherit_env = inherit;
        self
    }

    /// The complete environment the child starts with.
    ///
    /// A snapshot of the host environment when inheriting, with
    /// [`Executable::env`] applied on top.
    pub fn effective_env(&self) -> BTreeMap<OsString, OsString> {
        let mut env: BTreeMap<OsString, OsString> = if self.inherit_env {
            std::env::vars_os().collect()
        } else {
            BTreeMap::new()
        };
        env.extend(
            self.env
                .iter()
                .map(|(k, v)| (OsString::from(k), OsString::from(v))),
        );
        env
    }

    /// Builds the process command with piped stdio, rooted at `cwd`.
    ///
    /// The child environment is cleared and then set to
    /// [`Executable::effective_env`].
    pub fn command(&self, cwd: &Path) -> async_process::Command {
        let mut cmd = async_process::Command::new(&self.command);
        cmd.env_clear()
            .envs(self.effective_env())
            .args(&self.args)
            .current_dir(cwd)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        cmd
    }
}

/// Executables for normal and debug sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerOptions {
    /// Used for normal sessions.
    pub run: Executable,
    /// Used when the host runs in debug mode.
    pub debug: Executable,
}

impl ServerOptions {
    /// Uses the same executable for run and debug sessions.
    pub fn new(run: Executable) -> Self {
        Self {
            debug: run.clone(),
            run,
        }
    }

    /// Picks the executable for the given mode.
    pub fn select(&self, debug_mode: bool) -> &Executable {
        if debug_mode { &self.debug } else { &self.run }
    }
}
