// MgSetup: Provisioning shaped dumbbell and multipath topologies on Emulab testbeds
// Copyright (C) 2023 Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Module for managing SSH sessions.

use std::{
    ffi::OsStr,
    process::{Command as StdCommand, Output},
};

use thiserror::Error;
use tokio::process::Command;

use crate::cmd::Cmd;

pub const EMPTY: &[&str] = &[];

/// This is the main SSH session with a testbed node.
///
/// The session does not keep a connection open by itself. Instead, every command spawns a new
/// `ssh` process with the configured options (see [`crate::config::SshConfig`]). The default
/// options let `ssh` manage a control master, such that consecutive commands reuse the same
/// connection:
///
/// - `StrictHostKeyChecking no`
/// - `ControlMaster auto`
/// - `ControlPath /tmp/.ssh-%r@%h:%p`
/// - `ControlPersist 30m`
/// - `BatchMode yes`
///
/// **Warning** Make sure that the destination is reachable without a password, i.e., that the
/// command `ssh $hostname` establishes the session right away.
#[derive(Debug, Clone)]
pub struct SshSession {
    /// SSH destination host
    destination: String,
    /// Options passed to `ssh` before the destination
    options: Vec<String>,
}

impl SshSession {
    /// Create a new SSH Session with the destination.
    pub fn new(destination: impl Into<String>, options: Vec<String>) -> Self {
        Self {
            destination: destination.into(),
            options,
        }
    }

    /// Get the hostname for the session.
    pub fn name(&self) -> &str {
        &self.destination
    }

    /// Create a raw `ssh` command with all configured options, the additional `args`, and the
    /// destination. The child is killed once the command is dropped.
    pub(crate) fn raw_command(&self, args: &[impl AsRef<OsStr>]) -> Command {
        let mut cmd = Command::from(self.std_command(args));
        log::trace!("[tokio::process::Command] {:?}", cmd);
        cmd.kill_on_drop(true);
        cmd
    }

    /// Execute `cmd` on the remote host and wait until it finishes. The command is rendered into a
    /// single shell line (see [`Cmd::to_shell`]). The exit status is returned, but not checked.
    ///
    /// ```rust,no_run
    /// use emulab_lab::{cmd::Cmd, ssh::SshSession};
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///
    /// let s = SshSession::new("pc12.filab.uni-hannover.de", Vec::new());
    /// let out = s.execute(&Cmd::new("ip").args(["--brief", "address", "show"])).await?;
    /// println!("{}", String::from_utf8_lossy(&out.stdout));
    /// # Ok(())
    /// # }
    /// ```
    pub async fn execute(&self, cmd: &Cmd) -> Result<Output, SshError> {
        let line = cmd.to_shell();
        log::trace!("[{}] `{}`", self.name(), line);
        match self.raw_command(EMPTY).arg(&line).output().await {
            Ok(out) => Ok(out),
            Err(e) => {
                log::error!("[{}] {} failed: {}", self.name(), line, e);
                Err(SshError::Client(e))
            }
        }
    }

    /// Create a raw `ssh` command with the configured options, followed by `args` and the
    /// destination.
    pub fn std_command(&self, args: &[impl AsRef<OsStr>]) -> StdCommand {
        let mut cmd = StdCommand::new("ssh");
        cmd.args(&self.options).args(args).arg(self.name());
        cmd
    }
}

/// Render a short report of the output for logging.
pub fn describe_output(output: &Output) -> String {
    format!(
        "exit code {}{}{}",
        output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "none".to_string()),
        if !output.stdout.is_empty() {
            format!("\nSTDOUT:\n{}", String::from_utf8_lossy(&output.stdout))
        } else {
            String::new()
        },
        if !output.stderr.is_empty() {
            format!("\nSTDERR:\n{}", String::from_utf8_lossy(&output.stderr))
        } else {
            String::new()
        }
    )
}

/// Error kind returned by [`SshSession`] and the executors.
#[derive(Debug, Error)]
pub enum SshError {
    /// Error while spawning the `ssh` client.
    #[error("SSH Client error: {0}")]
    Client(#[from] std::io::Error),
    /// Error while spawning a local command.
    #[error("Cannot run {0}: {1}")]
    Local(String, std::io::Error),
}
