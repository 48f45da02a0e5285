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

//! Executors run [`Cmd`]s either on the local machine or on a testbed node, and capture the text
//! they print.

use std::process::Output;

use async_trait::async_trait;
use tokio::process::Command;

use crate::{
    cmd::Cmd,
    config::SshConfig,
    ssh::{describe_output, SshError, SshSession},
};

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdOutput {
    /// Everything the command wrote to `STDOUT`.
    pub stdout: String,
    /// Everything the command wrote to `STDERR`.
    pub stderr: String,
    /// The exit code, or `None` if the process was killed by a signal.
    pub status: Option<i32>,
}

impl CmdOutput {
    /// Output of a successful command that printed `stdout`.
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            status: Some(0),
        }
    }

    /// Whether the command exited with status 0.
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

impl From<Output> for CmdOutput {
    fn from(out: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            status: out.status.code(),
        }
    }
}

/// Something that can run commands locally and on testbed nodes.
///
/// Implementations must **not** turn a non-zero exit code into an error. Provisioning steps are
/// best-effort: each result is logged, and the caller decides what to do with the output. An error
/// is only returned if the command could not be started at all.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Run `cmd` on the local machine.
    async fn local(&self, cmd: &Cmd) -> Result<CmdOutput, SshError>;

    /// Run `cmd` on the node reachable as `host`.
    async fn remote(&self, host: &str, cmd: &Cmd) -> Result<CmdOutput, SshError>;
}

/// The executor used on the real testbed. Local commands are spawned directly, unless they change
/// the directory or detach (see [`Cmd::needs_shell`]). Then, they are passed to `sh -c` in the same
/// form as they are sent to a node. Remote commands are sent through a new [`SshSession`].
#[derive(Debug, Clone, Default)]
pub struct SshExecutor {
    options: Vec<String>,
}

impl SshExecutor {
    /// Create a new executor that passes the configured options to `ssh`.
    pub fn new(config: &SshConfig) -> Self {
        Self {
            options: config.options.clone(),
        }
    }

    /// Create a session towards `host`.
    pub fn session(&self, host: impl Into<String>) -> SshSession {
        SshSession::new(host, self.options.clone())
    }
}

#[async_trait]
impl Executor for SshExecutor {
    async fn local(&self, cmd: &Cmd) -> Result<CmdOutput, SshError> {
        log::trace!("[localhost] `{}`", cmd);
        let mut child = if cmd.needs_shell() {
            let mut c = Command::new("sh");
            c.arg("-c").arg(cmd.to_shell());
            c
        } else if cmd.is_sudo() {
            let mut c = Command::new("sudo");
            c.arg(cmd.program()).args(cmd.get_args());
            c
        } else {
            let mut c = Command::new(cmd.program());
            c.args(cmd.get_args());
            c
        };
        child.kill_on_drop(true);
        let output = child
            .output()
            .await
            .map_err(|e| SshError::Local(cmd.to_string(), e))?;
        if !output.status.success() {
            log::debug!("[localhost] {} returned {}", cmd, describe_output(&output));
        }
        Ok(output.into())
    }

    async fn remote(&self, host: &str, cmd: &Cmd) -> Result<CmdOutput, SshError> {
        let output = self.session(host).execute(cmd).await?;
        if !output.status.success() {
            log::debug!("[{}] {} returned {}", host, cmd, describe_output(&output));
        }
        Ok(output.into())
    }
}
