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

//! This library contains the plumbing for talking to the nodes of an Emulab experiment.
//!
//! # Configuration
//!
//! The testbed is described by a TOML file (see [`config`]). Pass its path on the command line, or
//! export it into the environment variable `EMULAB_SETUP_CONFIG`. Without any configuration, the
//! defaults of the testbed at the University of Hannover are used.
//!
//! All nodes are reached with plain `ssh`. Make sure that the command `ssh $hostname` logs in
//! without asking for a username or password, and that `sudo` does not require a password on the
//! nodes.
//!
//! # Executing commands
//!
//! Commands are built as [`cmd::Cmd`] values (a program plus its arguments) and handed to an
//! [`exec::Executor`]. The [`exec::SshExecutor`] runs them on the testbed. It captures the output
//! of each command, but it never fails because of a non-zero exit code. Provisioning is a
//! best-effort procedure, and the output is only used for logging and for parsing.

pub mod cmd;
pub mod config;
pub mod exec;
pub mod ssh;

#[cfg(test)]
mod test;

pub use cmd::Cmd;
pub use config::{ConfigError, LabConfig, MismatchPolicy};
pub use exec::{CmdOutput, Executor, SshExecutor};
pub use ssh::{SshError, SshSession};
