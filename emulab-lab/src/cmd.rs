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

//! Structured commands that are executed either locally or on a testbed node.
//!
//! A [`Cmd`] is a program together with its argument list. It is only turned into a shell string
//! at the very last moment (when it must be handed to `ssh`), and each word is quoted on its own.
//! This way, interface names or addresses taken from the output of other commands can never
//! change the meaning of the command line.

use std::{borrow::Cow, fmt};

use itertools::Itertools;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Words that the remote shell reads literally. A leading `~` is kept unquoted on purpose,
    /// such that helper scripts can be addressed relative to the home directory.
    static ref SAFE_WORD: Regex = Regex::new(r"^~?[A-Za-z0-9_./:=@%+,-]+$").unwrap();
}

/// A command, consisting of the program and all of its arguments.
///
/// ```
/// use emulab_lab::cmd::Cmd;
///
/// let cmd = Cmd::sudo("ip").args(["route", "add", "10.10.1.0/24", "dev", "eth1"]);
/// assert_eq!(cmd.to_string(), "sudo ip route add 10.10.1.0/24 dev eth1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    sudo: bool,
    cwd: Option<String>,
    detach_log: Option<String>,
}

impl Cmd {
    /// Create a new command that executes `program` without any arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            sudo: false,
            cwd: None,
            detach_log: None,
        }
    }

    /// Create a new command that executes `program` with `sudo`.
    pub fn sudo(program: impl Into<String>) -> Self {
        Self {
            sudo: true,
            ..Self::new(program)
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Append multiple arguments.
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        self.args.extend(args.into_iter().map(|a| a.to_string()));
        self
    }

    /// Change into `dir` before executing the program.
    pub fn current_dir(mut self, dir: impl Into<String>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Run the program with `nohup` in the background, writing both `STDOUT` and `STDERR` into
    /// `logfile`. The command then returns immediately.
    pub fn detached(mut self, logfile: impl Into<String>) -> Self {
        self.detach_log = Some(logfile.into());
        self
    }

    /// The program to execute.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// All arguments passed to the program.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Whether the program is executed with `sudo`.
    pub fn is_sudo(&self) -> bool {
        self.sudo
    }

    /// The logfile if the command is detached.
    pub fn logfile(&self) -> Option<&str> {
        self.detach_log.as_deref()
    }

    /// The directory to change into before executing the program.
    pub fn get_current_dir(&self) -> Option<&str> {
        self.cwd.as_deref()
    }

    /// Whether the command needs a shell to run, because it changes the directory or detaches.
    pub fn needs_shell(&self) -> bool {
        self.cwd.is_some() || self.detach_log.is_some()
    }

    /// Render the command as a single line for a POSIX shell.
    pub fn to_shell(&self) -> String {
        let mut words: Vec<Cow<'_, str>> = Vec::new();
        if self.sudo {
            words.push("sudo".into());
        }
        if self.detach_log.is_some() {
            words.push("nohup".into());
        }
        words.push(quote(&self.program));
        words.extend(self.args.iter().map(|a| quote(a)));
        let mut line = words.iter().join(" ");

        if let Some(log) = self.detach_log.as_ref() {
            line = format!("{line} > {} 2>&1 &", quote(log));
        }
        if let Some(dir) = self.cwd.as_ref() {
            line = format!("cd {} && {line}", quote(dir));
        }
        line
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}

/// Quote a single word for a POSIX shell. Words that only contain safe characters are returned
/// unchanged. All others are wrapped in single quotes.
pub fn quote(word: &str) -> Cow<'_, str> {
    if SAFE_WORD.is_match(word) {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}
