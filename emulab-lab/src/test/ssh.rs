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

use pretty_assertions::assert_eq;

use crate::{
    cmd::Cmd,
    config::SshConfig,
    exec::{CmdOutput, Executor, SshExecutor},
    ssh::{SshSession, EMPTY},
};

#[test]
fn options_before_destination() {
    let s = SshSession::new("pc12.filab.uni-hannover.de", SshConfig::default().options);
    let cmd = s.std_command(&["-T"]);
    let args: Vec<_> = cmd
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert_eq!(cmd.get_program(), "ssh");
    assert_eq!(args.first().map(String::as_str), Some("-oStrictHostKeyChecking=no"));
    assert_eq!(args[args.len() - 2], "-T");
    assert_eq!(args.last().map(String::as_str), Some("pc12.filab.uni-hannover.de"));
}

#[test]
fn no_options() {
    let s = SshSession::new("node1", Vec::new());
    let args: Vec<_> = s
        .std_command(EMPTY)
        .get_args()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    assert_eq!(args, vec!["node1".to_string()]);
}

#[tokio::test(flavor = "current_thread")]
async fn local_command_output() {
    let exec = SshExecutor::default();
    let out = exec.local(&Cmd::new("echo").args(["hello", "world"])).await.unwrap();
    assert_eq!(out, CmdOutput::from_stdout("hello world\n"));
    assert!(out.success());
}

#[tokio::test(flavor = "current_thread")]
async fn local_command_failure_is_not_an_error() {
    let exec = SshExecutor::default();
    let out = exec.local(&Cmd::new("false")).await.unwrap();
    assert!(!out.success());
}

#[tokio::test(flavor = "current_thread")]
async fn local_command_missing_program() {
    let exec = SshExecutor::default();
    assert!(exec
        .local(&Cmd::new("this-program-does-not-exist-anywhere"))
        .await
        .is_err());
}

#[tokio::test(flavor = "current_thread")]
async fn local_command_changes_directory() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().canonicalize().unwrap();
    let path = path.to_str().unwrap();
    let exec = SshExecutor::default();
    let out = exec.local(&Cmd::new("pwd").current_dir(path)).await.unwrap();
    assert_eq!(out.stdout.trim_end(), path);
}

#[tokio::test(flavor = "current_thread")]
async fn local_command_detaches_into_logfile() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("detached.log");
    let exec = SshExecutor::default();
    let out = exec
        .local(&Cmd::new("echo").arg("shaping").detached(log.to_str().unwrap()))
        .await
        .unwrap();
    assert!(out.success());
    assert_eq!(out.stdout, "");

    let mut content = String::new();
    for _ in 0..50 {
        content = std::fs::read_to_string(&log).unwrap_or_default();
        if content.contains("shaping") {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(content.contains("shaping"), "log: {content:?}");
}
