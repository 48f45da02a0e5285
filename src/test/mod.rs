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

//! Test module

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use emulab_lab::{Cmd, CmdOutput, Executor, LabConfig, SshError};

mod topology;

/// Name of the local machine in the recorded calls.
pub(crate) const LOCALHOST: &str = "localhost";

/// Executor that answers with canned outputs and records every command.
#[derive(Debug, Default)]
pub(crate) struct MockExecutor {
    /// Canned outputs of local commands, keyed by the rendered command.
    local: HashMap<String, String>,
    /// Canned outputs of remote commands, keyed by host and rendered command.
    remote: HashMap<(String, String), String>,
    /// All executed commands, as `(host, command)`.
    calls: Mutex<Vec<(String, String)>>,
}

impl MockExecutor {
    /// Create an executor without any canned outputs. Every command prints nothing.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Answer `cmd` on the local machine with `stdout`.
    pub(crate) fn on_local(mut self, cmd: &Cmd, stdout: impl Into<String>) -> Self {
        self.local.insert(cmd.to_shell(), stdout.into());
        self
    }

    /// Answer `cmd` on `host` with `stdout`.
    pub(crate) fn on_remote(mut self, host: &str, cmd: &Cmd, stdout: impl Into<String>) -> Self {
        self.remote
            .insert((host.to_string(), cmd.to_shell()), stdout.into());
        self
    }

    /// All recorded commands, in order.
    pub(crate) fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// All commands that were executed on `host`, in order.
    pub(crate) fn calls_on(&self, host: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(h, _)| h == host)
            .map(|(_, c)| c)
            .collect()
    }

    /// Record a call and look up its answer.
    fn answer(&self, host: &str, cmd: &Cmd, canned: Option<&String>) -> CmdOutput {
        self.calls
            .lock()
            .unwrap()
            .push((host.to_string(), cmd.to_shell()));
        CmdOutput::from_stdout(canned.cloned().unwrap_or_default())
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn local(&self, cmd: &Cmd) -> Result<CmdOutput, SshError> {
        Ok(self.answer(LOCALHOST, cmd, self.local.get(&cmd.to_shell())))
    }

    async fn remote(&self, host: &str, cmd: &Cmd) -> Result<CmdOutput, SshError> {
        let key = (host.to_string(), cmd.to_shell());
        Ok(self.answer(host, cmd, self.remote.get(&key)))
    }
}

/// Output of `nslookup` for a name with a canonical name.
pub(crate) fn nslookup(fqdn: &str, host: &str, addr: &str) -> String {
    format!(
        "Server:\t\t130.75.1.32\n\
         Address:\t130.75.1.32#53\n\
         \n\
         {fqdn}\tcanonical name = {host}.\n\
         Name:\t{host}\n\
         Address: {addr}\n"
    )
}

/// Output of `nslookup` for an unknown name.
pub(crate) fn nslookup_unknown(fqdn: &str) -> String {
    format!(
        "Server:\t\t130.75.1.32\n\
         Address:\t130.75.1.32#53\n\
         \n\
         ** server can't find {fqdn}: NXDOMAIN\n"
    )
}

/// Output of `ip --brief address show` with a loopback and a control interface, followed by
/// `rows` of `(ifname, state, addresses)`.
pub(crate) fn ip_brief(rows: &[(&str, &str, &str)]) -> String {
    let mut out = String::from(
        "lo               UNKNOWN        127.0.0.1/8 ::1/128 \n\
         eno1             UP             130.75.73.120/24 fe80::ae1f:6bff:fe2e:f2/64 \n",
    );
    for (ifname, state, addrs) in rows {
        out.push_str(&format!("{ifname:<16} {state:<14} {addrs} \n"));
    }
    out
}

/// The `ip --brief address show` command.
pub(crate) fn ip_brief_cmd() -> Cmd {
    Cmd::new("ip").args(["--brief", "address", "show"])
}

/// Host name of a node in the test experiment.
pub(crate) fn host_of(node: &str) -> String {
    format!("pc-{}.filab.uni-hannover.de", node.replace('_', "-"))
}

/// Configuration with a short grace period for `killall`.
pub(crate) fn test_config() -> LabConfig {
    let mut config = LabConfig::default();
    config.shaper.kill_grace_secs = 0;
    config
}

/// Interfaces of all nodes in the dumbbell, as reported by the nodes.
pub(crate) fn dumbbell_interfaces(edge_shapers: bool) -> Vec<(&'static str, String)> {
    let mut nodes = vec![
        ("sender1", ip_brief(&[("enp7s0f1", "UP", "10.10.1.1/24 fe80::1/64")])),
        ("sender2", ip_brief(&[("enp7s0f1", "UP", "10.10.2.1/24 fe80::1/64")])),
        ("receiver1", ip_brief(&[("enp7s0f0", "UP", "10.10.3.1/24 fe80::1/64")])),
        ("receiver2", ip_brief(&[("enp7s0f0", "UP", "10.10.4.1/24 fe80::1/64")])),
        (
            "router1",
            ip_brief(&[
                ("enp7s0f0", "UP", "10.10.1.2/24 fe80::1/64"),
                ("enp7s0f1", "UP", "10.10.2.2/24 fe80::2/64"),
                ("enp8s0f0", "UP", "10.10.5.1/24 fe80::3/64"),
            ]),
        ),
        (
            "router2",
            ip_brief(&[
                ("enp7s0f0", "UP", "10.10.3.2/24 fe80::1/64"),
                ("enp7s0f1", "UP", "10.10.4.2/24 fe80::2/64"),
                ("enp8s0f0", "UP", "10.10.5.2/24 fe80::3/64"),
            ]),
        ),
        (
            "mg_router",
            ip_brief(&[
                ("enp1s0f0", "DOWN", ""),
                ("enp1s0f1", "UP", "10.10.5.102/24 fe80::1/64"),
                ("enp2s0f0", "UP", "10.10.5.101/24 fe80::2/64"),
            ]),
        ),
    ];
    if edge_shapers {
        nodes.push((
            "mg_sender",
            ip_brief(&[
                ("enp1s0f0", "UP", "10.10.2.101/24"),
                ("enp1s0f1", "UP", "10.10.2.102/24"),
                ("enp2s0f0", "UP", "10.10.1.101/24"),
                ("enp2s0f1", "UP", "10.10.1.102/24"),
            ]),
        ));
        nodes.push((
            "mg_receiver",
            ip_brief(&[
                ("enp1s0f0", "UP", "10.10.3.101/24"),
                ("enp1s0f1", "UP", "10.10.3.102/24"),
                ("enp2s0f0", "UP", "10.10.4.101/24"),
                ("enp2s0f1", "UP", "10.10.4.102/24"),
            ]),
        ));
    }
    nodes
}

/// Executor that knows all nodes of the dumbbell in experiment `exp.rnlab`.
pub(crate) fn dumbbell_lab(edge_shapers: bool) -> MockExecutor {
    dumbbell_interfaces(edge_shapers)
        .into_iter()
        .enumerate()
        .fold(MockExecutor::new(), |exec, (i, (node, brief))| {
            let fqdn = format!("{node}.exp.rnlab.filab.uni-hannover.de");
            let host = host_of(node);
            exec.on_local(
                &Cmd::new("nslookup").arg(&fqdn),
                nslookup(&fqdn, &host, &format!("130.75.73.{}", 101 + i)),
            )
            .on_remote(&host, &ip_brief_cmd(), brief)
        })
}
