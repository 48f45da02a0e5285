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

//! # Topology discovery
//!
//! The discovery fills in a topology skeleton in two phases:
//!
//! 1. [`Discovery::locate_nodes`] resolves the name `<node>.<experiment>.<project>.<domain>` of
//!    each node with `nslookup`, and stores the canonical host name and the control address. A node
//!    that cannot be resolved aborts the discovery.
//! 2. [`Discovery::query_node`] runs `ip --brief address show` on each node, and records the
//!    physical name (and for shaping nodes the device index) of every interface whose address is
//!    reported. For shaping nodes, the links are inferred from the interfaces that share a `/24`
//!    prefix, but only if all interfaces were found.

use std::fmt;

use emulab_lab::{Cmd, Executor, LabConfig, MismatchPolicy, SshError};
use ipnet::Ipv4Net;
use itertools::Itertools;
use thiserror::Error;

use crate::topology::{Node, NodeKind, Topology};

mod links;
mod parser;

pub use links::{infer_links, LinkRule};
pub use parser::{parse_brief_addresses, parse_nslookup, AddrRow, Resolved};

/// Identifier of an experiment on the testbed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExperimentId {
    /// Name of the experiment
    pub experiment: String,
    /// Name of the project that the experiment belongs to.
    pub project: String,
}

impl ExperimentId {
    /// Create a new experiment identifier.
    pub fn new(experiment: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            experiment: experiment.into(),
            project: project.into(),
        }
    }

    /// The fully qualified name of `node` in this experiment.
    pub fn fqdn(&self, node: &str, domain: &str) -> String {
        format!("{}.{}.{}.{}", node, self.experiment, self.project, domain)
    }

    /// Extract the experiment from the fully qualified name of one of its nodes, which has the
    /// form `<node>.<experiment>.<project>.<domain>`.
    pub fn from_fqdn(fqdn: &str) -> Option<Self> {
        let mut tokens = fqdn.trim().split('.');
        let _node = tokens.next()?;
        let experiment = tokens.next().filter(|s| !s.is_empty())?;
        let project = tokens.next().filter(|s| !s.is_empty())?;
        Some(Self::new(experiment, project))
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.experiment, self.project)
    }
}

/// A shaping node on which not all interfaces could be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceMismatch {
    /// Logical name of the node
    pub node: String,
    /// Number of interfaces found
    pub found: usize,
    /// Number of interfaces in the skeleton
    pub expected: usize,
}

impl fmt::Display for InterfaceMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "found {} of {} interfaces on {}",
            self.found, self.expected, self.node
        )
    }
}

/// Errors during the discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The name server does not know the node.
    #[error("Could not locate node {0}")]
    Resolution(String),
    /// The node must be located before its interfaces can be queried.
    #[error("Node {0} was not located yet")]
    NotLocated(String),
    /// The experiment cannot be derived from the local host name.
    #[error("Cannot derive the experiment from the host name {0:?}")]
    UnknownExperiment(String),
    /// Not all interfaces were found on a shaping node, and the policy is to abort.
    #[error("Interface mismatch: {0}")]
    InterfaceMismatch(InterfaceMismatch),
    /// A command could not be executed.
    #[error("{0}")]
    Ssh(#[from] SshError),
}

/// The discovery of a topology, using an [`Executor`] to run the commands.
#[derive(Debug)]
pub struct Discovery<'a, E: ?Sized> {
    /// Executes the commands
    exec: &'a E,
    /// Domain of the testbed
    domain: String,
    /// Range of all experiment addresses.
    private_range: Ipv4Net,
    /// What to do on an interface mismatch.
    policy: MismatchPolicy,
}

impl<'a, E: Executor + ?Sized> Discovery<'a, E> {
    /// Create a new discovery that uses the testbed settings and the mismatch policy of `config`.
    pub fn new(exec: &'a E, config: &LabConfig) -> Self {
        Self {
            exec,
            domain: config.testbed.domain.clone(),
            private_range: config.testbed.private_range,
            policy: config.discovery.mismatch_policy,
        }
    }

    /// Override the mismatch policy.
    pub fn with_policy(mut self, policy: MismatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Discover the entire topology: first locate all nodes, then query the interfaces of each
    /// node. Returns all interface mismatches that were tolerated.
    pub async fn run(
        &self,
        topo: &mut Topology,
        exp: &ExperimentId,
    ) -> Result<Vec<InterfaceMismatch>, DiscoveryError> {
        self.locate_nodes(topo, exp).await?;
        let mut mismatches = Vec::new();
        for (name, node) in topo.iter_mut() {
            if let Some(m) = self.query_node(name, node).await? {
                mismatches.push(m);
            }
        }
        Ok(mismatches)
    }

    /// Resolve the host name and control address of every node in the topology.
    pub async fn locate_nodes(
        &self,
        topo: &mut Topology,
        exp: &ExperimentId,
    ) -> Result<(), DiscoveryError> {
        for (name, node) in topo.iter_mut() {
            self.locate(name, node, exp).await?;
        }
        Ok(())
    }

    /// Resolve the host name and control address of a single node.
    pub async fn locate(
        &self,
        name: &str,
        node: &mut Node,
        exp: &ExperimentId,
    ) -> Result<(), DiscoveryError> {
        log::info!("locating node {}", name);
        let fqdn = exp.fqdn(name, &self.domain);
        let out = self.exec.local(&Cmd::new("nslookup").arg(&fqdn)).await?;
        let resolved = parse_nslookup(&out.stdout);

        let hostname = resolved
            .canonical
            .ok_or_else(|| DiscoveryError::Resolution(fqdn.clone()))?;
        log::debug!("    cname match: {}", hostname);
        node.hostname = Some(hostname);
        if let Some(addr) = resolved.address {
            log::debug!("    addr match: {}", addr);
            node.cn_ip = Some(addr);
        }
        Ok(())
    }

    /// Query the interfaces of a located node. For shapers, the links are inferred if all
    /// interfaces were found. Otherwise, the mismatch is returned (or raised if the policy is
    /// [`MismatchPolicy::Abort`]). Hosts always get the links among the interfaces that were found.
    pub async fn query_node(
        &self,
        name: &str,
        node: &mut Node,
    ) -> Result<Option<InterfaceMismatch>, DiscoveryError> {
        let host = node
            .hostname
            .clone()
            .ok_or_else(|| DiscoveryError::NotLocated(name.to_string()))?;
        log::info!("gathering info from {} {} ({})", node.role(), name, host);

        let cmd = Cmd::new("ip").args(["--brief", "address", "show"]);
        let out = self.exec.remote(&host, &cmd).await?;
        let rows = parse_brief_addresses(&out.stdout, self.private_range);

        let tracks_index = node.tracks_index();
        let mut found: Vec<String> = Vec::new();
        for row in rows.iter() {
            for iface in node.ifaces_mut() {
                if !row.addrs.iter().any(|a| a.addr() == iface.ip) {
                    continue;
                }
                log::debug!(
                    "    discovered the interface for {}: {} (index {:?})",
                    iface.ip,
                    row.ifname,
                    row.idx
                );
                if !iface.set_ifname(&row.ifname) {
                    log::warn!("{}: interface {} is already known", name, iface.name);
                }
                if tracks_index {
                    if let Some(idx) = row.idx {
                        iface.set_idx(idx);
                    }
                }
                found.push(row.ifname.clone());
            }
        }

        let rule = match node.kind {
            NodeKind::Shaper { .. } => LinkRule::AllGroups,
            NodeKind::Host { .. } => LinkRule::SharedOnly,
            _ => return Ok(None),
        };

        let expected = node.ifaces().len();
        if rule == LinkRule::AllGroups && found.len() != expected {
            let mismatch = InterfaceMismatch {
                node: name.to_string(),
                found: found.len(),
                expected,
            };
            log::error!("did not find enough usable interfaces: {}", mismatch);
            return match self.policy {
                MismatchPolicy::Continue => Ok(Some(mismatch)),
                MismatchPolicy::Abort => Err(DiscoveryError::InterfaceMismatch(mismatch)),
            };
        }

        if found.len() != expected {
            log::warn!(
                "{}: found {} of {} interfaces, linking only those",
                name,
                found.len(),
                expected
            );
        }
        log::info!(
            "    usable interfaces: {}",
            found.iter().sorted().join(", ")
        );
        let links = infer_links(node.ifaces(), rule);
        log::info!("    links: {}", links.iter().join(", "));
        if let NodeKind::Shaper { links: l, .. } | NodeKind::Host { links: l, .. } = &mut node.kind {
            *l = Some(links);
        }
        Ok(None)
    }

    /// Derive the experiment from the fully qualified host name of the local machine.
    pub async fn local_experiment(&self) -> Result<ExperimentId, DiscoveryError> {
        let out = self.exec.local(&Cmd::new("hostname")).await?;
        let fqdn = out.stdout.trim();
        ExperimentId::from_fqdn(fqdn)
            .ok_or_else(|| DiscoveryError::UnknownExperiment(fqdn.to_string()))
    }
}
