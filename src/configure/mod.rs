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

//! # Node configuration
//!
//! Configuring a node happens in two steps. First, a [`NodePlan`] is computed from the discovered
//! topology. Planning does not touch any node, and fails if the topology is incomplete or the
//! shaping parameters do not fit the links. Only once the plans of all nodes are computed, the
//! [`Provisioner`] executes them one after the other.
//!
//! A plan is a sequence of [`Stage`]s, each reached after executing its [`Step`]s. The exit status
//! of the executed commands is not checked. Their output is logged.

use std::{collections::BTreeMap, fmt, time::Duration};

use emulab_lab::{Cmd, Executor, LabConfig, SshError};
use ipnet::Ipv4Net;
use itertools::Itertools;
use thiserror::Error;

use crate::topology::{
    Iface, Node, NodeKind, Role, Topology, BOTTLENECK_SHAPER, RECEIVER_SHAPER, SENDER_SHAPER,
};

mod routes;
mod shaper;

pub use routes::{direct_route, disable_offload, purge_commands, range_route, show_routes};
pub use shaper::{ShaperTemplate, ShapingParams};

/// State of a node that is reached after executing all steps of that stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Routes towards the private range, installed by the testbed, are removed.
    RoutesPurged,
    /// Direct routes and the route for the private range are installed.
    RoutesInstalled,
    /// Hardware offloading is disabled on all experiment interfaces.
    OffloadDisabled,
    /// The packages required by MoonGen are installed.
    DependenciesInstalled,
    /// No MoonGen instance is running anymore.
    ShaperStopped,
    /// All experiment interfaces are administratively down.
    InterfacesDown,
    /// Hugepages are set up and the interfaces are bound to DPDK.
    DpdkPrepared,
    /// MoonGen is running.
    ShaperArmed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::RoutesPurged => "routes-purged",
            Stage::RoutesInstalled => "routes-installed",
            Stage::OffloadDisabled => "offload-disabled",
            Stage::DependenciesInstalled => "dependencies-installed",
            Stage::ShaperStopped => "shaper-stopped",
            Stage::InterfacesDown => "interfaces-down",
            Stage::DpdkPrepared => "dpdk-prepared",
            Stage::ShaperArmed => "shaper-armed",
        })
    }
}

/// A single step of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Run the command on the node.
    Run(Cmd),
    /// Wait before executing the next step.
    Wait(Duration),
    /// Read the routing table of the node, and remove every route (except the default route) that
    /// mentions an address inside the range.
    PurgeRoutes(Ipv4Net),
}

/// Everything that must happen on a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePlan {
    /// Logical name of the node
    pub node: String,
    /// Host name used to reach the node
    pub host: String,
    /// Role of the node
    pub role: Role,
    /// All stages, in the order in which they are reached.
    pub stages: Vec<(Stage, Vec<Step>)>,
}

impl NodePlan {
    /// Create an empty plan.
    fn new(node: &str, host: &str, role: Role) -> Self {
        Self {
            node: node.to_string(),
            host: host.to_string(),
            role,
            stages: Vec::new(),
        }
    }

    /// Append a stage.
    fn stage(mut self, stage: Stage, steps: Vec<Step>) -> Self {
        self.stages.push((stage, steps));
        self
    }

    /// All commands of the plan, in order. [`Step::PurgeRoutes`] contributes `ip route show`.
    pub fn commands(&self) -> Vec<Cmd> {
        self.stages
            .iter()
            .flat_map(|(_, steps)| steps)
            .filter_map(|step| match step {
                Step::Run(cmd) => Some(cmd.clone()),
                Step::PurgeRoutes(_) => Some(show_routes()),
                Step::Wait(_) => None,
            })
            .collect()
    }

    /// The stages of the plan, in order.
    pub fn stage_names(&self) -> Vec<Stage> {
        self.stages.iter().map(|(s, _)| *s).collect()
    }
}

/// Errors during configuration.
#[derive(Debug, Error)]
pub enum ConfigureError {
    /// The node does not exist in the topology.
    #[error("Node {0} does not exist")]
    UnknownNode(String),
    /// The node has a different role than required.
    #[error("Node {node} is a {found}, expected a {expected}")]
    WrongRole {
        /// Logical name of the node
        node: String,
        /// The required role
        expected: Role,
        /// The actual role
        found: Role,
    },
    /// The node was never located.
    #[error("Node {0} has no host name")]
    NotLocated(String),
    /// An interface was not discovered.
    #[error("The interface {iface} of {node} was not discovered")]
    MissingInterface {
        /// Logical name of the node
        node: String,
        /// Logical name of the interface
        iface: String,
    },
    /// No router is attached to the subnet of the endpoint.
    #[error("No gateway found for {0}")]
    NoGateway(String),
    /// The router does not share a subnet with any other router.
    #[error("No peer router found for {0}")]
    NoPeer(String),
    /// The links of the shaping node are not known.
    #[error("The links of {0} were not discovered")]
    LinksUnknown(String),
    /// The number of rates does not match the number of links.
    #[error("{node} has {links} links, but {rates} rates are given")]
    ParameterCountMismatch {
        /// Logical name of the node
        node: String,
        /// Number of links
        links: usize,
        /// Number of rates
        rates: usize,
    },
    /// The latency is negative or not a finite number.
    #[error("Invalid latency {latency} ms for {node}")]
    InvalidLatency {
        /// Logical name of the node
        node: String,
        /// The requested latency
        latency: f64,
    },
    /// No template exists for the links of the shaping node.
    #[error("Cannot shape the links {links:?} of {node}")]
    UnsupportedTopology {
        /// Logical name of the node
        node: String,
        /// The links of the node
        links: Vec<Vec<usize>>,
    },
    /// A command could not be executed.
    #[error("{0}")]
    Ssh(#[from] SshError),
}

/// Look up a node and check that it was located.
fn located<'t>(topo: &'t Topology, name: &str) -> Result<(&'t Node, &'t str), ConfigureError> {
    let node = topo
        .get(name)
        .ok_or_else(|| ConfigureError::UnknownNode(name.to_string()))?;
    let host = node
        .hostname
        .as_deref()
        .ok_or_else(|| ConfigureError::NotLocated(name.to_string()))?;
    Ok((node, host))
}

/// Error for a node with the wrong role.
fn wrong_role(name: &str, node: &Node, expected: Role) -> ConfigureError {
    ConfigureError::WrongRole {
        node: name.to_string(),
        expected,
        found: node.role(),
    }
}

/// The physical name of `iface`, or an error if it was not discovered.
fn ifname<'i>(node: &str, iface: &'i Iface) -> Result<&'i str, ConfigureError> {
    iface
        .ifname()
        .ok_or_else(|| ConfigureError::MissingInterface {
            node: node.to_string(),
            iface: iface.name.clone(),
        })
}

/// Plan the routing of an endpoint: purge the testbed routes, install the direct route and the
/// route for the private range via the gateway, and disable offloading.
pub fn plan_endpoint(
    topo: &Topology,
    name: &str,
    config: &LabConfig,
) -> Result<NodePlan, ConfigureError> {
    let (node, host) = located(topo, name)?;
    let iface = match &node.kind {
        NodeKind::Endpoint { iface } => iface,
        _ => return Err(wrong_role(name, node, Role::Endpoint)),
    };
    let dev = ifname(name, iface)?;
    let gateway = topo
        .gateway_of(name)
        .ok_or_else(|| ConfigureError::NoGateway(name.to_string()))?;
    let range = config.testbed.private_range;

    Ok(NodePlan::new(name, host, Role::Endpoint)
        .stage(Stage::RoutesPurged, vec![Step::PurgeRoutes(range)])
        .stage(
            Stage::RoutesInstalled,
            vec![
                Step::Run(direct_route(iface.net, dev, iface.ip)),
                Step::Run(range_route(range, gateway, dev)),
            ],
        )
        .stage(
            Stage::OffloadDisabled,
            vec![Step::Run(disable_offload(
                &config.testbed.offload_script,
                [dev],
            ))],
        ))
}

/// Plan the routing of a router: purge the testbed routes, install the direct routes of all
/// interfaces (starting with the core interface towards the peer router), the route for the private
/// range via the peer router, and disable offloading on all interfaces.
pub fn plan_router(
    topo: &Topology,
    name: &str,
    config: &LabConfig,
) -> Result<NodePlan, ConfigureError> {
    let (node, host) = located(topo, name)?;
    let ifaces = match &node.kind {
        NodeKind::Router { ifaces } => ifaces,
        _ => return Err(wrong_role(name, node, Role::Router)),
    };
    let (core, peer) = topo
        .peer_of(name)
        .ok_or_else(|| ConfigureError::NoPeer(name.to_string()))?;
    let core_dev = ifname(name, core)?;
    let range = config.testbed.private_range;

    let ordered = std::iter::once(core)
        .chain(ifaces.values().filter(|i| i.name != core.name))
        .map(|i| Ok((i, ifname(name, i)?)))
        .collect::<Result<Vec<_>, ConfigureError>>()?;

    let mut installs = ordered
        .iter()
        .map(|(i, dev)| Step::Run(direct_route(i.net, dev, i.ip)))
        .collect::<Vec<_>>();
    installs.push(Step::Run(range_route(range, peer, core_dev)));

    // the offload script gets the interfaces in the order of their logical names
    let devs = ifaces
        .values()
        .map(|i| ifname(name, i))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NodePlan::new(name, host, Role::Router)
        .stage(Stage::RoutesPurged, vec![Step::PurgeRoutes(range)])
        .stage(Stage::RoutesInstalled, installs)
        .stage(
            Stage::OffloadDisabled,
            vec![Step::Run(disable_offload(&config.testbed.offload_script, devs))],
        ))
}

/// Plan the start of MoonGen on a shaping node (or a host of a multipath experiment).
///
/// The shaping parameters are checked against the links before anything else. The plan then
/// installs the dependencies (if any are configured), stops running MoonGen instances, takes the
/// interfaces down, prepares DPDK, and launches the selected [`ShaperTemplate`].
pub fn plan_shaper(
    topo: &Topology,
    name: &str,
    params: &ShapingParams,
    config: &LabConfig,
) -> Result<NodePlan, ConfigureError> {
    let (node, host) = located(topo, name)?;
    let role = node.role();
    if !matches!(role, Role::Shaper | Role::Host) {
        return Err(wrong_role(name, node, Role::Shaper));
    }
    let links = node
        .links()
        .ok_or_else(|| ConfigureError::LinksUnknown(name.to_string()))?;
    let cfg = &config.shaper;
    let template = ShaperTemplate::select(name, links, params, cfg.buffer_size)?;
    log::debug!("{} uses {:?}", name, template);

    let mut plan = NodePlan::new(name, host, role);

    if !cfg.packages.is_empty() {
        plan = plan.stage(
            Stage::DependenciesInstalled,
            vec![
                Step::Run(Cmd::sudo("sed").args([
                    "-i",
                    r"/\bquagga\b/d",
                    "/var/lib/dpkg/statoverride",
                ])),
                Step::Run(Cmd::sudo("apt-get").arg("update")),
                Step::Run(
                    Cmd::sudo("apt-get")
                        .args(["install", "-y"])
                        .args(&cfg.packages),
                ),
            ],
        );
    }

    let process = cfg.binary.rsplit('/').next().unwrap_or(&cfg.binary);
    let killall = Cmd::sudo("killall").arg(process);
    plan = plan.stage(
        Stage::ShaperStopped,
        vec![
            Step::Run(killall.clone()),
            Step::Wait(Duration::from_secs(cfg.kill_grace_secs)),
            Step::Run(killall),
        ],
    );

    let downs = node
        .ifaces()
        .into_iter()
        .filter_map(|i| match i.ifname() {
            Some(dev) => Some(dev),
            None => {
                log::debug!("{}: skipping undiscovered interface {}", name, i.name);
                None
            }
        })
        .map(|dev| Step::Run(Cmd::sudo("ip").args(["link", "set", "dev", dev, "down"])))
        .collect();
    plan = plan.stage(Stage::InterfacesDown, downs);

    plan = plan.stage(
        Stage::DpdkPrepared,
        vec![
            Step::Run(Cmd::sudo(format!("./{}", cfg.hugepage_script)).current_dir(&cfg.moongen_dir)),
            Step::Run(Cmd::sudo(format!("./{}", cfg.bind_script)).current_dir(&cfg.moongen_dir)),
        ],
    );

    Ok(plan.stage(Stage::ShaperArmed, vec![Step::Run(template.command(cfg))]))
}

/// Shaping parameters for the shapers of a dumbbell, keyed by node name.
///
/// A single sender or receiver rate applies to every link of that shaper. A longer list is taken
/// as given, one rate per link.
pub fn dumbbell_shaping(
    topo: &Topology,
    bottleneck: ShapingParams,
    sender: &[u32],
    receiver: &[u32],
) -> BTreeMap<String, ShapingParams> {
    let mut shaping = BTreeMap::new();
    shaping.insert(BOTTLENECK_SHAPER.to_string(), bottleneck);
    shaping.insert(SENDER_SHAPER.to_string(), per_link(topo, SENDER_SHAPER, sender));
    shaping.insert(RECEIVER_SHAPER.to_string(), per_link(topo, RECEIVER_SHAPER, receiver));
    shaping
}

/// Repeat a single rate for each discovered link of `name`.
fn per_link(topo: &Topology, name: &str, rates: &[u32]) -> ShapingParams {
    let num_links = topo
        .get(name)
        .and_then(Node::links)
        .map_or(1, |links| links.len());
    match rates {
        [rate] if num_links > 1 => ShapingParams::rates(std::iter::repeat(*rate).take(num_links)),
        _ => ShapingParams::rates(rates.iter().copied()),
    }
}

/// Plan the configuration of an entire dumbbell: all endpoints, all routers, and every shaping
/// node for which `shaping` contains parameters. Shaping nodes without parameters are skipped.
///
/// All plans are computed before anything is executed, such that a wrong parameter does not leave
/// the experiment half-configured.
pub fn plan_dumbbell(
    topo: &Topology,
    shaping: &BTreeMap<String, ShapingParams>,
    config: &LabConfig,
) -> Result<Vec<NodePlan>, ConfigureError> {
    let mut plans = Vec::new();
    for name in topo.names_with_role(Role::Endpoint) {
        plans.push(plan_endpoint(topo, name, config)?);
    }
    for name in topo.names_with_role(Role::Router) {
        plans.push(plan_router(topo, name, config)?);
    }
    for name in topo.names_with_role(Role::Shaper) {
        match shaping.get(name) {
            Some(params) => plans.push(plan_shaper(topo, name, params, config)?),
            None => log::warn!("No shaping parameters for {}, skipping it", name),
        }
    }
    Ok(plans)
}

/// Executes [`NodePlan`]s.
#[derive(Debug)]
pub struct Provisioner<'a, E: ?Sized> {
    /// Executes the commands
    exec: &'a E,
}

impl<'a, E: Executor + ?Sized> Provisioner<'a, E> {
    /// Create a new provisioner.
    pub fn new(exec: &'a E) -> Self {
        Self { exec }
    }

    /// Execute all plans, one after the other.
    pub async fn apply_all(&self, plans: &[NodePlan]) -> Result<(), ConfigureError> {
        for plan in plans {
            self.apply(plan).await?;
        }
        Ok(())
    }

    /// Execute a single plan.
    pub async fn apply(&self, plan: &NodePlan) -> Result<(), ConfigureError> {
        log::info!("configuring {} {} ({})", plan.role, plan.node, plan.host);
        for (stage, steps) in plan.stages.iter() {
            for step in steps {
                match step {
                    Step::Run(cmd) => self.run(&plan.host, cmd).await?,
                    Step::Wait(duration) => tokio::time::sleep(*duration).await,
                    Step::PurgeRoutes(range) => self.purge_routes(&plan.host, *range).await?,
                }
            }
            log::debug!("[{}] {}", plan.host, stage);
        }
        Ok(())
    }

    /// Remove the testbed routes from the routing table.
    async fn purge_routes(&self, host: &str, range: Ipv4Net) -> Result<(), ConfigureError> {
        let table = self.exec.remote(host, &show_routes()).await?.stdout;
        log::debug!("[{}] routing table:\n{}", host, table.trim_end());
        for cmd in purge_commands(&table, range) {
            self.run(host, &cmd).await?;
        }
        Ok(())
    }

    /// Run a command and log its output.
    async fn run(&self, host: &str, cmd: &Cmd) -> Result<(), ConfigureError> {
        log::info!("[{}] {}", host, cmd);
        let out = self.exec.remote(host, cmd).await?;
        let text = [out.stdout.trim(), out.stderr.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .join("\n");
        if !text.is_empty() {
            log::debug!("[{}] response: {}", host, text);
        }
        Ok(())
    }
}
