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

//! The topology map: every logical node of an experiment together with the interfaces it is
//! expected to have.
//!
//! A topology is created from a skeleton (see [`TopologyBuilder`] and the presets
//! [`Topology::dumbbell`] and [`Topology::dumbbell_with_edge_shapers`]), filled in by the discovery,
//! written to a JSON file, and later read back for configuring the nodes. The addresses of all
//! interfaces are fixed when the skeleton is built. The discovery only fills in the fields that are
//! still unknown, and each of them at most once.

use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{BufReader, BufWriter},
    net::Ipv4Addr,
    path::Path,
};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod builder;

pub use builder::{
    TopologyBuilder, BOTTLENECK_SHAPER, RECEIVER_SHAPER, SENDER_SHAPER, SUBNET_PREFIX_LEN,
};

/// Map from the logical node name (like `sender1` or `mg_router`) to the node record. The map is
/// sorted by name, such that the JSON representation is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topology {
    /// All nodes
    nodes: BTreeMap<String, Node>,
}

impl Topology {
    /// Get a node by its logical name.
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Get a mutable reference to a node by its logical name.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    /// Iterate over all nodes, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Node)> {
        self.nodes.iter().map(|(n, node)| (n.as_str(), node))
    }

    /// Iterate mutably over all nodes, sorted by name.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Node)> {
        self.nodes.iter_mut().map(|(n, node)| (n.as_str(), node))
    }

    /// Names of all nodes with the given role, sorted by name.
    pub fn names_with_role(&self, role: Role) -> Vec<&str> {
        self.iter()
            .filter(|(_, node)| node.role() == role)
            .map(|(name, _)| name)
            .collect()
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the topology contains no node at all.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find the address of the router that acts as the gateway for `endpoint`. This is the router
    /// interface whose subnet contains the address of the endpoint.
    pub fn gateway_of(&self, endpoint: &str) -> Option<Ipv4Addr> {
        let ip = match &self.get(endpoint)?.kind {
            NodeKind::Endpoint { iface } => iface.ip,
            _ => return None,
        };
        self.routers()
            .flat_map(|(_, ifaces)| ifaces.values())
            .find(|i| i.ip != ip && i.net.contains(&ip))
            .map(|i| i.ip)
    }

    /// Find the core interface of `router` (the one that shares its subnet with another router)
    /// together with the address of the other router on that subnet.
    pub fn peer_of(&self, router: &str) -> Option<(&Iface, Ipv4Addr)> {
        let own = match &self.get(router)?.kind {
            NodeKind::Router { ifaces } => ifaces,
            _ => return None,
        };
        let others = self
            .routers()
            .filter(|(name, _)| *name != router)
            .flat_map(|(_, ifaces)| ifaces.values())
            .collect::<Vec<_>>();
        own.values().find_map(|iface| {
            others
                .iter()
                .find(|o| o.net == iface.net)
                .map(|o| (iface, o.ip))
        })
    }

    /// Iterate over all routers and their interfaces.
    fn routers(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, Iface>)> {
        self.iter().filter_map(|(name, node)| match &node.kind {
            NodeKind::Router { ifaces } => Some((name, ifaces)),
            _ => None,
        })
    }

    /// Serialize the topology as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, TopologyError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a topology from its JSON representation.
    pub fn from_json(json: &str) -> Result<Self, TopologyError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read the topology from a JSON file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| TopologyError::Io(path.display().to_string(), e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Write the topology as pretty-printed JSON into a file.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), TopologyError> {
        let path = path.as_ref();
        let file =
            File::create(path).map_err(|e| TopologyError::Io(path.display().to_string(), e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        Ok(())
    }
}

impl FromIterator<(String, Node)> for Topology {
    fn from_iter<T: IntoIterator<Item = (String, Node)>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

/// A single node of the experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Canonical host name, as resolved by the name server.
    pub hostname: Option<String>,
    /// Address of the node on the control network.
    #[serde(rename = "cn-ip")]
    pub cn_ip: Option<Ipv4Addr>,
    /// The role of the node together with its interfaces.
    #[serde(flatten)]
    pub kind: NodeKind,
}

impl Node {
    /// Create a node that was not located yet.
    pub fn new(kind: NodeKind) -> Self {
        Self {
            hostname: None,
            cn_ip: None,
            kind,
        }
    }

    /// The role of the node.
    pub fn role(&self) -> Role {
        match self.kind {
            NodeKind::Endpoint { .. } => Role::Endpoint,
            NodeKind::Router { .. } => Role::Router,
            NodeKind::Shaper { .. } => Role::Shaper,
            NodeKind::Host { .. } => Role::Host,
        }
    }

    /// All interfaces of the node. Routers yield their interfaces sorted by the logical name.
    pub fn ifaces(&self) -> Vec<&Iface> {
        match &self.kind {
            NodeKind::Endpoint { iface } => vec![iface],
            NodeKind::Router { ifaces } => ifaces.values().collect(),
            NodeKind::Shaper { ifaces, .. } | NodeKind::Host { ifaces, .. } => {
                ifaces.iter().collect()
            }
        }
    }

    /// Mutable references to all interfaces of the node, in the same order as
    /// [`Node::ifaces`].
    pub fn ifaces_mut(&mut self) -> Vec<&mut Iface> {
        match &mut self.kind {
            NodeKind::Endpoint { iface } => vec![iface],
            NodeKind::Router { ifaces } => ifaces.values_mut().collect(),
            NodeKind::Shaper { ifaces, .. } | NodeKind::Host { ifaces, .. } => {
                ifaces.iter_mut().collect()
            }
        }
    }

    /// The inferred links of a shaper or host. Returns `None` for all other roles, and if the links
    /// were not (yet) inferred.
    pub fn links(&self) -> Option<&[Link]> {
        match &self.kind {
            NodeKind::Shaper { links, .. } | NodeKind::Host { links, .. } => links.as_deref(),
            _ => None,
        }
    }

    /// Whether the device index of each interface is relevant for this node.
    pub fn tracks_index(&self) -> bool {
        matches!(self.kind, NodeKind::Shaper { .. } | NodeKind::Host { .. })
    }
}

/// The role of a node, together with its interfaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "kebab-case")]
pub enum NodeKind {
    /// Traffic source or sink with a single interface.
    Endpoint {
        /// The only interface
        iface: Iface,
    },
    /// Router with one interface per attached subnet, keyed by the logical interface name.
    Router {
        /// All interfaces
        ifaces: BTreeMap<String, Iface>,
    },
    /// MoonGen node that shapes the traffic between pairs of its interfaces.
    Shaper {
        /// All interfaces, in the order they are defined.
        ifaces: Vec<Iface>,
        /// Links, inferred by the discovery.
        links: Option<Vec<Link>>,
    },
    /// Node taken from the hosts file of a multipath experiment. Only subnets that the node is
    /// attached to with at least two interfaces become links.
    Host {
        /// All interfaces, in the order they appear in the hosts file.
        ifaces: Vec<Iface>,
        /// Links, inferred by the discovery.
        links: Option<Vec<Link>>,
    },
}

/// Role of a node, without any data attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// See [`NodeKind::Endpoint`]
    Endpoint,
    /// See [`NodeKind::Router`]
    Router,
    /// See [`NodeKind::Shaper`]
    Shaper,
    /// See [`NodeKind::Host`]
    Host,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Endpoint => "endpoint",
            Role::Router => "router",
            Role::Shaper => "shaper",
            Role::Host => "host",
        })
    }
}

/// Interface of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iface {
    /// Logical name of the interface (like `if-r-1`).
    pub name: String,
    /// Physical interface name (like `enp7s0f1`), filled in by the discovery.
    ifname: Option<String>,
    /// Address the interface is expected to have.
    pub ip: Ipv4Addr,
    /// Subnet the interface is expected to be in.
    pub net: Ipv4Net,
    /// Device index of the interface, as used by MoonGen. Filled in by the discovery.
    idx: Option<usize>,
}

impl Iface {
    /// Create a new interface with address `ip` in a subnet with prefix length `prefix_len`.
    /// Prefix lengths above 32 are clamped to 32.
    pub fn new(name: impl Into<String>, ip: impl Into<Ipv4Addr>, prefix_len: u8) -> Self {
        let ip = ip.into();
        let net = Ipv4Net::new(ip, prefix_len.min(32))
            .map(|n| n.trunc())
            .unwrap_or_else(|_| Ipv4Net::from(ip));
        Self {
            name: name.into(),
            ifname: None,
            ip,
            net,
            idx: None,
        }
    }

    /// The physical interface name, if discovered.
    pub fn ifname(&self) -> Option<&str> {
        self.ifname.as_deref()
    }

    /// The device index, if discovered.
    pub fn idx(&self) -> Option<usize> {
        self.idx
    }

    /// The `/24` prefix of the interface address, used to group interfaces into links.
    pub fn prefix(&self) -> Ipv4Net {
        Ipv4Net::new(self.ip, SUBNET_PREFIX_LEN)
            .map(|n| n.trunc())
            .unwrap_or(self.net)
    }

    /// Record the physical interface name. The name is only written once; later calls keep the
    /// first value and return `false`.
    pub fn set_ifname(&mut self, ifname: impl Into<String>) -> bool {
        if self.ifname.is_some() {
            return false;
        }
        self.ifname = Some(ifname.into());
        true
    }

    /// Record the device index. Like [`Iface::set_ifname`], only the first value is kept.
    pub fn set_idx(&mut self, idx: usize) -> bool {
        if self.idx.is_some() {
            return false;
        }
        self.idx = Some(idx);
        true
    }
}

/// A group of device indices of a shaping node that are attached to the same segment. The
/// indices are sorted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Link(pub Vec<usize>);

impl Link {
    /// The two endpoints of the link, if the link has exactly two members.
    pub fn pair(&self) -> Option<(usize, usize)> {
        match self.0.as_slice() {
            [a, b] => Some((*a, *b)),
            _ => None,
        }
    }

    /// All members of the link.
    pub fn members(&self) -> &[usize] {
        &self.0
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the link has no members.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Errors when reading or writing a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// Cannot open or create the file.
    #[error("Cannot access {0}: {1}")]
    Io(String, #[source] std::io::Error),
    /// The JSON is malformed.
    #[error("Malformed topology: {0}")]
    Json(#[from] serde_json::Error),
}
