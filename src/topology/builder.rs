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

//! Skeletons of the topologies used in the experiments.

use std::collections::BTreeMap;

use super::{Iface, Node, NodeKind, Topology};

/// Prefix length of all experiment subnets.
pub const SUBNET_PREFIX_LEN: u8 = 24;

/// Name of the shaper on the bottleneck link between both routers.
pub const BOTTLENECK_SHAPER: &str = "mg_router";
/// Name of the shaper between the senders and the first router.
pub const SENDER_SHAPER: &str = "mg_sender";
/// Name of the shaper between the second router and the receivers.
pub const RECEIVER_SHAPER: &str = "mg_receiver";

/// Builder for a fresh topology skeleton. Every call to [`TopologyBuilder::build`] produces an
/// independent topology, in which no interface is discovered yet.
///
/// ```
/// use mg_setup::topology::{Iface, TopologyBuilder};
///
/// let topo = TopologyBuilder::new()
///     .endpoint("sender1", Iface::new("if-s", [10, 10, 1, 1], 24))
///     .router("router1", [Iface::new("if-r-1", [10, 10, 1, 2], 24)])
///     .build();
/// assert_eq!(topo.gateway_of("sender1"), Some([10, 10, 1, 2].into()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TopologyBuilder {
    /// Nodes added so far
    nodes: BTreeMap<String, Node>,
}

impl TopologyBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an endpoint (sender or receiver) with a single interface.
    pub fn endpoint(self, name: impl Into<String>, iface: Iface) -> Self {
        self.node(name, NodeKind::Endpoint { iface })
    }

    /// Add a router. Interfaces are keyed by their logical name.
    pub fn router(self, name: impl Into<String>, ifaces: impl IntoIterator<Item = Iface>) -> Self {
        let ifaces = ifaces.into_iter().map(|i| (i.name.clone(), i)).collect();
        self.node(name, NodeKind::Router { ifaces })
    }

    /// Add a shaping node. The order of `ifaces` determines the order of the inferred links.
    pub fn shaper(self, name: impl Into<String>, ifaces: impl IntoIterator<Item = Iface>) -> Self {
        let ifaces = ifaces.into_iter().collect();
        self.node(name, NodeKind::Shaper { ifaces, links: None })
    }

    /// Add a node of a multipath experiment.
    pub fn host(self, name: impl Into<String>, ifaces: impl IntoIterator<Item = Iface>) -> Self {
        let ifaces = ifaces.into_iter().collect();
        self.node(name, NodeKind::Host { ifaces, links: None })
    }

    /// Add a node. An existing node with the same name is replaced.
    fn node(mut self, name: impl Into<String>, kind: NodeKind) -> Self {
        self.nodes.insert(name.into(), Node::new(kind));
        self
    }

    /// Create the topology.
    pub fn build(self) -> Topology {
        self.nodes.into_iter().collect()
    }

    /// Two senders and two receivers, connected through two routers. The link between the routers
    /// passes through the bottleneck shaper `mg_router`.
    pub fn dumbbell() -> Self {
        Self::new()
            .endpoint("sender1", iface("if", [10, 10, 1, 1]))
            .endpoint("sender2", iface("if", [10, 10, 2, 1]))
            .endpoint("receiver1", iface("if", [10, 10, 3, 1]))
            .endpoint("receiver2", iface("if", [10, 10, 4, 1]))
            .router(
                "router1",
                [
                    iface("if-r-1", [10, 10, 1, 2]),
                    iface("if-r-2", [10, 10, 2, 2]),
                    iface("if-r-r", [10, 10, 5, 1]),
                ],
            )
            .router(
                "router2",
                [
                    iface("if-r-1", [10, 10, 3, 2]),
                    iface("if-r-2", [10, 10, 4, 2]),
                    iface("if-r-r", [10, 10, 5, 2]),
                ],
            )
            .shaper(
                BOTTLENECK_SHAPER,
                [
                    iface("if-mg-1", [10, 10, 5, 101]),
                    iface("if-mg-2", [10, 10, 5, 102]),
                ],
            )
    }

    /// The [`TopologyBuilder::dumbbell`], with an additional shaper on the access links of the
    /// senders (`mg_sender`) and of the receivers (`mg_receiver`). Each of them shapes two links.
    pub fn dumbbell_with_edge_shapers() -> Self {
        Self::dumbbell()
            .shaper(
                SENDER_SHAPER,
                [
                    iface("if-mg-1", [10, 10, 1, 101]),
                    iface("if-mg-2", [10, 10, 2, 101]),
                    iface("if-mg-3", [10, 10, 1, 102]),
                    iface("if-mg-4", [10, 10, 2, 102]),
                ],
            )
            .shaper(
                RECEIVER_SHAPER,
                [
                    iface("if-mg-1", [10, 10, 3, 101]),
                    iface("if-mg-2", [10, 10, 4, 101]),
                    iface("if-mg-3", [10, 10, 3, 102]),
                    iface("if-mg-4", [10, 10, 4, 102]),
                ],
            )
    }
}

impl Topology {
    /// A fresh skeleton of the dumbbell topology. See [`TopologyBuilder::dumbbell`].
    pub fn dumbbell() -> Self {
        TopologyBuilder::dumbbell().build()
    }

    /// A fresh skeleton of the dumbbell topology with edge shapers. See
    /// [`TopologyBuilder::dumbbell_with_edge_shapers`].
    pub fn dumbbell_with_edge_shapers() -> Self {
        TopologyBuilder::dumbbell_with_edge_shapers().build()
    }
}

/// Interface in a `/24` experiment subnet.
fn iface(name: &str, ip: [u8; 4]) -> Iface {
    Iface::new(name, ip, SUBNET_PREFIX_LEN)
}
