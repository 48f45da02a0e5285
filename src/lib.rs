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

//! # MgSetup: shaped dumbbell and multipath topologies on Emulab
//!
//! This crate prepares an Emulab experiment in which MoonGen nodes act as traffic shapers between
//! routers and endpoints. It is used in two steps:
//!
//! 1. **Discovery** (right after the experiment is swapped in): every node is located through the
//!    name server, and the physical interface names are read from each node over SSH. For shaping
//!    nodes, the device indices and the links between them are inferred as well. The resulting
//!    [`Topology`] is printed as JSON. This must happen before MoonGen is started, since binding the
//!    interfaces to DPDK removes them from the kernel.
//! 2. **Configuration**: the stored topology is read back. The stale routes of the testbed are
//!    replaced by explicit routes on endpoints and routers, and MoonGen is started on the shaping
//!    nodes with the requested rate, latency and queue depth.
//!
//! ## Structure
//! - The module [`topology`] defines the topology map and the skeletons of the dumbbell.
//! - The module [`hosts`] builds the skeleton of a multipath experiment from the hosts file.
//! - The module [`discovery`] locates the nodes and discovers their interfaces and links.
//! - The module [`configure`] plans and applies the routing and the MoonGen configuration.
//! - Running commands locally and over SSH, as well as the configuration file, are part of the
//!   separate crate [`emulab_lab`].

#![deny(
    missing_docs,
    clippy::missing_docs_in_private_items,
    missing_debug_implementations,
    rust_2018_idioms
)]

use thiserror::Error;

pub mod configure;
pub mod discovery;
pub mod hosts;
pub mod topology;

#[cfg(test)]
mod test;

pub use configure::{ConfigureError, NodePlan, Provisioner, ShaperTemplate, ShapingParams};
pub use discovery::{Discovery, DiscoveryError, ExperimentId, InterfaceMismatch};
pub use topology::{Iface, Link, Node, NodeKind, Role, Topology, TopologyBuilder, TopologyError};

/// Any error that can happen while setting up an experiment.
#[derive(Debug, Error)]
pub enum Error {
    /// Error while loading the configuration file
    #[error("{0}")]
    Config(#[from] emulab_lab::ConfigError),
    /// Error while reading or writing the topology
    #[error("{0}")]
    Topology(#[from] TopologyError),
    /// Error during the discovery
    #[error("{0}")]
    Discovery(#[from] DiscoveryError),
    /// Error during the configuration
    #[error("{0}")]
    Configure(#[from] ConfigureError),
    /// Cannot read the hosts file
    #[error("Cannot read the hosts file: {0}")]
    Hosts(#[from] std::io::Error),
}
