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

//! Build the skeleton of a multipath experiment from the hosts file that the testbed installs on
//! every node.
//!
//! Each experiment interface has a line of the form
//!
//! ```text
//! 10.10.1.1	node1-link-1 node1-0 node1
//! ```
//!
//! where the second column is the name of the link endpoint, whose prefix up to the first `-` is
//! the name of the node.

use std::{collections::BTreeMap, net::Ipv4Addr, path::Path};

use ipnet::Ipv4Net;

use crate::topology::{Iface, Topology, TopologyBuilder, SUBNET_PREFIX_LEN};

/// Parse the content of a hosts file. Only lines whose address lies within `private_range` are
/// considered. Interfaces keep the order in which they appear in the file.
pub fn parse_hosts(content: &str, private_range: Ipv4Net) -> Topology {
    let mut nodes: BTreeMap<String, Vec<Iface>> = BTreeMap::new();
    for line in content.lines() {
        let mut tokens = line.split_whitespace();
        let ip = match tokens.next().and_then(|t| t.parse::<Ipv4Addr>().ok()) {
            Some(ip) if private_range.contains(&ip) => ip,
            _ => continue,
        };
        let linkname = match tokens.next() {
            Some(l) => l,
            None => continue,
        };
        let node = linkname.split('-').next().unwrap_or(linkname);
        log::debug!("{} on {} ({})", ip, node, linkname);
        nodes
            .entry(node.to_string())
            .or_default()
            .push(Iface::new(linkname, ip, SUBNET_PREFIX_LEN));
    }

    nodes
        .into_iter()
        .fold(TopologyBuilder::new(), |b, (node, ifaces)| b.host(node, ifaces))
        .build()
}

/// Read and parse the hosts file at `path`.
pub fn read_hosts(path: impl AsRef<Path>, private_range: Ipv4Net) -> std::io::Result<Topology> {
    Ok(parse_hosts(&std::fs::read_to_string(path)?, private_range))
}
