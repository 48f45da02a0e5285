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

//! Link inference for shaping nodes.

use ipnet::Ipv4Net;

use crate::topology::{Iface, Link};

/// Which prefix groups become links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRule {
    /// Every prefix group is a link (dumbbell shapers).
    AllGroups,
    /// Only prefix groups with at least two interfaces are links (multipath hosts).
    SharedOnly,
}

/// Group the discovered device indices of `ifaces` by their `/24` prefix.
///
/// Links are ordered by the first interface (in the order of `ifaces`) of each prefix. The indices
/// within each link are sorted. Interfaces without a device index are ignored.
pub fn infer_links<'a>(ifaces: impl IntoIterator<Item = &'a Iface>, rule: LinkRule) -> Vec<Link> {
    let mut groups: Vec<(Ipv4Net, Vec<usize>)> = Vec::new();
    for iface in ifaces {
        let idx = match iface.idx() {
            Some(idx) => idx,
            None => continue,
        };
        let prefix = iface.prefix();
        match groups.iter_mut().find(|(p, _)| *p == prefix) {
            Some((_, members)) => members.push(idx),
            None => groups.push((prefix, vec![idx])),
        }
    }

    groups
        .into_iter()
        .map(|(_, mut members)| {
            members.sort_unstable();
            Link(members)
        })
        .filter(|link| match rule {
            LinkRule::AllGroups => true,
            LinkRule::SharedOnly => link.len() >= 2,
        })
        .collect()
}
