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

//! Commands that change the routing table of a node.

use std::net::Ipv4Addr;

use emulab_lab::Cmd;
use ipnet::Ipv4Net;

/// Command that prints the routing table.
pub fn show_routes() -> Cmd {
    Cmd::new("ip").args(["route", "show"])
}

/// Compute the commands that remove all routes from `table` (the output of `ip route show`) that
/// mention an address inside `private_range`. The default route is never removed.
///
/// ```
/// use mg_setup::configure::purge_commands;
///
/// let table = "default via 130.75.73.1 dev eno1\n\
///              10.10.0.0/16 via 10.10.1.2 dev enp7s0f1\n\
///              130.75.73.0/24 dev eno1 proto kernel scope link src 130.75.73.112\n";
/// let cmds = purge_commands(table, "10.10.0.0/16".parse().unwrap());
/// assert_eq!(cmds.len(), 1);
/// assert_eq!(
///     cmds[0].to_string(),
///     "sudo ip route del 10.10.0.0/16 via 10.10.1.2 dev enp7s0f1"
/// );
/// ```
pub fn purge_commands(table: &str, private_range: Ipv4Net) -> Vec<Cmd> {
    table
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .filter(|words| !words.is_empty() && !words.contains(&"default"))
        .filter(|words| words.iter().any(|w| mentions(w, private_range)))
        .map(|words| Cmd::sudo("ip").args(["route", "del"]).args(words))
        .collect()
}

/// Whether `word` is an address or a network inside `range`.
fn mentions(word: &str, range: Ipv4Net) -> bool {
    if let Ok(net) = word.parse::<Ipv4Net>() {
        range.contains(&net)
    } else if let Ok(addr) = word.parse::<Ipv4Addr>() {
        range.contains(&addr)
    } else {
        false
    }
}

/// Route towards the directly attached subnet `net` on `dev`, with source address `src`.
pub fn direct_route(net: Ipv4Net, dev: &str, src: Ipv4Addr) -> Cmd {
    Cmd::sudo("ip")
        .args(["route", "add"])
        .arg(net)
        .args(["dev", dev, "proto", "kernel", "scope", "link", "src"])
        .arg(src)
}

/// Route for `range` via the next hop `via`, leaving through `dev`.
pub fn range_route(range: Ipv4Net, via: Ipv4Addr, dev: &str) -> Cmd {
    Cmd::sudo("ip")
        .args(["route", "add"])
        .arg(range)
        .arg("via")
        .arg(via)
        .args(["dev", dev])
}

/// Disable the hardware offloading features on all `ifnames` with the external `script`.
pub fn disable_offload<'a>(script: &str, ifnames: impl IntoIterator<Item = &'a str>) -> Cmd {
    Cmd::new(script).args(ifnames)
}
