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

//! Parsers for the text printed by `nslookup` and `ip --brief address show`.

use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Line announcing the canonical name of the looked-up name.
    static ref CNAME_RE: Regex = Regex::new(r"canonical\s+name\s+=\s+(\S+)").unwrap();
    /// Line with an address, that is not followed by a port.
    static ref ADDR_RE: Regex = Regex::new(r"^Address:\s+(\d+\.\d+\.\d+\.\d+)$").unwrap();
}

/// Result of a name lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    /// The canonical name (without the trailing dot).
    pub canonical: Option<String>,
    /// The last address reported for the name. Addresses of the name server itself (followed by
    /// `#53`) are ignored.
    pub address: Option<Ipv4Addr>,
}

/// Parse the output of `nslookup`.
///
/// ```text
/// Server:		130.75.1.32
/// Address:	130.75.1.32#53
///
/// sender1.exp.rnlab.filab.uni-hannover.de	canonical name = pc12.filab.uni-hannover.de.
/// Name:	pc12.filab.uni-hannover.de
/// Address: 130.75.73.112
/// ```
pub fn parse_nslookup(output: &str) -> Resolved {
    let mut result = Resolved::default();
    for line in output.lines().map(str::trim_end) {
        if let Some(c) = CNAME_RE.captures(line) {
            result.canonical = Some(c[1].trim_end_matches('.').to_string());
        }
        if let Some(addr) = ADDR_RE
            .captures(line)
            .and_then(|c| c[1].parse::<Ipv4Addr>().ok())
        {
            result.address = Some(addr);
        }
    }
    result
}

/// A row of `ip --brief address show`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrRow {
    /// Physical interface name
    pub ifname: String,
    /// Operational state, like `UP`, `DOWN` or `UNKNOWN`.
    pub state: String,
    /// All IPv4 addresses on that interface. IPv6 addresses are skipped.
    pub addrs: Vec<Ipv4Net>,
    /// The device index, if the row starts a new device block.
    pub idx: Option<usize>,
}

/// Parse the output of `ip --brief address show`.
///
/// Each row that is either down or carries an address inside `private_range` counts as a new
/// device, and the first such row gets index 0. This is the numbering that MoonGen uses after the
/// experiment interfaces are bound to DPDK.
pub fn parse_brief_addresses(output: &str, private_range: Ipv4Net) -> Vec<AddrRow> {
    let mut next_idx = 0;
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let ifname = fields.next()?.trim_end_matches(':').to_string();
            let state = fields.next()?.to_string();
            let addrs: Vec<Ipv4Net> = fields.filter_map(parse_v4).collect();
            let new_device = state.contains("DOWN")
                || addrs.iter().any(|a| private_range.contains(&a.addr()));
            let idx = new_device.then(|| {
                next_idx += 1;
                next_idx - 1
            });
            Some(AddrRow {
                ifname,
                state,
                addrs,
                idx,
            })
        })
        .collect()
}

/// Parse an IPv4 address with or without prefix length.
fn parse_v4(field: &str) -> Option<Ipv4Net> {
    field
        .parse::<Ipv4Net>()
        .ok()
        .or_else(|| field.parse::<Ipv4Addr>().ok().map(Ipv4Net::from))
}
