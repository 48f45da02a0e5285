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

use std::net::Ipv4Addr;

use pretty_assertions::assert_eq;
use test_log::test;

use crate::topology::{Iface, Link, NodeKind, Role, Topology, BOTTLENECK_SHAPER};

#[test]
fn dumbbell_skeleton() {
    let topo = Topology::dumbbell();
    assert_eq!(topo.len(), 7);
    assert_eq!(
        topo.names_with_role(Role::Endpoint),
        vec!["receiver1", "receiver2", "sender1", "sender2"]
    );
    assert_eq!(topo.names_with_role(Role::Router), vec!["router1", "router2"]);
    assert_eq!(topo.names_with_role(Role::Shaper), vec![BOTTLENECK_SHAPER]);

    for (_, node) in topo.iter() {
        assert_eq!(node.hostname, None);
        assert_eq!(node.cn_ip, None);
        for iface in node.ifaces() {
            assert_eq!(iface.ifname(), None);
            assert_eq!(iface.idx(), None);
            assert!(iface.net.contains(&iface.ip));
            assert_eq!(iface.net.prefix_len(), 24);
        }
    }

    let topo = Topology::dumbbell_with_edge_shapers();
    assert_eq!(topo.len(), 9);
    assert_eq!(
        topo.names_with_role(Role::Shaper),
        vec!["mg_receiver", "mg_router", "mg_sender"]
    );
    assert_eq!(topo.get("mg_sender").unwrap().ifaces().len(), 4);
}

#[test]
fn skeletons_are_independent() {
    let mut a = Topology::dumbbell();
    a.get_mut("sender1").unwrap().hostname = Some("pc12".to_string());
    a.get_mut("sender1").unwrap().ifaces_mut()[0].set_ifname("enp7s0f1");

    let b = Topology::dumbbell();
    assert_eq!(b.get("sender1").unwrap().hostname, None);
    assert_eq!(b.get("sender1").unwrap().ifaces()[0].ifname(), None);
    assert_ne!(a, b);
}

#[test]
fn gateway_and_peer() {
    let topo = Topology::dumbbell();
    let ip = |s: &str| s.parse::<Ipv4Addr>().unwrap();

    assert_eq!(topo.gateway_of("sender1"), Some(ip("10.10.1.2")));
    assert_eq!(topo.gateway_of("sender2"), Some(ip("10.10.2.2")));
    assert_eq!(topo.gateway_of("receiver1"), Some(ip("10.10.3.2")));
    assert_eq!(topo.gateway_of("receiver2"), Some(ip("10.10.4.2")));
    assert_eq!(topo.gateway_of("router1"), None);
    assert_eq!(topo.gateway_of("nonexisting"), None);

    let (core, peer) = topo.peer_of("router1").unwrap();
    assert_eq!(core.name, "if-r-r");
    assert_eq!(peer, ip("10.10.5.2"));
    let (core, peer) = topo.peer_of("router2").unwrap();
    assert_eq!(core.name, "if-r-r");
    assert_eq!(peer, ip("10.10.5.1"));
    assert!(topo.peer_of("sender1").is_none());
}

#[test]
fn fields_are_written_once() {
    let mut iface = Iface::new("if-mg-1", [10, 10, 5, 101], 24);
    assert!(iface.set_ifname("enp1s0f0"));
    assert!(!iface.set_ifname("enp1s0f1"));
    assert_eq!(iface.ifname(), Some("enp1s0f0"));

    assert!(iface.set_idx(3));
    assert!(!iface.set_idx(0));
    assert_eq!(iface.idx(), Some(3));
}

#[test]
fn iface_network() {
    let iface = Iface::new("if", [10, 10, 3, 1], 24);
    assert_eq!(iface.net.to_string(), "10.10.3.0/24");
    assert_eq!(iface.prefix().to_string(), "10.10.3.0/24");

    let wide = Iface::new("if", [10, 10, 3, 1], 16);
    assert_eq!(wide.net.to_string(), "10.10.0.0/16");
    assert_eq!(wide.prefix().to_string(), "10.10.3.0/24");
}

#[test]
fn link_pairs() {
    assert_eq!(Link(vec![0, 1]).pair(), Some((0, 1)));
    assert_eq!(Link(vec![0]).pair(), None);
    assert_eq!(Link(vec![0, 1, 2]).pair(), None);
    assert_eq!(Link(vec![2, 3]).to_string(), "[2, 3]");
}

#[test]
fn json_layout() {
    let topo = Topology::dumbbell();
    let json: serde_json::Value = serde_json::from_str(&topo.to_json().unwrap()).unwrap();

    assert_eq!(json["sender1"]["role"], "endpoint");
    assert_eq!(json["sender1"]["hostname"], serde_json::Value::Null);
    assert_eq!(json["sender1"]["cn-ip"], serde_json::Value::Null);
    assert_eq!(json["sender1"]["iface"]["ip"], "10.10.1.1");
    assert_eq!(json["sender1"]["iface"]["net"], "10.10.1.0/24");
    assert_eq!(json["sender1"]["iface"]["ifname"], serde_json::Value::Null);
    assert_eq!(json["router1"]["role"], "router");
    assert_eq!(json["router1"]["ifaces"]["if-r-r"]["ip"], "10.10.5.1");
    assert_eq!(json["mg_router"]["role"], "shaper");
    assert_eq!(json["mg_router"]["ifaces"][1]["ip"], "10.10.5.102");
    assert_eq!(json["mg_router"]["links"], serde_json::Value::Null);
}

#[test]
fn json_round_trip_with_nulls() {
    let mut topo = Topology::dumbbell();
    let node = topo.get_mut(BOTTLENECK_SHAPER).unwrap();
    node.hostname = Some("pc5.filab.uni-hannover.de".to_string());
    node.cn_ip = Some([130, 75, 73, 105].into());
    if let NodeKind::Shaper { ifaces, links } = &mut node.kind {
        ifaces[0].set_ifname("enp1s0f0");
        ifaces[0].set_idx(0);
        *links = Some(vec![Link(vec![0, 1])]);
    }

    let restored = Topology::from_json(&topo.to_json().unwrap()).unwrap();
    assert_eq!(restored, topo);
    // undiscovered fields stay unknown
    assert_eq!(restored.get("mg_router").unwrap().ifaces()[1].ifname(), None);
    assert_eq!(restored.get("sender1").unwrap().hostname, None);
}

#[test]
fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nodeinfo.json");
    let topo = Topology::dumbbell_with_edge_shapers();
    topo.write(&path).unwrap();
    assert_eq!(Topology::read(&path).unwrap(), topo);
    assert!(Topology::read(dir.path().join("missing.json")).is_err());
}

#[test]
fn malformed_json() {
    assert!(Topology::from_json("{\"sender1\": {\"role\": \"spaceship\"}}").is_err());
    assert!(Topology::from_json("[]").is_err());
}
