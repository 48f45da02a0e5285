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

use std::io::Write;

use pretty_assertions::assert_eq;

use crate::config::{LabConfig, MismatchPolicy};

#[test]
fn empty_file_is_default() {
    let cfg: LabConfig = toml::from_str("").unwrap();
    assert_eq!(cfg, LabConfig::default());
    assert_eq!(cfg.testbed.private_range.to_string(), "10.10.0.0/16");
    assert_eq!(cfg.testbed.project, "rnlab");
    assert_eq!(cfg.shaper.buffer_size, 20000);
    assert_eq!(cfg.discovery.mismatch_policy, MismatchPolicy::Continue);
}

#[test]
fn partial_override() {
    let cfg: LabConfig = toml::from_str(
        r#"
        [testbed]
        domain = "emulab.net"
        private_range = "10.20.3.7/16"

        [shaper]
        moongen_dir = "/opt/moongen"
        packages = []

        [discovery]
        mismatch_policy = "abort"
        "#,
    )
    .unwrap();
    assert_eq!(cfg.testbed.domain, "emulab.net");
    // the range is truncated to the network address
    assert_eq!(cfg.testbed.private_range.to_string(), "10.20.0.0/16");
    // untouched keys keep the default
    assert_eq!(cfg.testbed.project, "rnlab");
    assert_eq!(cfg.shaper.binary_path(), "/opt/moongen/build/MoonGen");
    assert_eq!(
        cfg.shaper.script_path("l2-forward-rate-crc.lua"),
        "/opt/moongen/examples/l2-forward-rate-crc.lua"
    );
    assert!(cfg.shaper.packages.is_empty());
    assert_eq!(cfg.discovery.mismatch_policy, MismatchPolicy::Abort);
    assert_eq!(cfg.ssh, Default::default());
}

#[test]
fn private_range_too_small() {
    let cfg = toml::from_str::<LabConfig>(
        r#"
        [testbed]
        private_range = "10.10.1.0/25"
        "#,
    );
    assert!(cfg.is_err());
}

#[test]
fn load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[ssh]\noptions = [\"-oBatchMode=yes\"]").unwrap();
    let cfg = LabConfig::load(file.path()).unwrap();
    assert_eq!(cfg.ssh.options, vec!["-oBatchMode=yes".to_string()]);

    let cfg = LabConfig::resolve(Some(file.path())).unwrap();
    assert_eq!(cfg.ssh.options.len(), 1);
}

#[test]
fn load_missing_file() {
    assert!(LabConfig::load("/this/file/does/not/exist.toml").is_err());
}
