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

//! This module contains the code for reading the configuration.
//!
//! The configuration is a TOML file. Every key is optional, missing keys fall back to the values
//! of the testbed at the University of Hannover. A minimal file might look like this:
//!
//! ```toml
//! [testbed]
//! domain = "filab.uni-hannover.de"
//! project = "rnlab"
//! private_range = "10.10.0.0/16"
//!
//! [shaper]
//! moongen_dir = "MoonGen"
//! packages = ["htop", "libtbb2", "libtbb-dev"]
//!
//! [discovery]
//! mismatch_policy = "continue"
//! ```

use std::path::Path;

use ipnet::Ipv4Net;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Environment variable that points to the configuration file.
pub const CONFIG_ENV: &str = "EMULAB_SETUP_CONFIG";

/// The complete configuration of the testbed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LabConfig {
    /// Naming and addressing of the testbed.
    pub testbed: TestbedConfig,
    /// Options passed to `ssh`.
    pub ssh: SshConfig,
    /// Everything about MoonGen on the shaping nodes.
    pub shaper: ShaperConfig,
    /// Behavior of the topology discovery.
    pub discovery: DiscoveryConfig,
}

impl LabConfig {
    /// Read and parse the configuration file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        log::debug!("Reading configuration from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Read the configuration from `path` if given, and otherwise from the file referenced by the
    /// environment variable [`CONFIG_ENV`]. If neither is present, return the default
    /// configuration.
    pub fn resolve(path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::load(path),
            Err(_) => {
                log::debug!("{CONFIG_ENV} is not set. Using the default configuration.");
                Ok(Self::default())
            }
        }
    }
}

/// Naming and addressing of the testbed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TestbedConfig {
    /// DNS domain under which the experiment nodes are registered as
    /// `<node>.<experiment>.<project>.<domain>`.
    pub domain: String,
    /// Project name used if none is given on the command line.
    pub project: String,
    /// Address range of all experiment networks. Routes into this range are replaced during
    /// configuration, and interfaces with an address in this range count as experiment interfaces.
    #[serde(deserialize_with = "deserialize_private_range")]
    pub private_range: Ipv4Net,
    /// Script on the nodes that disables hardware offloading for all interfaces given as arguments.
    pub offload_script: String,
    /// Hosts file of the local node, used to derive multipath topologies.
    pub hosts_file: String,
}

impl Default for TestbedConfig {
    fn default() -> Self {
        Self {
            domain: "filab.uni-hannover.de".to_string(),
            project: "rnlab".to_string(),
            private_range: Ipv4Net::new([10, 10, 0, 0].into(), 16).unwrap(),
            offload_script: "~/../rnlabad/nooffload.sh".to_string(),
            hosts_file: "/etc/hosts".to_string(),
        }
    }
}

/// Options passed to every `ssh` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SshConfig {
    /// Raw options, each one passed as a single argument before the destination.
    pub options: Vec<String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            options: vec![
                "-oStrictHostKeyChecking=no".to_string(),
                "-oControlMaster=auto".to_string(),
                "-oControlPath=/tmp/.ssh-%r@%h:%p".to_string(),
                "-oControlPersist=30m".to_string(),
                "-oBatchMode=yes".to_string(),
            ],
        }
    }
}

/// Configuration for MoonGen on the shaping nodes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ShaperConfig {
    /// MoonGen checkout, relative to the home directory of the user on the shaping node.
    pub moongen_dir: String,
    /// Path of the MoonGen binary, relative to `moongen_dir`.
    pub binary: String,
    /// Folder of the Lua scripts, relative to `moongen_dir`.
    pub scripts_dir: String,
    /// Script (in `moongen_dir`) that mounts the hugetlbfs.
    pub hugepage_script: String,
    /// Script (in `moongen_dir`) that binds the experiment interfaces to DPDK.
    pub bind_script: String,
    /// Packages installed with `apt` before MoonGen is started. Leave empty to skip.
    pub packages: Vec<String>,
    /// Size of the byte-sized ring used by the latency template without explicit queue depth.
    pub buffer_size: u32,
    /// Seconds to wait between the two attempts of killing old MoonGen processes.
    pub kill_grace_secs: u64,
    /// Folder on the shaping node where the MoonGen log is written.
    pub log_dir: String,
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self {
            moongen_dir: "MoonGen".to_string(),
            binary: "build/MoonGen".to_string(),
            scripts_dir: "examples".to_string(),
            hugepage_script: "setup-hugetlbfs.sh".to_string(),
            bind_script: "bind-interfaces.sh".to_string(),
            packages: vec![
                "htop".to_string(),
                "libtbb2".to_string(),
                "libtbb-dev".to_string(),
            ],
            buffer_size: 20000,
            kill_grace_secs: 5,
            log_dir: "/tmp".to_string(),
        }
    }
}

impl ShaperConfig {
    /// Path of the MoonGen binary relative to the home directory.
    pub fn binary_path(&self) -> String {
        format!("{}/{}", self.moongen_dir, self.binary)
    }

    /// Path of a Lua script relative to the home directory.
    pub fn script_path(&self, script: &str) -> String {
        format!("{}/{}/{}", self.moongen_dir, self.scripts_dir, script)
    }
}

/// Behavior of the topology discovery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// What to do if a shaping node exposes fewer interfaces than expected.
    pub mismatch_policy: MismatchPolicy,
}

/// What to do if a shaping node exposes fewer experiment interfaces than its skeleton expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchPolicy {
    /// Log the mismatch and leave the links of that node unset.
    #[default]
    Continue,
    /// Abort the discovery.
    Abort,
}

fn deserialize_private_range<'de, D>(de: D) -> Result<Ipv4Net, D::Error>
where
    D: Deserializer<'de>,
{
    let net = Ipv4Net::deserialize(de)?;
    if net.prefix_len() <= 24 {
        Ok(net.trunc())
    } else {
        Err(serde::de::Error::custom(format!(
            "The private range must contain /24 subnets, but {net} is too small"
        )))
    }
}

/// Error while reading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Cannot read the file.
    #[error("Cannot read the configuration: {0}")]
    Io(#[from] std::io::Error),
    /// Cannot parse the file.
    #[error("Cannot parse the configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
