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

use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use emulab_lab::{LabConfig, MismatchPolicy, SshExecutor};

use mg_setup::{
    configure::{dumbbell_shaping, plan_dumbbell},
    Discovery, ExperimentId, Provisioner, ShapingParams, Topology,
};

/// Discover or configure a dumbbell experiment with MoonGen shapers.
///
/// Run it once with `-e` right after the experiment is swapped in, and store the printed topology.
/// Then, configure the routes and start MoonGen with `-j`.
#[derive(Debug, Parser)]
#[clap(group(ArgGroup::new("mode").required(true).args(["exp_name", "nodeinfo"])))]
struct Cli {
    /// Name of the experiment. Discovers the topology and prints it as JSON.
    #[clap(short = 'e', long = "exp-name")]
    exp_name: Option<String>,
    /// Name of the project (defaults to the project in the configuration).
    #[clap(short = 'p', long = "proj-name")]
    proj_name: Option<String>,
    /// Discovered topology (JSON). Configures all nodes.
    #[clap(short = 'j', long = "nodeinfo")]
    nodeinfo: Option<PathBuf>,
    /// Rate of the bottleneck link in Mbps.
    #[clap(short = 'b', long, default_value_t = 5)]
    bottleneck_rate: u32,
    /// Rates of the sender links in Mbps. A single rate applies to all links of the sender shaper.
    #[clap(short = 's', long, num_args = 1.., default_values_t = [10])]
    sender_rate: Vec<u32>,
    /// Rates of the receiver links in Mbps. A single rate applies to all links of the receiver
    /// shaper.
    #[clap(short = 'r', long, num_args = 1.., default_values_t = [10])]
    receiver_rate: Vec<u32>,
    /// Latency of the bottleneck link in milliseconds.
    #[clap(short = 'l', long, default_value_t = 0.0)]
    bottleneck_latency: f64,
    /// Queue depth of the bottleneck link (only used with a nonzero latency).
    #[clap(short = 'q', long, default_value_t = 0)]
    queue: u32,
    /// Add shapers on the access links of the senders and receivers.
    #[clap(long)]
    edge_shapers: bool,
    /// Stop the discovery if not all interfaces of a shaper are found.
    #[clap(long)]
    abort_on_mismatch: bool,
    /// Also write the discovered topology into this file.
    #[clap(short = 'o', long)]
    output: Option<PathBuf>,
    /// Configuration file (TOML).
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var_os("RUST_LOG").is_none() {
        std::env::set_var("RUST_LOG", "info");
    }
    pretty_env_logger::init_timed();

    let args = Cli::parse();
    let mut config = LabConfig::resolve(args.config.as_ref())?;
    if args.abort_on_mismatch {
        config.discovery.mismatch_policy = MismatchPolicy::Abort;
    }
    let exec = SshExecutor::new(&config.ssh);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    if let Some(exp_name) = args.exp_name.as_ref() {
        let exp = ExperimentId::new(
            exp_name,
            args.proj_name
                .clone()
                .unwrap_or_else(|| config.testbed.project.clone()),
        );
        let mut topo = if args.edge_shapers {
            Topology::dumbbell_with_edge_shapers()
        } else {
            Topology::dumbbell()
        };
        let mismatches = rt.block_on(Discovery::new(&exec, &config).run(&mut topo, &exp))?;
        for m in mismatches {
            log::warn!("Links of {} are unknown: {}", m.node, m);
        }
        println!("{}", topo.to_json()?);
        if let Some(output) = args.output.as_ref() {
            topo.write(output)?;
        }
    } else if let Some(nodeinfo) = args.nodeinfo.as_ref() {
        let topo = Topology::read(nodeinfo)?;
        let bottleneck = ShapingParams::rates([args.bottleneck_rate])
            .latency(args.bottleneck_latency)
            .queue(args.queue);
        let shaping = dumbbell_shaping(&topo, bottleneck, &args.sender_rate, &args.receiver_rate);
        let plans = plan_dumbbell(&topo, &shaping, &config)?;
        rt.block_on(Provisioner::new(&exec).apply_all(&plans))?;
    }

    Ok(())
}
