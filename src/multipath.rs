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

use clap::Parser;
use emulab_lab::{LabConfig, MismatchPolicy, SshExecutor};

use mg_setup::{
    configure::plan_shaper, hosts::read_hosts, Discovery, ExperimentId, Provisioner,
    ShapingParams, Topology,
};

/// Discover a multipath experiment from the hosts file, or start MoonGen on one of its nodes.
///
/// Without `-j`, the nodes are taken from the hosts file of the local machine, and the experiment
/// is derived from the local host name. The discovered topology is printed as JSON. With `-j` and
/// `-m`, MoonGen is started on a single node of a stored topology.
#[derive(Debug, Parser)]
struct Cli {
    /// Name of the experiment (defaults to the experiment of the local machine).
    #[clap(short = 'e', long = "exp-name")]
    exp_name: Option<String>,
    /// Name of the project (defaults to the project in the configuration if `-e` is given, and to
    /// the project of the local machine otherwise).
    #[clap(short = 'p', long = "proj-name")]
    proj_name: Option<String>,
    /// Discovered topology (JSON).
    #[clap(short = 'j', long = "nodeinfo", requires = "mgnode")]
    nodeinfo: Option<PathBuf>,
    /// Node on which MoonGen is started.
    #[clap(short = 'm', long = "mgnode", requires = "nodeinfo")]
    mgnode: Option<String>,
    /// Rates in Mbps, one for each link of the node.
    #[clap(short = 'b', long, num_args = 1.., default_values_t = [5])]
    bottleneck_rate: Vec<u32>,
    /// Latency in milliseconds. Only the first value is used.
    #[clap(short = 'l', long, num_args = 1.., default_values_t = [0.0])]
    bottleneck_latency: Vec<f64>,
    /// Queue depth. Only the first value is used.
    #[clap(short = 'q', long, num_args = 1.., default_values_t = [0])]
    queue: Vec<u32>,
    /// Hosts file to read the nodes from (defaults to the one in the configuration).
    #[clap(long)]
    hosts: Option<PathBuf>,
    /// Stop the discovery if not all interfaces of a node are found.
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

    match (args.nodeinfo.as_ref(), args.mgnode.as_ref()) {
        (Some(nodeinfo), Some(mgnode)) => {
            let topo = Topology::read(nodeinfo)?;
            let params = ShapingParams::rates(args.bottleneck_rate.iter().copied())
                .latency(args.bottleneck_latency.first().copied().unwrap_or_default())
                .queue(args.queue.first().copied().unwrap_or_default());
            let plan = plan_shaper(&topo, mgnode, &params, &config)?;
            rt.block_on(Provisioner::new(&exec).apply(&plan))?;
        }
        _ => {
            let hosts = args
                .hosts
                .clone()
                .unwrap_or_else(|| PathBuf::from(&config.testbed.hosts_file));
            let mut topo = read_hosts(&hosts, config.testbed.private_range)
                .map_err(mg_setup::Error::from)?;
            let discovery = Discovery::new(&exec, &config);

            rt.block_on(async {
                let exp = match args.exp_name.as_ref() {
                    Some(e) => ExperimentId::new(
                        e,
                        args.proj_name
                            .clone()
                            .unwrap_or_else(|| config.testbed.project.clone()),
                    ),
                    None => {
                        let mut exp = discovery.local_experiment().await?;
                        if let Some(p) = args.proj_name.as_ref() {
                            exp.project = p.clone();
                        }
                        exp
                    }
                };
                log::info!("discovering experiment {}", exp);
                for m in discovery.run(&mut topo, &exp).await? {
                    log::warn!("Links of {} are unknown: {}", m.node, m);
                }
                Ok::<_, mg_setup::DiscoveryError>(())
            })?;

            println!("{}", topo.to_json()?);
            if let Some(output) = args.output.as_ref() {
                topo.write(output)?;
            }
        }
    }

    Ok(())
}
