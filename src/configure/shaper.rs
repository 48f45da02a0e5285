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

//! MoonGen forwarding scripts and the selection among them.

use emulab_lab::{config::ShaperConfig, Cmd};

use super::ConfigureError;
use crate::topology::Link;

/// Render each argument with [`ToString`].
macro_rules! words {
    ($($w:expr),* $(,)?) => {
        vec![$($w.to_string()),*]
    };
}

/// Parameters for shaping the links of one node.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapingParams {
    /// Rate in Mbps, one per link (in link order).
    pub rates: Vec<u32>,
    /// Latency in milliseconds. Only used on nodes with a single link.
    pub latency: f64,
    /// Queue depth. Only used on nodes with a single link and a nonzero latency.
    pub queue: u32,
}

impl ShapingParams {
    /// Pure rate limiting with the given rates.
    pub fn rates(rates: impl IntoIterator<Item = u32>) -> Self {
        Self {
            rates: rates.into_iter().collect(),
            latency: 0.0,
            queue: 0,
        }
    }

    /// Set the latency.
    pub fn latency(self, latency: f64) -> Self {
        Self { latency, ..self }
    }

    /// Set the queue depth.
    pub fn queue(self, queue: u32) -> Self {
        Self { queue, ..self }
    }
}

/// The MoonGen script to run, together with its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum ShaperTemplate {
    /// Rate limit both directions of a single link.
    PureRate {
        /// Device pair
        link: (usize, usize),
        /// Rate in Mbps
        rate: u32,
    },
    /// Rate limit and delay a single link, with a buffer of fixed size.
    LatencyRate {
        /// Device pair
        link: (usize, usize),
        /// Rate in Mbps
        rate: u32,
        /// Latency in milliseconds
        latency: f64,
        /// Buffer size in packets
        buffer: u32,
    },
    /// Rate limit and delay a single link, with a queue of the given depth.
    LatencyRateQueue {
        /// Device pair
        link: (usize, usize),
        /// Rate in Mbps
        rate: u32,
        /// Latency in milliseconds
        latency: f64,
        /// Queue depth
        queue: u32,
    },
    /// Rate limit two links independently.
    DualLink {
        /// Both device pairs, in link order.
        links: [(usize, usize); 2],
        /// Rate of each link
        rates: [u32; 2],
    },
}

impl ShaperTemplate {
    /// Select the template for `node` from its links and the requested parameters.
    ///
    /// The number of rates must match the number of links, and the latency must be a finite,
    /// non-negative number. Nodes with one link use one of the
    /// single-link templates, depending on whether latency and queue depth are zero. Nodes with two
    /// links use [`ShaperTemplate::DualLink`]. Everything else is unsupported.
    pub fn select(
        node: &str,
        links: &[Link],
        params: &ShapingParams,
        buffer: u32,
    ) -> Result<Self, ConfigureError> {
        if params.rates.len() != links.len() {
            return Err(ConfigureError::ParameterCountMismatch {
                node: node.to_string(),
                links: links.len(),
                rates: params.rates.len(),
            });
        }
        if !params.latency.is_finite() || params.latency < 0.0 {
            return Err(ConfigureError::InvalidLatency {
                node: node.to_string(),
                latency: params.latency,
            });
        }
        let unsupported = || ConfigureError::UnsupportedTopology {
            node: node.to_string(),
            links: links.iter().map(|l| l.0.clone()).collect(),
        };
        let pairs = links
            .iter()
            .map(Link::pair)
            .collect::<Option<Vec<_>>>()
            .ok_or_else(unsupported)?;

        Ok(match (pairs.as_slice(), params.rates.as_slice()) {
            ([link], [rate]) if params.latency == 0.0 => Self::PureRate {
                link: *link,
                rate: *rate,
            },
            ([link], [rate]) if params.queue == 0 => Self::LatencyRate {
                link: *link,
                rate: *rate,
                latency: params.latency,
                buffer,
            },
            ([link], [rate]) => Self::LatencyRateQueue {
                link: *link,
                rate: *rate,
                latency: params.latency,
                queue: params.queue,
            },
            ([l0, l1], [r0, r1]) => Self::DualLink {
                links: [*l0, *l1],
                rates: [*r0, *r1],
            },
            _ => return Err(unsupported()),
        })
    }

    /// Name of the MoonGen script.
    pub fn script(&self) -> &'static str {
        match self {
            Self::PureRate { .. } => "l2-forward-rate-crc.lua",
            Self::LatencyRate { .. } => "l2-forward-bsring-lrl.lua",
            Self::LatencyRateQueue { .. } => "l2-forward-psring-lrl.lua",
            Self::DualLink { .. } => "l2-multi-forward-rate-crc.lua",
        }
    }

    /// Arguments passed to the script.
    pub fn args(&self) -> Vec<String> {
        match self {
            Self::PureRate { link: (a, b), rate } => words![a, b, rate, rate],
            Self::LatencyRate {
                link: (a, b),
                rate,
                latency,
                buffer,
            } => words!["-d", a, b, "-r", rate, rate, "-l", latency, latency, "-x", buffer, buffer],
            Self::LatencyRateQueue {
                link: (a, b),
                rate,
                latency,
                queue,
            } => words!["-d", a, b, "-r", rate, rate, "-l", latency, latency, "-q", queue, queue],
            Self::DualLink {
                links: [(a0, b0), (a1, b1)],
                rates: [r0, r1],
            } => words![a0, b0, a1, b1, r0, r0, r1, r1],
        }
    }

    /// The first device of the first link. MoonGen logs into a file named after it.
    pub fn first_device(&self) -> usize {
        match self {
            Self::PureRate { link, .. }
            | Self::LatencyRate { link, .. }
            | Self::LatencyRateQueue { link, .. } => link.0,
            Self::DualLink { links, .. } => links[0].0,
        }
    }

    /// The command that launches MoonGen in the background.
    pub fn command(&self, config: &ShaperConfig) -> Cmd {
        Cmd::sudo(config.binary_path())
            .arg(config.script_path(self.script()))
            .args(self.args())
            .detached(format!(
                "{}/mglog-{}.log",
                config.log_dir.trim_end_matches('/'),
                self.first_device()
            ))
    }
}
