//! Simulation configuration.
//!
//! A [`SimulationConfig`] is usually loaded from TOML:
//!
//! ```toml
//! node_count = 60
//! seed = 7
//! max_simulation_time = 200.0
//!
//! [topology]
//! kind = "er"
//! p = 0.5
//!
//! [events.mine]
//! tau = 0.2
//!
//! [events.nominate]
//! tau = 0.5
//! tau_domain = [0, 1, 2]
//! ```
//!
//! Event kinds missing from `[events]` keep their default rate. Setting
//! `tau = 0` disables a kind.

use std::collections::BTreeMap;
use std::path::Path;

use scpsim_scp::QuorumSet;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimulationError};
use crate::event::EventKind;

// =============================================================================
// Event rates
// =============================================================================

/// Rate parameters of one event kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventParams {
    /// Firing rate per eligible node.
    pub tau: f64,
    /// Node ids eligible to fire the event; every node when absent.
    #[serde(default)]
    pub tau_domain: Option<Vec<u32>>,
}

impl EventParams {
    pub fn new(tau: f64) -> Self {
        Self {
            tau,
            tau_domain: None,
        }
    }

    pub fn with_domain(mut self, domain: Vec<u32>) -> Self {
        self.tau_domain = Some(domain);
        self
    }

    /// Rate used when the configuration does not mention `kind`.
    ///
    /// Receiving is much faster than acting so that statements spread
    /// before nodes move on.
    pub fn default_for(kind: EventKind) -> Self {
        let tau = match kind {
            EventKind::Mine => 0.1,
            EventKind::RetrieveTx => 0.5,
            EventKind::Nominate => 0.1,
            EventKind::ReceiveNomination => 10.0,
            EventKind::PrepareBallot => 1.0,
            EventKind::ReceivePrepare => 10.0,
            EventKind::PrepareCommit => 1.0,
            EventKind::ReceiveCommit => 10.0,
            EventKind::Externalize => 1.0,
            EventKind::ReceiveExternalize => 2.0,
        };
        Self::new(tau)
    }
}

// =============================================================================
// Topology
// =============================================================================

/// How quorum sets are assigned before the simulation starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopologyKind {
    /// Every node trusts every node, itself included.
    #[default]
    Full,
    /// Erdős–Rényi graph: each pair is linked with probability `p`, and a
    /// node's quorum set is itself plus its links.
    Er { p: f64 },
    /// One explicit quorum set per node, indexed by node id.
    Hardcoded { quorum_sets: Vec<QuorumSet> },
}

// =============================================================================
// SimulationConfig
// =============================================================================

/// Parameters of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of nodes, with ids `0..node_count`.
    #[serde(default = "default_node_count")]
    pub node_count: usize,

    /// Seed for every random draw of the run.
    #[serde(default)]
    pub seed: u64,

    /// The run stops before the clock passes this time.
    #[serde(default = "default_max_simulation_time")]
    pub max_simulation_time: f64,

    /// Length of a nomination round.
    #[serde(default = "default_round_duration")]
    pub round_duration: f64,

    /// Mined fees are drawn uniformly from `1..=max_fee`.
    #[serde(default = "default_max_fee")]
    pub max_fee: u64,

    #[serde(default)]
    pub topology: TopologyKind,

    /// Per-kind overrides keyed by event name (`"mine"`, `"receive-commit"`, ...).
    #[serde(default)]
    pub events: BTreeMap<String, EventParams>,

    /// Default `tracing` level for [`crate::logging`].
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_node_count() -> usize {
    10
}

fn default_max_simulation_time() -> f64 {
    100.0
}

fn default_round_duration() -> f64 {
    1.0
}

fn default_max_fee() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            node_count: default_node_count(),
            seed: 0,
            max_simulation_time: default_max_simulation_time(),
            round_duration: default_round_duration(),
            max_fee: default_max_fee(),
            topology: TopologyKind::default(),
            events: BTreeMap::new(),
            log_level: default_log_level(),
        }
    }
}

impl SimulationConfig {
    /// Default configuration for `node_count` nodes.
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_simulation_time(mut self, max_simulation_time: f64) -> Self {
        self.max_simulation_time = max_simulation_time;
        self
    }

    pub fn with_topology(mut self, topology: TopologyKind) -> Self {
        self.topology = topology;
        self
    }

    /// Override the rate of one event kind.
    pub fn with_event(mut self, kind: EventKind, params: EventParams) -> Self {
        self.events.insert(kind.name().to_string(), params);
        self
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load a configuration file, then apply environment overrides.
    pub fn from_file_with_env(path: impl AsRef<Path>) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// - `SCPSIM_SEED`
    /// - `SCPSIM_MAX_SIMULATION_TIME`
    /// - `SCPSIM_LOG_LEVEL`
    ///
    /// Values that do not parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SCPSIM_SEED") {
            if let Ok(seed) = val.parse() {
                self.seed = seed;
            }
        }
        if let Ok(val) = std::env::var("SCPSIM_MAX_SIMULATION_TIME") {
            if let Ok(time) = val.parse() {
                self.max_simulation_time = time;
            }
        }
        if let Ok(val) = std::env::var("SCPSIM_LOG_LEVEL") {
            self.log_level = val;
        }
    }

    /// Effective parameters of `kind`: the override if present, else the default.
    pub fn event_params(&self, kind: EventKind) -> EventParams {
        self.events
            .get(kind.name())
            .cloned()
            .unwrap_or_else(|| EventParams::default_for(kind))
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> Result<()> {
        if self.node_count == 0 {
            return Err(invalid("node_count must be > 0"));
        }
        if u32::try_from(self.node_count).is_err() {
            return Err(invalid("node_count does not fit a node id"));
        }
        if !(self.max_simulation_time.is_finite() && self.max_simulation_time > 0.0) {
            return Err(invalid("max_simulation_time must be a positive number"));
        }
        if !(self.round_duration.is_finite() && self.round_duration > 0.0) {
            return Err(invalid("round_duration must be a positive number"));
        }
        if self.max_fee == 0 {
            return Err(invalid("max_fee must be > 0"));
        }

        match &self.topology {
            TopologyKind::Full => {}
            TopologyKind::Er { p } => {
                if !(0.0..=1.0).contains(p) {
                    return Err(invalid(format!("ER probability {p} is outside [0, 1]")));
                }
            }
            TopologyKind::Hardcoded { quorum_sets } => {
                if quorum_sets.len() != self.node_count {
                    return Err(invalid(format!(
                        "{} hard-coded quorum sets for {} nodes",
                        quorum_sets.len(),
                        self.node_count
                    )));
                }
            }
        }

        for (name, params) in &self.events {
            let kind: EventKind = name.parse()?;
            if !(params.tau.is_finite() && params.tau >= 0.0) {
                return Err(invalid(format!("{kind}: tau must be a non-negative number")));
            }
            if let Some(domain) = &params.tau_domain {
                if let Some(id) = domain.iter().find(|id| **id as usize >= self.node_count) {
                    return Err(invalid(format!("{kind}: node {id} is not in the network")));
                }
            }
        }

        Ok(())
    }
}

fn invalid(reason: impl Into<String>) -> SimulationError {
    SimulationError::InvalidConfig(reason.into())
}
