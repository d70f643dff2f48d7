//! Error types for building and running a simulation.

use scpsim_scp::ScpError;
use thiserror::Error;

/// Errors raised while loading a configuration or assembling a network.
///
/// Once [`crate::Simulation::new`] succeeds, running the simulation never
/// fails; protocol invariant violations panic instead.
#[derive(Error, Debug)]
pub enum SimulationError {
    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The event table names an event kind that does not exist.
    #[error("unknown event kind: {0}")]
    UnknownEvent(String),

    /// Reading the configuration file failed.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for [`crate::SimulationConfig`].
    #[error("failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// A node rejected its quorum set.
    #[error(transparent)]
    Scp(#[from] ScpError),
}

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimulationError>;
