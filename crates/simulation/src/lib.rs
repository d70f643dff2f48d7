//! Discrete-event simulator for a network of SCP nodes.
//!
//! The simulator drives the per-node state machines of `scpsim-scp` with a
//! Gillespie scheduler: every `(event kind, node)` pair fires as a Poisson
//! process, and one handler runs to completion at a time. A fixed seed
//! reproduces a run exactly.
//!
//! ## Components
//!
//! - [`SimulationConfig`]: run parameters, loadable from TOML
//! - [`topology`]: quorum-set builders (`FULL`, Erdős–Rényi, hard-coded)
//! - [`GillespieScheduler`]: draws the next event and its delay
//! - [`Simulation`]: owns the nodes, the global mempool and the clock
//! - [`EventLog`]: text log of mining, phase changes and finalizations
//! - [`consensus`]: agreement and progress checks
//! - [`logging`]: `tracing` subscriber setup
//!
//! ## Example
//!
//! ```no_run
//! use scpsim_simulation::{Simulation, SimulationConfig, TopologyKind};
//!
//! let config = SimulationConfig::new(60)
//!     .with_seed(7)
//!     .with_topology(TopologyKind::Er { p: 0.5 })
//!     .with_max_simulation_time(200.0);
//! let mut sim = Simulation::new(config)?;
//! sim.run();
//! sim.log().write_to(std::io::stdout())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod clock;
mod config;
pub mod consensus;
mod error;
mod event;
mod event_log;
mod gillespie;
pub mod logging;
mod simulation;
pub mod topology;

pub use clock::SimulationClock;
pub use config::{EventParams, SimulationConfig, TopologyKind};
pub use error::{Result, SimulationError};
pub use event::EventKind;
pub use event_log::{EventLog, LogEntry, LogTag};
pub use gillespie::{EventRate, GillespieScheduler, ScheduledEvent};
pub use simulation::{Simulation, SimulationStats};
