//! The simulation driver.
//!
//! [`Simulation`] owns the network, the global mempool, the seeded RNG and
//! the only [`SimulationClock`]. Each step draws one `(event, node)` pair
//! from the [`GillespieScheduler`], advances the clock and runs the handler
//! on the target node to completion.

use std::collections::{BTreeMap, BTreeSet};

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use scpsim_common::{Hash256, NodeId};
use scpsim_scp::{
    deliver, validate_node_table, Mempool, MessageKind, Node, Transaction, Transition,
};
use tracing::{debug, info, warn};

use crate::clock::SimulationClock;
use crate::config::SimulationConfig;
use crate::consensus::{have_all_externalized, slot_counts, DEFAULT_MAX_SPREAD};
use crate::error::Result;
use crate::event::EventKind;
use crate::event_log::EventLog;
use crate::gillespie::{GillespieScheduler, ScheduledEvent};
use crate::topology;

/// Counters collected while a simulation runs.
#[derive(Debug, Clone, Default)]
pub struct SimulationStats {
    /// Events fired, including those whose handler had nothing to do.
    pub events_fired: u64,
    /// Events whose handler changed something.
    pub events_effective: u64,
    pub events_by_kind: BTreeMap<EventKind, u64>,
    pub transactions_mined: u64,
    /// Slot finalizations summed over all nodes, adoptions included.
    pub externalizations: u64,
    pub adoptions: u64,
}

/// A seeded, reproducible run over a network of SCP nodes.
pub struct Simulation {
    config: SimulationConfig,
    clock: SimulationClock,
    rng: ChaCha8Rng,
    scheduler: GillespieScheduler,
    nodes: Vec<Node>,
    mempool: Mempool,
    log: EventLog,
    stats: SimulationStats,
    finished: bool,
}

impl Simulation {
    /// Validate `config`, build the topology and create every node.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let quorum_sets =
            topology::build_quorum_sets(&config.topology, config.node_count, &mut rng)?;
        let nodes = quorum_sets
            .into_iter()
            .enumerate()
            .map(|(i, quorum_set)| Node::new(NodeId(i as u32), quorum_set))
            .collect::<scpsim_scp::Result<Vec<_>>>()?;
        validate_node_table(&nodes)?;

        let scheduler = GillespieScheduler::from_config(&config);
        info!(
            nodes = nodes.len(),
            seed = config.seed,
            max_time = config.max_simulation_time,
            propensity = scheduler.total_propensity(),
            "Simulation ready"
        );

        Ok(Self {
            config,
            clock: SimulationClock::new(),
            rng,
            scheduler,
            nodes,
            mempool: Mempool::new(),
            log: EventLog::new(),
            stats: SimulationStats::default(),
            finished: false,
        })
    }

    /// Run until the clock would pass `max_simulation_time` or no event is
    /// eligible.
    pub fn run(&mut self) -> &SimulationStats {
        while self.step().is_some() {}

        let counts = slot_counts(&self.nodes);
        let slots = counts.iter().max().copied().unwrap_or(0);
        let progress = have_all_externalized(&counts, 1, DEFAULT_MAX_SPREAD);
        info!(
            time = self.clock.now(),
            events = self.stats.events_fired,
            mined = self.stats.transactions_mined,
            slots,
            adoptions = self.stats.adoptions,
            progress = %progress,
            "Simulation finished"
        );
        if progress.is_spread_too_wide() {
            warn!(%progress, "Nodes drifted apart");
        }
        &self.stats
    }

    /// Fire the next event. Returns `None` once the run is over.
    pub fn step(&mut self) -> Option<ScheduledEvent> {
        if self.finished {
            return None;
        }
        let Some(event) = self.scheduler.next_event(&mut self.rng) else {
            self.finished = true;
            return None;
        };
        if self.clock.now() + event.delay > self.config.max_simulation_time {
            self.finished = true;
            return None;
        }
        self.clock.advance(event.delay);
        self.dispatch(event.kind, event.target);
        Some(event)
    }

    /// Run the handler of `kind` on `target` at the current time. Returns
    /// whether the handler changed anything.
    pub fn dispatch(&mut self, kind: EventKind, target: NodeId) -> bool {
        let index = target.index();
        if index >= self.nodes.len() {
            warn!(node = %target, event = %kind, "Event for unknown node");
            return false;
        }

        let ctx = self.clock.context(self.config.round_duration);
        let acted = match kind {
            EventKind::Mine => {
                self.mine(target);
                true
            }
            EventKind::RetrieveTx => self.nodes[index].retrieve_transactions(&self.mempool) > 0,
            EventKind::Nominate => self.nodes[index].prepare_nomination_msg(&ctx),
            EventKind::ReceiveNomination => {
                deliver(&mut self.nodes, target, MessageKind::Nomination, &ctx)
            }
            EventKind::PrepareBallot => self.nodes[index].prepare_ballot_msg(&ctx),
            EventKind::ReceivePrepare => {
                deliver(&mut self.nodes, target, MessageKind::Prepare, &ctx)
            }
            EventKind::PrepareCommit => self.nodes[index].prepare_commit_msg(&ctx),
            EventKind::ReceiveCommit => deliver(&mut self.nodes, target, MessageKind::Commit, &ctx),
            EventKind::Externalize => self.nodes[index].prepare_externalize_msg(&ctx),
            EventKind::ReceiveExternalize => {
                deliver(&mut self.nodes, target, MessageKind::Externalize, &ctx)
            }
        };

        self.stats.events_fired += 1;
        *self.stats.events_by_kind.entry(kind).or_default() += 1;
        if acted {
            self.stats.events_effective += 1;
        }
        self.collect_transitions(index);
        acted
    }

    fn mine(&mut self, miner: NodeId) {
        let mut bytes = [0u8; 32];
        self.rng.fill_bytes(&mut bytes);
        let fee = self.rng.gen_range(1..=self.config.max_fee);
        let tx = Transaction::new(Hash256::from_bytes(bytes), fee, self.clock.now());

        debug!(node = %miner, tx = %tx.hash.short(), fee, "Mined transaction");
        self.log.record_mined(self.clock.now(), miner, &tx);
        self.mempool.add_transaction(tx);
        self.stats.transactions_mined += 1;
    }

    /// Move the target's journal into the event log and drop whatever it
    /// finalized from the global mempool.
    fn collect_transitions(&mut self, index: usize) {
        for record in self.nodes[index].drain_transitions() {
            self.log.record_transition(&record);
            if let Transition::Externalized { value, adopted, .. } = &record.transition {
                let finalized: BTreeSet<Hash256> = value.transaction_hashes().copied().collect();
                self.mempool.remove_finalized(&finalized);
                self.stats.externalizations += 1;
                if *adopted {
                    self.stats.adoptions += 1;
                }
            }
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Current simulated time.
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    /// The global mempool miners write into.
    pub fn mempool(&self) -> &Mempool {
        &self.mempool
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Nodes whose externalized slots include transaction `tx`.
    pub fn finalized_by(&self, tx: &Hash256) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|node| node.is_transaction_in_externalized_slots(tx))
            .map(Node::id)
            .collect()
    }
}
