//! Gillespie (stochastic simulation algorithm) event selection.
//!
//! Every `(event kind, node)` pair fires as an independent Poisson process
//! with rate `tau`. The time to the next event of any pair is exponential in
//! the total propensity, and the pair that fires is drawn proportionally to
//! its own rate.

use rand::Rng;
use scpsim_common::NodeId;

use crate::config::SimulationConfig;
use crate::event::EventKind;

/// Rate and eligible nodes of one event kind.
#[derive(Debug, Clone)]
pub struct EventRate {
    pub kind: EventKind,
    pub tau: f64,
    /// Eligible nodes in ascending id order.
    pub domain: Vec<NodeId>,
}

impl EventRate {
    /// Summed rate of this kind over its domain.
    pub fn propensity(&self) -> f64 {
        self.tau * self.domain.len() as f64
    }
}

/// The next event to fire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledEvent {
    /// Simulated time until the event.
    pub delay: f64,
    pub kind: EventKind,
    pub target: NodeId,
}

/// Draws the next `(delay, kind, target)` from fixed event rates.
#[derive(Debug, Clone)]
pub struct GillespieScheduler {
    rates: Vec<EventRate>,
    total: f64,
}

impl GillespieScheduler {
    /// Build from explicit rates. Kinds with no rate or no eligible node are
    /// dropped; the rest keep tie-break order.
    pub fn new(rates: Vec<EventRate>) -> Self {
        let mut rates: Vec<EventRate> = rates
            .into_iter()
            .filter(|rate| rate.tau > 0.0 && !rate.domain.is_empty())
            .map(|mut rate| {
                rate.domain.sort();
                rate.domain.dedup();
                rate
            })
            .collect();
        rates.sort_by_key(|rate| rate.kind);
        let total = rates.iter().map(EventRate::propensity).sum();
        Self { rates, total }
    }

    /// Rates for every kind of a validated configuration.
    pub fn from_config(config: &SimulationConfig) -> Self {
        let everyone: Vec<NodeId> = (0..config.node_count as u32).map(NodeId).collect();
        let rates = EventKind::ALL
            .into_iter()
            .map(|kind| {
                let params = config.event_params(kind);
                let domain = match params.tau_domain {
                    Some(ids) => ids.into_iter().map(NodeId).collect(),
                    None => everyone.clone(),
                };
                EventRate {
                    kind,
                    tau: params.tau,
                    domain,
                }
            })
            .collect();
        Self::new(rates)
    }

    pub fn rates(&self) -> &[EventRate] {
        &self.rates
    }

    /// Sum of all propensities.
    pub fn total_propensity(&self) -> f64 {
        self.total
    }

    /// Exponentially distributed time to the next event, or `None` when no
    /// event can ever fire.
    pub fn next_delay<R: Rng>(&self, rng: &mut R) -> Option<f64> {
        if self.total <= 0.0 {
            return None;
        }
        // gen::<f64>() is in [0, 1); flip it so ln never sees zero.
        let u = 1.0 - rng.gen::<f64>();
        Some(-u.ln() / self.total)
    }

    /// Pick the pair that fires, proportionally to its rate.
    pub fn pick<R: Rng>(&self, rng: &mut R) -> Option<(EventKind, NodeId)> {
        if self.total <= 0.0 {
            return None;
        }
        self.select(rng.gen::<f64>() * self.total)
    }

    /// Map a point of `[0, total)` onto the pair covering it. Pairs are laid
    /// out kind by kind in declaration order, then by ascending node id.
    pub fn select(&self, mut point: f64) -> Option<(EventKind, NodeId)> {
        for rate in &self.rates {
            let block = rate.propensity();
            if point < block {
                let index = ((point / rate.tau) as usize).min(rate.domain.len() - 1);
                return Some((rate.kind, rate.domain[index]));
            }
            point -= block;
        }
        // Rounding can leave the point just past the last block.
        self.rates
            .last()
            .and_then(|rate| rate.domain.last().map(|node| (rate.kind, *node)))
    }

    /// Draw the next event.
    pub fn next_event<R: Rng>(&self, rng: &mut R) -> Option<ScheduledEvent> {
        let delay = self.next_delay(rng)?;
        let (kind, target) = self.pick(rng)?;
        Some(ScheduledEvent {
            delay,
            kind,
            target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rate(kind: EventKind, tau: f64, ids: &[u32]) -> EventRate {
        EventRate {
            kind,
            tau,
            domain: ids.iter().copied().map(NodeId).collect(),
        }
    }

    #[test]
    fn test_total_propensity_skips_disabled_kinds() {
        let scheduler = GillespieScheduler::new(vec![
            rate(EventKind::Mine, 0.5, &[0, 1, 2]),
            rate(EventKind::Nominate, 0.0, &[0, 1, 2]),
            rate(EventKind::ReceiveCommit, 2.0, &[]),
            rate(EventKind::Externalize, 1.0, &[1]),
        ]);
        assert_eq!(scheduler.rates().len(), 2);
        assert!((scheduler.total_propensity() - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_select_follows_declaration_then_node_order() {
        // Declared out of order on purpose.
        let scheduler = GillespieScheduler::new(vec![
            rate(EventKind::Externalize, 1.0, &[5, 2]),
            rate(EventKind::Mine, 1.0, &[3, 1]),
        ]);
        assert_eq!(scheduler.select(0.0), Some((EventKind::Mine, NodeId(1))));
        assert_eq!(scheduler.select(1.5), Some((EventKind::Mine, NodeId(3))));
        assert_eq!(
            scheduler.select(2.0),
            Some((EventKind::Externalize, NodeId(2)))
        );
        assert_eq!(
            scheduler.select(3.999),
            Some((EventKind::Externalize, NodeId(5)))
        );
        assert_eq!(
            scheduler.select(4.0),
            Some((EventKind::Externalize, NodeId(5)))
        );
    }

    #[test]
    fn test_nothing_eligible() {
        let scheduler = GillespieScheduler::new(vec![rate(EventKind::Mine, 0.0, &[0])]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(scheduler.next_event(&mut rng).is_none());
    }

    #[test]
    fn test_draws_are_reproducible_and_proportional() {
        let scheduler = GillespieScheduler::new(vec![
            rate(EventKind::Mine, 1.0, &[0]),
            rate(EventKind::Nominate, 3.0, &[0]),
        ]);

        let draw = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..2000)
                .map(|_| scheduler.next_event(&mut rng).unwrap())
                .collect::<Vec<_>>()
        };
        let events = draw(42);
        assert_eq!(events, draw(42));

        let nominations = events
            .iter()
            .filter(|e| e.kind == EventKind::Nominate)
            .count();
        assert!((1350..1650).contains(&nominations), "{nominations}");

        let mean_delay: f64 = events.iter().map(|e| e.delay).sum::<f64>() / events.len() as f64;
        assert!((mean_delay - 0.25).abs() < 0.03, "{mean_delay}");
        assert!(events.iter().all(|e| e.delay >= 0.0 && e.delay.is_finite()));
    }

    #[test]
    fn test_from_config_applies_domains() {
        let config = SimulationConfig::new(4).with_event(
            EventKind::Nominate,
            crate::config::EventParams::new(2.0).with_domain(vec![3, 1]),
        );
        let scheduler = GillespieScheduler::from_config(&config);
        let nominate = scheduler
            .rates()
            .iter()
            .find(|r| r.kind == EventKind::Nominate)
            .unwrap();
        assert_eq!(nominate.domain, vec![NodeId(1), NodeId(3)]);
        assert_eq!(scheduler.rates().len(), EventKind::ALL.len());
    }
}
