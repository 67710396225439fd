//! Signal scheduler state machine
//!
//! The scheduler owns the signal: it evaluates the overload condition for the
//! high-priority lane, asks the registry for the next lane to serve, opens the
//! signal with a computed release quota, then meters vehicles out one per
//! release-gate interval until the quota is exhausted or the lane empties.
//! The select-then-meter split bounds how long any one lane holds the signal.

use crate::config::JunctionConfig;
use crate::event::{events, EventEmitter, JunctionEvent};
use crate::registry::LaneRegistry;
use crate::vehicle::LaneName;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Current signal state. At most one lane is green at any instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SignalState {
    AllRed,
    Green(LaneName),
}

/// Ephemeral record of an in-progress service window.
///
/// Exists only while the signal is green; discarded when the quota is
/// exhausted or the lane empties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSession {
    pub lane: LaneName,
    pub quota: usize,
    pub served: usize,
}

enum Phase {
    Idle,
    Serving(ServiceSession),
}

struct SchedulerState {
    phase: Phase,
    overload_active: bool,
    last_release: Instant,
}

/// The intersection scheduler state machine.
///
/// Driven by a polling loop calling [`Scheduler::tick`]; owns signal state and
/// the service session exclusively. Other loops only read the signal via
/// [`Scheduler::signal_state`].
pub struct Scheduler {
    registry: Arc<LaneRegistry>,
    config: JunctionConfig,
    emitter: EventEmitter,
    state: Mutex<SchedulerState>,
    served_total: Arc<AtomicU64>,
}

impl Scheduler {
    /// Create a scheduler over an already-populated registry.
    ///
    /// `served_total` is shared with the free-turn drain so both release
    /// paths count toward the same throughput total.
    pub fn new(
        registry: Arc<LaneRegistry>,
        config: JunctionConfig,
        emitter: EventEmitter,
        served_total: Arc<AtomicU64>,
    ) -> Self {
        Self {
            registry,
            config,
            emitter,
            state: Mutex::new(SchedulerState {
                phase: Phase::Idle,
                overload_active: false,
                last_release: Instant::now(),
            }),
            served_total,
        }
    }

    /// Current signal state
    pub async fn signal_state(&self) -> SignalState {
        match &self.state.lock().await.phase {
            Phase::Idle => SignalState::AllRed,
            Phase::Serving(session) => SignalState::Green(session.lane),
        }
    }

    /// Whether overload mode is currently active
    pub async fn overload_active(&self) -> bool {
        self.state.lock().await.overload_active
    }

    /// The in-progress service session, if the signal is green
    pub async fn session(&self) -> Option<ServiceSession> {
        match &self.state.lock().await.phase {
            Phase::Idle => None,
            Phase::Serving(session) => Some(*session),
        }
    }

    /// Total vehicles released so far (signalled and free-turn combined)
    pub fn served_total(&self) -> u64 {
        self.served_total.load(Ordering::SeqCst)
    }

    /// Re-evaluate the overload condition for the high-priority lane and
    /// update its registry weight. Hysteresis: above the high threshold the
    /// mode latches on, below the low threshold it latches off, and between
    /// the two it keeps its current value so demand hovering near the
    /// threshold cannot flap the mode.
    pub async fn evaluate_overload(&self) -> bool {
        let lane = LaneName::HIGH_PRIORITY;
        let size = match self.registry.queue(lane).await {
            Some(queue) => queue.len().await,
            None => return false,
        };

        let mut state = self.state.lock().await;
        if size > self.config.overload_high {
            self.registry
                .set_weight(lane, self.config.overload_weight)
                .await;
            if !state.overload_active {
                state.overload_active = true;
                tracing::info!(lane = %lane, size, "overload mode entered");
                self.emitter
                    .emit(JunctionEvent::with_string(events::OVERLOAD_ENTERED, lane.to_string()));
            }
        } else if size < self.config.overload_low {
            self.registry.set_weight(lane, 0).await;
            if state.overload_active {
                state.overload_active = false;
                tracing::info!(lane = %lane, size, "overload mode cleared");
                self.emitter
                    .emit(JunctionEvent::with_string(events::OVERLOAD_CLEARED, lane.to_string()));
            }
        }
        state.overload_active
    }

    /// One poll iteration of the state machine.
    ///
    /// IDLE: evaluate overload, select a lane, open the signal with a quota.
    /// SERVING: gated by the release interval, release one vehicle or close
    /// the session when the quota is met or the lane is found empty.
    pub async fn tick(&self) {
        let serving = matches!(self.state.lock().await.phase, Phase::Serving(_));
        if serving {
            self.tick_serving().await;
        } else {
            self.tick_idle().await;
        }
    }

    async fn tick_idle(&self) {
        let overload = self.evaluate_overload().await;

        let Some(lane) = self.registry.select_next().await else {
            return;
        };

        let quota = self.compute_quota(lane, overload).await;
        tracing::debug!(lane = %lane, quota, overload, "opening signal");
        self.emitter.emit(JunctionEvent::with_map(
            events::SIGNAL_GREEN,
            HashMap::from([
                ("lane".to_string(), serde_json::json!(lane.to_string())),
                ("quota".to_string(), serde_json::json!(quota)),
            ]),
        ));

        let mut state = self.state.lock().await;
        state.phase = Phase::Serving(ServiceSession {
            lane,
            quota,
            served: 0,
        });
        // Resetting the gate here means the first release also waits a full
        // gate interval.
        state.last_release = Instant::now();
    }

    async fn tick_serving(&self) {
        let now = Instant::now();
        let (lane, quota, served) = {
            let state = self.state.lock().await;
            if now.duration_since(state.last_release) < self.config.release_gate {
                return;
            }
            match &state.phase {
                Phase::Serving(s) => (s.lane, s.quota, s.served),
                Phase::Idle => return,
            }
        };

        let mut close = false;
        if served < quota {
            let released = match self.registry.queue(lane).await {
                Some(queue) => queue.dequeue().await,
                None => None,
            };
            match released {
                Some(vehicle) => {
                    self.served_total.fetch_add(1, Ordering::SeqCst);
                    tracing::info!(vehicle = %vehicle.id, lane = %lane, "served");
                    self.emitter.emit(JunctionEvent::with_map(
                        events::VEHICLE_SERVED,
                        HashMap::from([
                            ("id".to_string(), serde_json::json!(vehicle.id)),
                            ("lane".to_string(), serde_json::json!(lane.to_string())),
                        ]),
                    ));
                    let mut state = self.state.lock().await;
                    if let Phase::Serving(session) = &mut state.phase {
                        session.served += 1;
                    }
                    state.last_release = now;
                    return;
                }
                // Lane emptied before the quota was met: close early.
                None => close = true,
            }
        } else {
            close = true;
        }

        if close {
            tracing::debug!(lane = %lane, served, quota, "closing signal");
            self.emitter
                .emit(JunctionEvent::with_string(events::SIGNAL_RED, lane.to_string()));
            let mut state = self.state.lock().await;
            state.phase = Phase::Idle;
            state.last_release = now;
        }
    }

    /// Release quota for a freshly selected lane.
    ///
    /// Overloaded high-priority lane: drain the backlog down to the residual
    /// buffer. Any other lane: the truncated mean of the arbitrated queue
    /// sizes, at least 1, where the high-priority lane's size only enters the
    /// mean while small enough that its backlog is not being handled by the
    /// overload path.
    async fn compute_quota(&self, lane: LaneName, overload: bool) -> usize {
        let sizes = self.registry.sizes().await;

        if lane == LaneName::HIGH_PRIORITY && overload {
            let size = sizes
                .iter()
                .find(|(l, _)| *l == lane)
                .map(|(_, s)| *s)
                .unwrap_or(0);
            return size.saturating_sub(self.config.residual_buffer);
        }

        let mut included = Vec::with_capacity(sizes.len());
        for (l, size) in sizes {
            if l == LaneName::HIGH_PRIORITY && size > self.config.average_inclusion_cap {
                continue;
            }
            included.push(size);
        }

        if included.is_empty() {
            return 1;
        }
        let avg = included.iter().sum::<usize>() as f64 / included.len() as f64;
        (avg as usize).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::VehicleQueue;
    use crate::vehicle::{LaneSlot, Road, Vehicle};
    use std::time::Duration;

    struct Fixture {
        scheduler: Scheduler,
        registry: Arc<LaneRegistry>,
    }

    /// Registry over the four signal lanes with the given queue depths
    /// (A, B, C, D order), release gate disabled for determinism.
    async fn fixture(sizes: [usize; 4]) -> Fixture {
        let registry = Arc::new(LaneRegistry::new());
        for (road, count) in Road::ALL.into_iter().zip(sizes) {
            let lane = LaneName::new(road, LaneSlot::Signal);
            let queue = Arc::new(VehicleQueue::new(lane));
            for i in 0..count {
                queue.enqueue(Vehicle::new(format!("{lane}-{i}"), lane)).await;
            }
            registry.register(lane, queue).await;
        }

        let config = JunctionConfig::default().with_release_gate(Duration::ZERO);
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            config,
            EventEmitter::new(100),
            Arc::new(AtomicU64::new(0)),
        );
        Fixture {
            scheduler,
            registry,
        }
    }

    async fn set_high_priority_size(registry: &LaneRegistry, size: usize) {
        let lane = LaneName::HIGH_PRIORITY;
        let queue = registry.queue(lane).await.unwrap();
        while queue.dequeue().await.is_some() {}
        for i in 0..size {
            queue.enqueue(Vehicle::new(format!("H{i}"), lane)).await;
        }
    }

    #[tokio::test]
    async fn test_initial_state_all_red() {
        let f = fixture([0, 0, 0, 0]).await;
        assert_eq!(f.scheduler.signal_state().await, SignalState::AllRed);
        assert!(!f.scheduler.overload_active().await);
        assert!(f.scheduler.session().await.is_none());
    }

    #[tokio::test]
    async fn test_idle_remains_idle_with_empty_queues() {
        let f = fixture([0, 0, 0, 0]).await;
        f.scheduler.tick().await;
        assert_eq!(f.scheduler.signal_state().await, SignalState::AllRed);
    }

    #[tokio::test]
    async fn test_overload_hysteresis_sequence() {
        // Size sequence 0 → 6 → 11 → 7 → 4 → 6: mode turns on only above 10,
        // stays on between the thresholds, turns off only below 5, and stays
        // off back inside the band.
        let f = fixture([0, 0, 0, 0]).await;
        let expectations = [(0, false), (6, false), (11, true), (7, true), (4, false), (6, false)];

        for (size, expected) in expectations {
            set_high_priority_size(&f.registry, size).await;
            assert_eq!(
                f.scheduler.evaluate_overload().await,
                expected,
                "size {size}"
            );
        }
    }

    #[tokio::test]
    async fn test_overload_sets_and_resets_weight() {
        let f = fixture([0, 0, 0, 0]).await;
        let lane = LaneName::HIGH_PRIORITY;

        set_high_priority_size(&f.registry, 11).await;
        f.scheduler.evaluate_overload().await;
        assert_eq!(f.registry.weight(lane).await, Some(100));

        set_high_priority_size(&f.registry, 3).await;
        f.scheduler.evaluate_overload().await;
        assert_eq!(f.registry.weight(lane).await, Some(0));
    }

    #[tokio::test]
    async fn test_overload_events_only_on_transition() {
        let registry = Arc::new(LaneRegistry::new());
        let lane = LaneName::HIGH_PRIORITY;
        let queue = Arc::new(VehicleQueue::new(lane));
        registry.register(lane, Arc::clone(&queue)).await;

        let emitter = EventEmitter::new(100);
        let mut stream = emitter
            .subscribe_filtered(|e| e.key.starts_with("overload."));
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            JunctionConfig::default(),
            emitter,
            Arc::new(AtomicU64::new(0)),
        );

        set_high_priority_size(&registry, 12).await;
        scheduler.evaluate_overload().await;
        scheduler.evaluate_overload().await; // still overloaded, no second event

        set_high_priority_size(&registry, 2).await;
        scheduler.evaluate_overload().await;

        let entered = stream.recv().await.unwrap();
        assert_eq!(entered.key, events::OVERLOAD_ENTERED);
        let cleared = stream.recv().await.unwrap();
        assert_eq!(cleared.key, events::OVERLOAD_CLEARED);
    }

    #[tokio::test]
    async fn test_quota_normal_mode_truncated_mean() {
        // High-priority lane at 7 (> cap 5) is excluded; mean of {2, 4, 6}
        // truncates to 4.
        let f = fixture([7, 2, 4, 6]).await;
        f.scheduler.tick().await; // opens for the largest normal queue

        let session = f.scheduler.session().await.unwrap();
        assert_eq!(session.quota, 4);
        assert_eq!(session.served, 0);
    }

    #[tokio::test]
    async fn test_quota_includes_small_high_priority_lane() {
        // High-priority lane at 4 (≤ cap) joins the mean: (4+2+4+6)/4 = 4.
        let f = fixture([4, 2, 4, 6]).await;
        f.scheduler.tick().await;

        let session = f.scheduler.session().await.unwrap();
        assert_eq!(session.lane, LaneName::new(Road::D, LaneSlot::Signal));
        assert_eq!(session.quota, 4);
    }

    #[tokio::test]
    async fn test_quota_minimum_one() {
        let f = fixture([0, 1, 0, 0]).await;
        f.scheduler.tick().await;

        let session = f.scheduler.session().await.unwrap();
        assert_eq!(session.quota, 1);
    }

    #[tokio::test]
    async fn test_quota_overload_mode_drains_to_buffer() {
        // 14 queued, overload active → quota 10 (14 − 4).
        let f = fixture([14, 0, 0, 0]).await;
        f.scheduler.tick().await;

        let session = f.scheduler.session().await.unwrap();
        assert_eq!(session.lane, LaneName::HIGH_PRIORITY);
        assert_eq!(session.quota, 10);
        assert!(f.scheduler.overload_active().await);
    }

    #[tokio::test]
    async fn test_serving_releases_in_fifo_order() {
        let f = fixture([0, 3, 0, 0]).await;
        let lane = LaneName::new(Road::B, LaneSlot::Signal);

        f.scheduler.tick().await;
        assert_eq!(f.scheduler.signal_state().await, SignalState::Green(lane));

        // Quota is max(1, (3+0+0+0)/4 = 0) = 1: one release then close.
        f.scheduler.tick().await;
        assert_eq!(f.scheduler.served_total(), 1);

        f.scheduler.tick().await;
        assert_eq!(f.scheduler.signal_state().await, SignalState::AllRed);

        let queue = f.registry.queue(lane).await.unwrap();
        assert_eq!(queue.snapshot().await[0].id, format!("{lane}-1"));
    }

    #[tokio::test]
    async fn test_session_closes_early_when_lane_empties() {
        let f = fixture([0, 2, 2, 2]).await;
        f.scheduler.tick().await;
        let session = f.scheduler.session().await.unwrap();
        assert_eq!(session.quota, 1); // mean of {0(incl), 2, 2, 2} = 1.5 → 1

        // Drain the serving lane behind the scheduler's back.
        let queue = f.registry.queue(session.lane).await.unwrap();
        while queue.dequeue().await.is_some() {}

        f.scheduler.tick().await;
        assert_eq!(f.scheduler.signal_state().await, SignalState::AllRed);
        assert_eq!(f.scheduler.served_total(), 0);
    }

    #[tokio::test]
    async fn test_release_gate_paces_releases() {
        let registry = Arc::new(LaneRegistry::new());
        let lane = LaneName::new(Road::B, LaneSlot::Signal);
        let queue = Arc::new(VehicleQueue::new(lane));
        for i in 0..4 {
            queue.enqueue(Vehicle::new(format!("V{i}"), lane)).await;
        }
        registry.register(lane, Arc::clone(&queue)).await;

        let config = JunctionConfig::default().with_release_gate(Duration::from_secs(60));
        let scheduler = Scheduler::new(
            Arc::clone(&registry),
            config,
            EventEmitter::new(100),
            Arc::new(AtomicU64::new(0)),
        );

        scheduler.tick().await; // opens the signal
        assert_eq!(scheduler.signal_state().await, SignalState::Green(lane));

        // Gate has not elapsed: repeated ticks release nothing.
        for _ in 0..5 {
            scheduler.tick().await;
        }
        assert_eq!(scheduler.served_total(), 0);
        assert_eq!(queue.len().await, 4);
    }

    #[tokio::test]
    async fn test_end_to_end_overload_window() {
        // 12 vehicles arrive in the high-priority lane; one
        // full IDLE→SERVING→IDLE pass serves exactly 8 and leaves 4 queued.
        let f = fixture([12, 0, 0, 0]).await;
        let lane = LaneName::HIGH_PRIORITY;

        f.scheduler.tick().await;
        assert!(f.scheduler.overload_active().await);
        assert_eq!(f.scheduler.signal_state().await, SignalState::Green(lane));
        assert_eq!(f.scheduler.session().await.unwrap().quota, 8);

        let mut guard = 0;
        while f.scheduler.signal_state().await != SignalState::AllRed {
            f.scheduler.tick().await;
            guard += 1;
            assert!(guard < 50, "scheduler failed to return to idle");
        }

        assert_eq!(f.scheduler.served_total(), 8);
        let queue = f.registry.queue(lane).await.unwrap();
        assert_eq!(queue.len().await, 4);
    }
}
