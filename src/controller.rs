//! Intersection controller and its timed loops
//!
//! The controller owns all twelve queues plus the scheduler and runs the
//! three concurrent loops: arrival ingestion, scheduler polling, and the
//! free-turn drain. The loops never block on each other; they share queue
//! state through the per-lane mutexes and observe a common `running` flag at
//! each iteration boundary, so shutdown completes within one tick of each
//! loop without tearing down an in-flight dequeue.

use crate::config::JunctionConfig;
use crate::event::{events, EventEmitter, JunctionEvent};
use crate::ingest::{ArrivalSource, FileSource, Ingestor};
use crate::queue::VehicleQueue;
use crate::registry::LaneRegistry;
use crate::scheduler::{Scheduler, SignalState};
use crate::vehicle::{LaneName, Vehicle};
use crate::JunctionStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Read-only view for display collaborators.
///
/// Captures every queue's contents, the signal, the overload flag, and the
/// throughput counters at one observation point. Building it never mutates
/// scheduler state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JunctionSnapshot {
    pub lanes: HashMap<String, Vec<Vehicle>>,
    pub signal: SignalState,
    pub overload_active: bool,
    pub served_total: u64,
    pub ingested_total: u64,
}

/// Orchestrates the junction's queues, scheduler, and timed loops
pub struct IntersectionController {
    queues: HashMap<LaneName, Arc<VehicleQueue>>,
    registry: Arc<LaneRegistry>,
    scheduler: Arc<Scheduler>,
    ingestor: Arc<Ingestor>,
    config: JunctionConfig,
    emitter: EventEmitter,
    running: Arc<AtomicBool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    served_total: Arc<AtomicU64>,
    ingested_total: Arc<AtomicU64>,
}

impl IntersectionController {
    /// Whether the timed loops are running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The queue for a lane
    pub fn queue(&self, lane: LaneName) -> Option<Arc<VehicleQueue>> {
        self.queues.get(&lane).map(Arc::clone)
    }

    /// The underlying scheduler
    pub fn scheduler(&self) -> Arc<Scheduler> {
        Arc::clone(&self.scheduler)
    }

    /// Current signal state
    pub async fn signal_state(&self) -> SignalState {
        self.scheduler.signal_state().await
    }

    /// Whether overload mode is active
    pub async fn overload_active(&self) -> bool {
        self.scheduler.overload_active().await
    }

    /// Total vehicles released (signalled plus free-turn)
    pub fn served_total(&self) -> u64 {
        self.served_total.load(Ordering::SeqCst)
    }

    /// Total vehicles ingested from arrival sources
    pub fn ingested_total(&self) -> u64 {
        self.ingested_total.load(Ordering::SeqCst)
    }

    /// Run one ingestion cycle now (also driven by the ingest loop)
    pub async fn ingest_cycle(&self) {
        self.ingestor.run_cycle().await;
    }

    /// Run one scheduler poll now (also driven by the scheduler loop)
    pub async fn scheduler_tick(&self) {
        self.scheduler.tick().await;
    }

    /// Drain at most one vehicle from each free-turn lane.
    ///
    /// Free-turn lanes bypass arbitration entirely: no signal state is
    /// involved and the scheduler's phase is never consulted.
    pub async fn drain_free_turn_once(&self) {
        for lane in LaneName::free_turn() {
            let Some(queue) = self.queues.get(&lane) else {
                continue;
            };
            if let Some(vehicle) = queue.dequeue().await {
                self.served_total.fetch_add(1, Ordering::SeqCst);
                tracing::info!(vehicle = %vehicle.id, lane = %lane, "free turn");
                self.emitter.emit(JunctionEvent::with_map(
                    events::VEHICLE_FREE_TURN,
                    HashMap::from([
                        ("id".to_string(), serde_json::json!(vehicle.id)),
                        ("lane".to_string(), serde_json::json!(lane.to_string())),
                    ]),
                ));
            }
        }
    }

    /// Spawn the three timed loops
    pub async fn start(&self) -> anyhow::Result<()> {
        if self.is_running() {
            return Ok(());
        }
        tracing::info!("starting junction loops");
        self.running.store(true, Ordering::SeqCst);
        let mut handles = self.handles.lock().await;

        // Ingestion loop
        {
            let ingestor = Arc::clone(&self.ingestor);
            let running = Arc::clone(&self.running);
            let period = self.config.ingest_period;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                while running.load(Ordering::SeqCst) {
                    ticker.tick().await;
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    ingestor.run_cycle().await;
                }
            }));
        }

        // Scheduler poll loop
        {
            let scheduler = Arc::clone(&self.scheduler);
            let running = Arc::clone(&self.running);
            let period = self.config.tick_period;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                while running.load(Ordering::SeqCst) {
                    ticker.tick().await;
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    scheduler.tick().await;
                }
            }));
        }

        // Free-turn drain loop
        {
            let queues: Vec<Arc<VehicleQueue>> = LaneName::free_turn()
                .filter_map(|lane| self.queues.get(&lane).map(Arc::clone))
                .collect();
            let served_total = Arc::clone(&self.served_total);
            let emitter = self.emitter.clone();
            let running = Arc::clone(&self.running);
            let period = self.config.drain_period;
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                while running.load(Ordering::SeqCst) {
                    ticker.tick().await;
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    for queue in &queues {
                        if let Some(vehicle) = queue.dequeue().await {
                            served_total.fetch_add(1, Ordering::SeqCst);
                            tracing::info!(vehicle = %vehicle.id, lane = %queue.lane(), "free turn");
                            emitter.emit(JunctionEvent::with_map(
                                events::VEHICLE_FREE_TURN,
                                HashMap::from([
                                    ("id".to_string(), serde_json::json!(vehicle.id)),
                                    (
                                        "lane".to_string(),
                                        serde_json::json!(queue.lane().to_string()),
                                    ),
                                ]),
                            ));
                        }
                    }
                }
            }));
        }

        Ok(())
    }

    /// Stop the loops cooperatively and wait for them to exit.
    ///
    /// Each loop observes the flag at its next iteration boundary, so this
    /// returns within roughly one tick of the slowest loop.
    pub async fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.emitter
            .emit(JunctionEvent::empty(events::JUNCTION_SHUTDOWN));

        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        tracing::info!("junction loops stopped");
    }

    /// Subscribe to junction lifecycle events
    pub fn subscribe(&self) -> crate::event::EventStream {
        self.emitter.subscribe_stream()
    }

    /// Point-in-time read-only snapshot for display
    pub async fn snapshot(&self) -> JunctionSnapshot {
        let mut lanes = HashMap::with_capacity(self.queues.len());
        for (lane, queue) in &self.queues {
            lanes.insert(lane.to_string(), queue.snapshot().await);
        }
        JunctionSnapshot {
            lanes,
            signal: self.scheduler.signal_state().await,
            overload_active: self.scheduler.overload_active().await,
            served_total: self.served_total(),
            ingested_total: self.ingested_total(),
        }
    }

    /// Per-lane queue depths and throughput totals
    pub async fn stats(&self) -> JunctionStats {
        let mut lanes = HashMap::with_capacity(self.queues.len());
        let mut total_queued = 0;
        for (lane, queue) in &self.queues {
            let len = queue.len().await;
            total_queued += len;
            lanes.insert(lane.to_string(), len);
        }
        JunctionStats {
            total_queued,
            served_total: self.served_total(),
            ingested_total: self.ingested_total(),
            lanes,
        }
    }

    /// Registry accessor (arbitrated lanes only)
    pub fn registry(&self) -> Arc<LaneRegistry> {
        Arc::clone(&self.registry)
    }
}

/// Builder for [`IntersectionController`]
pub struct IntersectionBuilder {
    config: JunctionConfig,
    emitter: Option<EventEmitter>,
    sources: Vec<Arc<dyn ArrivalSource>>,
}

impl IntersectionBuilder {
    pub fn new() -> Self {
        Self {
            config: JunctionConfig::default(),
            emitter: None,
            sources: Vec::new(),
        }
    }

    /// Set the junction configuration
    pub fn with_config(mut self, config: JunctionConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing event emitter (e.g. one a display already subscribes to)
    pub fn with_emitter(mut self, emitter: EventEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Add an arrival source
    pub fn with_source(mut self, source: Arc<dyn ArrivalSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Add the conventional per-road source files (`lanea.txt` … `laned.txt`)
    /// under the given directory
    pub fn with_file_sources(mut self, dir: impl AsRef<Path>) -> Self {
        for road in crate::vehicle::Road::ALL {
            let name = format!("lane{}.txt", road.letter().to_ascii_lowercase());
            self.sources
                .push(Arc::new(FileSource::new(dir.as_ref().join(name))));
        }
        self
    }

    /// Build the controller: twelve queues, the arbitrated-lane registry in
    /// fixed road order, the scheduler, and the ingestor.
    pub async fn build(self) -> IntersectionController {
        let emitter = self.emitter.unwrap_or_else(|| EventEmitter::new(256));

        let queues: HashMap<LaneName, Arc<VehicleQueue>> = LaneName::all()
            .map(|lane| (lane, Arc::new(VehicleQueue::new(lane))))
            .collect();

        let registry = Arc::new(LaneRegistry::new());
        for lane in LaneName::arbitrated() {
            registry.register(lane, Arc::clone(&queues[&lane])).await;
        }

        let served_total = Arc::new(AtomicU64::new(0));
        let ingested_total = Arc::new(AtomicU64::new(0));

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&registry),
            self.config.clone(),
            emitter.clone(),
            Arc::clone(&served_total),
        ));

        let ingestor = Arc::new(Ingestor::new(
            queues.clone(),
            self.sources,
            emitter.clone(),
            Arc::clone(&ingested_total),
        ));

        IntersectionController {
            queues,
            registry,
            scheduler,
            ingestor,
            config: self.config,
            emitter,
            running: Arc::new(AtomicBool::new(false)),
            handles: Mutex::new(Vec::new()),
            served_total,
            ingested_total,
        }
    }
}

impl Default for IntersectionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
