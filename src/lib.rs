//! # Crossflow
//!
//! A four-road junction scheduler with per-lane FIFO queues, priority
//! arbitration, and timed service windows.
//!
//! ## Core
//!
//! - Twelve per-lane FIFO vehicle queues (four roads, three lanes each)
//! - Weight-then-size arbitration over the four signal-controlled lanes
//! - Overload mode for the high-priority lane with hysteresis thresholds
//! - Quota-bounded service windows metered by a release gate
//! - Free-turn lanes drained on an independent timer
//! - Pluggable arrival sources (file-backed or in-memory) with line-delimited
//!   JSON records
//! - Synthetic traffic producer with engineered bursts
//! - Event system for junction lifecycle notifications
//! - Cooperative shutdown across all loops
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use crossflow::{IntersectionBuilder, JunctionConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let controller = IntersectionBuilder::new()
//!         .with_config(JunctionConfig::default())
//!         .with_file_sources("./arrivals")
//!         .build()
//!         .await;
//!
//!     controller.start().await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     controller.shutdown().await;
//!
//!     let stats = controller.stats().await;
//!     println!("served {} of {}", stats.served_total, stats.ingested_total);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod ingest;
pub mod producer;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod vehicle;

pub use config::JunctionConfig;
pub use controller::{IntersectionBuilder, IntersectionController, JunctionSnapshot};
pub use error::{JunctionError, Result};
pub use event::{events, EventEmitter, EventPayload, EventStream, JunctionEvent};
pub use ingest::{ArrivalRecord, ArrivalSource, FileSource, Ingestor, MemorySource};
pub use producer::{ArrivalSink, VehicleProducer, DEFAULT_PRODUCER_PERIOD};
pub use queue::VehicleQueue;
pub use registry::{LaneRegistry, Weight};
pub use scheduler::{Scheduler, ServiceSession, SignalState};
pub use vehicle::{LaneName, LaneSlot, Road, Vehicle, VehicleId};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Junction statistics snapshot
///
/// Provides a point-in-time view of queue depths and throughput across all
/// twelve lanes.
///
/// # Fields
///
/// * `total_queued` - Vehicles currently waiting across all lanes
/// * `served_total` - Vehicles released since startup (signalled and free-turn)
/// * `ingested_total` - Vehicles accepted from arrival sources since startup
/// * `lanes` - Per-lane queue depth keyed by lane label ("AL2")
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JunctionStats {
    pub total_queued: usize,
    pub served_total: u64,
    pub ingested_total: u64,
    pub lanes: HashMap<String, usize>,
}
