//! Arrival record ingestion
//!
//! Each road has one external arrival source holding line-delimited JSON
//! records. Once per ingestion cycle every source is drained (read all
//! pending lines, then clear) and each record is routed to the queue named by
//! its embedded lane label. Delivery is at most once per cycle: a crash
//! between read and clear may duplicate or lose a batch, which is an accepted
//! weakness of the protocol, not something this module tries to repair.

use crate::error::{JunctionError, Result};
use crate::event::{events, EventEmitter, JunctionEvent};
use crate::queue::VehicleQueue;
use crate::vehicle::{LaneName, Vehicle};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;

/// One arrival on the wire: a vehicle id and its target lane label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrivalRecord {
    pub id: String,
    pub lane: String,
}

impl ArrivalRecord {
    pub fn new(id: impl Into<String>, lane: LaneName) -> Self {
        Self {
            id: id.into(),
            lane: lane.to_string(),
        }
    }

    /// Wire form: one JSON object per line
    pub fn to_line(&self) -> String {
        // Serialization of two plain strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A per-road source of pending arrival records.
///
/// `collect` returns all pending lines and clears the source in the same
/// call, giving at-most-once delivery per cycle.
#[async_trait]
pub trait ArrivalSource: Send + Sync {
    async fn collect(&self) -> Result<Vec<String>>;
}

/// File-backed arrival source: one text file per road, appended to by an
/// external producer, read then truncated by the ingestion loop.
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

#[async_trait]
impl ArrivalSource for FileSource {
    async fn collect(&self) -> Result<Vec<String>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            // Missing file means the producer has not written yet.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JunctionError::SourceError(e.to_string())),
        };

        if content.is_empty() {
            return Ok(Vec::new());
        }

        fs::write(&self.path, "")
            .await
            .map_err(|e| JunctionError::SourceError(e.to_string()))?;

        Ok(content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// In-process arrival source, used by the embedded producer and by tests
#[derive(Default)]
pub struct MemorySource {
    lines: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record to the pending batch
    pub async fn append(&self, record: &ArrivalRecord) {
        self.lines.lock().await.push(record.to_line());
    }

    /// Append a raw line (tests use this for malformed input)
    pub async fn append_line(&self, line: impl Into<String>) {
        self.lines.lock().await.push(line.into());
    }
}

#[async_trait]
impl ArrivalSource for MemorySource {
    async fn collect(&self) -> Result<Vec<String>> {
        Ok(std::mem::take(&mut *self.lines.lock().await))
    }
}

/// Routes collected arrival records into the per-lane queues.
pub struct Ingestor {
    queues: HashMap<LaneName, Arc<VehicleQueue>>,
    sources: Vec<Arc<dyn ArrivalSource>>,
    emitter: EventEmitter,
    ingested_total: Arc<AtomicU64>,
}

impl Ingestor {
    pub fn new(
        queues: HashMap<LaneName, Arc<VehicleQueue>>,
        sources: Vec<Arc<dyn ArrivalSource>>,
        emitter: EventEmitter,
        ingested_total: Arc<AtomicU64>,
    ) -> Self {
        Self {
            queues,
            sources,
            emitter,
            ingested_total,
        }
    }

    /// Total vehicles successfully enqueued since startup
    pub fn ingested_total(&self) -> u64 {
        self.ingested_total.load(Ordering::SeqCst)
    }

    /// Drain every source once and enqueue what parses.
    ///
    /// Malformed lines are skipped; an unreadable source counts as "no
    /// arrivals this cycle". Nothing here propagates to the caller loop.
    pub async fn run_cycle(&self) {
        let mut batch = 0u64;

        for source in &self.sources {
            let lines = match source.collect().await {
                Ok(lines) => lines,
                Err(e) => {
                    tracing::warn!(error = %e, "arrival source unreadable, skipping cycle");
                    continue;
                }
            };

            for line in lines {
                match self.route(&line).await {
                    Ok(()) => batch += 1,
                    Err(e) => tracing::warn!(error = %e, line, "skipping arrival record"),
                }
            }
        }

        if batch > 0 {
            self.ingested_total.fetch_add(batch, Ordering::SeqCst);
            self.emitter.emit(JunctionEvent::with_map(
                events::INGEST_BATCH,
                HashMap::from([("count".to_string(), serde_json::json!(batch))]),
            ));
        }
    }

    async fn route(&self, line: &str) -> Result<()> {
        let record: ArrivalRecord =
            serde_json::from_str(line).map_err(|e| JunctionError::ParseError(e.to_string()))?;
        let lane: LaneName = record.lane.parse()?;
        let queue = self
            .queues
            .get(&lane)
            .ok_or_else(|| JunctionError::UnknownLane(record.lane.clone()))?;
        queue.enqueue(Vehicle::new(record.id, lane)).await;
        Ok(())
    }
}
