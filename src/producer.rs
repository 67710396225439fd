//! Synthetic arrival producer
//!
//! Generates arrival records per lane on its own cadence, independent of the
//! ingestion loop. Batch sizes are randomized per lane slot, with an
//! engineered chance of a large burst on the high-priority lane so overload
//! mode actually gets exercised.

use crate::error::Result;
use crate::ingest::{ArrivalRecord, FileSource, MemorySource};
use crate::vehicle::{LaneName, LaneSlot, Road};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Probability that a high-priority-lane batch is a burst
const BURST_PROBABILITY: f64 = 0.35;

/// Default producer cadence
pub const DEFAULT_PRODUCER_PERIOD: Duration = Duration::from_secs(5);

/// Destination a producer can publish arrival records to
#[async_trait]
pub trait ArrivalSink: Send + Sync {
    async fn publish(&self, record: &ArrivalRecord) -> Result<()>;
}

#[async_trait]
impl ArrivalSink for MemorySource {
    async fn publish(&self, record: &ArrivalRecord) -> Result<()> {
        self.append(record).await;
        Ok(())
    }
}

#[async_trait]
impl ArrivalSink for FileSource {
    async fn publish(&self, record: &ArrivalRecord) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .create(true)
            .open(self.path())
            .await
            .map_err(|e| crate::error::JunctionError::SourceError(e.to_string()))?;
        file.write_all(format!("{}\n", record.to_line()).as_bytes())
            .await
            .map_err(|e| crate::error::JunctionError::SourceError(e.to_string()))?;
        Ok(())
    }
}

/// Synthetic vehicle producer with monotonic `V{n}` ids
pub struct VehicleProducer {
    sinks: Vec<(Road, Arc<dyn ArrivalSink>)>,
    counter: AtomicU64,
    rng: Mutex<StdRng>,
}

impl VehicleProducer {
    /// Create a producer publishing to one sink per road
    pub fn new(sinks: Vec<(Road, Arc<dyn ArrivalSink>)>) -> Self {
        Self {
            sinks,
            counter: AtomicU64::new(0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Create a producer with a fixed seed for reproducible batches
    pub fn with_seed(sinks: Vec<(Road, Arc<dyn ArrivalSink>)>, seed: u64) -> Self {
        Self {
            sinks,
            counter: AtomicU64::new(0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Ids assigned so far
    pub fn generated_total(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }

    /// Batch size for one lane this cycle.
    ///
    /// Inbound and free-turn lanes see light-to-moderate traffic; signal
    /// lanes slightly more; the high-priority lane occasionally bursts well
    /// past the overload threshold's reach.
    fn batch_size(&self, lane: LaneName, rng: &mut StdRng) -> usize {
        match lane.slot {
            LaneSlot::Inbound => rng.gen_range(1..=3),
            LaneSlot::FreeTurn => rng.gen_range(1..=3),
            LaneSlot::Signal if lane == LaneName::HIGH_PRIORITY => {
                if rng.gen::<f64>() < BURST_PROBABILITY {
                    rng.gen_range(4..=7)
                } else {
                    rng.gen_range(1..=3)
                }
            }
            LaneSlot::Signal => rng.gen_range(1..=4),
        }
    }

    /// Publish one cycle's worth of arrivals to every road sink
    pub async fn generate_cycle(&self) {
        let mut rng = self.rng.lock().await;
        for (road, sink) in &self.sinks {
            for slot in LaneSlot::ALL {
                let lane = LaneName::new(*road, slot);
                let count = self.batch_size(lane, &mut rng);
                for _ in 0..count {
                    let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
                    let record = ArrivalRecord::new(format!("V{n}"), lane);
                    if let Err(e) = sink.publish(&record).await {
                        tracing::warn!(error = %e, lane = %lane, "failed to publish arrival");
                    }
                }
            }
        }
        tracing::debug!(total = self.generated_total(), "producer cycle complete");
    }

    /// Run the producer loop until `running` clears
    pub async fn run(&self, period: Duration, running: Arc<AtomicBool>) {
        let mut ticker = tokio::time::interval(period);
        while running.load(Ordering::SeqCst) {
            ticker.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }
            self.generate_cycle().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::ArrivalSource;

    fn memory_sinks() -> (Vec<(Road, Arc<dyn ArrivalSink>)>, Vec<Arc<MemorySource>>) {
        let mut sinks: Vec<(Road, Arc<dyn ArrivalSink>)> = Vec::new();
        let mut sources = Vec::new();
        for road in Road::ALL {
            let source = Arc::new(MemorySource::new());
            sources.push(Arc::clone(&source));
            sinks.push((road, source as Arc<dyn ArrivalSink>));
        }
        (sinks, sources)
    }

    #[tokio::test]
    async fn test_ids_are_monotonic_across_roads() {
        let (sinks, sources) = memory_sinks();
        let producer = VehicleProducer::with_seed(sinks, 7);
        producer.generate_cycle().await;

        let mut ids = Vec::new();
        for source in &sources {
            for line in source.collect().await.unwrap() {
                let record: ArrivalRecord = serde_json::from_str(&line).unwrap();
                let n: u64 = record.id.trim_start_matches('V').parse().unwrap();
                ids.push(n);
            }
        }

        assert_eq!(ids.len() as u64, producer.generated_total());
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
        assert_eq!(sorted.first(), Some(&1));
        assert_eq!(sorted.last(), Some(&(ids.len() as u64)));
    }

    #[tokio::test]
    async fn test_batch_sizes_within_profile() {
        let (sinks, sources) = memory_sinks();
        let producer = VehicleProducer::with_seed(sinks, 42);

        for _ in 0..20 {
            producer.generate_cycle().await;
            for (source, road) in sources.iter().zip(Road::ALL) {
                let mut per_lane: std::collections::HashMap<String, usize> = Default::default();
                for line in source.collect().await.unwrap() {
                    let record: ArrivalRecord = serde_json::from_str(&line).unwrap();
                    *per_lane.entry(record.lane).or_default() += 1;
                }
                for slot in LaneSlot::ALL {
                    let lane = LaneName::new(road, slot);
                    let count = per_lane.get(&lane.to_string()).copied().unwrap_or(0);
                    let max = match slot {
                        LaneSlot::Signal if lane == LaneName::HIGH_PRIORITY => 7,
                        LaneSlot::Signal => 4,
                        _ => 3,
                    };
                    assert!((1..=max).contains(&count), "{lane}: {count}");
                }
            }
        }
    }

    #[tokio::test]
    async fn test_high_priority_lane_bursts_eventually() {
        let (sinks, sources) = memory_sinks();
        let producer = VehicleProducer::with_seed(sinks, 1);

        let mut saw_burst = false;
        for _ in 0..50 {
            producer.generate_cycle().await;
            let lines = sources[0].collect().await.unwrap();
            let high_count = lines
                .iter()
                .filter_map(|l| serde_json::from_str::<ArrivalRecord>(l).ok())
                .filter(|r| r.lane == "AL2")
                .count();
            if high_count >= 4 {
                saw_burst = true;
            }
            // Other sources get drained too so they don't grow unbounded.
            for source in &sources[1..] {
                let _ = source.collect().await;
            }
        }
        assert!(saw_burst, "expected at least one burst in 50 cycles");
    }

    #[tokio::test]
    async fn test_records_route_through_lane_labels() {
        let (sinks, sources) = memory_sinks();
        let producer = VehicleProducer::with_seed(sinks, 9);
        producer.generate_cycle().await;

        for (source, road) in sources.iter().zip(Road::ALL) {
            for line in source.collect().await.unwrap() {
                let record: ArrivalRecord = serde_json::from_str(&line).unwrap();
                let lane: LaneName = record.lane.parse().unwrap();
                assert_eq!(lane.road, road);
            }
        }
    }
}
