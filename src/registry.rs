//! Registry of arbitrated lanes and next-lane selection

use crate::queue::VehicleQueue;
use crate::vehicle::LaneName;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Priority weight attached to an arbitrated lane.
///
/// Defaults to 0; the scheduler raises it to a fixed high value while the
/// overload condition holds. Larger weight wins arbitration.
pub type Weight = i32;

struct Entry {
    lane: LaneName,
    queue: Arc<VehicleQueue>,
    weight: Weight,
}

/// Collection of the lanes that compete for the signal (one per road).
///
/// Selection is a comparator-driven scan over the fixed-size entry list; with
/// only four lanes a heap buys nothing, and the explicit scan keeps the
/// tie-break rule obvious: highest weight, then larger queue, then
/// registration order.
pub struct LaneRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl LaneRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a lane with weight 0. Registration order is the final
    /// tie-break in selection, so callers register in a fixed order.
    pub async fn register(&self, lane: LaneName, queue: Arc<VehicleQueue>) {
        self.entries.lock().await.push(Entry {
            lane,
            queue,
            weight: 0,
        });
    }

    /// Number of registered lanes
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Overwrite the stored weight for a lane.
    ///
    /// Unknown lanes are a silent no-op: weight updates are only ever issued
    /// by the scheduler for lanes it registered itself, so there is no error
    /// path worth surfacing.
    pub async fn set_weight(&self, lane: LaneName, weight: Weight) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.iter_mut().find(|e| e.lane == lane) {
            entry.weight = weight;
        }
    }

    /// Current weight of a lane, if registered
    pub async fn weight(&self, lane: LaneName) -> Option<Weight> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.lane == lane)
            .map(|e| e.weight)
    }

    /// Pick the lane to serve next, or `None` if every registered queue is
    /// empty. Reads queue sizes at call time without dequeuing; a concurrent
    /// append may race the snapshot, which is fine because the scheduler
    /// re-evaluates sizes on every selection.
    pub async fn select_next(&self) -> Option<LaneName> {
        let entries = self.entries.lock().await;

        let mut best: Option<(Weight, usize, LaneName)> = None;
        for entry in entries.iter() {
            let size = entry.queue.len().await;
            if size == 0 {
                continue;
            }
            // Strict > on both keys keeps earlier registrations on full ties.
            let candidate = (entry.weight, size, entry.lane);
            best = match best {
                None => Some(candidate),
                Some(current) => {
                    if candidate.0 > current.0
                        || (candidate.0 == current.0 && candidate.1 > current.1)
                    {
                        Some(candidate)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        best.map(|(_, _, lane)| lane)
    }

    /// The queue registered for a lane, if any
    pub async fn queue(&self, lane: LaneName) -> Option<Arc<VehicleQueue>> {
        self.entries
            .lock()
            .await
            .iter()
            .find(|e| e.lane == lane)
            .map(|e| Arc::clone(&e.queue))
    }

    /// Queue sizes of all registered lanes in registration order
    pub async fn sizes(&self) -> Vec<(LaneName, usize)> {
        let entries = self.entries.lock().await;
        let mut sizes = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            sizes.push((entry.lane, entry.queue.len().await));
        }
        sizes
    }
}

impl Default for LaneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vehicle::{LaneSlot, Road, Vehicle};

    async fn registry_with_sizes(sizes: [usize; 4]) -> (LaneRegistry, Vec<LaneName>) {
        let registry = LaneRegistry::new();
        let mut lanes = Vec::new();
        for (road, count) in Road::ALL.into_iter().zip(sizes) {
            let lane = LaneName::new(road, LaneSlot::Signal);
            let queue = Arc::new(VehicleQueue::new(lane));
            for i in 0..count {
                queue.enqueue(Vehicle::new(format!("{lane}-{i}"), lane)).await;
            }
            registry.register(lane, queue).await;
            lanes.push(lane);
        }
        (registry, lanes)
    }

    #[tokio::test]
    async fn test_select_none_when_all_empty() {
        let (registry, _) = registry_with_sizes([0, 0, 0, 0]).await;
        assert!(registry.select_next().await.is_none());
    }

    #[tokio::test]
    async fn test_select_largest_queue_on_equal_weights() {
        // Sizes {A:3, B:3, C:5, D:0} with equal weights → C wins
        let (registry, lanes) = registry_with_sizes([3, 3, 5, 0]).await;
        assert_eq!(registry.select_next().await, Some(lanes[2]));
    }

    #[tokio::test]
    async fn test_tie_breaks_by_registration_order() {
        // A and B tie at size 3 with equal weights → A, registered first
        let (registry, lanes) = registry_with_sizes([3, 3, 0, 0]).await;
        assert_eq!(registry.select_next().await, Some(lanes[0]));

        // Stable across repeated calls with unchanged state
        assert_eq!(registry.select_next().await, Some(lanes[0]));
        assert_eq!(registry.select_next().await, Some(lanes[0]));
    }

    #[tokio::test]
    async fn test_weight_dominates_size() {
        let (registry, lanes) = registry_with_sizes([1, 9, 9, 9]).await;
        registry.set_weight(lanes[0], 100).await;
        assert_eq!(registry.select_next().await, Some(lanes[0]));
    }

    #[tokio::test]
    async fn test_weighted_lane_skipped_when_empty() {
        // A carries the overload weight but has drained; selection falls back
        // to the largest normal queue.
        let (registry, lanes) = registry_with_sizes([0, 2, 4, 1]).await;
        registry.set_weight(lanes[0], 100).await;
        assert_eq!(registry.select_next().await, Some(lanes[2]));
    }

    #[tokio::test]
    async fn test_set_weight_unknown_lane_is_noop() {
        let (registry, lanes) = registry_with_sizes([1, 0, 0, 0]).await;
        let unknown = LaneName::new(Road::B, LaneSlot::FreeTurn);

        registry.set_weight(unknown, 100).await;
        assert!(registry.weight(unknown).await.is_none());
        assert_eq!(registry.weight(lanes[0]).await, Some(0));
    }

    #[tokio::test]
    async fn test_select_does_not_dequeue() {
        let (registry, _) = registry_with_sizes([2, 0, 0, 0]).await;
        let _ = registry.select_next().await;
        let sizes = registry.sizes().await;
        assert_eq!(sizes[0].1, 2);
    }

    #[tokio::test]
    async fn test_sizes_in_registration_order() {
        let (registry, lanes) = registry_with_sizes([1, 2, 3, 4]).await;
        let sizes = registry.sizes().await;
        let expected: Vec<_> = lanes.into_iter().zip([1usize, 2, 3, 4]).collect();
        assert_eq!(sizes, expected);
    }
}
