//! Per-lane FIFO vehicle queues

use crate::vehicle::{LaneName, Vehicle};
use std::collections::VecDeque;
use tokio::sync::Mutex;

/// FIFO queue of vehicles for one physical lane.
///
/// Created once per lane at startup and never destroyed; the ingestion loop
/// appends and exactly one consumer (the scheduler or the free-turn drain,
/// depending on the lane's slot) removes. The inner mutex serializes the two
/// so enqueue/dequeue on a single queue are linearizable; queues on different
/// lanes need no coordination.
pub struct VehicleQueue {
    lane: LaneName,
    inner: Mutex<VecDeque<Vehicle>>,
}

impl VehicleQueue {
    /// Create an empty queue for the given lane
    pub fn new(lane: LaneName) -> Self {
        Self {
            lane,
            inner: Mutex::new(VecDeque::new()),
        }
    }

    /// The lane this queue belongs to
    pub fn lane(&self) -> LaneName {
        self.lane
    }

    /// Append a vehicle. Unbounded; never fails.
    pub async fn enqueue(&self, vehicle: Vehicle) {
        self.inner.lock().await.push_back(vehicle);
    }

    /// Remove and return the oldest vehicle, or `None` if the queue is empty.
    ///
    /// An empty queue is a normal "nothing available" result, not an error.
    pub async fn dequeue(&self) -> Option<Vehicle> {
        self.inner.lock().await.pop_front()
    }

    /// Current queue depth
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Ordered read-only copy of the queued vehicles, oldest first.
    ///
    /// Used by display and by arbitration inspection; does not mutate the
    /// queue or its element order.
    pub async fn snapshot(&self) -> Vec<Vehicle> {
        self.inner.lock().await.iter().cloned().collect()
    }
}
