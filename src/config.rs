//! Junction configuration types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Junction configuration
///
/// Thresholds and timer periods for the scheduler, ingestion, and free-turn
/// drain loops. Defaults mirror the reference junction: overload hysteresis
/// at 10/5 vehicles, a residual buffer of 4, 2 s ingest and drain cycles,
/// a 500 ms scheduler poll with a 1.5 s release gate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JunctionConfig {
    /// Queue size above which the high-priority lane enters overload mode
    pub overload_high: usize,
    /// Queue size below which overload mode clears (hysteresis band between)
    pub overload_low: usize,
    /// Weight assigned to the high-priority lane while overloaded
    pub overload_weight: i32,
    /// Vehicles left queued when draining an overloaded backlog
    pub residual_buffer: usize,
    /// High-priority lane sizes above this are excluded from the quota average
    pub average_inclusion_cap: usize,
    /// Period of the arrival ingestion loop
    #[serde(with = "duration_millis")]
    pub ingest_period: Duration,
    /// Period of the scheduler poll loop
    #[serde(with = "duration_millis")]
    pub tick_period: Duration,
    /// Minimum interval between vehicle releases within a service session
    #[serde(with = "duration_millis")]
    pub release_gate: Duration,
    /// Period of the free-turn drain loop
    #[serde(with = "duration_millis")]
    pub drain_period: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for JunctionConfig {
    fn default() -> Self {
        Self {
            overload_high: 10,
            overload_low: 5,
            overload_weight: 100,
            residual_buffer: 4,
            average_inclusion_cap: 5,
            ingest_period: Duration::from_secs(2),
            tick_period: Duration::from_millis(500),
            release_gate: Duration::from_millis(1500),
            drain_period: Duration::from_secs(2),
        }
    }
}

impl JunctionConfig {
    /// Set the overload hysteresis thresholds (builder pattern)
    pub fn with_overload_thresholds(mut self, high: usize, low: usize) -> Self {
        self.overload_high = high;
        self.overload_low = low;
        self
    }

    /// Set the overload residual buffer (builder pattern)
    pub fn with_residual_buffer(mut self, buffer: usize) -> Self {
        self.residual_buffer = buffer;
        self
    }

    /// Set the scheduler poll period (builder pattern)
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Set the inter-release gate (builder pattern)
    pub fn with_release_gate(mut self, gate: Duration) -> Self {
        self.release_gate = gate;
        self
    }

    /// Set the ingestion period (builder pattern)
    pub fn with_ingest_period(mut self, period: Duration) -> Self {
        self.ingest_period = period;
        self
    }

    /// Set the free-turn drain period (builder pattern)
    pub fn with_drain_period(mut self, period: Duration) -> Self {
        self.drain_period = period;
        self
    }
}
