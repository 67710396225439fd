//! Vehicles and lane naming
//!
//! The junction has four roads (A through D) with three lanes each: an inbound
//! lane, a signal-controlled lane, and a free-turn lane. Lane labels follow the
//! `{road}L{slot}` convention ("AL2" is road A's signal lane), which is also
//! the wire form used in arrival records.

use crate::error::JunctionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Vehicle identifier, assigned monotonically by the producer
pub type VehicleId = String;

/// A vehicle waiting in (or released from) a lane queue.
///
/// Immutable after creation; owned by exactly one queue at a time and handed
/// off by value on dequeue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    pub lane: LaneName,
}

impl Vehicle {
    pub fn new(id: impl Into<VehicleId>, lane: LaneName) -> Self {
        Self {
            id: id.into(),
            lane,
        }
    }
}

/// One of the four roads meeting at the junction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Road {
    A,
    B,
    C,
    D,
}

impl Road {
    /// All roads in fixed order
    pub const ALL: [Road; 4] = [Road::A, Road::B, Road::C, Road::D];

    /// Road letter as used in lane labels and source file names
    pub fn letter(&self) -> char {
        match self {
            Road::A => 'A',
            Road::B => 'B',
            Road::C => 'C',
            Road::D => 'D',
        }
    }
}

impl fmt::Display for Road {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Position of a lane within its road
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneSlot {
    /// L1: inbound lane, no arbitration
    Inbound,
    /// L2: signal-controlled lane, competes via the scheduler
    Signal,
    /// L3: free-turn lane, drains on its own timer
    FreeTurn,
}

impl LaneSlot {
    pub const ALL: [LaneSlot; 3] = [LaneSlot::Inbound, LaneSlot::Signal, LaneSlot::FreeTurn];

    /// Slot number as used in lane labels (1, 2, 3)
    pub fn number(&self) -> u8 {
        match self {
            LaneSlot::Inbound => 1,
            LaneSlot::Signal => 2,
            LaneSlot::FreeTurn => 3,
        }
    }
}

/// Fully-qualified lane name, one of the twelve lanes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LaneName {
    pub road: Road,
    pub slot: LaneSlot,
}

impl LaneName {
    pub const fn new(road: Road, slot: LaneSlot) -> Self {
        Self { road, slot }
    }

    /// The distinguished high-priority lane (road A's signal lane)
    pub const HIGH_PRIORITY: LaneName = LaneName::new(Road::A, LaneSlot::Signal);

    /// All twelve lanes, grouped by road in fixed order
    pub fn all() -> impl Iterator<Item = LaneName> {
        Road::ALL
            .into_iter()
            .flat_map(|road| LaneSlot::ALL.into_iter().map(move |slot| LaneName::new(road, slot)))
    }

    /// The four signal-controlled lanes in registration order (A, B, C, D)
    pub fn arbitrated() -> impl Iterator<Item = LaneName> {
        Road::ALL
            .into_iter()
            .map(|road| LaneName::new(road, LaneSlot::Signal))
    }

    /// The four free-turn lanes in road order
    pub fn free_turn() -> impl Iterator<Item = LaneName> {
        Road::ALL
            .into_iter()
            .map(|road| LaneName::new(road, LaneSlot::FreeTurn))
    }
}

impl fmt::Display for LaneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}L{}", self.road.letter(), self.slot.number())
    }
}

impl FromStr for LaneName {
    type Err = JunctionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 3 || bytes[1] != b'L' {
            return Err(JunctionError::UnknownLane(s.to_string()));
        }
        let road = match bytes[0] {
            b'A' => Road::A,
            b'B' => Road::B,
            b'C' => Road::C,
            b'D' => Road::D,
            _ => return Err(JunctionError::UnknownLane(s.to_string())),
        };
        let slot = match bytes[2] {
            b'1' => LaneSlot::Inbound,
            b'2' => LaneSlot::Signal,
            b'3' => LaneSlot::FreeTurn,
            _ => return Err(JunctionError::UnknownLane(s.to_string())),
        };
        Ok(LaneName::new(road, slot))
    }
}

// Lane names serialize as their wire labels ("AL2"), matching arrival records.
impl Serialize for LaneName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LaneName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_name_display() {
        assert_eq!(LaneName::new(Road::A, LaneSlot::Signal).to_string(), "AL2");
        assert_eq!(LaneName::new(Road::D, LaneSlot::FreeTurn).to_string(), "DL3");
        assert_eq!(LaneName::new(Road::B, LaneSlot::Inbound).to_string(), "BL1");
    }

    #[test]
    fn test_lane_name_parse() {
        let lane: LaneName = "CL2".parse().unwrap();
        assert_eq!(lane.road, Road::C);
        assert_eq!(lane.slot, LaneSlot::Signal);
    }

    #[test]
    fn test_lane_name_parse_roundtrip() {
        for lane in LaneName::all() {
            let parsed: LaneName = lane.to_string().parse().unwrap();
            assert_eq!(parsed, lane);
        }
    }

    #[test]
    fn test_lane_name_parse_rejects_unknown() {
        assert!("EL2".parse::<LaneName>().is_err());
        assert!("AL4".parse::<LaneName>().is_err());
        assert!("AL".parse::<LaneName>().is_err());
        assert!("".parse::<LaneName>().is_err());
        assert!("AX2".parse::<LaneName>().is_err());
    }

    #[test]
    fn test_twelve_lanes() {
        assert_eq!(LaneName::all().count(), 12);
        assert_eq!(LaneName::arbitrated().count(), 4);
        assert_eq!(LaneName::free_turn().count(), 4);
    }

    #[test]
    fn test_arbitrated_order_is_registration_order() {
        let order: Vec<String> = LaneName::arbitrated().map(|l| l.to_string()).collect();
        assert_eq!(order, vec!["AL2", "BL2", "CL2", "DL2"]);
    }

    #[test]
    fn test_high_priority_lane() {
        assert_eq!(LaneName::HIGH_PRIORITY.to_string(), "AL2");
    }

    #[test]
    fn test_lane_name_serde_as_label() {
        let lane = LaneName::new(Road::B, LaneSlot::Signal);
        let json = serde_json::to_string(&lane).unwrap();
        assert_eq!(json, "\"BL2\"");

        let parsed: LaneName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, lane);
    }

    #[test]
    fn test_vehicle_new() {
        let v = Vehicle::new("V1", LaneName::HIGH_PRIORITY);
        assert_eq!(v.id, "V1");
        assert_eq!(v.lane.to_string(), "AL2");
    }

    #[test]
    fn test_vehicle_serialization() {
        let v = Vehicle::new("V42", LaneName::new(Road::C, LaneSlot::FreeTurn));
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.contains("\"id\":\"V42\""));
        assert!(json.contains("\"lane\":\"CL3\""));

        let parsed: Vehicle = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, v);
    }
}
