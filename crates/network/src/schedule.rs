//! Synthetic stop times from segment lengths and a fixed travel speed.

use serde::{Deserialize, Serialize};

use crate::identifiers::*;

/// Arrival of one trip at one stop, as an offset from the trip start
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopTime {
    pub trip_id: RelationId,
    pub stop_id: StopId,
    /// 1-based position in the trip
    pub stop_sequence: u32,
    pub offset_minutes: u32,
}

impl StopTime {
    /// `HH:MM:00`; hours run past 23 for long trips, as GTFS allows
    pub fn clock(&self) -> String {
        format!("{:02}:{:02}:00", self.offset_minutes / 60, self.offset_minutes % 60)
    }
}

/// Whole minutes to cover `length_m` at `speed_kmh`, rounded up to at
/// least one minute per hop
pub fn travel_minutes(length_m: f64, speed_kmh: f64) -> u32 {
    let meters_per_minute = speed_kmh * 1000.0 / 60.0;
    (length_m / meters_per_minute).floor() as u32 + 1
}

/// Stop times for a trip whose consecutive stops are `lengths` meters apart.
///
/// `stops` has one more entry than `lengths`; the first stop is at offset 0.
pub fn stop_times(
    trip_id: RelationId,
    stops: &[StopId],
    lengths: &[f64],
    speed_kmh: f64,
) -> Vec<StopTime> {
    let mut offset = 0;
    stops
        .iter()
        .enumerate()
        .map(|(i, &stop_id)| {
            if i > 0 {
                offset += lengths.get(i - 1).map_or(0, |&l| travel_minutes(l, speed_kmh));
            }
            StopTime {
                trip_id,
                stop_id,
                stop_sequence: i as u32 + 1,
                offset_minutes: offset,
            }
        })
        .collect()
}

/// Map named colours to hex; anything else passes through
pub fn normalize_colour(colour: &str) -> String {
    match colour {
        "black" => "#000000".to_string(),
        "red" => "#FF0000".to_string(),
        other => other.to_string(),
    }
}
