use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use osm_transit_network::schedule::StopTime;
use osm_transit_network::{RelationId, StopId, TransportMode};

/// Stop time as written to `<mode>_stop_times.json`
#[derive(Debug, Serialize)]
pub struct StopTimeRow {
    pub trip_id: RelationId,
    pub stop_id: StopId,
    pub stop_sequence: u32,
    /// `HH:MM:SS` from the trip start
    pub arrival_time: String,
}

impl From<&StopTime> for StopTimeRow {
    fn from(time: &StopTime) -> Self {
        Self {
            trip_id: time.trip_id,
            stop_id: time.stop_id,
            stop_sequence: time.stop_sequence,
            arrival_time: time.clock(),
        }
    }
}

/// `<dir>/<mode>_<suffix>.json`
pub fn output_path(dir: &Path, mode: TransportMode, suffix: &str) -> PathBuf {
    dir.join(format!("{}_{}.json", mode, suffix))
}

/// Write records as a pretty-printed JSON array
pub fn write_records<T: Serialize>(records: &[T], output_path: &Path) -> Result<()> {
    log::info!("Writing {} records to {}", records.len(), output_path.display());

    let json_string =
        serde_json::to_string_pretty(records).context("Failed to serialize records")?;

    std::fs::write(output_path, json_string)
        .with_context(|| format!("Failed to write JSON to {}", output_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use osm_transit_network::SegmentRecord;

    #[test]
    fn test_output_path() {
        let path = output_path(Path::new("/tmp/out"), TransportMode::Trolleybus, "s2s");
        assert_eq!(path, PathBuf::from("/tmp/out/trolleybus_s2s.json"));
    }

    #[test]
    fn test_write_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bus_s2s.json");
        let segments = vec![SegmentRecord {
            from: StopId::new(1),
            to: StopId::new(2),
            shape: "LINESTRING(37.6 55.7,37.7 55.7)".into(),
            length: 6279.5,
            trip_ref: "7".into(),
            trip_id: RelationId::new(10),
        }];

        write_records(&segments, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<SegmentRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, segments);
    }

    #[test]
    fn test_stop_time_row() {
        let time = StopTime {
            trip_id: RelationId::new(3),
            stop_id: StopId::new(4),
            stop_sequence: 1,
            offset_minutes: 75,
        };
        let json = serde_json::to_value(StopTimeRow::from(&time)).unwrap();
        assert_eq!(json["arrival_time"], "01:15:00");
        assert_eq!(json["stop_id"], 4);
    }

    #[test]
    fn test_write_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("bus_trips.json");
        let err = write_records::<SegmentRecord>(&[], &path).unwrap_err();
        assert!(err.to_string().contains("Failed to write JSON"));
    }
}
