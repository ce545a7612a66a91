//! Batched stop lookup.
//!
//! The remote side is pluggable: implement [`StopSource`] over whatever
//! client talks to the mapping API. A failed batch aborts the run.

use std::thread;
use std::time::Duration;

use hashbrown::HashSet;

use crate::extract::stop_record;
use crate::identifiers::*;
use crate::models::types::Result;
use crate::models::StopRecord;
use crate::osm::{Element, OverpassDocument};

/// Provider of platform elements by id
pub trait StopSource: Send + Sync {
    /// Elements for one batch of ids. Ids with no element are simply absent
    /// from the result; a non-success upstream response is
    /// `TransitError::UpstreamFetchFailure`.
    fn fetch_batch(&self, ids: &[StopId]) -> Result<Vec<Element>>;
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FetchConfig {
    pub batch_size: usize,
    /// Pause between consecutive batches
    pub delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            delay: Duration::from_secs(2),
        }
    }
}

/// Fetch and convert every stop in `ids`, one batch at a time
pub fn fetch_stops(
    source: &dyn StopSource,
    ids: &[StopId],
    config: &FetchConfig,
) -> Result<Vec<StopRecord>> {
    let batch_size = config.batch_size.max(1);
    let batches = ids.len().div_ceil(batch_size);
    let mut stops = Vec::with_capacity(ids.len());

    for (n, batch) in ids.chunks(batch_size).enumerate() {
        if n > 0 && !config.delay.is_zero() {
            thread::sleep(config.delay);
        }

        let elements = source.fetch_batch(batch)?;
        let before = stops.len();
        stops.extend(elements.iter().filter_map(stop_record));
        log::debug!(
            "Stop batch {}/{}: {} ids, {} stops",
            n + 1,
            batches,
            batch.len(),
            stops.len() - before
        );
    }

    log::info!("Fetched {} stops for {} ids", stops.len(), ids.len());
    Ok(stops)
}

/// Serves stops from an already downloaded Overpass document
#[derive(Debug, Default)]
pub struct DumpStopSource {
    elements: Vec<Element>,
}

impl DumpStopSource {
    /// Keep the `public_transport=platform` elements of `document`
    pub fn new(document: OverpassDocument) -> Self {
        let elements = document
            .elements
            .into_iter()
            .filter(|e| e.tag("public_transport") == Some("platform"))
            .collect();
        Self { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl StopSource for DumpStopSource {
    fn fetch_batch(&self, ids: &[StopId]) -> Result<Vec<Element>> {
        let wanted: HashSet<i64> = ids.iter().map(|id| id.get()).collect();
        Ok(self
            .elements
            .iter()
            .filter(|e| e.id().is_some_and(|id| wanted.contains(&id)))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::types::TransitError;
    use std::sync::Mutex;

    fn document() -> OverpassDocument {
        OverpassDocument::from_json(
            r#"{"elements": [
                {"type": "node", "id": 1, "lat": 55.0, "lon": 37.0,
                 "tags": {"public_transport": "platform", "name": "A"}},
                {"type": "node", "id": 2, "lat": 55.1, "lon": 37.1,
                 "tags": {"public_transport": "platform", "name": "B"}},
                {"type": "node", "id": 3, "lat": 55.2, "lon": 37.2,
                 "tags": {"public_transport": "stop_position"}},
                {"type": "node", "id": 4, "lat": 55.3, "lon": 37.3,
                 "tags": {"public_transport": "platform", "name": "D"}}
            ]}"#,
        )
        .unwrap()
    }

    fn no_delay(batch_size: usize) -> FetchConfig {
        FetchConfig {
            batch_size,
            delay: Duration::ZERO,
        }
    }

    /// Records the batches it was asked for
    struct Recording {
        inner: DumpStopSource,
        batches: Mutex<Vec<usize>>,
    }

    impl StopSource for Recording {
        fn fetch_batch(&self, ids: &[StopId]) -> Result<Vec<Element>> {
            self.batches.lock().unwrap().push(ids.len());
            self.inner.fetch_batch(ids)
        }
    }

    struct Throttled;

    impl StopSource for Throttled {
        fn fetch_batch(&self, _ids: &[StopId]) -> Result<Vec<Element>> {
            Err(TransitError::UpstreamFetchFailure {
                status: 429,
                message: "rate limited".into(),
            })
        }
    }

    #[test]
    fn test_dump_source_keeps_platforms() {
        let source = DumpStopSource::new(document());
        assert_eq!(source.len(), 3);

        let ids = [StopId::new(2), StopId::new(3), StopId::new(99)];
        let elements = source.fetch_batch(&ids).unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].id(), Some(2));
    }

    #[test]
    fn test_fetch_in_batches() {
        let source = Recording {
            inner: DumpStopSource::new(document()),
            batches: Mutex::new(Vec::new()),
        };
        let ids: Vec<StopId> = [1, 2, 4, 5, 6].into_iter().map(StopId::new).collect();

        let stops = fetch_stops(&source, &ids, &no_delay(2)).unwrap();

        assert_eq!(*source.batches.lock().unwrap(), vec![2, 2, 1]);
        let names: Vec<&str> = stops.iter().map(|s| s.stop_name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "D"]);
    }

    #[test]
    fn test_upstream_failure_is_fatal() {
        let ids = [StopId::new(1)];
        let err = fetch_stops(&Throttled, &ids, &no_delay(10)).unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, TransitError::UpstreamFetchFailure { status: 429, .. }));
    }

    #[test]
    fn test_empty_ids_fetch_nothing() {
        let stops = fetch_stops(&Throttled, &[], &FetchConfig::default()).unwrap();
        assert!(stops.is_empty());
    }
}
