//! Per-run driver: validate, extract, fetch stops, then build every route.
//!
//! Routes are independent once the stop table exists, so the geometric
//! stages run per route on the rayon pool. A route that cannot be built is
//! reported and dropped; only a failed stop fetch aborts the run.

use geo::{Coord, LineString};
use hashbrown::HashMap;
use rayon::prelude::*;

use crate::assembly::ShapeAssembler;
use crate::cutting::{Segment, SegmentCutter};
use crate::diagnostics::{DiagnosticKind, DiagnosticSink, RouteScope};
use crate::extract::{extract_routes, platform_ids, RouteMasterIndex};
use crate::fetch::{fetch_stops, FetchConfig, StopSource};
use crate::geometry::{Hemisphere, Projector, RouteGeometry};
use crate::identifiers::*;
use crate::models::types::{collapse_repeats, Result, Stop, TransitError, TransportMode};
use crate::models::{RouteRecord, SegmentRecord, StopRecord};
use crate::osm::OverpassDocument;
use crate::schedule::{stop_times, StopTime};
use crate::snapping::{orient_to_stops, StopSnapper};
use crate::topology::{self, TopologyReport};

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// UTM zone of the planar frame
    pub zone: u8,
    pub hemisphere: Hemisphere,
    /// Planar distance under which two coordinates are the same point
    pub epsilon: f64,
    /// Planar distance beyond which a stop snap is reported
    pub snap_tolerance: f64,
    pub mode: TransportMode,
    /// Travel speed used for stop times, km/h
    pub speed_kmh: f64,
    pub fetch: FetchConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            zone: 37,
            hemisphere: Hemisphere::North,
            epsilon: 1e-6,
            snap_tolerance: 250.0,
            mode: TransportMode::Bus,
            speed_kmh: 20.0,
            fetch: FetchConfig::default(),
        }
    }
}

/// Everything one route contributes to the output
#[derive(Clone, Debug, PartialEq)]
pub struct RouteOutput {
    /// The input record with the assembled `LINESTRING` shape and the stops
    /// that were found
    pub record: RouteRecord,
    pub segments: Vec<SegmentRecord>,
    pub stop_times: Vec<StopTime>,
}

#[derive(Clone, Debug, Default)]
pub struct PipelineOutput {
    pub routes: Vec<RouteRecord>,
    pub stops: Vec<StopRecord>,
    pub segments: Vec<SegmentRecord>,
    pub stop_times: Vec<StopTime>,
    /// Relations rejected by the topology check
    pub invalid: Vec<TopologyReport>,
}

/// Stop positions in the planar frame, keyed by id
#[derive(Debug, Default)]
pub struct StopTable {
    coords: HashMap<StopId, Coord<f64>>,
}

impl StopTable {
    pub fn build(stops: &[StopRecord], projector: &Projector, sink: &dyn DiagnosticSink) -> Self {
        let mut coords = HashMap::with_capacity(stops.len());

        for stop in stops {
            let planar = RouteGeometry::from_wkt(&stop.stop_shape).and_then(|g| {
                let point = g.as_point().ok_or_else(|| {
                    TransitError::InvalidGeometry(format!("expected POINT, got {}", stop.stop_shape))
                })?;
                projector.to_planar(point.0)
            });

            match planar {
                Ok(coord) => {
                    coords.insert(stop.stop_id, coord);
                }
                Err(e) => sink.warn(DiagnosticKind::MalformedStop {
                    stop_id: stop.stop_id,
                    reason: e.to_string(),
                }),
            }
        }

        Self { coords }
    }

    pub fn get(&self, id: StopId) -> Option<Coord<f64>> {
        self.coords.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }
}

pub struct Pipeline {
    config: PipelineConfig,
    projector: Projector,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        if config.epsilon.is_nan() || config.epsilon <= 0.0 {
            return Err(TransitError::InvalidData(format!(
                "epsilon must be positive, got {}",
                config.epsilon
            )));
        }
        if config.speed_kmh.is_nan() || config.speed_kmh <= 0.0 {
            return Err(TransitError::InvalidData(format!(
                "speed must be positive, got {} km/h",
                config.speed_kmh
            )));
        }

        let projector = Projector::utm(config.zone, config.hemisphere)?;
        log::debug!(
            "Planar frame EPSG:{} for {} routes",
            projector.epsg(),
            config.mode
        );
        Ok(Self { config, projector })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    /// Full run over an Overpass document of route relations
    pub fn run(
        &self,
        document: &OverpassDocument,
        source: &dyn StopSource,
        sink: &dyn DiagnosticSink,
    ) -> Result<PipelineOutput> {
        let partition = topology::partition(document.relations().filter(|r| r.is_route()), sink);
        let masters = RouteMasterIndex::from_relations(document.relations());
        if masters.is_empty() {
            log::debug!("No route masters in document");
        } else {
            log::info!("{} routes listed under route masters", masters.len());
        }
        let routes = extract_routes(&partition.valid, &masters, sink);

        let ids = platform_ids(&routes);
        let stops = fetch_stops(source, &ids, &self.config.fetch)?;

        let mut output = self.process(routes, stops, sink);
        output.invalid = partition.invalid;
        Ok(output)
    }

    /// Build every route against an already fetched set of stops
    pub fn process(
        &self,
        routes: Vec<RouteRecord>,
        stops: Vec<StopRecord>,
        sink: &dyn DiagnosticSink,
    ) -> PipelineOutput {
        let table = StopTable::build(&stops, &self.projector, sink);
        log::info!("Building {} routes over {} stops", routes.len(), table.len());

        let built: Vec<RouteOutput> = routes
            .par_iter()
            .filter_map(|route| {
                let scope = RouteScope::new(route.route_id, sink);
                match self.process_route(route, &table, &scope) {
                    Ok(output) => Some(output),
                    Err(e) => {
                        scope.warn(DiagnosticKind::RouteSkipped {
                            reason: e.to_string(),
                        });
                        None
                    }
                }
            })
            .collect();

        let mut output = PipelineOutput {
            stops,
            ..Default::default()
        };
        for route in built {
            output.routes.push(route.record);
            output.segments.extend(route.segments);
            output.stop_times.extend(route.stop_times);
        }

        log::info!(
            "Built {} routes with {} segments",
            output.routes.len(),
            output.segments.len()
        );
        output
    }

    /// Assemble, orient, snap and cut one route
    pub fn process_route(
        &self,
        route: &RouteRecord,
        table: &StopTable,
        sink: &dyn DiagnosticSink,
    ) -> Result<RouteOutput> {
        let epsilon = self.config.epsilon;

        let fragments = RouteGeometry::from_wkt(&route.shape)?
            .into_fragments()
            .iter()
            .map(|f| self.projector.line_to_planar(f))
            .collect::<Result<Vec<_>>>()?;

        let mut path = ShapeAssembler::new(epsilon, sink).assemble(fragments)?;

        let mut stops: Vec<Stop> = route
            .stop_sequence
            .iter()
            .filter_map(|&id| match table.get(id) {
                Some(coord) => Some(Stop::new(id, coord)),
                None => {
                    sink.warn(DiagnosticKind::MissingStop { stop_id: id });
                    None
                }
            })
            .collect();
        collapse_repeats(&mut stops);

        if orient_to_stops(&mut path, &stops) {
            log::trace!("Route {} path reversed to follow its stops", route.route_id);
        }
        StopSnapper::new(self.config.snap_tolerance, epsilon, sink).snap(&mut path, &stops);

        let segments = SegmentCutter::new(self.config.mode.cut_policy(), epsilon, sink)
            .with_wrap_tolerance(self.config.snap_tolerance)
            .cut(&path, &stops);

        let segment_records = segments
            .iter()
            .map(|segment| self.segment_record(route, segment))
            .collect::<Result<Vec<_>>>()?;

        let stop_ids: Vec<StopId> = stops.iter().map(|s| s.id).collect();
        let lengths: Vec<f64> = segments.iter().map(|s| s.length).collect();
        let times = stop_times(route.route_id, &stop_ids, &lengths, self.config.speed_kmh);

        log::debug!(
            "Route {} ({}): {} vertices, {} stops, {} segments",
            route.route_id,
            route.ref_tag,
            path.len(),
            stops.len(),
            segments.len()
        );

        Ok(RouteOutput {
            record: RouteRecord {
                stop_sequence: stop_ids,
                shape: self.geographic_wkt(path.as_line_string())?,
                ..route.clone()
            },
            segments: segment_records,
            stop_times: times,
        })
    }

    fn segment_record(&self, route: &RouteRecord, segment: &Segment) -> Result<SegmentRecord> {
        Ok(SegmentRecord {
            from: segment.from,
            to: segment.to,
            shape: self.geographic_wkt(&segment.shape)?,
            length: segment.length,
            trip_ref: route.ref_tag.clone(),
            trip_id: route.route_id,
        })
    }

    fn geographic_wkt(&self, line: &LineString<f64>) -> Result<String> {
        let geographic = self.projector.line_to_geographic(line)?;
        Ok(RouteGeometry::Polyline(geographic).to_wkt())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::models::Wheelchair;
    use approx::assert_relative_eq;

    fn route(shape: &str, stops: &[i64]) -> RouteRecord {
        RouteRecord {
            stop_sequence: stops.iter().copied().map(StopId::new).collect(),
            shape: shape.to_string(),
            colour: String::new(),
            ref_tag: "12".into(),
            route_id: RelationId::new(500),
            route_name: "Bus 12".into(),
            route_master: None,
            route_master_name: String::new(),
            route_master_ref: String::new(),
        }
    }

    fn stop(id: i64, lon: f64, lat: f64) -> StopRecord {
        StopRecord {
            stop_id: StopId::new(id),
            stop_name: format!("Stop {}", id),
            stop_shape: format!("POINT({} {})", lon, lat),
            wheelchair: Wheelchair::No,
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(Pipeline::new(PipelineConfig::default()).is_ok());
        assert!(Pipeline::new(PipelineConfig {
            zone: 0,
            ..Default::default()
        })
        .is_err());
        assert!(Pipeline::new(PipelineConfig {
            speed_kmh: 0.0,
            ..Default::default()
        })
        .is_err());
        assert_eq!(
            Pipeline::new(PipelineConfig::default()).unwrap().projector().epsg(),
            32637
        );
    }

    #[test]
    fn test_stop_table_reports_malformed() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let sink = CollectingSink::new();
        let mut bad = stop(2, 0.0, 0.0);
        bad.stop_shape = "LINESTRING(37 55,38 56)".into();
        let mut worse = stop(3, 0.0, 0.0);
        worse.stop_shape = "POINT(37.6 95.0)".into();

        let table = StopTable::build(&[stop(1, 37.6, 55.7), bad, worse], pipeline.projector(), &sink);
        assert_eq!(table.len(), 1);
        assert!(table.get(StopId::new(1)).is_some());
        assert_eq!(sink.counts_by_kind()["malformed_stop"], 2);
    }

    #[test]
    fn test_process_route_builds_segments() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let sink = CollectingSink::new();

        // Two ways listed end to start, the second one reversed
        let record = route(
            "MULTILINESTRING((37.62 55.75,37.63 55.75),(37.61 55.75,37.62 55.75))",
            &[1, 2, 3],
        );
        let stops = [
            stop(1, 37.61, 55.75),
            stop(2, 37.62, 55.75),
            stop(3, 37.63, 55.75),
        ];
        let table = StopTable::build(&stops, pipeline.projector(), &sink);

        let output = pipeline.process_route(&record, &table, &sink).unwrap();

        assert!(sink.is_empty(), "{:?}", sink.snapshot());
        let shape = RouteGeometry::from_wkt(&output.record.shape).unwrap();
        let line = &shape.into_fragments()[0];
        assert_eq!(line.0.len(), 3);
        assert_relative_eq!(line.0[0].x, 37.61, epsilon = 1e-7);
        assert_relative_eq!(line.0[2].x, 37.63, epsilon = 1e-7);
        assert_eq!(output.segments.len(), 2);
        for segment in &output.segments {
            assert_eq!(segment.trip_id, RelationId::new(500));
            assert_eq!(segment.trip_ref, "12");
            // 0.01 degrees of longitude at 55.75N is about 627 m
            assert_relative_eq!(segment.length, 627.0, epsilon = 5.0);
        }
        assert_eq!(output.stop_times.len(), 3);
        assert_eq!(output.stop_times[1].offset_minutes, 2);
    }

    #[test]
    fn test_missing_stops_are_dropped() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let sink = CollectingSink::new();
        let record = route("MULTILINESTRING((37.61 55.75,37.63 55.75))", &[1, 9, 1, 3]);
        let table = StopTable::build(
            &[stop(1, 37.61, 55.75), stop(3, 37.63, 55.75)],
            pipeline.projector(),
            &sink,
        );

        let output = pipeline.process_route(&record, &table, &sink).unwrap();
        assert_eq!(
            output.record.stop_sequence,
            vec![StopId::new(1), StopId::new(3)]
        );
        assert_eq!(sink.counts_by_kind()["missing_stop"], 1);
    }

    #[test]
    fn test_unusable_route_is_skipped() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let sink = CollectingSink::new();
        let routes = vec![
            route("MULTILINESTRING((37.61 55.75,37.61 55.75))", &[]),
            RouteRecord {
                route_id: RelationId::new(501),
                ..route("MULTILINESTRING((37.61 55.75,37.62 55.75))", &[])
            },
        ];

        let output = pipeline.process(routes, Vec::new(), &sink);
        assert_eq!(output.routes.len(), 1);
        assert_eq!(output.routes[0].route_id, RelationId::new(501));

        let skipped: Vec<_> = sink
            .snapshot()
            .into_iter()
            .filter(|d| d.kind.name() == "route_skipped")
            .collect();
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].route_id, Some(RelationId::new(500)));
    }
}
