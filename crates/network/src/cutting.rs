//! Segment cutting: slice the snapped path between consecutive stops.
//!
//! Two ways of locating a stop on the path, chosen by transport mode:
//!
//! - [`CutPolicy::SingleOccurrence`]: the nearest point on the path. Paths
//!   whose end returns to within the wrap tolerance of their start are
//!   walked twice so a slice may run across the closing point.
//! - [`CutPolicy::MultipleOccurrence`]: every vertex equal to the stop. The
//!   pair with the smallest forward index gap wins, so an out-and-back route
//!   never takes the long way round.
//!
//! A pair that cannot be sliced becomes the straight segment between the
//! two stops, reported as a degenerate slice.

use geo::{Coord, LineString};
use strum::IntoStaticStr;

use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::geometry::{coords_eq, dedup_coords, distance, nearest_on_polyline, polyline_length, Path};
use crate::identifiers::StopId;
use crate::models::types::{CutPolicy, Stop};

/// Where a segment's shape came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SliceSource {
    /// Vertex range of the path; `end` may exceed the last index when the
    /// slice wraps around a closing path
    Path { start: usize, end: usize },
    /// Straight line between the two stops
    Straight,
}

/// Stop-to-stop piece of a route, in the planar frame
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub from: StopId,
    pub to: StopId,
    pub shape: LineString<f64>,
    pub length: f64,
    pub source: SliceSource,
}

impl Segment {
    fn sliced(from: &Stop, to: &Stop, coords: Vec<Coord<f64>>, start: usize, end: usize) -> Self {
        Self {
            from: from.id,
            to: to.id,
            length: polyline_length(&coords),
            shape: LineString::new(coords),
            source: SliceSource::Path { start, end },
        }
    }

    fn straight(from: &Stop, to: &Stop) -> Self {
        Self {
            from: from.id,
            to: to.id,
            length: distance(from.coord, to.coord),
            shape: LineString::new(vec![from.coord, to.coord]),
            source: SliceSource::Straight,
        }
    }

    pub fn is_straight(&self) -> bool {
        self.source == SliceSource::Straight
    }
}

/// Why a stop pair fell back to a straight segment
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SliceFailure {
    /// A stop does not occur on the path
    NoMatch,
    /// Every occurrence of the second stop precedes the first
    Backward,
    /// The slice has fewer than two distinct vertices
    Empty,
    /// The second stop precedes the first on a path whose ends are apart
    WrapOnOpenPath,
}

type Slice = (usize, usize, Vec<Coord<f64>>);

pub struct SegmentCutter<'a> {
    policy: CutPolicy,
    epsilon: f64,
    wrap_tolerance: f64,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> SegmentCutter<'a> {
    pub fn new(policy: CutPolicy, epsilon: f64, sink: &'a dyn DiagnosticSink) -> Self {
        Self {
            policy,
            epsilon,
            wrap_tolerance: epsilon,
            sink,
        }
    }

    /// Treat the path as a round trip when its end lies within `tolerance`
    /// of its start
    pub fn with_wrap_tolerance(mut self, tolerance: f64) -> Self {
        self.wrap_tolerance = tolerance.max(self.epsilon);
        self
    }

    fn wraps(&self, coords: &[Coord<f64>]) -> bool {
        distance(coords[0], coords[coords.len() - 1]) <= self.wrap_tolerance
    }

    /// One segment per consecutive pair of `stops`
    pub fn cut(&self, path: &Path, stops: &[Stop]) -> Vec<Segment> {
        stops
            .windows(2)
            .map(|pair| self.cut_pair(path, &pair[0], &pair[1]))
            .collect()
    }

    fn cut_pair(&self, path: &Path, from: &Stop, to: &Stop) -> Segment {
        let slice = match self.policy {
            CutPolicy::SingleOccurrence => self.slice_nearest(path, from, to),
            CutPolicy::MultipleOccurrence => self.slice_occurrences(path, from, to),
        };

        match slice {
            Ok((start, end, coords)) => Segment::sliced(from, to, coords, start, end),
            Err(failure) => {
                self.sink.warn(DiagnosticKind::DegenerateSlice {
                    from: from.id,
                    to: to.id,
                    reason: failure.into(),
                });
                Segment::straight(from, to)
            }
        }
    }

    fn slice_nearest(&self, path: &Path, from: &Stop, to: &Stop) -> Result<Slice, SliceFailure> {
        let coords = path.coords();
        let (ea, pa) = nearest_on_polyline(coords, from.coord).ok_or(SliceFailure::NoMatch)?;
        let (eb, pb) = nearest_on_polyline(coords, to.coord).ok_or(SliceFailure::NoMatch)?;

        let forward = (eb, pb.t) > (ea, pa.t);
        let (end_edge, walk): (usize, Vec<Coord<f64>>) = if forward {
            (eb, coords.to_vec())
        } else if (eb, pb.t) == (ea, pa.t) {
            return Err(SliceFailure::Empty);
        } else if self.wraps(coords) {
            // An exactly closed path repeats its start; skip the duplicate
            let skip = usize::from(path.is_closed(self.epsilon));
            let n = coords.len();
            let doubled = coords.iter().chain(&coords[skip..]).copied().collect();
            (eb + n - skip, doubled)
        } else {
            return Err(SliceFailure::WrapOnOpenPath);
        };

        let mut slice = Vec::with_capacity(end_edge - ea + 2);
        slice.push(pa.point);
        slice.extend_from_slice(&walk[ea + 1..=end_edge]);
        slice.push(pb.point);
        dedup_coords(&mut slice, self.epsilon);

        if slice.len() < 2 {
            return Err(SliceFailure::Empty);
        }
        Ok((ea, end_edge + 1, slice))
    }

    fn slice_occurrences(
        &self,
        path: &Path,
        from: &Stop,
        to: &Stop,
    ) -> Result<Slice, SliceFailure> {
        let coords = path.coords();
        let starts = self.occurrences(coords, from.coord);
        let ends = self.occurrences(coords, to.coord);
        if starts.is_empty() || ends.is_empty() {
            return Err(SliceFailure::NoMatch);
        }

        let (_, i, j) = starts
            .iter()
            .flat_map(|&i| ends.iter().filter(move |&&j| j > i).map(move |&j| (j - i, i, j)))
            .min()
            .ok_or(SliceFailure::Backward)?;

        Ok((i, j, coords[i..=j].to_vec()))
    }

    fn occurrences(&self, coords: &[Coord<f64>], target: Coord<f64>) -> Vec<usize> {
        coords
            .iter()
            .enumerate()
            .filter(|(_, c)| coords_eq(**c, target, self.epsilon))
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use approx::assert_relative_eq;

    const EPS: f64 = 1e-9;

    fn coord(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    fn stop(id: i64, x: f64, y: f64) -> Stop {
        Stop::new(StopId::new(id), coord(x, y))
    }

    fn path(points: &[(f64, f64)]) -> Path {
        Path::new(points.iter().map(|&(x, y)| coord(x, y)).collect()).unwrap()
    }

    /// Out along y=0, around a turning loop, back along y=1.
    /// Stop A sits at indices 2 and 9.
    fn out_and_back() -> Path {
        path(&[
            (0.0, 0.0),
            (1.0, 0.0),
            (2.0, 0.5),
            (3.0, 0.0),
            (4.0, 0.0),
            (5.0, 0.5),
            (4.0, 1.0),
            (3.0, 1.0),
            (2.5, 1.0),
            (2.0, 0.5),
            (1.0, 1.0),
            (0.0, 1.0),
        ])
    }

    #[test]
    fn test_emits_one_segment_per_pair() {
        let sink = CollectingSink::new();
        let cutter = SegmentCutter::new(CutPolicy::SingleOccurrence, EPS, &sink);
        let p = path(&[(0.0, 0.0), (3.0, 4.0), (6.0, 0.0), (9.0, 4.0)]);
        let stops = [stop(1, 0.0, 0.0), stop(2, 6.0, 0.0), stop(3, 9.0, 4.0)];

        let segments = cutter.cut(&p, &stops);
        assert_eq!(segments.len(), stops.len() - 1);
        for (segment, pair) in segments.iter().zip(stops.windows(2)) {
            assert!(segment.length + EPS >= distance(pair[0].coord, pair[1].coord));
        }
        assert_relative_eq!(segments[0].length, 10.0);
        assert_relative_eq!(segments[1].length, 5.0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_out_and_back_picks_pairing_around_middle_stop() {
        let sink = CollectingSink::new();
        let cutter = SegmentCutter::new(CutPolicy::MultipleOccurrence, EPS, &sink);
        let a = stop(1, 2.0, 0.5);
        let b = stop(2, 5.0, 0.5);

        let segments = cutter.cut(&out_and_back(), &[a, b, a]);

        assert_eq!(segments[0].source, SliceSource::Path { start: 2, end: 5 });
        assert_eq!(segments[1].source, SliceSource::Path { start: 5, end: 9 });
        assert_eq!(segments[0].shape.0.first(), Some(&a.coord));
        assert_eq!(segments[1].shape.0.last(), Some(&a.coord));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_out_and_back_falls_back_when_middle_stop_precedes() {
        let sink = CollectingSink::new();
        let cutter = SegmentCutter::new(CutPolicy::MultipleOccurrence, EPS, &sink);
        let a = stop(1, 2.0, 0.5);
        let b = stop(2, 1.0, 0.0);

        let segments = cutter.cut(&out_and_back(), &[a, b, a]);

        assert!(segments[0].is_straight());
        assert_relative_eq!(segments[0].length, distance(a.coord, b.coord));
        assert_eq!(segments[1].source, SliceSource::Path { start: 1, end: 2 });

        let diagnostics = sink.into_inner();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            diagnostics[0].kind,
            DiagnosticKind::DegenerateSlice { reason: "backward", .. }
        ));
    }

    #[test]
    fn test_multiple_occurrence_missing_stop() {
        let sink = CollectingSink::new();
        let cutter = SegmentCutter::new(CutPolicy::MultipleOccurrence, EPS, &sink);

        let segments = cutter.cut(&out_and_back(), &[stop(1, 2.0, 0.5), stop(9, 7.0, 7.0)]);
        assert!(segments[0].is_straight());
        assert_eq!(sink.counts_by_kind()["degenerate_slice"], 1);
    }

    #[test]
    fn test_single_occurrence_projects_off_path_stops() {
        let sink = CollectingSink::new();
        let cutter = SegmentCutter::new(CutPolicy::SingleOccurrence, EPS, &sink);
        let p = path(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);

        let segments = cutter.cut(&p, &[stop(1, 4.0, 1.0), stop(2, 11.0, 6.0)]);
        assert_eq!(
            segments[0].shape.0,
            vec![coord(4.0, 0.0), coord(10.0, 0.0), coord(10.0, 6.0)]
        );
        assert_relative_eq!(segments[0].length, 12.0);
    }

    #[test]
    fn test_single_occurrence_wraps_closed_path() {
        let sink = CollectingSink::new();
        let cutter = SegmentCutter::new(CutPolicy::SingleOccurrence, EPS, &sink);
        let ring = path(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]);

        // From the left side across the closing vertex to the bottom side
        let segments = cutter.cut(&ring, &[stop(1, 0.0, 2.0), stop(2, 2.0, 0.0)]);
        assert_eq!(
            segments[0].shape.0,
            vec![coord(0.0, 2.0), coord(0.0, 0.0), coord(2.0, 0.0)]
        );
        assert_relative_eq!(segments[0].length, 4.0);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_single_occurrence_backward_on_open_path() {
        let sink = CollectingSink::new();
        let cutter = SegmentCutter::new(CutPolicy::SingleOccurrence, EPS, &sink);
        let p = path(&[(0.0, 0.0), (10.0, 0.0)]);

        let segments = cutter.cut(&p, &[stop(1, 8.0, 0.0), stop(2, 2.0, 0.0)]);
        assert!(segments[0].is_straight());
        assert!(matches!(
            sink.snapshot()[0].kind,
            DiagnosticKind::DegenerateSlice { reason: "wrap_on_open_path", .. }
        ));

        let segments = cutter.cut(&p, &[stop(3, 5.0, 1.0), stop(4, 5.0, -1.0)]);
        assert!(segments[0].is_straight());
        assert_relative_eq!(segments[0].length, 2.0);
    }

    #[test]
    fn test_single_occurrence_wraps_nearly_closed_path() {
        let sink = CollectingSink::new();
        let p = path(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.5)]);
        let stops = [stop(1, 0.0, 2.0), stop(2, 2.0, 0.0)];

        // Ends 0.5 apart: open at the default tolerance
        let cutter = SegmentCutter::new(CutPolicy::SingleOccurrence, EPS, &sink);
        assert!(cutter.cut(&p, &stops)[0].is_straight());
        assert_eq!(sink.counts_by_kind()["degenerate_slice"], 1);

        let cutter = cutter.with_wrap_tolerance(1.0);
        let segments = cutter.cut(&p, &stops);
        assert_eq!(
            segments[0].shape.0,
            vec![coord(0.0, 2.0), coord(0.0, 0.5), coord(0.0, 0.0), coord(2.0, 0.0)]
        );
        assert_eq!(segments[0].source, SliceSource::Path { start: 3, end: 6 });
        assert_relative_eq!(segments[0].length, 4.0);
        assert_eq!(sink.counts_by_kind()["degenerate_slice"], 1);
    }
}
