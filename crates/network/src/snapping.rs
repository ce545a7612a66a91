//! Stop snapping: make every stop an exact vertex of the route path.

use geo::Coord;

use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::geometry::{coords_eq, distance, project_onto_segment, Path};
use crate::models::types::Stop;

pub struct StopSnapper<'a> {
    /// Planar distance beyond which a snap is reported as unresolved
    tolerance: f64,
    epsilon: f64,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> StopSnapper<'a> {
    pub fn new(tolerance: f64, epsilon: f64, sink: &'a dyn DiagnosticSink) -> Self {
        Self {
            tolerance,
            epsilon,
            sink,
        }
    }

    /// Insert the stops, in route order, into the path.
    ///
    /// Each stop goes between the endpoints of the edge closest to it (by
    /// the sum of the distances to both endpoints), on the path as left by
    /// the previous insertions. A stop already sitting on one of those
    /// endpoints leaves the path unchanged.
    pub fn snap(&self, path: &mut Path, stops: &[Stop]) {
        for stop in stops {
            let Some(edge) = closest_edge(path.coords(), stop.coord) else {
                continue;
            };
            let a = path.coords()[edge];
            let b = path.coords()[edge + 1];

            let offset = project_onto_segment(stop.coord, a, b).distance;
            if offset > self.tolerance {
                self.sink.warn(DiagnosticKind::UnresolvedSnap {
                    stop_id: stop.id,
                    distance: offset,
                });
            }

            if coords_eq(stop.coord, a, self.epsilon) || coords_eq(stop.coord, b, self.epsilon) {
                log::trace!("Stop {} already on path at edge {}", stop.id, edge);
                continue;
            }

            path.insert(edge + 1, stop.coord);
        }
    }
}

/// Edge index whose endpoints are jointly nearest to `p`; earliest on ties
fn closest_edge(coords: &[Coord<f64>], p: Coord<f64>) -> Option<usize> {
    coords
        .windows(2)
        .map(|w| distance(p, w[0]) + distance(p, w[1]))
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, score)| match best {
            Some((_, s)) if s <= score => best,
            _ => Some((i, score)),
        })
        .map(|(i, _)| i)
}

/// Point the path in the direction of travel of its stop sequence.
///
/// The path is reversed when the first stop lies further along it than the
/// last stop (or the second stop, for routes that end where they start).
/// Returns whether the path was reversed.
pub fn orient_to_stops(path: &mut Path, stops: &[Stop]) -> bool {
    let (Some(first), Some(last)) = (stops.first(), stops.last()) else {
        return false;
    };
    let other = if first.id == last.id {
        match stops.get(1) {
            Some(second) => second,
            None => return false,
        }
    } else {
        last
    };

    match (path.locate(first.coord), path.locate(other.coord)) {
        (Some(from), Some(to)) if from > to => {
            path.reverse();
            true
        }
        _ => false,
    }
}
