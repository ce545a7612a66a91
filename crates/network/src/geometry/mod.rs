//! Planar geometry helpers shared by the assembly, snapping and cutting stages.

pub mod path;
pub mod projection;

pub use path::{Fragment, Path, RouteGeometry};
pub use projection::{Hemisphere, Projector};

use geo::Coord;

/// Tolerant coordinate equality (per axis)
pub fn coords_eq(a: Coord<f64>, b: Coord<f64>, epsilon: f64) -> bool {
    (a.x - b.x).abs() <= epsilon && (a.y - b.y).abs() <= epsilon
}

pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}

/// Closest point to `p` on the segment `a`-`b`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SegmentProjection {
    pub point: Coord<f64>,
    /// Position along the segment, 0 at `a` and 1 at `b`
    pub t: f64,
    pub distance: f64,
}

pub fn project_onto_segment(p: Coord<f64>, a: Coord<f64>, b: Coord<f64>) -> SegmentProjection {
    let ab = b - a;
    let ap = p - a;
    let ab_ab = ab.x * ab.x + ab.y * ab.y;

    if ab_ab == 0.0 {
        // Segment is actually a point
        return SegmentProjection {
            point: a,
            t: 0.0,
            distance: distance(p, a),
        };
    }

    let t = ((ab.x * ap.x + ab.y * ap.y) / ab_ab).clamp(0.0, 1.0);
    let point = Coord {
        x: a.x + t * ab.x,
        y: a.y + t * ab.y,
    };
    SegmentProjection {
        point,
        t,
        distance: distance(p, point),
    }
}

/// Nearest location on a polyline: the edge index `i` (edge `i`..`i + 1`)
/// and the projection onto it. Ties resolve to the earliest edge.
pub fn nearest_on_polyline(coords: &[Coord<f64>], p: Coord<f64>) -> Option<(usize, SegmentProjection)> {
    let mut best: Option<(usize, SegmentProjection)> = None;
    for (i, edge) in coords.windows(2).enumerate() {
        let projection = project_onto_segment(p, edge[0], edge[1]);
        match best {
            Some((_, b)) if b.distance <= projection.distance => {}
            _ => best = Some((i, projection)),
        }
    }
    best
}

/// Remove consecutive near-duplicates in place
pub fn dedup_coords(coords: &mut Vec<Coord<f64>>, epsilon: f64) {
    coords.dedup_by(|next, prev| coords_eq(*next, *prev, epsilon));
}

/// Euclidean length of a coordinate sequence
pub fn polyline_length(coords: &[Coord<f64>]) -> f64 {
    coords.windows(2).map(|w| distance(w[0], w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn coord(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_project_onto_segment() {
        let proj = project_onto_segment(coord(5.0, 3.0), coord(0.0, 0.0), coord(10.0, 0.0));
        assert_eq!(proj.point, coord(5.0, 0.0));
        assert_relative_eq!(proj.t, 0.5);
        assert_relative_eq!(proj.distance, 3.0);

        // Clamped beyond the end
        let proj = project_onto_segment(coord(14.0, 3.0), coord(0.0, 0.0), coord(10.0, 0.0));
        assert_eq!(proj.point, coord(10.0, 0.0));
        assert_relative_eq!(proj.distance, 5.0);
    }

    #[test]
    fn test_degenerate_segment() {
        let proj = project_onto_segment(coord(3.0, 4.0), coord(0.0, 0.0), coord(0.0, 0.0));
        assert_relative_eq!(proj.distance, 5.0);
    }

    #[test]
    fn test_nearest_on_polyline_prefers_earliest_tie() {
        let coords = vec![coord(0.0, 0.0), coord(1.0, 0.0), coord(2.0, 0.0)];
        let (edge, proj) = nearest_on_polyline(&coords, coord(1.0, 0.0)).unwrap();
        assert_eq!(edge, 0);
        assert_relative_eq!(proj.t, 1.0);

        assert!(nearest_on_polyline(&coords[..1], coord(0.0, 0.0)).is_none());
    }

    #[test]
    fn test_dedup_and_length() {
        let mut coords = vec![coord(0.0, 0.0), coord(0.0, 1e-12), coord(3.0, 4.0)];
        dedup_coords(&mut coords, 1e-9);
        assert_eq!(coords.len(), 2);
        assert_relative_eq!(polyline_length(&coords), 5.0);
    }
}
