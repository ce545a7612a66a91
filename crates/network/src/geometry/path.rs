//! Route geometry: raw fragments, the assembled path, and WKT conversion.

use geo::{Coord, EuclideanLength, LineLocatePoint, LineString, MultiLineString, Point};
use wkt::{ToWkt, TryFromWkt};

use crate::geometry::coords_eq;
use crate::models::types::{Result, TransitError};

/// One raw way of a route, direction unknown
pub type Fragment = LineString<f64>;

/// Geometry as it arrives from the source data
#[derive(Clone, Debug, PartialEq)]
pub enum RouteGeometry {
    Point(Point<f64>),
    Polyline(LineString<f64>),
    MultiPolyline(MultiLineString<f64>),
}

impl RouteGeometry {
    pub fn from_wkt(text: &str) -> Result<Self> {
        let geometry = geo::Geometry::<f64>::try_from_wkt_str(text)
            .map_err(|e| TransitError::InvalidGeometry(format!("{}: {}", text, e)))?;

        match geometry {
            geo::Geometry::Point(p) => Ok(Self::Point(p)),
            geo::Geometry::Line(l) => Ok(Self::Polyline(LineString::from(l))),
            geo::Geometry::LineString(ls) => Ok(Self::Polyline(ls)),
            geo::Geometry::MultiLineString(mls) => Ok(Self::MultiPolyline(mls)),
            other => Err(TransitError::InvalidGeometry(format!(
                "expected point or line geometry, got {:?}",
                other
            ))),
        }
    }

    pub fn to_wkt(&self) -> String {
        match self {
            Self::Point(p) => p.wkt_string(),
            Self::Polyline(ls) => ls.wkt_string(),
            Self::MultiPolyline(mls) => mls.wkt_string(),
        }
    }

    /// The line pieces of this geometry; a point has none
    pub fn into_fragments(self) -> Vec<Fragment> {
        match self {
            Self::Point(_) => Vec::new(),
            Self::Polyline(ls) => vec![ls],
            Self::MultiPolyline(mls) => mls.0,
        }
    }

    pub fn as_point(&self) -> Option<Point<f64>> {
        match self {
            Self::Point(p) => Some(*p),
            Self::Polyline(_) | Self::MultiPolyline(_) => None,
        }
    }
}

/// An ordered route geometry with at least two vertices.
///
/// Consecutive vertices are distinct when built through [`Path::new`]; the
/// same coordinate may still appear at non-adjacent indices (loops,
/// out-and-back sections).
#[derive(Clone, Debug, PartialEq)]
pub struct Path(LineString<f64>);

impl Path {
    /// Build a path, dropping consecutive exact duplicates
    pub fn new(mut coords: Vec<Coord<f64>>) -> Result<Self> {
        coords.dedup();
        if coords.len() < 2 {
            return Err(TransitError::DegeneratePath(format!(
                "path needs at least 2 distinct vertices, got {}",
                coords.len()
            )));
        }
        Ok(Self(LineString::new(coords)))
    }

    pub fn coords(&self) -> &[Coord<f64>] {
        &self.0 .0
    }

    pub fn len(&self) -> usize {
        self.0 .0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0 .0.is_empty()
    }

    pub fn first(&self) -> Coord<f64> {
        self.0 .0[0]
    }

    pub fn last(&self) -> Coord<f64> {
        self.0 .0[self.0 .0.len() - 1]
    }

    pub fn is_closed(&self, epsilon: f64) -> bool {
        self.len() >= 4 && coords_eq(self.first(), self.last(), epsilon)
    }

    pub fn reverse(&mut self) {
        self.0 .0.reverse();
    }

    /// Euclidean length in the units of the frame
    pub fn length(&self) -> f64 {
        self.0.euclidean_length()
    }

    /// Fraction (0..=1) along the path of the point closest to `coord`
    pub fn locate(&self, coord: Coord<f64>) -> Option<f64> {
        self.0.line_locate_point(&Point::from(coord))
    }

    pub fn as_line_string(&self) -> &LineString<f64> {
        &self.0
    }

    pub(crate) fn insert(&mut self, index: usize, coord: Coord<f64>) {
        self.0 .0.insert(index, coord);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn coord(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_path_dedups_consecutive() {
        let path = Path::new(vec![coord(0.0, 0.0), coord(0.0, 0.0), coord(1.0, 0.0)]).unwrap();
        assert_eq!(path.len(), 2);
        assert_relative_eq!(path.length(), 1.0);
    }

    #[test]
    fn test_path_keeps_non_adjacent_repeats() {
        let path = Path::new(vec![
            coord(0.0, 0.0),
            coord(1.0, 0.0),
            coord(1.0, 1.0),
            coord(0.0, 0.0),
        ])
        .unwrap();
        assert_eq!(path.len(), 4);
        assert!(path.is_closed(1e-9));
    }

    #[test]
    fn test_path_rejects_single_point() {
        assert!(Path::new(vec![coord(3.0, 3.0), coord(3.0, 3.0)]).is_err());
        assert!(Path::new(Vec::new()).is_err());
    }

    #[test]
    fn test_locate() {
        let path = Path::new(vec![coord(0.0, 0.0), coord(10.0, 0.0)]).unwrap();
        assert_relative_eq!(path.locate(coord(2.5, 3.0)).unwrap(), 0.25);
    }

    #[test]
    fn test_parse_multilinestring() {
        let geometry =
            RouteGeometry::from_wkt("MULTILINESTRING((0 0,1 0),(2 0,1 0))").unwrap();
        let fragments = geometry.into_fragments();
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[1].0[0], coord(2.0, 0.0));
    }

    #[test]
    fn test_parse_point_and_linestring() {
        let point = RouteGeometry::from_wkt("POINT(37.5 55.7)").unwrap();
        assert_eq!(point.as_point(), Some(Point::new(37.5, 55.7)));
        assert!(point.into_fragments().is_empty());

        let line = RouteGeometry::from_wkt("LINESTRING(0 0,1 1,2 1)").unwrap();
        assert_eq!(line.into_fragments()[0].0.len(), 3);
    }

    #[test]
    fn test_reject_polygon_and_garbage() {
        assert!(matches!(
            RouteGeometry::from_wkt("POLYGON((0 0,1 0,1 1,0 0))"),
            Err(TransitError::InvalidGeometry(_))
        ));
        assert!(RouteGeometry::from_wkt("LINESTRING(0 0,").is_err());
    }

    #[test]
    fn test_wkt_round_trip() {
        let original = RouteGeometry::Polyline(LineString::from(vec![(37.5, 55.7), (37.6, 55.8)]));
        let parsed = RouteGeometry::from_wkt(&original.to_wkt()).unwrap();
        assert_eq!(parsed, original);
    }
}
