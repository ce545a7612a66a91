//! Core data types and enums for transit extraction.

use geo::Coord;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::identifiers::*;
use crate::topology::RoleCounts;

// ============================================================================
// Enums
// ============================================================================

/// Kind of public transport network being extracted.
///
/// Parses from the `route=*` value used when querying (`bus`, `tram`, ...),
/// with `commuter` standing for `route=train` + `service=commuter`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransportMode {
    Bus,
    Trolleybus,
    Tram,
    Subway,
    Commuter,
}

impl TransportMode {
    /// GTFS `route_type` for this mode
    pub fn route_type(self) -> u16 {
        match self {
            Self::Tram => 0,
            Self::Subway => 1,
            Self::Commuter => 2,
            Self::Bus => 3,
            Self::Trolleybus => 11,
        }
    }

    /// How stops are located on the path when cutting segments.
    ///
    /// Rail platforms are distinct points even at the same station, road
    /// stops reuse one point in both directions.
    pub fn cut_policy(self) -> CutPolicy {
        match self {
            Self::Tram | Self::Subway | Self::Commuter => CutPolicy::SingleOccurrence,
            Self::Bus | Self::Trolleybus => CutPolicy::MultipleOccurrence,
        }
    }
}

/// Index resolution strategy used by the segment cutter
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CutPolicy {
    /// Nearest point on the path per stop, with wraparound on round trips
    SingleOccurrence,
    /// Exact vertex matches, picking the shortest forward slice
    MultipleOccurrence,
}

/// `wheelchair=*` accessibility of a platform
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Wheelchair {
    #[default]
    No,
    Yes,
    Limited,
    CrossPlatform,
}

impl Wheelchair {
    /// Parse a raw tag value, treating anything unrecognized as `no`
    pub fn from_tag(value: Option<&str>) -> Self {
        value.and_then(|v| v.parse().ok()).unwrap_or_default()
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A stop as seen by the geometry stages: id plus a single location
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Stop {
    pub id: StopId,
    pub coord: Coord<f64>,
}

impl Stop {
    pub fn new(id: StopId, coord: Coord<f64>) -> Self {
        Self { id, coord }
    }
}

/// Drop stops that repeat the previous one.
///
/// A stop sequence may revisit a stop (round trips) but never lists the
/// same stop twice in a row.
pub fn collapse_repeats(stops: &mut Vec<Stop>) {
    stops.dedup_by(|next, prev| next.id == prev.id);
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Invalid coordinate: ({x}, {y})")]
    InvalidCoordinate { x: f64, y: f64 },

    #[error("Relation {relation_id} has unbalanced stop/platform roles: {counts}")]
    TopologyInvalid {
        relation_id: RelationId,
        counts: RoleCounts,
    },

    #[error("Upstream fetch failed with status {status}: {message}")]
    UpstreamFetchFailure { status: u16, message: String },

    #[error("Degenerate path: {0}")]
    DegeneratePath(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl TransitError {
    pub(crate) fn invalid_coordinate(coord: Coord<f64>) -> Self {
        Self::InvalidCoordinate {
            x: coord.x,
            y: coord.y,
        }
    }

    /// Whether this error must abort the whole run rather than one route
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UpstreamFetchFailure { .. })
    }
}

pub type Result<T> = std::result::Result<T, TransitError>;
