//! JSON record shapes exchanged with the fetch and export collaborators.
//!
//! Geometry travels as WKT in WGS84 (lon/lat) order.

use serde::{Deserialize, Serialize};

use crate::identifiers::*;
use crate::models::types::Wheelchair;

/// One route relation (a trip pattern) with its shape and stop order
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteRecord {
    pub stop_sequence: Vec<StopId>,
    /// `LINESTRING` once assembled, `MULTILINESTRING` of raw ways before
    pub shape: String,
    pub colour: String,
    #[serde(rename = "ref")]
    pub ref_tag: String,
    pub route_id: RelationId,
    pub route_name: String,
    #[serde(with = "route_master_id")]
    pub route_master: Option<RelationId>,
    pub route_master_name: String,
    pub route_master_ref: String,
}

/// A platform with a single representative point
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StopRecord {
    pub stop_id: StopId,
    pub stop_name: String,
    /// WKT `POINT`
    pub stop_shape: String,
    #[serde(default)]
    pub wheelchair: Wheelchair,
}

/// Stop-to-stop travel segment of one trip
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub from: StopId,
    pub to: StopId,
    /// WKT `LINESTRING`
    pub shape: String,
    /// Planar length in meters
    pub length: f64,
    pub trip_ref: String,
    pub trip_id: RelationId,
}

/// `route_master` is written as the master relation id, or `"NONE"`.
mod route_master_id {
    use serde::de::{self, Deserializer};
    use serde::Deserialize;
    use serde::ser::Serializer;

    use crate::identifiers::RelationId;

    const NONE: &str = "NONE";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Id(i64),
        Text(String),
    }

    pub fn serialize<S>(id: &Option<RelationId>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match id {
            Some(id) => serializer.serialize_i64(id.get()),
            None => serializer.serialize_str(NONE),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<RelationId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Id(id) => Ok(Some(RelationId::new(id))),
            Raw::Text(s) if s == NONE => Ok(None),
            Raw::Text(s) => s
                .parse::<i64>()
                .map(|id| Some(RelationId::new(id)))
                .map_err(de::Error::custom),
        }
    }
}
