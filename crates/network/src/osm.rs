//! Overpass API JSON (`out geom`) element model.

use geo::Coord;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Tag storage type
pub type Tags = HashMap<String, String>;

/// A whole Overpass response
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OverpassDocument {
    #[serde(default)]
    pub elements: Vec<Element>,
}

impl OverpassDocument {
    pub fn from_json(text: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.elements.iter().filter_map(|e| match e {
            Element::Relation(r) => Some(r),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Element {
    Node(Node),
    Way(Way),
    Relation(Relation),
    /// Areas, counts and anything else Overpass may emit
    #[serde(other)]
    Unknown,
}

impl Element {
    pub fn id(&self) -> Option<i64> {
        match self {
            Self::Node(n) => Some(n.id),
            Self::Way(w) => Some(w.id),
            Self::Relation(r) => Some(r.id),
            Self::Unknown => None,
        }
    }

    pub fn tags(&self) -> Option<&Tags> {
        match self {
            Self::Node(n) => Some(&n.tags),
            Self::Way(w) => Some(&w.tags),
            Self::Relation(r) => Some(&r.tags),
            Self::Unknown => None,
        }
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags().and_then(|t| t.get(key)).map(String::as_str)
    }
}

/// `{lat, lon}` vertex of an inline geometry
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn to_coord(self) -> Coord<f64> {
        Coord {
            x: self.lon,
            y: self.lat,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Way {
    pub id: i64,
    #[serde(default)]
    pub nodes: Vec<i64>,
    #[serde(default)]
    pub geometry: Vec<LatLon>,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Relation {
    pub id: i64,
    #[serde(default)]
    pub tags: Tags,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl Relation {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// A route relation (as opposed to a route master or anything else)
    pub fn is_route(&self) -> bool {
        self.tags.contains_key("route") && self.tag("type") != Some("route_master")
    }

    pub fn is_route_master(&self) -> bool {
        self.tag("type") == Some("route_master")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Node,
    Way,
    Relation,
}

/// Relation member, with inline geometry when fetched with `out geom`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "type")]
    pub kind: MemberKind,
    #[serde(rename = "ref")]
    pub ref_id: i64,
    #[serde(default)]
    pub role: MemberRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub geometry: Vec<LatLon>,
}

impl Member {
    /// Every vertex this member carries inline
    pub fn coords(&self) -> Vec<Coord<f64>> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => vec![Coord { x: lon, y: lat }],
            _ => self.geometry.iter().map(|p| p.to_coord()).collect(),
        }
    }
}

/// PTv2 member roles
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MemberRole {
    Stop,
    StopEntryOnly,
    StopExitOnly,
    Platform,
    PlatformEntryOnly,
    PlatformExitOnly,
    /// Empty role, used for the ways the route runs along
    #[default]
    Way,
    Other(String),
}

impl MemberRole {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Stop => "stop",
            Self::StopEntryOnly => "stop_entry_only",
            Self::StopExitOnly => "stop_exit_only",
            Self::Platform => "platform",
            Self::PlatformEntryOnly => "platform_entry_only",
            Self::PlatformExitOnly => "platform_exit_only",
            Self::Way => "",
            Self::Other(s) => s,
        }
    }

    pub fn is_platform(&self) -> bool {
        matches!(
            self,
            Self::Platform | Self::PlatformEntryOnly | Self::PlatformExitOnly
        )
    }
}

impl From<&str> for MemberRole {
    fn from(s: &str) -> Self {
        match s {
            "stop" => Self::Stop,
            "stop_entry_only" => Self::StopEntryOnly,
            "stop_exit_only" => Self::StopExitOnly,
            "platform" => Self::Platform,
            "platform_entry_only" => Self::PlatformEntryOnly,
            "platform_exit_only" => Self::PlatformExitOnly,
            "" => Self::Way,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for MemberRole {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<MemberRole> for String {
    fn from(role: MemberRole) -> Self {
        role.as_str().to_string()
    }
}
