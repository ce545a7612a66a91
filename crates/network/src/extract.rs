//! Route and stop records from Overpass elements.

use geo::{Centroid, Coord, LineString, MultiLineString, MultiPoint, Point};
use hashbrown::HashMap;
use wkt::ToWkt;

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::geometry::RouteGeometry;
use crate::identifiers::*;
use crate::models::{RouteRecord, StopRecord, Wheelchair};
use crate::osm::{Element, MemberKind, MemberRole, Relation};
use crate::schedule::normalize_colour;

const UNKNOWN: &str = "UNKNOWN";

/// `route_master` relation a route belongs to
#[derive(Clone, Debug, PartialEq)]
pub struct RouteMaster {
    pub id: RelationId,
    pub name: String,
    pub ref_tag: String,
}

/// Route relation id -> its route master
#[derive(Debug, Default)]
pub struct RouteMasterIndex {
    by_route: HashMap<i64, RouteMaster>,
}

impl RouteMasterIndex {
    pub fn from_relations<'a, I>(relations: I) -> Self
    where
        I: IntoIterator<Item = &'a Relation>,
    {
        let mut by_route = HashMap::new();

        for master in relations.into_iter().filter(|r| r.is_route_master()) {
            let entry = RouteMaster {
                id: RelationId::new(master.id),
                name: master.tag("name").unwrap_or_default().to_string(),
                ref_tag: master.tag("ref").unwrap_or_default().to_string(),
            };
            for member in &master.members {
                if member.kind == MemberKind::Relation {
                    by_route.entry(member.ref_id).or_insert_with(|| entry.clone());
                }
            }
        }

        log::debug!("Indexed {} routes under route masters", by_route.len());
        Self { by_route }
    }

    pub fn get(&self, route_id: i64) -> Option<&RouteMaster> {
        self.by_route.get(&route_id)
    }

    pub fn len(&self) -> usize {
        self.by_route.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_route.is_empty()
    }
}

/// Route record with the raw ways as a `MULTILINESTRING` shape.
///
/// Returns `None` when the relation has no way member with geometry.
pub fn route_record(relation: &Relation, masters: &RouteMasterIndex) -> Option<RouteRecord> {
    let fragments: Vec<LineString<f64>> = relation
        .members
        .iter()
        .filter(|m| m.kind == MemberKind::Way && m.role == MemberRole::Way)
        .map(|m| LineString::new(m.coords()))
        .filter(|ls| ls.0.len() >= 2)
        .collect();

    if fragments.is_empty() {
        return None;
    }

    let mut stop_sequence: Vec<StopId> = relation
        .members
        .iter()
        .filter(|m| m.role.is_platform())
        .map(|m| StopId::new(m.ref_id))
        .collect();
    stop_sequence.dedup();

    let master = masters.get(relation.id);

    Some(RouteRecord {
        stop_sequence,
        shape: RouteGeometry::MultiPolyline(MultiLineString::new(fragments)).to_wkt(),
        colour: normalize_colour(relation.tag("colour").unwrap_or_default()),
        ref_tag: relation.tag("ref").unwrap_or(UNKNOWN).to_string(),
        route_id: RelationId::new(relation.id),
        route_name: relation.tag("name").unwrap_or(UNKNOWN).to_string(),
        route_master: master.map(|m| m.id),
        route_master_name: master.map(|m| m.name.clone()).unwrap_or_default(),
        route_master_ref: master.map(|m| m.ref_tag.clone()).unwrap_or_default(),
    })
}

/// Route records for every relation that passed the topology check
pub fn extract_routes(
    relations: &[&Relation],
    masters: &RouteMasterIndex,
    sink: &dyn DiagnosticSink,
) -> Vec<RouteRecord> {
    let routes: Vec<RouteRecord> = relations
        .iter()
        .filter(|r| r.is_route())
        .filter_map(|relation| {
            let record = route_record(relation, masters);
            if record.is_none() {
                sink.report(Diagnostic {
                    route_id: Some(RelationId::new(relation.id)),
                    kind: DiagnosticKind::RouteSkipped {
                        reason: "no way members with geometry".into(),
                    },
                });
            }
            record
        })
        .collect();

    log::info!("Extracted {} routes", routes.len());
    routes
}

/// Every platform referenced by `routes`, sorted and deduplicated
pub fn platform_ids(routes: &[RouteRecord]) -> Vec<StopId> {
    let mut ids: Vec<StopId> = routes
        .iter()
        .flat_map(|r| r.stop_sequence.iter().copied())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Stop record for a `public_transport=*` element.
///
/// Nodes keep their position; ways and relations are reduced to the
/// centroid of their vertices.
pub fn stop_record(element: &Element) -> Option<StopRecord> {
    element.tag("public_transport")?;

    let point = match element {
        Element::Node(node) => Point::new(node.lon, node.lat),
        Element::Way(way) => centroid(way.geometry.iter().map(|p| p.to_coord()))?,
        Element::Relation(relation) => {
            centroid(relation.members.iter().flat_map(|m| m.coords()))?
        }
        Element::Unknown => return None,
    };

    Some(StopRecord {
        stop_id: StopId::new(element.id()?),
        stop_name: element.tag("name").unwrap_or(UNKNOWN).to_string(),
        stop_shape: point.wkt_string(),
        wheelchair: Wheelchair::from_tag(element.tag("wheelchair")),
    })
}

fn centroid(coords: impl Iterator<Item = Coord<f64>>) -> Option<Point<f64>> {
    let points: MultiPoint<f64> = coords.map(Point::from).collect();
    points.centroid()
}
