//! PTv2 structural check on route relations.
//!
//! A route is usable when every stop position has a matching platform:
//! the `stop`, `stop_entry_only` and `stop_exit_only` counts must equal the
//! `platform`, `platform_entry_only` and `platform_exit_only` counts.
//! Rejected relations are kept for reporting and never abort a run.

use std::fmt;

use serde::Serialize;

use crate::diagnostics::{DiagnosticKind, DiagnosticSink};
use crate::identifiers::RelationId;
use crate::models::types::{Result, TransitError};
use crate::osm::{Member, MemberRole, Relation};

/// Role counts of one relation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RoleCounts {
    pub stop: usize,
    pub stop_entry_only: usize,
    pub stop_exit_only: usize,
    pub platform: usize,
    pub platform_entry_only: usize,
    pub platform_exit_only: usize,
    pub ways: usize,
}

impl RoleCounts {
    pub fn tally(members: &[Member]) -> Self {
        let mut counts = Self::default();
        for member in members {
            match member.role {
                MemberRole::Stop => counts.stop += 1,
                MemberRole::StopEntryOnly => counts.stop_entry_only += 1,
                MemberRole::StopExitOnly => counts.stop_exit_only += 1,
                MemberRole::Platform => counts.platform += 1,
                MemberRole::PlatformEntryOnly => counts.platform_entry_only += 1,
                MemberRole::PlatformExitOnly => counts.platform_exit_only += 1,
                MemberRole::Way => counts.ways += 1,
                MemberRole::Other(_) => {}
            }
        }
        counts
    }

    pub fn is_balanced(&self) -> bool {
        self.stop == self.platform
            && self.stop_entry_only == self.platform_entry_only
            && self.stop_exit_only == self.platform_exit_only
    }
}

impl fmt::Display for RoleCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stop {} / platform {}, entry {} / {}, exit {} / {}",
            self.stop,
            self.platform,
            self.stop_entry_only,
            self.platform_entry_only,
            self.stop_exit_only,
            self.platform_exit_only
        )
    }
}

/// Outcome of checking one relation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopologyReport {
    pub relation_id: RelationId,
    #[serde(rename = "ref")]
    pub ref_tag: Option<String>,
    pub name: Option<String>,
    pub counts: RoleCounts,
    pub valid: bool,
}

pub fn check(relation: &Relation) -> TopologyReport {
    let counts = RoleCounts::tally(&relation.members);
    TopologyReport {
        relation_id: RelationId::new(relation.id),
        ref_tag: relation.tag("ref").map(str::to_string),
        name: relation.tag("name").map(str::to_string),
        counts,
        valid: counts.is_balanced(),
    }
}

impl TopologyReport {
    pub fn validate(&self) -> Result<RoleCounts> {
        if self.valid {
            Ok(self.counts)
        } else {
            Err(TransitError::TopologyInvalid {
                relation_id: self.relation_id,
                counts: self.counts,
            })
        }
    }
}

/// Relations split by the balance check
#[derive(Debug, Default)]
pub struct Partition<'a> {
    pub valid: Vec<&'a Relation>,
    pub invalid: Vec<TopologyReport>,
}

pub fn partition<'a, I>(relations: I, sink: &dyn DiagnosticSink) -> Partition<'a>
where
    I: IntoIterator<Item = &'a Relation>,
{
    let mut result = Partition::default();

    for relation in relations {
        let report = check(relation);
        match report.validate() {
            Ok(counts) => {
                log::debug!(
                    "{} {} valid counts ({})",
                    report.ref_tag.as_deref().unwrap_or("-"),
                    relation.id,
                    counts
                );
                result.valid.push(relation);
            }
            Err(e) => {
                log::debug!("{}", e);
                sink.warn(DiagnosticKind::TopologyInvalid {
                    relation_id: report.relation_id,
                    counts: report.counts,
                });
                result.invalid.push(report);
            }
        }
    }

    log::info!(
        "Topology check: {} valid, {} invalid",
        result.valid.len(),
        result.invalid.len()
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CollectingSink;
    use crate::osm::{MemberKind, Tags};

    fn member(role: &str) -> Member {
        Member {
            kind: if role.is_empty() {
                MemberKind::Way
            } else {
                MemberKind::Node
            },
            ref_id: 1,
            role: MemberRole::from(role),
            lat: None,
            lon: None,
            geometry: Vec::new(),
        }
    }

    fn relation(id: i64, roles: &[&str]) -> Relation {
        let mut tags = Tags::new();
        tags.insert("route".to_string(), "bus".to_string());
        tags.insert("ref".to_string(), "5".to_string());
        Relation {
            id,
            tags,
            members: roles.iter().map(|r| member(r)).collect(),
        }
    }

    #[test]
    fn test_rejects_three_stops_two_platforms() {
        let rel = relation(1, &["stop", "platform", "stop", "platform", "stop", ""]);
        let report = check(&rel);
        assert!(!report.valid);
        assert_eq!(report.counts.stop, 3);
        assert_eq!(report.counts.platform, 2);
        assert!(matches!(
            report.validate(),
            Err(TransitError::TopologyInvalid { .. })
        ));
    }

    #[test]
    fn test_accepts_two_and_two() {
        let rel = relation(2, &["stop", "platform", "stop", "platform", "", ""]);
        let counts = check(&rel).validate().unwrap();
        assert_eq!(counts.ways, 2);
    }

    #[test]
    fn test_entry_and_exit_balance() {
        let rel = relation(
            3,
            &["stop_entry_only", "platform_entry_only", "stop_exit_only", "platform"],
        );
        assert!(!check(&rel).valid);

        let rel = relation(
            4,
            &[
                "stop_entry_only",
                "platform_entry_only",
                "stop_exit_only",
                "platform_exit_only",
            ],
        );
        assert!(check(&rel).valid);
    }

    #[test]
    fn test_member_order_is_ignored() {
        // Platforms before stops are fine; only the counts matter
        let rel = relation(5, &["platform", "platform", "", "stop", "stop"]);
        assert!(check(&rel).valid);
    }

    #[test]
    fn test_partition_keeps_invalid_for_reporting() {
        let good = relation(10, &["stop", "platform"]);
        let bad = relation(11, &["stop", "stop", "platform"]);
        let sink = CollectingSink::new();

        let result = partition([&good, &bad], &sink);
        assert_eq!(result.valid.len(), 1);
        assert_eq!(result.valid[0].id, 10);
        assert_eq!(result.invalid.len(), 1);
        assert_eq!(result.invalid[0].relation_id, RelationId::new(11));
        assert_eq!(sink.counts_by_kind()["topology_invalid"], 1);
    }
}
