//! Quality diagnostics reported by the pipeline stages.
//!
//! Nothing here is fatal: a stage that hits one of these conditions falls
//! back (bridging, straight segments, skipping a route) and reports it to
//! the sink it was given.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use geo::Coord;

use crate::identifiers::*;
use crate::topology::RoleCounts;

#[derive(Clone, Debug, PartialEq)]
pub enum DiagnosticKind {
    /// Relation failed the stop/platform balance check
    TopologyInvalid {
        relation_id: RelationId,
        counts: RoleCounts,
    },
    /// No fragment touched the path ends; joined with a straight edge
    BridgedGap {
        from: Coord<f64>,
        to: Coord<f64>,
        distance: f64,
    },
    /// Stop is further from the path than the snap tolerance
    UnresolvedSnap { stop_id: StopId, distance: f64 },
    /// Cutter could not slice the path and used a straight segment
    DegenerateSlice {
        from: StopId,
        to: StopId,
        reason: &'static str,
    },
    /// Stop referenced by a route but absent from the stop table
    MissingStop { stop_id: StopId },
    /// Stop record whose geometry is unusable
    MalformedStop { stop_id: StopId, reason: String },
    /// Route dropped from the output
    RouteSkipped { reason: String },
}

impl DiagnosticKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TopologyInvalid { .. } => "topology_invalid",
            Self::BridgedGap { .. } => "bridged_gap",
            Self::UnresolvedSnap { .. } => "unresolved_snap",
            Self::DegenerateSlice { .. } => "degenerate_slice",
            Self::MissingStop { .. } => "missing_stop",
            Self::MalformedStop { .. } => "malformed_stop",
            Self::RouteSkipped { .. } => "route_skipped",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Diagnostic {
    /// Route the condition was found in, when known
    pub route_id: Option<RelationId>,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind) -> Self {
        Self {
            route_id: None,
            kind,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(route_id) = self.route_id {
            write!(f, "route {}: ", route_id)?;
        }
        match &self.kind {
            DiagnosticKind::TopologyInvalid {
                relation_id,
                counts,
            } => write!(f, "relation {} rejected ({})", relation_id, counts),
            DiagnosticKind::BridgedGap { from, to, distance } => write!(
                f,
                "bridged {:.1} gap from ({:.1}, {:.1}) to ({:.1}, {:.1})",
                distance, from.x, from.y, to.x, to.y
            ),
            DiagnosticKind::UnresolvedSnap { stop_id, distance } => {
                write!(f, "stop {} is {:.1} away from the path", stop_id, distance)
            }
            DiagnosticKind::DegenerateSlice { from, to, reason } => {
                write!(f, "segment {} -> {} is a straight line ({})", from, to, reason)
            }
            DiagnosticKind::MissingStop { stop_id } => {
                write!(f, "stop {} not found in stop table", stop_id)
            }
            DiagnosticKind::MalformedStop { stop_id, reason } => {
                write!(f, "stop {} ignored: {}", stop_id, reason)
            }
            DiagnosticKind::RouteSkipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// Receiver for diagnostics, passed into each stage
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);

    fn warn(&self, kind: DiagnosticKind) {
        self.report(Diagnostic::new(kind));
    }
}

/// Forwards every diagnostic to `log::warn!`
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn report(&self, diagnostic: Diagnostic) {
        log::warn!("{}", diagnostic);
    }
}

/// Keeps every diagnostic for the end-of-run report, optionally logging
/// them as they arrive
#[derive(Debug, Default)]
pub struct CollectingSink {
    entries: Mutex<Vec<Diagnostic>>,
    echo: Option<LogSink>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log each diagnostic as it is reported
    pub fn logging() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            echo: Some(LogSink),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.lock().clone()
    }

    pub fn into_inner(self) -> Vec<Diagnostic> {
        self.entries
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Number of diagnostics per kind name
    pub fn counts_by_kind(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for diagnostic in self.lock().iter() {
            *counts.entry(diagnostic.kind.name()).or_insert(0) += 1;
        }
        counts
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Diagnostic>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diagnostic: Diagnostic) {
        if let Some(echo) = &self.echo {
            echo.report(diagnostic.clone());
        }
        self.lock().push(diagnostic);
    }
}

/// Tags diagnostics with the route being processed
pub struct RouteScope<'a> {
    route_id: RelationId,
    inner: &'a dyn DiagnosticSink,
}

impl<'a> RouteScope<'a> {
    pub fn new(route_id: RelationId, inner: &'a dyn DiagnosticSink) -> Self {
        Self { route_id, inner }
    }
}

impl DiagnosticSink for RouteScope<'_> {
    fn report(&self, mut diagnostic: Diagnostic) {
        diagnostic.route_id.get_or_insert(self.route_id);
        self.inner.report(diagnostic);
    }
}
