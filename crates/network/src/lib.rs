//! # osm-transit-network
//!
//! Rebuild public transport routes from OpenStreetMap relations.
//!
//! ## Features
//!
//! - **Topology check**: PTv2 stop/platform role balance per relation
//! - **Shape assembly**: unordered, undirected ways merged into one path,
//!   with turning loops cut open
//! - **Stop snapping**: platforms inserted as exact path vertices
//! - **Segment cutting**: stop-to-stop slices for rail and road routes
//! - **Projection**: all lengths in meters through a UTM frame
//!
//! ## Example
//!
//! ```
//! use osm_transit_network::prelude::*;
//! use geo::LineString;
//!
//! let sink = CollectingSink::new();
//! let assembler = ShapeAssembler::new(1e-6, &sink);
//!
//! // Two ways meeting at (1, 0), the second one drawn backwards
//! let path = assembler
//!     .assemble(vec![
//!         LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]),
//!         LineString::from(vec![(2.0, 0.0), (1.0, 0.0)]),
//!     ])
//!     .unwrap();
//!
//! assert_eq!(path.len(), 3);
//! assert!(sink.is_empty());
//! ```

pub mod assembly;
pub mod cutting;
pub mod diagnostics;
pub mod extract;
pub mod fetch;
pub mod geometry;
pub mod identifiers;
pub mod models;
pub mod osm;
pub mod pipeline;
pub mod schedule;
pub mod snapping;
pub mod topology;

// Re-exports for convenience
pub mod prelude {
    pub use crate::assembly::ShapeAssembler;
    pub use crate::cutting::{Segment, SegmentCutter, SliceSource};
    pub use crate::diagnostics::{
        CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink, LogSink, RouteScope,
    };
    pub use crate::fetch::{fetch_stops, DumpStopSource, FetchConfig, StopSource};
    pub use crate::geometry::{Hemisphere, Path, Projector, RouteGeometry};
    pub use crate::identifiers::*;
    pub use crate::models::{records::*, types::*};
    pub use crate::osm::OverpassDocument;
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineOutput};
    pub use crate::snapping::{orient_to_stops, StopSnapper};
    pub use crate::topology::{RoleCounts, TopologyReport};
}

pub use prelude::*;
