//! Transit data models, record shapes and errors.

pub mod records;
pub mod types;

// Re-exports for convenience
pub use records::{RouteRecord, SegmentRecord, StopRecord};
pub use types::{collapse_repeats, CutPolicy, Result, Stop, TransitError, TransportMode, Wheelchair};
