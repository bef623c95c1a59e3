//! Application Services
//!
//! Orchestration over the ports: the single-flight cache read path and the
//! shared artifact reads built on top of it.

pub mod artifacts;
pub mod single_flight;

pub use artifacts::{ArtifactTtls, SharedArtifacts};
pub use single_flight::{CacheError, SingleFlightCache, SingleFlightConfig};
