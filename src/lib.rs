//! Symbolic flows between Chinese cities, derived from place names that POIs
//! mention, and the rose-diagram statistics of those flows.
//!
//! Stages run in order, each handing a table to the next on disk:
//! symbol table → POI tagging → OD aggregation → city geocoding →
//! enrichment → per-city metrics. See [`pipeline::Pipeline`].

pub mod config;
pub mod enrich;
pub mod error;
pub mod flows;
pub mod geocode;
pub mod logging;
pub mod matcher;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod stats;
pub mod symbols;
pub mod table;
pub mod tagging;

#[cfg(feature = "python")]
mod python;

pub use config::PipelineConfig;
pub use error::{FlowError, Result};
pub use pipeline::Pipeline;
