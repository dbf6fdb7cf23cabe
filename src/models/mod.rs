//! Domain models for ML Constructor.
//!
//! # Core Concepts
//!
//! ## Bookkeeping Entities
//!
//! - [`Project`]: A modeling project with one primary data source and its column mapping.
//! - [`SecondarySource`]: An additional dataset merged alongside the primary series.
//!
//! ## Artifacts
//!
//! Each project holds at most one live artifact per stage. A new run replaces
//! the previous artifact wholesale.
//!
//! - [`AggregatedArtifact`]: Resampled, gap-filled and merged table.
//! - [`FeatureArtifact`]: The aggregated table enriched with date and numerical features.
//!
//! ## Run Configuration
//!
//! - [`AggregationConfig`]: Target period and the value column's reduction.
//! - [`FeatureConfig`]: [`DateFeatureConfig`] plus [`NumericalFeatureConfig`].

mod aggregation;
mod artifact;
mod features;
mod project;
mod source;

pub use aggregation::*;
pub use artifact::*;
pub use features::*;
pub use project::*;
pub use source::*;
