//! Large-neighborhood search for minimal pairwise-interaction samples of
//! feature models.
//!
//! Given a feature model and an initial sample covering every feasible pair
//! of feature literals, the optimizer shrinks the sample while preserving its
//! pairwise coverage, and maintains a matching lower bound through a set of
//! pairwise-conflicting literal tuples computed on a background worker.
//!
//! The typical entry points are [`parser::parse_file`] for the model,
//! [`sample::read_sample`] for the initial sample, and
//! [`lns::SampleOptimizer`] for the optimization itself.

pub mod cds;
pub mod coverage;
pub mod errors;
pub mod graph;
pub mod instances;
pub mod lns;
pub mod parser;
pub mod preprocessor;
pub mod sample;
pub mod solver;
pub mod utils;
pub mod verify;

pub use errors::{Error, Result};
pub use instances::{ExternalConfig, ExternalSample, Instance};
pub use lns::{OptimizeParams, OptimizerOptions, SampleOptimizer};
pub use preprocessor::IndexInstance;
