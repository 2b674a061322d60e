//! Capture correlation, stream alignment and drift-compensation core for
//! swarm ranging experiments.
//!
//! Raw sniffer captures are folded into per-message timing records, named
//! measurement streams are aligned onto that time base, and a compensation
//! filter is tuned against ground truth by exhaustive grid search.

pub mod capture;
pub mod config;
pub mod math;
pub mod prelude;
pub mod processing;
pub mod series;
pub mod telemetry;

pub use config::PipelineConfig;
pub use prelude::{PipelineError, PipelineResult};
