//! Sweep-and-measure orchestration
//!
//! - `point`: configuration points and Cartesian-product enumeration
//! - `trial`: warmup and timed trials for one point
//! - `aggregate`: mean of k samples
//! - `record`: the persisted row
//! - `sweep`: skip, measure and stage every point

pub mod aggregate;
pub(crate) mod context;
pub mod point;
mod record;
mod run_name;
mod sweep;
pub mod trial;

pub use aggregate::Summary;
pub use context::RunContext;
pub use point::{expand, offload_layers, ConfigPoint};
pub use record::ResultRecord;
pub use run_name::random_run_name;
pub use sweep::{run_benchmark, Sweep, SweepReport};
pub use trial::{synthetic_prompt, MetricSample, TrialOutcome, TrialRunner};
