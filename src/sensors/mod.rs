//! Sensor stream supervision and fusion.
//!
//! Raw host streams are individually supervised (dropouts masked, stalls
//! retried with backoff) and then fused into throttled snapshots carrying
//! the freshest value of every input.

pub mod fusion;
pub mod supervisor;

pub use fusion::{FusedSnapshot, FusionConfig, SensorFusion};
pub use supervisor::{RetryBackoff, StreamSupervisor, SupervisionMode};
