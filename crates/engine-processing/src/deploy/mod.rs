//! Write side of a step: batching and bounded-concurrency submission.

pub mod accumulator;
pub mod submitter;

pub use accumulator::{BatchAccumulator, BatchLimits};
pub use submitter::{BatchSubmitter, DeploySummary};
