//! Nano network saturation benchmark.
//!
//! Provisions a set of accounts derived from one seed, generates one block per
//! account, publishes them to the network peers and times how fast the node
//! reports them confirmed.

pub mod accounts;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod error;
pub mod generator;
pub mod pipeline;
pub mod provisioner;
pub mod report;
pub mod tracker;

pub use error::{BenchmarkError, Stage};
pub use pipeline::Pipeline;
