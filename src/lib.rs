//! perf-probe: Async launch latency and frame-rate measurement harness
//!
//! This library measures how long an application takes to launch and how
//! smoothly it renders, against host capabilities injected as traits. Each
//! probe invocation hands exactly one result or failure to a report sink.
//!
//! - [`wait`]: bounded condition polling and event/condition races
//! - [`probe`]: launch probe, frame sampler and launch series
//! - [`host`]: collaborator traits plus an in-process simulated host
//! - [`report`]: report sinks and the write-once guard

pub mod config;
pub mod error;
pub mod host;
pub mod model;
pub mod perf;
pub mod probe;
pub mod report;
pub mod wait;

pub use error::{ProbeError, ProbeOutcome};
