//! crpt-gate - Rate-limited document submission client
//!
//! This crate submits documents to the CRPT document API while keeping the
//! number of submissions within a sliding time window under a fixed limit.
//! Concurrent callers share one admission gate; callers over the limit wait
//! until capacity frees.

pub mod client;
pub mod config;
pub mod error;
pub mod ratelimit;

pub use client::{Document, Encoder, SubmissionClient, INTRODUCE_GOODS_PATH};
pub use error::{GateError, Result};
pub use ratelimit::{AdmissionGate, TimeUnit};
