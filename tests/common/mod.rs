//! Shared helpers for integration tests.
//!
//! - `fixtures`: provider wire payloads, config files, and a CLI harness
//! - `logger`: per-test progress logging
//! - `log_capture`: tracing capture for asserting on emitted events
//!
//! Each test binary uses a subset of these.
#![allow(dead_code)]

pub mod fixtures;
pub mod log_capture;
pub mod logger;
