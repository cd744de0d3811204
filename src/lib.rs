//! vidgate - a gateway over API-only video generation services.
//!
//! Normalizes Sora, Runway, and Kling behind one request shape, tracks each
//! generation through `queued -> processing -> completed | failed |
//! cancelled`, stores finished videos, and prices every run.

#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod providers;
pub mod render;
pub mod storage;
pub mod util;

/// Test utilities - included in test builds or when the `test-utils` feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ExitCode, GateError, Result};

#[cfg(any(test, feature = "test-utils"))]
pub use test_utils::*;
