//! Small formatting and terminal helpers.

pub mod env;
pub mod format;
pub mod time;

pub use format::{format_progress, format_seconds, format_usd, format_usd_opt, truncate};
pub use time::{format_relative_time, format_timestamp};
