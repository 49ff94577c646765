//! Utility functions and helpers
//!
//! Atomic file writes and timestamp helpers.

pub mod atomic;
pub mod time;

pub use atomic::{atomic_write, atomic_write_with, cleanup_temp_files, temp_path_for};
pub use time::{format_timestamp, parse_timestamp};
