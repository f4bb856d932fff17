//! Foundational low-level utilities shared across Tally crates.
//!
//! Provides time and calendar-day helpers, retry backoff math, and text
//! truncation used by storage, transport clients, and the reporting runtime.

pub mod calendar;
pub mod retry;
pub mod text_utils;
pub mod time_utils;

pub use calendar::{local_date, local_day_bounds, local_midnight, parse_timezone};
pub use retry::{is_retryable_status, retry_delay};
pub use text_utils::{truncate_chars, truncate_for_error};
pub use time_utils::{current_unix_timestamp_ms, is_expired_unix};
