//! Schedule normalization for `on:` shorthand.
//!
//! Converts human schedule phrases ("daily", "weekly on monday at 9:30",
//! "every 15 minutes") into 5-field cron expressions, and deterministically
//! scatters fuzzy schedules so a fleet of workflows does not fire on the
//! same minute.

pub mod error;
pub mod phrase;
pub mod scatter;

pub use {
    error::{Error, Result},
    phrase::{FuzzyPeriod, OnShorthand, ScheduleInput, parse_on_shorthand, validate_cron},
    scatter::{ResolvedSchedule, resolve_schedule},
};
