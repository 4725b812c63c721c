use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("invalid time '{0}': expected HH:MM with HH in 0..=23 and MM in 0..=59")]
    InvalidTime(String),

    #[error("invalid interval: `every {0} minutes` is out of range (1..=59)")]
    InvalidInterval(u32),

    #[error("unknown weekday '{0}'")]
    UnknownWeekday(String),

    #[error("unrecognized schedule phrase '{0}'")]
    UnrecognizedPhrase(String),

    #[error("fuzzy schedule requires a workflow identifier for scattering")]
    MissingWorkflowId,
}

pub type Result<T> = std::result::Result<T, Error>;
