//! Deterministic scattering of fuzzy schedules.
//!
//! Many workflows saying `daily` must not all fire at 00:00. The concrete
//! cron is derived from a stable hash of the workflow identifier (its
//! repo-relative source path), so re-compiling the same file always yields
//! the same minute, and distinct workflows land on different minutes.

use {
    crate::{
        error::{Error, Result},
        phrase::{FuzzyPeriod, ScheduleInput},
    },
    ghaw_common::fnv1a64,
};

/// A schedule ready for emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSchedule {
    pub cron: String,
    /// The human phrase, emitted as a YAML comment beside the cron.
    pub phrase: String,
}

/// Resolve a schedule input to a concrete cron expression.
///
/// Literal inputs pass through; fuzzy inputs are scattered using
/// `workflow_id`, which must be present for them.
pub fn resolve_schedule(
    input: &ScheduleInput,
    workflow_id: Option<&str>,
) -> Result<ResolvedSchedule> {
    match input {
        ScheduleInput::Literal { cron, phrase } => Ok(ResolvedSchedule {
            cron: cron.clone(),
            phrase: phrase.clone(),
        }),
        ScheduleInput::Fuzzy {
            phrase,
            period,
            hour,
            weekday,
        } => {
            let id = workflow_id.ok_or(Error::MissingWorkflowId)?;
            let hash = fnv1a64(id);
            let minute = hash % 60;
            let scattered_hour = (hash / 60) % 24;
            let scattered_weekday = (hash / 1440) % 7;

            let hour = hour.map_or(scattered_hour, u64::from);
            let cron = match period {
                FuzzyPeriod::Daily => format!("{minute} {hour} * * *"),
                FuzzyPeriod::Weekly => {
                    let weekday = weekday.map_or(scattered_weekday, u64::from);
                    format!("{minute} {hour} * * {weekday}")
                },
            };
            Ok(ResolvedSchedule {
                cron,
                phrase: phrase.clone(),
            })
        },
    }
}
