//! Parsing of `on:` shorthand strings and schedule phrases.

use crate::error::{Error, Result};

/// What a scalar `on:` value means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnShorthand {
    /// A schedule phrase or raw cron expression.
    Schedule(ScheduleInput),
    /// `/name` — a slash-command trigger.
    SlashCommand(String),
    /// A plain event name ("push", "issues", ...).
    Event(String),
}

/// A schedule before scattering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleInput {
    /// Fully specified: emit as-is.
    Literal { cron: String, phrase: String },
    /// Needs deterministic scattering at compile time.
    Fuzzy {
        phrase: String,
        period: FuzzyPeriod,
        /// Hour pinned by "around HH:MM" (minute is always scattered).
        hour: Option<u8>,
        /// Weekday pinned by "weekly on <day>".
        weekday: Option<u8>,
    },
}

/// Granularity of a fuzzy schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzyPeriod {
    Daily,
    Weekly,
}

/// Parse a scalar `on:` value.
///
/// Accepts schedule phrases, 5-field cron expressions, `/command`
/// shorthand, and plain event names.
pub fn parse_on_shorthand(input: &str) -> Result<OnShorthand> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::UnrecognizedPhrase(input.to_string()));
    }

    if let Some(command) = trimmed.strip_prefix('/') {
        if command.is_empty() || command.contains(char::is_whitespace) {
            return Err(Error::UnrecognizedPhrase(input.to_string()));
        }
        return Ok(OnShorthand::SlashCommand(command.to_string()));
    }

    if let Some(schedule) = parse_schedule_phrase(trimmed)? {
        return Ok(OnShorthand::Schedule(schedule));
    }

    if looks_like_cron(trimmed) {
        validate_cron(trimmed)?;
        return Ok(OnShorthand::Schedule(ScheduleInput::Literal {
            cron: trimmed.to_string(),
            phrase: trimmed.to_string(),
        }));
    }

    // Anything word-shaped is treated as an event name; the schema
    // validator rejects unknown events with a suggestion.
    if trimmed.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        return Ok(OnShorthand::Event(trimmed.to_string()));
    }

    Err(Error::UnrecognizedPhrase(input.to_string()))
}

/// Parse a schedule phrase; returns `Ok(None)` when the input is not a
/// recognized phrase (it may still be a cron expression or event name).
fn parse_schedule_phrase(input: &str) -> Result<Option<ScheduleInput>> {
    let lower = input.to_ascii_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    match words.as_slice() {
        ["daily"] => Ok(Some(ScheduleInput::Fuzzy {
            phrase: input.to_string(),
            period: FuzzyPeriod::Daily,
            hour: None,
            weekday: None,
        })),
        ["daily", "at", time] => {
            let (hour, minute) = parse_time(time)?;
            Ok(Some(ScheduleInput::Literal {
                cron: format!("{minute} {hour} * * *"),
                phrase: input.to_string(),
            }))
        },
        ["daily", "around", time] => {
            let (hour, _minute) = parse_time(time)?;
            Ok(Some(ScheduleInput::Fuzzy {
                phrase: input.to_string(),
                period: FuzzyPeriod::Daily,
                hour: Some(hour),
                weekday: None,
            }))
        },
        ["weekly"] => Ok(Some(ScheduleInput::Fuzzy {
            phrase: input.to_string(),
            period: FuzzyPeriod::Weekly,
            hour: None,
            weekday: None,
        })),
        ["weekly", "on", day] => {
            let weekday = parse_weekday(day)?;
            Ok(Some(ScheduleInput::Fuzzy {
                phrase: input.to_string(),
                period: FuzzyPeriod::Weekly,
                hour: None,
                weekday: Some(weekday),
            }))
        },
        ["weekly", "on", day, "at", time] => {
            let weekday = parse_weekday(day)?;
            let (hour, minute) = parse_time(time)?;
            Ok(Some(ScheduleInput::Literal {
                cron: format!("{minute} {hour} * * {weekday}"),
                phrase: input.to_string(),
            }))
        },
        ["every", n, "minutes" | "minute"] => {
            let n: u32 = n
                .parse()
                .map_err(|_| Error::UnrecognizedPhrase(input.to_string()))?;
            if !(1..=59).contains(&n) {
                return Err(Error::InvalidInterval(n));
            }
            Ok(Some(ScheduleInput::Literal {
                cron: format!("*/{n} * * * *"),
                phrase: input.to_string(),
            }))
        },
        _ => Ok(None),
    }
}

/// Parse `HH:MM` with bounds checking. `24:00` is rejected.
fn parse_time(input: &str) -> Result<(u8, u8)> {
    let Some((h, m)) = input.split_once(':') else {
        return Err(Error::InvalidTime(input.to_string()));
    };
    let hour: u8 = h.parse().map_err(|_| Error::InvalidTime(input.to_string()))?;
    let minute: u8 = m.parse().map_err(|_| Error::InvalidTime(input.to_string()))?;
    if hour > 23 || minute > 59 {
        return Err(Error::InvalidTime(input.to_string()));
    }
    Ok((hour, minute))
}

/// Parse a weekday name (full or three-letter) to cron numbering
/// (0 = sunday .. 6 = saturday).
fn parse_weekday(input: &str) -> Result<u8> {
    let day = match input.to_ascii_lowercase().as_str() {
        "sunday" | "sun" => 0,
        "monday" | "mon" => 1,
        "tuesday" | "tue" => 2,
        "wednesday" | "wed" => 3,
        "thursday" | "thu" => 4,
        "friday" | "fri" => 5,
        "saturday" | "sat" => 6,
        _ => return Err(Error::UnknownWeekday(input.to_string())),
    };
    Ok(day)
}

/// Heuristic: five whitespace-separated fields of cron-ish characters.
fn looks_like_cron(input: &str) -> bool {
    let fields: Vec<&str> = input.split_whitespace().collect();
    fields.len() == 5
        && fields.iter().all(|f| {
            f.chars()
                .all(|c| c.is_ascii_digit() || matches!(c, '*' | '/' | ',' | '-'))
        })
}

/// Validate a 5-field cron expression.
///
/// The `cron` crate expects 7 fields (sec min hour dom month dow year), so
/// the expression is padded with "0" seconds and "*" year for validation.
pub fn validate_cron(expr: &str) -> Result<()> {
    let padded = format!("0 {expr} *");
    padded
        .parse::<cron::Schedule>()
        .map(|_| ())
        .map_err(|e| Error::InvalidCron {
            expr: expr.to_string(),
            reason: e.to_string(),
        })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daily_at_literal() {
        let parsed = parse_on_shorthand("daily at 02:00").unwrap();
        match parsed {
            OnShorthand::Schedule(ScheduleInput::Literal { cron, phrase }) => {
                assert_eq!(cron, "0 2 * * *");
                assert_eq!(phrase, "daily at 02:00");
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn daily_is_fuzzy() {
        let parsed = parse_on_shorthand("daily").unwrap();
        assert!(matches!(
            parsed,
            OnShorthand::Schedule(ScheduleInput::Fuzzy {
                period: FuzzyPeriod::Daily,
                hour: None,
                ..
            })
        ));
    }

    #[test]
    fn daily_around_pins_hour() {
        let parsed = parse_on_shorthand("daily around 14:30").unwrap();
        assert!(matches!(
            parsed,
            OnShorthand::Schedule(ScheduleInput::Fuzzy { hour: Some(14), .. })
        ));
    }

    #[test]
    fn weekly_on_weekday() {
        let parsed = parse_on_shorthand("weekly on Monday").unwrap();
        assert!(matches!(
            parsed,
            OnShorthand::Schedule(ScheduleInput::Fuzzy {
                period: FuzzyPeriod::Weekly,
                weekday: Some(1),
                ..
            })
        ));
    }

    #[test]
    fn weekly_on_weekday_at_literal() {
        let parsed = parse_on_shorthand("weekly on friday at 9:30").unwrap();
        match parsed {
            OnShorthand::Schedule(ScheduleInput::Literal { cron, .. }) => {
                assert_eq!(cron, "30 9 * * 5");
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn every_minutes_bounds() {
        match parse_on_shorthand("every 1 minutes").unwrap() {
            OnShorthand::Schedule(ScheduleInput::Literal { cron, .. }) => {
                assert_eq!(cron, "*/1 * * * *");
            },
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parse_on_shorthand("every 59 minutes").is_ok());
        assert!(matches!(
            parse_on_shorthand("every 60 minutes"),
            Err(Error::InvalidInterval(60))
        ));
        assert!(matches!(
            parse_on_shorthand("every 0 minutes"),
            Err(Error::InvalidInterval(0))
        ));
    }

    #[test]
    fn midnight_24_rejected() {
        assert!(matches!(
            parse_on_shorthand("daily at 24:00"),
            Err(Error::InvalidTime(_))
        ));
        assert!(parse_on_shorthand("daily at 23:59").is_ok());
    }

    #[test]
    fn raw_cron_passthrough() {
        match parse_on_shorthand("0 9 * * 1").unwrap() {
            OnShorthand::Schedule(ScheduleInput::Literal { cron, .. }) => {
                assert_eq!(cron, "0 9 * * 1");
            },
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn invalid_cron_rejected() {
        assert!(matches!(
            parse_on_shorthand("99 99 * * *"),
            Err(Error::InvalidCron { .. })
        ));
    }

    #[test]
    fn slash_command() {
        assert_eq!(
            parse_on_shorthand("/my-bot").unwrap(),
            OnShorthand::SlashCommand("my-bot".to_string())
        );
        assert!(parse_on_shorthand("/").is_err());
    }

    #[test]
    fn plain_event_name() {
        assert_eq!(
            parse_on_shorthand("push").unwrap(),
            OnShorthand::Event("push".to_string())
        );
        assert_eq!(
            parse_on_shorthand("pull_request").unwrap(),
            OnShorthand::Event("pull_request".to_string())
        );
    }

    #[test]
    fn unknown_weekday_rejected() {
        assert!(matches!(
            parse_on_shorthand("weekly on someday"),
            Err(Error::UnknownWeekday(_))
        ));
    }
}
