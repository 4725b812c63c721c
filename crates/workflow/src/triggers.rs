//! Trigger normalization: every accepted `on:` shape becomes one
//! [`Triggers`] value ready for emission.
//!
//! Synthetic keys (`command`, `alias`, `reaction`, `skip-if-match`,
//! `stop-after`, slash-command shorthand) do not exist in GitHub Actions;
//! they normalize to real events plus activation-job conditions.

use std::collections::BTreeMap;

use {
    ghaw_common::Diagnostic,
    ghaw_schedule::{OnShorthand, ResolvedSchedule, ScheduleInput, parse_on_shorthand,
        resolve_schedule},
    serde_yaml::Value,
};

/// The normalized trigger set.
#[derive(Debug, Clone, Default)]
pub struct Triggers {
    /// Real Actions events for the emitted `on:` block, keyed by event
    /// name. `schedule` is kept separately for comment rendering.
    pub events: BTreeMap<String, Value>,
    /// Resolved schedules, in declaration order.
    pub schedules: Vec<ResolvedSchedule>,
    /// `/command` or alias the activation job matches against comments.
    pub command: Option<String>,
    /// Emoji reaction the activation job posts on the triggering entity.
    pub reaction: Option<String>,
    /// GitHub search query; matching items skip the run.
    pub skip_if_match: Option<String>,
    /// ISO date after which the activation job stops the workflow.
    pub stop_after: Option<String>,
}

impl Triggers {
    /// Whether trigger conditions require the activation job.
    #[must_use]
    pub fn needs_activation(&self) -> bool {
        self.command.is_some()
            || self.reaction.is_some()
            || self.skip_if_match.is_some()
            || self.stop_after.is_some()
    }

    fn add_event(&mut self, event: &str, config: Value) {
        self.events.entry(event.to_string()).or_insert(config);
    }

    /// The events a command/alias trigger actually listens on.
    fn add_command_events(&mut self) {
        self.add_event(
            "issue_comment",
            serde_yaml::from_str("types: [created, edited]").unwrap_or(Value::Null),
        );
        self.add_event("workflow_dispatch", Value::Null);
    }
}

/// Normalize the `on:` value. Problems are reported as diagnostics and the
/// trigger set stays best-effort so later phases can still run.
#[must_use]
pub fn normalize_triggers(on: Option<&Value>, workflow_id: &str) -> (Triggers, Vec<Diagnostic>) {
    let mut triggers = Triggers::default();
    let mut diagnostics = Vec::new();

    match on {
        None | Some(Value::Null) => {
            triggers.add_event("workflow_dispatch", Value::Null);
        },
        Some(Value::String(shorthand)) => {
            normalize_shorthand(shorthand, workflow_id, &mut triggers, &mut diagnostics);
        },
        Some(Value::Mapping(mapping)) => {
            for (key, config) in mapping {
                let Some(key) = key.as_str() else { continue };
                normalize_entry(key, config, workflow_id, &mut triggers, &mut diagnostics);
            }
        },
        Some(_) => {
            diagnostics.push(Diagnostic::error("schema", "on", "`on` must be a string or mapping"));
        },
    }

    // Scheduled workflows always accept manual dispatch as well.
    if !triggers.schedules.is_empty() {
        triggers.add_event("workflow_dispatch", Value::Null);
    }
    if triggers.events.is_empty() && triggers.schedules.is_empty() {
        triggers.add_event("workflow_dispatch", Value::Null);
    }

    (triggers, diagnostics)
}

fn normalize_shorthand(
    shorthand: &str,
    workflow_id: &str,
    triggers: &mut Triggers,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match parse_on_shorthand(shorthand) {
        Ok(OnShorthand::Schedule(input)) => {
            push_schedule(&input, workflow_id, triggers, diagnostics);
        },
        Ok(OnShorthand::SlashCommand(command)) => {
            triggers.command = Some(command);
            triggers.add_command_events();
        },
        Ok(OnShorthand::Event(event)) => {
            triggers.add_event(&event, Value::Null);
        },
        Err(e) => {
            diagnostics.push(Diagnostic::error("schema", "on", e.to_string()));
        },
    }
}

fn normalize_entry(
    key: &str,
    config: &Value,
    workflow_id: &str,
    triggers: &mut Triggers,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match key {
        "schedule" => normalize_schedule_entry(config, workflow_id, triggers, diagnostics),
        "command" | "slash_command" | "alias" => {
            match config.as_str() {
                Some(name) => {
                    triggers.command = Some(name.trim_start_matches('/').to_string());
                    triggers.add_command_events();
                },
                None => diagnostics.push(Diagnostic::error(
                    "schema",
                    format!("on.{key}"),
                    "expected a command name",
                )),
            }
        },
        "reaction" => {
            triggers.reaction = config.as_str().map(str::to_string);
        },
        "skip-if-match" => {
            triggers.skip_if_match = config.as_str().map(str::to_string);
        },
        "stop-after" => {
            triggers.stop_after = config.as_str().map(str::to_string);
        },
        _ => {
            triggers.add_event(key, config.clone());
        },
    }
}

/// `schedule:` accepts a phrase string, a list of phrase strings, or the
/// standard Actions list of `{cron: …}` mappings.
fn normalize_schedule_entry(
    config: &Value,
    workflow_id: &str,
    triggers: &mut Triggers,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match config {
        Value::String(phrase) => match parse_on_shorthand(phrase) {
            Ok(OnShorthand::Schedule(input)) => {
                push_schedule(&input, workflow_id, triggers, diagnostics);
            },
            _ => diagnostics.push(Diagnostic::error(
                "schema",
                "on.schedule",
                format!("unrecognized schedule '{phrase}'"),
            )),
        },
        Value::Sequence(items) => {
            for item in items {
                let phrase = item
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| {
                        item.get("cron").and_then(Value::as_str).map(str::to_string)
                    });
                match phrase {
                    Some(phrase) => match parse_on_shorthand(&phrase) {
                        Ok(OnShorthand::Schedule(input)) => {
                            push_schedule(&input, workflow_id, triggers, diagnostics);
                        },
                        _ => diagnostics.push(Diagnostic::error(
                            "schema",
                            "on.schedule",
                            format!("unrecognized schedule '{phrase}'"),
                        )),
                    },
                    None => diagnostics.push(Diagnostic::error(
                        "schema",
                        "on.schedule",
                        "schedule entries must be phrases or {cron: …} mappings",
                    )),
                }
            }
        },
        _ => diagnostics.push(Diagnostic::error(
            "schema",
            "on.schedule",
            "expected a phrase or list of schedules",
        )),
    }
}

fn push_schedule(
    input: &ScheduleInput,
    workflow_id: &str,
    triggers: &mut Triggers,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match resolve_schedule(input, Some(workflow_id)) {
        Ok(resolved) => triggers.schedules.push(resolved),
        Err(e) => diagnostics.push(Diagnostic::error("schema", "on.schedule", e.to_string())),
    }
}
