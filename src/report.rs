//! Run report and its rendering.

use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::diff::ActionKind;
use crate::probe::ProbeResult;

/// Category of a per-table failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Existing key schema differs from the desired one.
    Conflict,
    /// Retries exhausted on throttling or transport errors.
    Transient,
    /// The store rejected the request; retrying will not help.
    Permanent,
    /// The table did not become active in time.
    Timeout,
    /// The run was cancelled between retries.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Conflict => "conflict",
            FailureKind::Transient => "transient",
            FailureKind::Permanent => "permanent",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub detail: String,
}

impl Failure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// What happened to one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Applied,
    AlreadyExists,
    Failed(Failure),
    /// Cancelled before the create was issued.
    NotAttempted,
    /// Dry run: the create would have been issued.
    Planned,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Outcome::Applied | Outcome::AlreadyExists | Outcome::Planned
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied => "applied",
            Outcome::AlreadyExists => "already_exists",
            Outcome::Failed(_) => "failed",
            Outcome::NotAttempted => "not_attempted",
            Outcome::Planned => "planned",
        }
    }
}

/// Outcome of one action, as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionReport {
    pub table: String,
    pub action: ActionKind,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Create calls issued for this table.
    pub attempts: u32,
}

/// Overall result of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    ProbeFailed,
    ProvisioningFailed,
}

impl RunStatus {
    /// Process exit code. Codes 1 and 2 are reserved for internal and
    /// configuration errors raised before a run starts.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunStatus::Success => 0,
            RunStatus::ProbeFailed => 3,
            RunStatus::ProvisioningFailed => 4,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Success => "success",
            RunStatus::ProbeFailed => "probe_failed",
            RunStatus::ProvisioningFailed => "provisioning_failed",
        })
    }
}

/// The single record a bootstrap run produces.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub run_id: Uuid,
    pub endpoint: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub probe: ProbeResult,
    /// Set when the existing schema could not be read after a ready probe.
    pub snapshot_error: Option<String>,
    pub actions: Vec<ActionReport>,
}

/// Counts per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub applied: usize,
    pub already_exists: usize,
    pub failed: usize,
    pub not_attempted: usize,
    pub planned: usize,
}

impl Report {
    pub fn status(&self) -> RunStatus {
        if !self.probe.ready {
            RunStatus::ProbeFailed
        } else if self.snapshot_error.is_some()
            || self.actions.iter().any(|a| !a.outcome.is_success())
        {
            RunStatus::ProvisioningFailed
        } else {
            RunStatus::Success
        }
    }

    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for action in &self.actions {
            match action.outcome {
                Outcome::Applied => tally.applied += 1,
                Outcome::AlreadyExists => tally.already_exists += 1,
                Outcome::Failed(_) => tally.failed += 1,
                Outcome::NotAttempted => tally.not_attempted += 1,
                Outcome::Planned => tally.planned += 1,
            }
        }
        tally
    }

    pub fn outcome_of(&self, table: &str) -> Option<&Outcome> {
        self.actions
            .iter()
            .find(|a| a.table == table)
            .map(|a| &a.outcome)
    }

    /// Write one line per action plus a summary line.
    pub fn render(&self, format: ReportFormat, out: &mut impl Write) -> io::Result<()> {
        match format {
            ReportFormat::Text => self.render_text(out),
            ReportFormat::Json => self.render_json(out),
        }
    }

    fn render_text(&self, out: &mut impl Write) -> io::Result<()> {
        let width = self
            .actions
            .iter()
            .map(|a| a.table.len())
            .max()
            .unwrap_or(0);

        for action in &self.actions {
            write!(
                out,
                "{:<width$}  {:<8}  {:<14}  attempts={}",
                action.table,
                action.action.to_string(),
                action.outcome.label(),
                action.attempts,
                width = width
            )?;
            if let Outcome::Failed(failure) = &action.outcome {
                write!(out, "  [{}] {}", failure.kind, failure.detail)?;
            }
            writeln!(out)?;
        }

        let t = self.tally();
        write!(
            out,
            "status={} probe_attempts={} applied={} already_exists={} failed={} not_attempted={}",
            self.status(),
            self.probe.attempts,
            t.applied,
            t.already_exists,
            t.failed,
            t.not_attempted
        )?;
        if t.planned > 0 {
            write!(out, " planned={}", t.planned)?;
        }
        if !self.probe.ready {
            if let Some(e) = &self.probe.last_error {
                write!(out, " last_error=\"{}\"", e)?;
            }
        }
        if let Some(e) = &self.snapshot_error {
            write!(out, " snapshot_error=\"{}\"", e)?;
        }
        writeln!(out)
    }

    fn render_json(&self, out: &mut impl Write) -> io::Result<()> {
        for action in &self.actions {
            serde_json::to_writer(&mut *out, action)?;
            writeln!(out)?;
        }
        let summary = json!({
            "summary": {
                "run_id": self.run_id,
                "endpoint": self.endpoint,
                "status": self.status(),
                "exit_code": self.status().exit_code(),
                "started_at": self.started_at,
                "finished_at": self.finished_at,
                "probe": self.probe,
                "snapshot_error": self.snapshot_error,
                "counts": self.tally(),
            }
        });
        serde_json::to_writer(&mut *out, &summary)?;
        writeln!(out)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(probe_ready: bool, actions: Vec<ActionReport>) -> Report {
        let now = Utc::now();
        Report {
            run_id: Uuid::new_v4(),
            endpoint: "http://localhost:8000".to_string(),
            started_at: now,
            finished_at: now,
            probe: ProbeResult {
                ready: probe_ready,
                attempts: if probe_ready { 2 } else { 5 },
                last_error: (!probe_ready).then(|| "Connection refused".to_string()),
            },
            snapshot_error: None,
            actions,
        }
    }

    fn action(table: &str, kind: ActionKind, outcome: Outcome) -> ActionReport {
        ActionReport {
            table: table.to_string(),
            action: kind,
            outcome,
            attempts: u32::from(kind == ActionKind::Create),
        }
    }

    #[test]
    fn status_and_exit_codes() {
        let ok = report(
            true,
            vec![
                action("users", ActionKind::Skip, Outcome::AlreadyExists),
                action("users_email_lookup", ActionKind::Create, Outcome::Applied),
            ],
        );
        assert_eq!(ok.status(), RunStatus::Success);
        assert_eq!(ok.status().exit_code(), 0);

        let conflict = report(
            true,
            vec![action(
                "users",
                ActionKind::Conflict,
                Outcome::Failed(Failure::new(FailureKind::Conflict, "expected id:STRING, found id:NUMBER")),
            )],
        );
        assert_eq!(conflict.status(), RunStatus::ProvisioningFailed);
        assert_eq!(conflict.status().exit_code(), 4);

        let down = report(false, vec![]);
        assert_eq!(down.status(), RunStatus::ProbeFailed);
        assert_eq!(down.status().exit_code(), 3);
    }

    #[test]
    fn not_attempted_fails_the_run() {
        let r = report(true, vec![action("users", ActionKind::Create, Outcome::NotAttempted)]);
        assert_eq!(r.status(), RunStatus::ProvisioningFailed);
    }

    #[test]
    fn snapshot_error_fails_the_run() {
        let mut r = report(true, vec![]);
        r.snapshot_error = Some("ListTables throttled".to_string());
        assert_eq!(r.status(), RunStatus::ProvisioningFailed);
    }

    #[test]
    fn text_has_a_line_per_action_and_a_summary() {
        let r = report(
            true,
            vec![
                action("users", ActionKind::Create, Outcome::Applied),
                action(
                    "orders",
                    ActionKind::Create,
                    Outcome::Failed(Failure::new(FailureKind::Permanent, "bad capacity")),
                ),
            ],
        );
        let mut buf = Vec::new();
        r.render(ReportFormat::Text, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("users "));
        assert!(lines[0].contains("applied"));
        assert!(lines[1].contains("failed"));
        assert!(lines[1].ends_with("[permanent] bad capacity"));
        assert!(lines[2].starts_with("status=provisioning_failed"));
        assert!(lines[2].contains("applied=1"));
        assert!(lines[2].contains("failed=1"));
    }

    #[test]
    fn json_lines_are_parseable() {
        let r = report(
            true,
            vec![
                action("users", ActionKind::Skip, Outcome::AlreadyExists),
                action(
                    "events",
                    ActionKind::Conflict,
                    Outcome::Failed(Failure::new(FailureKind::Conflict, "mismatch")),
                ),
            ],
        );
        let mut buf = Vec::new();
        r.render(ReportFormat::Json, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let values: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(values.len(), 3);
        assert_eq!(values[0]["table"], "users");
        assert_eq!(values[0]["outcome"], "already_exists");
        assert_eq!(values[1]["outcome"], "failed");
        assert_eq!(values[1]["kind"], "conflict");
        assert_eq!(values[1]["detail"], "mismatch");
        assert_eq!(values[2]["summary"]["status"], "provisioning_failed");
        assert_eq!(values[2]["summary"]["exit_code"], 4);
        assert_eq!(values[2]["summary"]["counts"]["already_exists"], 1);
    }

    #[test]
    fn probe_failure_summary_names_last_error() {
        let mut buf = Vec::new();
        report(false, vec![]).render(ReportFormat::Text, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("status=probe_failed probe_attempts=5"));
        assert!(text.contains("last_error=\"Connection refused\""));
    }
}
