//! Bootstrap run sequencing.
//!
//! ```text
//! Idle → Probing ─┬─ Ready → Diffing → Provisioning → Done
//!                 └─ ProbeFailed ───────────────────→ Done
//! ```
//!
//! Phases are strictly sequential: provisioning decisions depend on a
//! single consistent snapshot of the existing schema. A run never
//! re-enters a phase and always yields exactly one [`Report`].

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backoff::{Backoff, DEFAULT_CEILING_FACTOR};
use crate::diff::{ActionKind, diff};
use crate::errors::{StoreError, StoreErrorKind};
use crate::probe::{ProbeConfig, probe};
use crate::provision::{ProvisionConfig, Provisioner};
use crate::report::{ActionReport, Failure, FailureKind, Outcome, Report};
use crate::schema::Descriptor;
use crate::store::{ExistingTable, TableStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Probing,
    Ready,
    ProbeFailed,
    Diffing,
    Provisioning,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Probing => "probing",
            Phase::Ready => "ready",
            Phase::ProbeFailed => "probe_failed",
            Phase::Diffing => "diffing",
            Phase::Provisioning => "provisioning",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tuning for a whole run.
#[derive(Debug, Clone, Default)]
pub struct BootstrapConfig {
    pub probe: ProbeConfig,
    pub provision: ProvisionConfig,
}

/// Sequences probe, snapshot, diff and provisioning against one store.
pub struct Bootstrap {
    store: Arc<dyn TableStore>,
    endpoint: String,
    config: BootstrapConfig,
}

impl fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bootstrap")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Tracks the current phase and logs every transition.
struct PhaseTracker {
    run_id: Uuid,
    phase: Phase,
}

impl PhaseTracker {
    fn enter(&mut self, next: Phase) {
        debug!(run_id = %self.run_id, from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }
}

impl Bootstrap {
    pub fn new(store: Arc<dyn TableStore>, endpoint: impl Into<String>, config: BootstrapConfig) -> Self {
        Self {
            store,
            endpoint: endpoint.into(),
            config,
        }
    }

    /// Run the bootstrap once.
    ///
    /// Never fails: every problem after schema loading is captured in the
    /// returned report.
    pub async fn run(&self, desired: &Descriptor, cancel: &CancellationToken) -> Report {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut tracker = PhaseTracker {
            run_id,
            phase: Phase::Idle,
        };
        info!(%run_id, endpoint = %self.endpoint, tables = desired.len(), "bootstrap starting");

        tracker.enter(Phase::Probing);
        let probe_result = probe(self.store.as_ref(), &self.config.probe, cancel).await;

        let mut report = Report {
            run_id,
            endpoint: self.endpoint.clone(),
            started_at,
            finished_at: started_at,
            probe: probe_result,
            snapshot_error: None,
            actions: Vec::new(),
        };

        if !report.probe.ready {
            tracker.enter(Phase::ProbeFailed);
            warn!(
                %run_id,
                attempts = report.probe.attempts,
                "endpoint unavailable, nothing provisioned"
            );
            return self.finish(report, &mut tracker);
        }
        tracker.enter(Phase::Ready);

        let existing = match self.snapshot(desired, cancel).await {
            Ok(existing) => existing,
            Err(e) => {
                warn!(%run_id, error = %e, "could not read existing schema");
                report.actions = unresolved_reports(desired, &e, cancel.is_cancelled());
                report.snapshot_error = Some(e.to_string());
                return self.finish(report, &mut tracker);
            }
        };

        tracker.enter(Phase::Diffing);
        let actions = diff(desired, &existing);
        debug!(%run_id, actions = actions.len(), existing = existing.len(), "diff computed");

        tracker.enter(Phase::Provisioning);
        let provisioner = Provisioner::new(Arc::clone(&self.store), self.config.provision.clone());
        report.actions = provisioner.apply(actions, cancel).await;

        self.finish(report, &mut tracker)
    }

    fn finish(&self, mut report: Report, tracker: &mut PhaseTracker) -> Report {
        tracker.enter(Phase::Done);
        report.finished_at = Utc::now();
        let tally = report.tally();
        info!(
            run_id = %report.run_id,
            status = %report.status(),
            applied = tally.applied,
            already_exists = tally.already_exists,
            failed = tally.failed,
            not_attempted = tally.not_attempted,
            "bootstrap finished"
        );
        report
    }

    /// Read the existing definition of every desired table that the store
    /// lists. Each call is retried like a transient create.
    async fn snapshot(
        &self,
        desired: &Descriptor,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExistingTable>, StoreError> {
        let listed = self.with_retry("ListTables", cancel, || self.store.list_tables()).await?;

        let mut existing = Vec::new();
        for spec in desired.tables() {
            if !listed.iter().any(|n| n == spec.name()) {
                continue;
            }
            let name = spec.name();
            match self
                .with_retry("DescribeTable", cancel, || self.store.describe_table(name))
                .await
            {
                Ok(table) => existing.push(table),
                // Deleted between list and describe.
                Err(e) if e.kind == StoreErrorKind::NotFound => {
                    debug!(table = name, "listed table vanished before describe");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(existing)
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, StoreError>>,
    {
        let config = &self.config.provision;
        let mut backoff = Backoff::new(config.retry_base, DEFAULT_CEILING_FACTOR);
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let err = match tokio::time::timeout(config.call_timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) if e.is_retryable() => e,
                Ok(Err(e)) => return Err(e),
                Err(_) => StoreError::transient(format!(
                    "{} timed out after {:?}",
                    operation, config.call_timeout
                )),
            };

            if attempts > config.max_retries {
                return Err(StoreError::new(
                    err.kind,
                    format!("{} failed after {} attempts: {}", operation, attempts, err),
                ));
            }

            let delay = backoff.next_delay();
            debug!(operation, attempts, ?delay, error = %err, "retrying");
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(StoreError::new(
                        err.kind,
                        format!("{} cancelled after {} attempts: {}", operation, attempts, err),
                    ));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// One report per desired table when the snapshot failed. After a cancel
/// nothing was attempted; otherwise each table failed with the snapshot error.
fn unresolved_reports(desired: &Descriptor, err: &StoreError, cancelled: bool) -> Vec<ActionReport> {
    desired
        .tables()
        .iter()
        .map(|spec| {
            let outcome = if cancelled {
                Outcome::NotAttempted
            } else {
                let kind = if err.is_retryable() {
                    FailureKind::Transient
                } else {
                    FailureKind::Permanent
                };
                Outcome::Failed(Failure::new(
                    kind,
                    format!("existing schema unreadable: {}", err),
                ))
            };
            ActionReport {
                table: spec.name().to_string(),
                action: ActionKind::Unresolved,
                outcome,
                attempts: 0,
            }
        })
        .collect()
}
