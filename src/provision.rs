//! Applying reconciliation actions to the store.
//!
//! Creates run concurrently up to a bound; every other action is resolved
//! locally without a network call. Results are buffered by position so the
//! returned reports follow action order regardless of completion order.
//! One table's failure never stops its siblings.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::{Backoff, DEFAULT_CEILING_FACTOR};
use crate::diff::{Action, ActionKind};
use crate::errors::{StoreError, StoreErrorKind};
use crate::report::{ActionReport, Failure, FailureKind, Outcome};
use crate::schema::TableSpec;
use crate::store::TableStore;
use crate::table_operations::{WaitError, wait_for_table_active};

/// Provisioning tuning.
#[derive(Debug, Clone)]
pub struct ProvisionConfig {
    /// Maximum creates in flight at once.
    pub concurrency: usize,
    /// Retries after the first create attempt, for transient errors only.
    pub max_retries: u32,
    /// First retry delay; doubles up to 8x.
    pub retry_base: Duration,
    /// Bound on each create call.
    pub call_timeout: Duration,
    /// Poll created tables until `ACTIVE` before reporting them applied.
    pub wait_active: bool,
    pub active_timeout: Duration,
    pub active_poll: Duration,
    /// Report creates as planned without issuing them.
    pub dry_run: bool,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 5,
            retry_base: Duration::from_millis(200),
            call_timeout: Duration::from_secs(5),
            wait_active: false,
            active_timeout: Duration::from_secs(60),
            active_poll: Duration::from_millis(250),
            dry_run: false,
        }
    }
}

/// Executes actions against a [`TableStore`].
#[derive(Clone)]
pub struct Provisioner {
    store: Arc<dyn TableStore>,
    config: ProvisionConfig,
}

impl std::fmt::Debug for Provisioner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provisioner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Provisioner {
    pub fn new(store: Arc<dyn TableStore>, config: ProvisionConfig) -> Self {
        Self { store, config }
    }

    /// Apply `actions`, returning one report per action in the same order.
    ///
    /// Once `cancel` fires no new creates are issued: creates not yet
    /// started are reported `NotAttempted`, in-flight ones finish.
    pub async fn apply(&self, actions: Vec<Action>, cancel: &CancellationToken) -> Vec<ActionReport> {
        let tables: Vec<String> = actions.iter().map(|a| a.table().to_string()).collect();
        let mut slots: Vec<Option<ActionReport>> = vec![None; actions.len()];
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, action) in actions.into_iter().enumerate() {
            let spec = match action {
                Action::Skip { name, reason } => {
                    debug!(table = %name, %reason, "skipping");
                    slots[index] = Some(local_report(name, ActionKind::Skip, Outcome::AlreadyExists));
                    continue;
                }
                Action::Conflict {
                    name,
                    expected,
                    actual,
                } => {
                    let detail = format!(
                        "key schema mismatch: expected {}, found {}",
                        expected, actual
                    );
                    warn!(table = %name, %expected, %actual, "key schema conflict");
                    slots[index] = Some(local_report(
                        name,
                        ActionKind::Conflict,
                        Outcome::Failed(Failure::new(FailureKind::Conflict, detail)),
                    ));
                    continue;
                }
                Action::Create(spec) if self.config.dry_run => {
                    info!(table = spec.name(), key = %spec.key(), "dry run: would create");
                    slots[index] = Some(local_report(
                        spec.name().to_string(),
                        ActionKind::Create,
                        Outcome::Planned,
                    ));
                    continue;
                }
                Action::Create(spec) => spec,
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = permits.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                debug!(table = spec.name(), "cancelled before create");
                slots[index] = Some(local_report(
                    spec.name().to_string(),
                    ActionKind::Create,
                    Outcome::NotAttempted,
                ));
                continue;
            };

            let store = Arc::clone(&self.store);
            let config = self.config.clone();
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let report = create_one(store.as_ref(), &spec, &config, &cancel).await;
                drop(permit);
                (index, report)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, report)) => slots[index] = Some(report),
                Err(e) => error!(error = %e, "provisioning task did not complete"),
            }
        }

        slots
            .into_iter()
            .zip(tables)
            .map(|(slot, table)| {
                slot.unwrap_or_else(|| ActionReport {
                    table,
                    action: ActionKind::Create,
                    outcome: Outcome::Failed(Failure::new(
                        FailureKind::Permanent,
                        "provisioning task aborted",
                    )),
                    attempts: 0,
                })
            })
            .collect()
    }
}

fn local_report(table: String, action: ActionKind, outcome: Outcome) -> ActionReport {
    ActionReport {
        table,
        action,
        outcome,
        attempts: 0,
    }
}

/// Result of re-describing a table after the store said it is in use.
enum InUseResolution {
    Settled(Outcome),
    Retry(StoreError),
}

/// Issue the create for one table, retrying transient failures.
async fn create_one(
    store: &dyn TableStore,
    spec: &TableSpec,
    config: &ProvisionConfig,
    cancel: &CancellationToken,
) -> ActionReport {
    let table = spec.name();
    let mut backoff = Backoff::new(config.retry_base, DEFAULT_CEILING_FACTOR);
    let mut attempts = 0u32;

    let outcome = loop {
        attempts += 1;
        let result = match tokio::time::timeout(config.call_timeout, store.create_table(spec)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::transient(format!(
                "CreateTable timed out after {:?}",
                config.call_timeout
            ))),
        };

        let err = match result {
            Ok(()) => {
                info!(table, attempts, "table created");
                break confirm_active(store, table, config).await;
            }
            Err(e) if e.kind == StoreErrorKind::InUse => match resolve_in_use(store, spec).await {
                InUseResolution::Settled(outcome) => break outcome,
                InUseResolution::Retry(e) => e,
            },
            Err(e) if e.is_retryable() => e,
            Err(e) => {
                warn!(table, error = %e, "create rejected");
                break Outcome::Failed(Failure::new(FailureKind::Permanent, e.message));
            }
        };

        if attempts > config.max_retries {
            warn!(table, attempts, error = %err, "create retries exhausted");
            break Outcome::Failed(Failure::new(
                FailureKind::Transient,
                format!("gave up after {} attempts: {}", attempts, err),
            ));
        }

        let delay = backoff.next_delay();
        debug!(table, attempts, ?delay, error = %err, "transient create failure, retrying");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                break Outcome::Failed(Failure::new(
                    FailureKind::Cancelled,
                    format!("cancelled after {} attempts: {}", attempts, err),
                ));
            }
            _ = tokio::time::sleep(delay) => {}
        }
    };

    ActionReport {
        table: table.to_string(),
        action: ActionKind::Create,
        outcome,
        attempts,
    }
}

/// The table appeared between snapshot and create, e.g. a concurrent
/// bootstrap won the race. Decide from its live definition.
async fn resolve_in_use(store: &dyn TableStore, spec: &TableSpec) -> InUseResolution {
    match store.describe_table(spec.name()).await {
        Ok(existing) if existing.has_key_schema(spec.key()) => {
            info!(table = spec.name(), "table created concurrently, already exists");
            InUseResolution::Settled(Outcome::AlreadyExists)
        }
        Ok(existing) => InUseResolution::Settled(Outcome::Failed(Failure::new(
            FailureKind::Conflict,
            format!(
                "key schema mismatch: expected {}, found {}",
                spec.key(),
                existing.key_schema()
            ),
        ))),
        Err(e) => InUseResolution::Retry(StoreError::transient(format!(
            "table reported in use but could not be described: {}",
            e
        ))),
    }
}

async fn confirm_active(store: &dyn TableStore, table: &str, config: &ProvisionConfig) -> Outcome {
    if !config.wait_active {
        return Outcome::Applied;
    }
    match wait_for_table_active(store, table, config.active_poll, config.active_timeout).await {
        Ok(()) => Outcome::Applied,
        Err(e @ WaitError::Timeout { .. }) => {
            warn!(table, error = %e, "table did not become active");
            Outcome::Failed(Failure::new(FailureKind::Timeout, e.to_string()))
        }
        Err(WaitError::Store(e)) => {
            let kind = if e.is_retryable() {
                FailureKind::Transient
            } else {
                FailureKind::Permanent
            };
            Outcome::Failed(Failure::new(kind, format!("created, but {}", e)))
        }
    }
}
