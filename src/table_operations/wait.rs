//! Wait for a table to become active.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::backoff::Backoff;
use crate::errors::{StoreError, StoreErrorKind};
use crate::store::{TableState, TableStore};

/// Why a wait ended without the table becoming active.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    #[error("table '{table}' still {state} after {waited:?}")]
    Timeout {
        table: String,
        state: TableState,
        waited: Duration,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Poll `describe_table` until `table` reports `ACTIVE`.
///
/// Polls start at `poll_interval` and back off up to 8x that, never
/// sleeping or waiting on a describe past `timeout`. Transient and not-found describe results are
/// retried until the deadline; other failures end the wait.
pub async fn wait_for_table_active(
    store: &dyn TableStore,
    table: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<(), WaitError> {
    let started = Instant::now();
    let deadline = started + timeout;
    let mut backoff = Backoff::new(poll_interval, crate::backoff::DEFAULT_CEILING_FACTOR);
    let mut last_state = TableState::Creating;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let Ok(described) = tokio::time::timeout(remaining, store.describe_table(table)).await else {
            return Err(WaitError::Timeout {
                table: table.to_string(),
                state: last_state,
                waited: started.elapsed(),
            });
        };

        match described {
            Ok(existing) if existing.state == TableState::Active => {
                debug!(table, waited = ?started.elapsed(), "table active");
                return Ok(());
            }
            Ok(existing) => {
                trace!(table, state = %existing.state, "table not active yet");
                last_state = existing.state;
            }
            // Freshly created tables can briefly describe as missing.
            Err(e) if e.is_retryable() || e.kind == StoreErrorKind::NotFound => {
                trace!(table, error = %e, "describe failed while waiting, retrying");
            }
            Err(e) => return Err(WaitError::Store(e)),
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(WaitError::Timeout {
                table: table.to_string(),
                state: last_state,
                waited: now - started,
            });
        }
        tokio::time::sleep(backoff.next_delay().min(deadline - now)).await;
    }
}
