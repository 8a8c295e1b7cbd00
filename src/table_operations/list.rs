//! List tables operation.

use aws_sdk_dynamodb::Client;
use tracing::trace;

use crate::errors::{StoreError, map_sdk_error};

/// Page size for `ListTables`; 100 is the service maximum.
const LIST_PAGE_SIZE: i32 = 100;

/// Guard against endpoints that keep returning the same cursor.
const MAX_PAGES: usize = 1000;

/// Makes a `ListTables` call with `limit = 1` to verify the endpoint
/// answers. An empty table list is a valid answer.
pub async fn ping(client: &Client) -> Result<(), StoreError> {
    client
        .list_tables()
        .limit(1)
        .send()
        .await
        .map(|_| ())
        .map_err(|e| map_sdk_error(e, None))
}

/// List every table name, following `LastEvaluatedTableName`.
pub async fn list_all_tables(client: &Client) -> Result<Vec<String>, StoreError> {
    let mut names = Vec::new();
    let mut start: Option<String> = None;

    for page in 0..MAX_PAGES {
        let output = client
            .list_tables()
            .limit(LIST_PAGE_SIZE)
            .set_exclusive_start_table_name(start.take())
            .send()
            .await
            .map_err(|e| map_sdk_error(e, None))?;

        names.extend(output.table_names().iter().cloned());
        trace!(page, total = names.len(), "listed tables page");

        match output.last_evaluated_table_name() {
            Some(last) => start = Some(last.to_string()),
            None => return Ok(names),
        }
    }

    Err(StoreError::malformed(format!(
        "ListTables did not finish after {} pages",
        MAX_PAGES
    )))
}
