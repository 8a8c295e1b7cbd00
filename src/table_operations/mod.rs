//! Table management operations for DynamoDB.
//!
//! This module provides the table lifecycle calls the bootstrap issues:
//! - `list` - List every table name, following pagination
//! - `describe` - Fetch a table's key schema and status
//! - `create` - Create a table from a `TableSpec`
//! - `wait` - Wait for a table to become active

mod create;
mod describe;
mod list;
mod wait;

pub use create::{build_create_table, create_table};
pub use describe::{describe_table, existing_from_description};
pub use list::{list_all_tables, ping};
pub use wait::{WaitError, wait_for_table_active};
