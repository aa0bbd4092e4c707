//! Table reflection from a live database.

use sqlx::PgPool;

use crate::db::models::{ColumnInfo, TableHandle};
use crate::error::{Result, SandboxError};
use crate::sql_constants::{DEFAULT_TABLE_SCHEMA, SELECT_TABLE_COLUMNS};

/// Reflect `table` and, when `expected` is given, check its column names
/// match exactly and in order.
///
/// `table` may be qualified as `schema.table`; unqualified names resolve to
/// `public`.
#[tracing::instrument(skip(pool, expected))]
pub async fn get_table(
    pool: &PgPool,
    table: &str,
    expected: Option<&[&str]>,
) -> Result<TableHandle> {
    let (schema, name) = split_qualified(table);

    let columns: Vec<ColumnInfo> = sqlx::query_as(SELECT_TABLE_COLUMNS)
        .bind(schema)
        .bind(name)
        .fetch_all(pool)
        .await?;

    if columns.is_empty() {
        return Err(SandboxError::TableNotFound(format!("{schema}.{name}")));
    }

    let handle = TableHandle {
        schema: schema.to_string(),
        name: name.to_string(),
        columns,
    };
    tracing::debug!(columns = ?handle.column_names(), "Reflected table");

    if let Some(expected) = expected {
        verify_columns(&handle, expected)?;
    }
    Ok(handle)
}

/// Compare reflected column names with `expected`, order included.
pub fn verify_columns(table: &TableHandle, expected: &[&str]) -> Result<()> {
    let actual = table.column_names();
    if actual == expected {
        return Ok(());
    }
    Err(SandboxError::SchemaMismatch {
        table: table.name.clone(),
        expected: expected.iter().map(|c| c.to_string()).collect(),
        actual: actual.iter().map(|c| c.to_string()).collect(),
    })
}

fn split_qualified(table: &str) -> (&str, &str) {
    match table.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => (schema, name),
        _ => (DEFAULT_TABLE_SCHEMA, table),
    }
}
