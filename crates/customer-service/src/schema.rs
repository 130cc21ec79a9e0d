//! Boot-time schema validation.
//!
//! In `validate` mode the service checks that every table and column it
//! queries exists before accepting work. It never creates or alters schema.

use crate::errors::CustomerError;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

/// Tables and columns the service depends on.
pub const REQUIRED_COLUMNS: &[(&str, &[&str])] = &[(
    "customer",
    &[
        "id",
        "name",
        "email",
        "password",
        "age",
        "gender",
        "profile_image_id",
        "created_at",
    ],
)];

/// Verify the current schema contains every required table and column.
///
/// # Errors
///
/// Returns `CustomerError::SchemaValidation` naming the first table with
/// missing columns.
#[instrument(skip_all, name = "cs.schema.validate")]
pub async fn validate(pool: &PgPool) -> Result<(), CustomerError> {
    for (table, columns) in REQUIRED_COLUMNS {
        let present: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            "#,
        )
        .bind(*table)
        .fetch_all(pool)
        .await?;

        let missing = missing_columns(columns, &present);
        if present.is_empty() {
            warn!(target: "cs.schema", table = %table, "Required table is missing");
            return Err(CustomerError::SchemaValidation(format!(
                "missing table {}",
                table
            )));
        }
        if !missing.is_empty() {
            warn!(target: "cs.schema", table = %table, missing = ?missing, "Required columns are missing");
            return Err(CustomerError::SchemaValidation(format!(
                "table {} is missing columns: {}",
                table,
                missing.join(", ")
            )));
        }
    }

    info!(target: "cs.schema", "Schema validated");
    Ok(())
}

fn missing_columns<'a>(required: &[&'a str], present: &[String]) -> Vec<&'a str> {
    let present: HashSet<&str> = present.iter().map(String::as_str).collect();
    required
        .iter()
        .copied()
        .filter(|column| !present.contains(column))
        .collect()
}
