//! Row decoding helpers shared by the repositories.

use std::str::FromStr;

use sqlx::postgres::PgRow;
use sqlx::Row;

use cerebro_core::{Error, Result};

/// Decode a TEXT enumeration column through the type's `FromStr`.
///
/// An unknown value means the schema and the code disagree, so it is an
/// internal error rather than a silent fallback.
pub(crate) fn text_enum<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|e: String| Error::Internal(format!("column {}: {}", column, e)))
}
