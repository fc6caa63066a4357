//! SQLite dialect.
//!
//! SQLite has no batch variables; `last_insert_rowid()` is read inline.
//! The correlation table is a connection-private TEMP table. It outlives
//! the batch, so the batch drops any leftover copy first and drops its own
//! after selecting it.

use super::{SqlDialect, column_defs};
use sqlwork_core::{Dialect, SqlType, Value};

/// Dialect for SQLite.
pub struct SqliteDialect;

impl SqlDialect for SqliteDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn parameter_prefix(&self) -> &'static str {
        "@"
    }

    fn identifier_escape_start(&self) -> char {
        '"'
    }

    fn identifier_escape_end(&self) -> char {
        '"'
    }

    fn supports_temporary_tables(&self) -> bool {
        false
    }

    fn type_name(&self, sql_type: SqlType) -> String {
        // SQLite type affinity
        match sql_type {
            SqlType::SmallInt | SqlType::Integer | SqlType::BigInt | SqlType::Boolean => {
                "INTEGER".to_string()
            }
            SqlType::Real | SqlType::Double => "REAL".to_string(),
            SqlType::Decimal { .. } => "NUMERIC".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::VarChar(_)
            | SqlType::Text
            | SqlType::Date
            | SqlType::Timestamp
            | SqlType::Uuid
            | SqlType::Json => "TEXT".to_string(),
            SqlType::Custom(name) => name.to_string(),
        }
    }

    fn temporary_table_name(&self, hint: &str) -> String {
        format!("__{}", hint)
    }

    fn create_temporary_table(&self, name: &str, columns: &[(&str, SqlType)]) -> String {
        format!(
            "CREATE TEMP TABLE {} ({})",
            self.quote_identifier(name),
            column_defs(self, columns)
        )
    }

    fn discard_stale_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.quote_identifier(table))
    }

    fn declare_variable(&self, _name: &str, _sql_type: SqlType) -> String {
        String::new()
    }

    fn assign_variable(&self, _name: &str, _value: &Value) -> String {
        String::new()
    }

    fn compute_auto_increment(&self, _name: &str) -> String {
        String::new()
    }

    fn variable_reference(&self, _name: &str) -> String {
        "last_insert_rowid()".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_table_is_dropped_around_the_batch() {
        let d = SqliteDialect;
        assert!(!d.supports_temporary_tables());
        assert_eq!(d.discard_stale_table("__ID"), "DROP TABLE IF EXISTS \"__ID\"");
        assert_eq!(
            d.create_temporary_table("__ID", &[("StatementId", SqlType::Integer)]),
            "CREATE TEMP TABLE \"__ID\" (\"StatementId\" INTEGER)"
        );
        assert_eq!(d.drop_table("__ID"), "DROP TABLE \"__ID\"");
        assert_eq!(d.variable_reference("id_0"), "last_insert_rowid()");
        assert_eq!(d.type_name(SqlType::Boolean), "INTEGER");
    }
}
