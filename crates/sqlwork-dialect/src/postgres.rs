//! PostgreSQL dialect.
//!
//! Plain PostgreSQL SQL has no batch variables. The generated key is read
//! with `lastval()` directly in the correlation insert that follows each
//! INSERT, and the correlation table is dropped when the transaction ends.

use super::{SqlDialect, column_defs};
use sqlwork_core::{Dialect, SqlType, Value};

/// Dialect for PostgreSQL.
pub struct PostgresDialect;

impl SqlDialect for PostgresDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn parameter_prefix(&self) -> &'static str {
        ":"
    }

    fn identifier_escape_start(&self) -> char {
        '"'
    }

    fn identifier_escape_end(&self) -> char {
        '"'
    }

    fn supports_temporary_tables(&self) -> bool {
        true
    }

    fn type_name(&self, sql_type: SqlType) -> String {
        match sql_type {
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal { precision, scale } => format!("NUMERIC({}, {})", precision, scale),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::VarChar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BYTEA".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Json => "JSONB".to_string(),
            SqlType::Custom(name) => name.to_string(),
        }
    }

    fn temporary_table_name(&self, hint: &str) -> String {
        format!("__{}", hint)
    }

    fn create_temporary_table(&self, name: &str, columns: &[(&str, SqlType)]) -> String {
        format!(
            "CREATE TEMP TABLE {} ({}) ON COMMIT DROP",
            self.quote_identifier(name),
            column_defs(self, columns)
        )
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
        "lastval()".to_string()
    }

    fn literal(&self, value: &Value) -> String {
        match value {
            Value::Bool(v) => String::from(if *v { "TRUE" } else { "FALSE" }),
            Value::Bytes(b) => format!("'\\x{}'", super::hex(b)),
            other => super::literal(other),
        }
    }
}
