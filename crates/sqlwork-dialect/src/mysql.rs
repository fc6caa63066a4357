//! MySQL dialect.
//!
//! MySQL user variables need no declaration; `LAST_INSERT_ID()` is
//! connection-scoped, which is what a single-batch commit needs.
//!
//! `@name` is a session user variable in MySQL, so bound parameters use
//! `:name` instead. The connection binds them by name.

use super::{SqlDialect, column_defs};
use sqlwork_core::{Dialect, SqlType, Value};

/// Dialect for MySQL and MariaDB.
pub struct MysqlDialect;

impl SqlDialect for MysqlDialect {
    fn dialect(&self) -> Dialect {
        Dialect::Mysql
    }

    fn parameter_prefix(&self) -> &'static str {
        ":"
    }

    fn identifier_escape_start(&self) -> char {
        '`'
    }

    fn identifier_escape_end(&self) -> char {
        '`'
    }

    fn supports_temporary_tables(&self) -> bool {
        true
    }

    fn type_name(&self, sql_type: SqlType) -> String {
        match sql_type {
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INT".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "FLOAT".to_string(),
            SqlType::Double => "DOUBLE".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
            SqlType::Boolean => "TINYINT(1)".to_string(),
            SqlType::VarChar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Timestamp => "DATETIME(6)".to_string(),
            SqlType::Uuid => "CHAR(36)".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Custom(name) => name.to_string(),
        }
    }

    fn temporary_table_name(&self, hint: &str) -> String {
        format!("__{}", hint)
    }

    fn create_temporary_table(&self, name: &str, columns: &[(&str, SqlType)]) -> String {
        format!(
            "CREATE TEMPORARY TABLE {} ({})",
            self.quote_identifier(name),
            column_defs(self, columns)
        )
    }

    fn declare_variable(&self, _name: &str, _sql_type: SqlType) -> String {
        String::new()
    }

    fn assign_variable(&self, name: &str, value: &Value) -> String {
        format!("SET @{} = {}", name, self.literal(value))
    }

    fn compute_auto_increment(&self, name: &str) -> String {
        format!("SET @{} = LAST_INSERT_ID()", name)
    }

    fn variable_reference(&self, name: &str) -> String {
        format!("@{}", name)
    }

    fn default_values_insert(&self, table: &str) -> String {
        format!("INSERT INTO {} () VALUES ()", self.quote_identifier(table))
    }
}
