//! SQL Server dialect.
//!
//! T-SQL has real batch variables and session-scoped `#` temporary tables,
//! so generated keys travel through `DECLARE`d variables and the
//! correlation table disappears with the session.

use super::{SqlDialect, column_defs};
use sqlwork_core::{Dialect, SqlType, Value};

/// Dialect for Microsoft SQL Server.
pub struct SqlServerDialect;

impl SqlDialect for SqlServerDialect {
    fn dialect(&self) -> Dialect {
        Dialect::SqlServer
    }

    fn parameter_prefix(&self) -> &'static str {
        "@"
    }

    fn identifier_escape_start(&self) -> char {
        '['
    }

    fn identifier_escape_end(&self) -> char {
        ']'
    }

    fn supports_temporary_tables(&self) -> bool {
        true
    }

    fn type_name(&self, sql_type: SqlType) -> String {
        match sql_type {
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INT".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "FLOAT".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
            SqlType::Boolean => "BIT".to_string(),
            SqlType::VarChar(len) => format!("NVARCHAR({})", len),
            SqlType::Text | SqlType::Json => "NVARCHAR(MAX)".to_string(),
            SqlType::Blob => "VARBINARY(MAX)".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Timestamp => "DATETIME2".to_string(),
            SqlType::Uuid => "UNIQUEIDENTIFIER".to_string(),
            SqlType::Custom(name) => name.to_string(),
        }
    }

    fn temporary_table_name(&self, hint: &str) -> String {
        format!("#__{}", hint)
    }

    fn create_temporary_table(&self, name: &str, columns: &[(&str, SqlType)]) -> String {
        format!(
            "CREATE TABLE {} ({})",
            self.quote_identifier(name),
            column_defs(self, columns)
        )
    }

    fn declare_variable(&self, name: &str, sql_type: SqlType) -> String {
        format!("DECLARE @{} {}", name, self.type_name(sql_type))
    }

    fn assign_variable(&self, name: &str, value: &Value) -> String {
        format!("SET @{} = {}", name, self.literal(value))
    }

    fn compute_auto_increment(&self, name: &str) -> String {
        format!("SET @{} = SCOPE_IDENTITY()", name)
    }

    fn variable_reference(&self, name: &str) -> String {
        format!("@{}", name)
    }
}
