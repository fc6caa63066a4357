//! SQL dialect rendering for commit batches.
//!
//! A commit batch needs more than INSERT/UPDATE/DELETE text: it also
//! declares scratch variables for server-generated keys, reads the key the
//! server produced, and records it in a correlation table that the batch
//! selects at the end. Every one of those fragments is product-specific,
//! so each supported database gets its own [`SqlDialect`].

mod mssql;
mod mysql;
mod postgres;
mod sqlite;

pub use mssql::SqlServerDialect;
pub use mysql::MysqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use sqlwork_core::{Dialect, SqlType, Value};

/// Renders the fragments of a commit batch for one database product.
///
/// Methods return a single statement without a terminator, or an empty
/// string when the product needs no statement for that step. The statement
/// builder skips empty fragments and terminates the rest.
pub trait SqlDialect: Send + Sync {
    /// Which product this dialect renders for.
    fn dialect(&self) -> Dialect;

    /// Prefix of a named parameter reference (`@`, `:`).
    fn parameter_prefix(&self) -> &'static str;

    /// Opening identifier quote.
    fn identifier_escape_start(&self) -> char;

    /// Closing identifier quote.
    fn identifier_escape_end(&self) -> char;

    /// Whether temporary tables vanish on their own. When `false` the
    /// correlation table is dropped at the end of the batch.
    fn supports_temporary_tables(&self) -> bool;

    /// Product type name for a property type.
    fn type_name(&self, sql_type: SqlType) -> String;

    /// Name of the temporary table for a given hint.
    fn temporary_table_name(&self, hint: &str) -> String;

    /// CREATE statement for a temporary table.
    fn create_temporary_table(&self, name: &str, columns: &[(&str, SqlType)]) -> String;

    /// Declare a scratch variable.
    fn declare_variable(&self, name: &str, sql_type: SqlType) -> String;

    /// Assign a value to a scratch variable.
    fn assign_variable(&self, name: &str, value: &Value) -> String;

    /// Store the key generated by the preceding insert in a scratch variable.
    fn compute_auto_increment(&self, name: &str) -> String;

    /// Expression reading the generated key back, right after the insert.
    fn variable_reference(&self, name: &str) -> String;

    /// Quote an identifier (table/column name).
    fn quote_identifier(&self, name: &str) -> String {
        let start = self.identifier_escape_start();
        let end = self.identifier_escape_end();
        let escaped = name.replace(end, &format!("{end}{end}"));
        format!("{start}{escaped}{end}")
    }

    /// Reference to a bound parameter.
    fn parameter_reference(&self, name: &str) -> String {
        format!("{}{}", self.parameter_prefix(), name)
    }

    /// Inline literal for a value.
    fn literal(&self, value: &Value) -> String {
        literal(value)
    }

    /// `INSERT INTO table (columns) VALUES (expressions)`.
    fn insert_statement(&self, table: &str, columns: &[(&str, String)]) -> String {
        if columns.is_empty() {
            return self.default_values_insert(table);
        }
        let names: Vec<String> = columns
            .iter()
            .map(|(column, _)| self.quote_identifier(column))
            .collect();
        let values: Vec<&str> = columns.iter().map(|(_, expr)| expr.as_str()).collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.quote_identifier(table),
            names.join(", "),
            values.join(", ")
        )
    }

    /// Insert a row made only of column defaults.
    fn default_values_insert(&self, table: &str) -> String {
        format!("INSERT INTO {} DEFAULT VALUES", self.quote_identifier(table))
    }

    /// `UPDATE table SET ... WHERE key`.
    fn update_statement(
        &self,
        table: &str,
        assignments: &[(&str, String)],
        key: &[(&str, String)],
    ) -> String {
        let sets: Vec<String> = assignments
            .iter()
            .map(|(column, expr)| format!("{} = {}", self.quote_identifier(column), expr))
            .collect();
        format!(
            "UPDATE {} SET {}{}",
            self.quote_identifier(table),
            sets.join(", "),
            self.where_clause(key)
        )
    }

    /// `DELETE FROM table WHERE key`.
    fn delete_statement(&self, table: &str, key: &[(&str, String)]) -> String {
        format!(
            "DELETE FROM {}{}",
            self.quote_identifier(table),
            self.where_clause(key)
        )
    }

    /// `SELECT * FROM table`.
    fn select_all(&self, table: &str) -> String {
        format!("SELECT * FROM {}", self.quote_identifier(table))
    }

    /// `DROP TABLE table`.
    fn drop_table(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.quote_identifier(table))
    }

    /// Statement run before creating the correlation table, for products
    /// where a table left over from an interrupted batch would otherwise
    /// be reused. Empty when creating the table cannot pick up stale rows.
    fn discard_stale_table(&self, table: &str) -> String {
        let _ = table;
        String::new()
    }

    /// ` WHERE a = x AND b = y`, or nothing for an empty key.
    fn where_clause(&self, key: &[(&str, String)]) -> String {
        if key.is_empty() {
            return String::new();
        }
        let conditions: Vec<String> = key
            .iter()
            .map(|(column, expr)| format!("{} = {}", self.quote_identifier(column), expr))
            .collect();
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// Create the dialect renderer for a database product.
pub fn dialect_for(dialect: Dialect) -> Box<dyn SqlDialect> {
    tracing::trace!(dialect = %dialect, "Selecting SQL dialect");
    match dialect {
        Dialect::SqlServer => Box::new(SqlServerDialect),
        Dialect::Postgres => Box::new(PostgresDialect),
        Dialect::Sqlite => Box::new(SqliteDialect),
        Dialect::Mysql => Box::new(MysqlDialect),
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Standard SQL literal rendering.
fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(v) => String::from(if *v { "1" } else { "0" }),
        Value::Int(v) | Value::Date(v) => v.to_string(),
        Value::BigInt(v) | Value::Timestamp(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Decimal(s) => s.clone(),
        Value::Text(s) => string_literal(s),
        Value::Bytes(b) => format!("X'{}'", hex(b)),
        Value::Uuid(b) => string_literal(&hex(b)),
        Value::Json(v) => string_literal(&v.to_string()),
        Value::Array(_) => string_literal(&value.to_delimited(",")),
    }
}

/// Single-quoted string literal with embedded quotes doubled.
fn string_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Column list of a CREATE TABLE statement.
fn column_defs(dialect: &dyn SqlDialect, columns: &[(&str, SqlType)]) -> String {
    columns
        .iter()
        .map(|(name, sql_type)| {
            format!(
                "{} {}",
                dialect.quote_identifier(name),
                dialect.type_name(*sql_type)
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_for_matches_product() {
        for dialect in [
            Dialect::SqlServer,
            Dialect::Postgres,
            Dialect::Sqlite,
            Dialect::Mysql,
        ] {
            assert_eq!(dialect_for(dialect).dialect(), dialect);
        }
    }

    #[test]
    fn provided_statements() {
        let d = SqliteDialect;
        let insert = d.insert_statement(
            "customers",
            &[("Name", "@Name_0".to_string()), ("Region", "NULL".to_string())],
        );
        assert_eq!(
            insert,
            "INSERT INTO \"customers\" (\"Name\", \"Region\") VALUES (@Name_0, NULL)"
        );

        let update = d.update_statement(
            "customers",
            &[("Name", "@Name_1".to_string())],
            &[("CustomerId", "@CustomerId_1".to_string())],
        );
        assert_eq!(
            update,
            "UPDATE \"customers\" SET \"Name\" = @Name_1 WHERE \"CustomerId\" = @CustomerId_1"
        );

        let delete = d.delete_statement(
            "orders",
            &[
                ("OrderId", "@OrderId_2".to_string()),
                ("Line", "@Line_2".to_string()),
            ],
        );
        assert_eq!(
            delete,
            "DELETE FROM \"orders\" WHERE \"OrderId\" = @OrderId_2 AND \"Line\" = @Line_2"
        );
    }

    #[test]
    fn insert_without_columns_uses_defaults() {
        assert_eq!(
            SqlServerDialect.insert_statement("audit", &[]),
            "INSERT INTO [audit] DEFAULT VALUES"
        );
        assert_eq!(MysqlDialect.insert_statement("audit", &[]), "INSERT INTO `audit` () VALUES ()");
    }

    #[test]
    fn quoting_escapes_closing_character() {
        assert_eq!(SqlServerDialect.quote_identifier("odd]name"), "[odd]]name]");
        assert_eq!(MysqlDialect.quote_identifier("a`b"), "`a``b`");
        assert_eq!(PostgresDialect.quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn literals() {
        assert_eq!(literal(&Value::Text("O'Brien".into())), "'O''Brien'");
        assert_eq!(literal(&Value::Null), "NULL");
        assert_eq!(literal(&Value::Bool(true)), "1");
        assert_eq!(literal(&Value::Bytes(vec![0xab, 0x01])), "X'ab01'");
        assert_eq!(literal(&Value::BigInt(-4)), "-4");
    }
}
