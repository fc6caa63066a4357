//! Named parameters bound into a commit batch.

use crate::types::SqlType;
use crate::value::Value;

/// A bound value destined for one statement of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Parameter name without the dialect prefix
    pub name: String,
    pub value: Value,
    /// Column the value is written to
    pub source_column: &'static str,
    pub sql_type: SqlType,
    /// The server produces this value; it names a scratch variable rather
    /// than a bound input.
    pub is_auto_generated: bool,
}

impl Parameter {
    pub fn new(
        name: impl Into<String>,
        value: Value,
        source_column: &'static str,
        sql_type: SqlType,
    ) -> Self {
        Self {
            name: name.into(),
            value,
            source_column,
            sql_type,
            is_auto_generated: false,
        }
    }

    /// Mark this parameter as server-generated.
    pub fn auto_generated(mut self, value: bool) -> Self {
        self.is_auto_generated = value;
        self
    }
}
