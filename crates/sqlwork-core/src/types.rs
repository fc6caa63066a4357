//! SQL type definitions and mapping.

use crate::value::Value;

/// SQL data types a tracked property can map to.
///
/// Dialects render these into their own type names when declaring
/// scratch variables and correlation table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    // Integer types
    SmallInt,
    Integer,
    BigInt,

    // Floating point
    Real,
    Double,

    // Fixed precision
    Decimal { precision: u8, scale: u8 },

    // Boolean
    Boolean,

    // String types
    VarChar(u32),
    Text,

    // Binary
    Blob,

    // Date/time types
    Date,
    Timestamp,

    // UUID
    Uuid,

    // JSON
    Json,

    // Custom type name
    Custom(&'static str),
}

impl SqlType {
    /// Get the generic SQL type name for this type.
    pub fn sql_name(&self) -> String {
        match self {
            SqlType::SmallInt => "SMALLINT".to_string(),
            SqlType::Integer => "INTEGER".to_string(),
            SqlType::BigInt => "BIGINT".to_string(),
            SqlType::Real => "REAL".to_string(),
            SqlType::Double => "DOUBLE PRECISION".to_string(),
            SqlType::Decimal { precision, scale } => format!("DECIMAL({}, {})", precision, scale),
            SqlType::Boolean => "BOOLEAN".to_string(),
            SqlType::VarChar(len) => format!("VARCHAR({})", len),
            SqlType::Text => "TEXT".to_string(),
            SqlType::Blob => "BLOB".to_string(),
            SqlType::Date => "DATE".to_string(),
            SqlType::Timestamp => "TIMESTAMP".to_string(),
            SqlType::Uuid => "UUID".to_string(),
            SqlType::Json => "JSON".to_string(),
            SqlType::Custom(name) => (*name).to_string(),
        }
    }

    /// Check if this type is an integer type.
    pub const fn is_integer(&self) -> bool {
        matches!(self, SqlType::SmallInt | SqlType::Integer | SqlType::BigInt)
    }

    /// Check if this type is text-based.
    pub const fn is_text(&self) -> bool {
        matches!(self, SqlType::VarChar(_) | SqlType::Text)
    }

    /// The zero value a scratch variable of this type starts from before
    /// the server assigns the generated key.
    pub fn default_value(&self) -> Value {
        match self {
            SqlType::SmallInt | SqlType::Integer => Value::Int(0),
            SqlType::BigInt => Value::BigInt(0),
            SqlType::Real | SqlType::Double => Value::Double(0.0),
            SqlType::Decimal { .. } => Value::Decimal("0".to_string()),
            SqlType::Boolean => Value::Bool(false),
            SqlType::VarChar(_) | SqlType::Text | SqlType::Custom(_) => Value::Text(String::new()),
            SqlType::Blob => Value::Bytes(Vec::new()),
            SqlType::Date => Value::Date(0),
            SqlType::Timestamp => Value::Timestamp(0),
            SqlType::Uuid => Value::Uuid([0; 16]),
            SqlType::Json => Value::Null,
        }
    }
}
