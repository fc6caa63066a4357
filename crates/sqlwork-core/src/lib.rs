//! Core types and traits for sqlwork.
//!
//! This crate provides the foundations the change tracker builds on:
//!
//! - `Entity` and `ContentIdentity` traits describing trackable objects
//! - `PropertyInfo` metadata for each tracked property
//! - `Value`, `SqlType` and `Parameter` for bound batch values
//! - `Connection` trait for the execution collaborator
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod entity;
pub mod error;
pub mod parameter;
pub mod row;
pub mod types;
pub mod value;

pub use connection::{Connection, Dialect};
pub use entity::{
    ContentIdentity, Entity, EntityPath, PathStep, Property, PropertyInfo, PropertyKind, assign,
    primary_key_hash, resolve_mut,
};
pub use error::{
    Error, QueryError, QueryErrorKind, Result, ScopeError, ScopeErrorKind, TypeError,
};
pub use parameter::Parameter;
pub use row::{ColumnInfo, FromValue, Row};
pub use types::SqlType;
pub use value::Value;
