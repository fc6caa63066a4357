//! sqlwork - unit-of-work change tracking with batched SQL commits.
//!
//! sqlwork keeps a snapshot of every entity that enters an object scope. On
//! commit it diffs the live object graph against that snapshot and sends
//! one batch to the database:
//!
//! - INSERTs for new entities, parents before children
//! - UPDATEs for changed scalar properties, one per entity
//! - DELETEs for removed entities, children before parents
//!
//! Keys generated by the server come back through a correlation table and
//! are written into the graph, then cascaded into nested entities that
//! carry the same property.
//!
//! # Quick Start
//!
//! ```ignore
//! use sqlwork::prelude::*;
//!
//! async fn rename(cx: &Cx, conn: &impl Connection, customer: Customer) -> Result<Customer> {
//!     let mut scope = ObjectScope::new();
//!     scope.begin(ScopeOptions::new().transactional(true));
//!
//!     let mut customer = scope.track(customer)?;
//!     customer.name = "Acme Inc".to_string();
//!
//!     match scope.commit(cx, conn, &mut customer).await {
//!         Outcome::Ok(_) => {}
//!         Outcome::Err(e) => return Err(e),
//!         Outcome::Cancelled(_) => return Err(Error::Custom("cancelled".into())),
//!         Outcome::Panicked(p) => std::panic::panic_any(p),
//!     }
//!     scope.end()?;
//!     Ok(customer.into_inner())
//! }
//! ```
//!
//! Entities describe themselves by implementing [`Entity`]: a static
//! [`PropertyInfo`] table plus property accessors. Nested lists are matched
//! across versions by [`ContentIdentity::content_hash`].

pub use sqlwork_core::{
    ColumnInfo, Connection, ContentIdentity, Cx, Dialect, Entity, EntityPath, Error, FromValue,
    Outcome, Parameter, PathStep, Property, PropertyInfo, PropertyKind, QueryError,
    QueryErrorKind, Result, Row, ScopeError, ScopeErrorKind, SqlType, TypeError, Value, assign,
    primary_key_hash, resolve_mut,
};

pub use sqlwork_dialect::{
    MysqlDialect, PostgresDialect, SqlDialect, SqlServerDialect, SqliteDialect, dialect_for,
};

pub use sqlwork_session::{
    ChangeNode, ChangeState, ChangeTrackingMode, ChangeTracker, ChangeTree, CommitStatement,
    CommitSummary, CorrelationRow, DiffOptions, EntityRef, NodeId, NodeValue, ObjectKey,
    ObjectScope, ObjectSnapshot, ScopeOptions, ScopeSummary, Tracked, TrackingState,
    TransactionVote, build_commit, cascade, changes, child_first, diff, parent_first,
};

/// Prelude module for convenient imports.
///
/// ```ignore
/// use sqlwork::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        ChangeState,
        ChangeTrackingMode,
        // Core traits and types
        Connection,
        ContentIdentity,
        Cx,
        Entity,
        Error,
        // Object scopes
        ObjectScope,
        Outcome,
        Property,
        PropertyInfo,
        Result,
        ScopeOptions,
        SqlType,
        Tracked,
        Value,
        assign,
        primary_key_hash,
    };
}
