//! Committing a tracked entity.
//!
//! A commit runs in four steps:
//! 1. Diff the live entity against the innermost frame's snapshot and
//!    render the batch (synchronous; the change tree never crosses an
//!    await).
//! 2. Execute the batch in one `Connection::query` call.
//! 3. Write generated keys back through the correlation rows and cascade
//!    them into nested entities.
//! 4. Refresh the outer frame's snapshot when nested, drop this frame's
//!    snapshot and complete the transaction vote.
//!
//! When execution fails or is cancelled the snapshot is kept and the vote
//! is left open, so the surrounding transaction rolls back and the entity
//! can be committed again.

use crate::ObjectKey;
use crate::cascade::cascade;
use crate::change_tracker::ObjectSnapshot;
use crate::diff::{DiffOptions, diff};
use crate::scope::{ChangeTrackingMode, ObjectScope, Tracked, TrackingState, not_tracked};
use crate::statement::{CommitStatement, CorrelationRow, build_commit};
use asupersync::{Cx, Outcome};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlwork_core::{
    Connection, Dialect, Entity, Error, QueryError, QueryErrorKind, Result, Row, TypeError,
    resolve_mut,
};
use sqlwork_dialect::dialect_for;

/// Result of a successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSummary {
    pub mode: ChangeTrackingMode,
    /// A batch was sent to the connection.
    pub executed: bool,
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
    /// Generated keys written back into the graph.
    pub generated: usize,
    /// Nested entities that received a cascaded key.
    pub cascaded: usize,
    /// The outer frame's snapshot was replaced with the committed state.
    pub refreshed_outer: bool,
}

impl CommitSummary {
    fn new(mode: ChangeTrackingMode) -> Self {
        Self {
            mode,
            executed: false,
            inserts: 0,
            updates: 0,
            deletes: 0,
            generated: 0,
            cascaded: 0,
            refreshed_outer: false,
        }
    }
}

impl ObjectScope {
    /// Persist the changes made to `tracked` since its snapshot.
    ///
    /// Precondition failures (no open scope, no snapshot) come back as
    /// `Outcome::Err` with a [`ScopeError`](sqlwork_core::ScopeError).
    #[tracing::instrument(level = "debug", skip_all, fields(serial = tracked.key().serial()))]
    pub async fn commit<C, T>(
        &mut self,
        cx: &Cx,
        conn: &C,
        tracked: &mut Tracked<T>,
    ) -> Outcome<CommitSummary, Error>
    where
        C: Connection,
        T: Entity + Serialize + DeserializeOwned + Send + Sync + 'static,
    {
        let key = tracked.key();
        let (mode, is_new) = match self.begin_commit(key) {
            Ok(v) => v,
            Err(e) => return Outcome::Err(e),
        };
        let mut summary = CommitSummary::new(mode);

        let statement = match mode {
            ChangeTrackingMode::Manual => None,
            ChangeTrackingMode::Automatic | ChangeTrackingMode::Debug => {
                match self.prepare(tracked, conn.dialect(), is_new) {
                    Ok(statement) => Some(statement),
                    Err(e) => {
                        self.set_state(key, TrackingState::Tracked);
                        return Outcome::Err(e);
                    }
                }
            }
        };

        if let Some(statement) = &statement {
            summary.inserts = statement.inserts;
            summary.updates = statement.updates;
            summary.deletes = statement.deletes;

            match mode {
                ChangeTrackingMode::Debug => {
                    tracing::debug!(
                        sql = %statement.sql,
                        parameters = statement.parameters.len(),
                        "Commit statement (debug mode, not executed)"
                    );
                }
                ChangeTrackingMode::Automatic if statement.is_empty() => {
                    tracing::debug!("No changes to commit");
                }
                ChangeTrackingMode::Automatic => {
                    let params = statement.bound_parameters();
                    let rows = match conn.query(cx, &statement.sql, &params).await {
                        Outcome::Ok(rows) => rows,
                        Outcome::Err(e) => {
                            tracing::warn!(error = %e, "Commit batch failed; snapshot kept");
                            self.set_state(key, TrackingState::Tracked);
                            return Outcome::Err(e);
                        }
                        Outcome::Cancelled(r) => {
                            self.set_state(key, TrackingState::Tracked);
                            return Outcome::Cancelled(r);
                        }
                        Outcome::Panicked(p) => {
                            self.set_state(key, TrackingState::Tracked);
                            return Outcome::Panicked(p);
                        }
                    };
                    summary.executed = true;

                    match apply_all(tracked.inner_mut(), statement, &rows) {
                        Ok((generated, cascaded)) => {
                            summary.generated = generated;
                            summary.cascaded = cascaded;
                        }
                        Err(e) => {
                            self.set_state(key, TrackingState::Tracked);
                            return Outcome::Err(e);
                        }
                    }
                }
                ChangeTrackingMode::Manual => {}
            }
        }

        match self.finish_commit(tracked) {
            Ok(refreshed) => summary.refreshed_outer = refreshed,
            Err(e) => {
                self.set_state(key, TrackingState::Tracked);
                return Outcome::Err(e);
            }
        }

        tracing::info!(
            mode = %mode,
            executed = summary.executed,
            inserts = summary.inserts,
            updates = summary.updates,
            deletes = summary.deletes,
            generated = summary.generated,
            "Committed tracked object"
        );
        Outcome::Ok(summary)
    }

    /// Check preconditions and mark the entity as committing.
    fn begin_commit(&mut self, key: ObjectKey) -> Result<(ChangeTrackingMode, bool)> {
        let frame = self.innermost_mut("commit")?;
        if !frame.tracker.is_tracked(&key) {
            return Err(not_tracked(key));
        }
        frame.states.insert(key, TrackingState::Committing);
        Ok((frame.options.change_tracking, frame.options.is_new))
    }

    /// Diff against the snapshot and render the batch.
    fn prepare<T>(
        &mut self,
        tracked: &Tracked<T>,
        dialect: Dialect,
        is_new: bool,
    ) -> Result<CommitStatement>
    where
        T: Entity + DeserializeOwned + Send + Sync + 'static,
    {
        let frame = self.innermost_mut("commit")?;
        let old = frame.tracker.snapshot_of::<T>(&tracked.key())?;
        let tree = diff(
            Some(tracked.inner() as &dyn Entity),
            old.map(|o| o as &dyn Entity),
            &DiffOptions::new().force_new(is_new),
        )?;
        let renderer = dialect_for(dialect);
        build_commit(&tree, renderer.as_ref())
    }

    /// Snapshot bookkeeping after the batch succeeded.
    fn finish_commit<T: Serialize>(&mut self, tracked: &Tracked<T>) -> Result<bool> {
        let key = tracked.key();
        let refreshed = match self
            .frames
            .len()
            .checked_sub(2)
            .and_then(|outer| self.frames.get_mut(outer))
        {
            Some(outer) => outer.tracker.refresh(key, tracked.inner())?,
            None => false,
        };

        let frame = self.innermost_mut("commit")?;
        frame.tracker.discard(&key);
        frame.states.insert(key, TrackingState::Committed);
        if let Some(vote) = frame.transaction.as_mut() {
            vote.complete();
        }
        if refreshed {
            tracing::trace!(serial = key.serial(), "Refreshed outer scope snapshot");
        }
        Ok(refreshed)
    }

    fn set_state(&mut self, key: ObjectKey, state: TrackingState) {
        if let Some(frame) = self.frames.last_mut() {
            frame.states.insert(key, state);
        }
    }
}

/// Apply generated keys as a unit: when any row cannot be applied the
/// entity is put back the way the batch left it.
fn apply_all<T>(value: &mut T, statement: &CommitStatement, rows: &[Row]) -> Result<(usize, usize)>
where
    T: Entity + Serialize + DeserializeOwned,
{
    if rows.is_empty() {
        return apply_generated(value, statement, rows);
    }
    let before = ObjectSnapshot::capture(&*value)?;
    match apply_generated(value, statement, rows) {
        Ok(counts) => Ok(counts),
        Err(e) => {
            match before.restore::<T>() {
                Ok(restored) => *value = restored,
                Err(restore) => {
                    tracing::warn!(error = %restore, "Could not undo partial key assignment");
                }
            }
            Err(e)
        }
    }
}

/// Write generated keys from the correlation rows into the graph under
/// `root` and cascade each key into the nested entities of its owner.
///
/// Every row is decoded and located before the first key is written.
/// Returns (keys written, cascaded assignments).
fn apply_generated(
    root: &mut dyn Entity,
    statement: &CommitStatement,
    rows: &[Row],
) -> Result<(usize, usize)> {
    if statement.correlated > 0 && rows.is_empty() {
        return Err(Error::Query(QueryError {
            kind: QueryErrorKind::NoResult,
            sql: Some(statement.sql.clone()),
            message: format!(
                "batch returned no correlation rows for {} generated keys",
                statement.correlated
            ),
            source: None,
        }));
    }

    let mut resolved = Vec::with_capacity(rows.len());
    for row in rows {
        let row = CorrelationRow::from_row(row)?;
        let path = row
            .statement_index()
            .and_then(|i| statement.inserted.get(i))
            .ok_or_else(|| {
                Error::Custom(format!(
                    "correlation row refers to unknown statement {}",
                    row.statement_id
                ))
            })?;
        let entity = resolve_mut(&mut *root, path).ok_or_else(|| {
            Error::Custom(format!(
                "entity inserted by statement {} is no longer in the graph",
                row.statement_id
            ))
        })?;
        if entity.property_info(&row.property_name).is_none() {
            return Err(Error::Custom(format!(
                "{} has no property '{}' for the key generated by statement {}",
                entity.table_name(),
                row.property_name,
                row.statement_id
            )));
        }
        resolved.push((row, path));
    }

    let mut generated = 0;
    let mut cascaded = 0;
    for (row, path) in resolved {
        let Some(entity) = resolve_mut(&mut *root, path) else {
            continue;
        };
        if !entity.set_property(&row.property_name, row.generated_id.clone()) {
            return Err(Error::Type(TypeError {
                expected: "generated key",
                actual: row.generated_id.type_name().to_string(),
                column: Some(row.property_name),
            }));
        }
        generated += 1;
        cascaded += cascade(entity, &row.property_name, &row.generated_id);
        tracing::trace!(
            statement_id = row.statement_id,
            property = %row.property_name,
            "Assigned generated key"
        );
    }
    Ok((generated, cascaded))
}
