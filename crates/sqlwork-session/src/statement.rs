//! Turning a change tree into one executable SQL batch.
//!
//! The batch runs in three phases:
//! - INSERT every new entity, parents first. Entities with a
//!   server-generated key record that key in a correlation table, which the
//!   batch selects once all inserts are done.
//! - UPDATE each entity with dirty scalar properties, one statement per
//!   entity.
//! - DELETE every removed entity, children first.
//!
//! Statement ids number the emitted statements in order. An inserted
//! entity's statement id is its position in [`CommitStatement::inserted`],
//! which is how generated keys find their way back after execution.

use crate::change_tree::{ChangeState, ChangeTree, NodeId};
use crate::traversal::{child_first, parent_first};
use indexmap::IndexMap;
use sqlwork_core::{
    Entity, EntityPath, Error, Parameter, Property, PropertyInfo, Result, Row, SqlType, Value,
};
use sqlwork_dialect::SqlDialect;
use std::collections::HashMap;

/// Hint passed to the dialect to name the correlation table.
const CORRELATION_TABLE_HINT: &str = "ID";

/// A rendered commit batch.
#[derive(Debug, Clone, Default)]
pub struct CommitStatement {
    /// `;`-terminated statements, one per line.
    pub sql: String,
    /// Every parameter the batch references, in emission order. Entries
    /// flagged `is_auto_generated` name batch variables and are not bound.
    pub parameters: Vec<Parameter>,
    /// Paths of inserted entities; the index is the statement id.
    pub inserted: Vec<EntityPath>,
    /// Name of the correlation table, when the batch inserts anything.
    pub correlation_table: Option<String>,
    pub inserts: usize,
    pub updates: usize,
    pub deletes: usize,
    /// Inserts that report a generated key through the correlation table.
    pub correlated: usize,
}

impl CommitStatement {
    /// Nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    /// Parameters the connection must bind.
    pub fn bound_parameters(&self) -> Vec<Parameter> {
        self.parameters
            .iter()
            .filter(|p| !p.is_auto_generated)
            .cloned()
            .collect()
    }

    /// Number of INSERT, UPDATE and DELETE statements for entities.
    pub fn statement_count(&self) -> usize {
        self.inserts + self.updates + self.deletes
    }
}

/// One row of the correlation table: the key generated by one insert.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationRow {
    pub statement_id: i32,
    pub generated_id: Value,
    /// Batch variable that held the key.
    pub parameter_name: String,
    /// Property the key belongs to.
    pub property_name: String,
}

impl CorrelationRow {
    /// Column names of the correlation table.
    pub const COLUMNS: [&'static str; 4] =
        ["StatementId", "GeneratedId", "ParameterName", "PropertyName"];

    /// Decode a row returned by the batch's final select.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            statement_id: row.get_named("StatementId")?,
            generated_id: row.get_named("GeneratedId")?,
            parameter_name: row.get_named("ParameterName")?,
            property_name: row.get_named("PropertyName")?,
        })
    }

    /// Position of the producing insert in [`CommitStatement::inserted`].
    pub fn statement_index(&self) -> Option<usize> {
        usize::try_from(self.statement_id).ok()
    }
}

/// Render the statements that persist `tree`.
#[tracing::instrument(level = "debug", skip_all, fields(dialect = %dialect.dialect()))]
pub fn build_commit(tree: &ChangeTree<'_>, dialect: &dyn SqlDialect) -> Result<CommitStatement> {
    let mut builder = Builder {
        tree,
        dialect,
        fragments: Vec::new(),
        statement: CommitStatement::default(),
        statement_id: 0,
        generated: HashMap::new(),
    };
    builder.inserts()?;
    builder.updates()?;
    builder.deletes()?;
    Ok(builder.finish())
}

struct Builder<'t, 'a> {
    tree: &'t ChangeTree<'a>,
    dialect: &'t dyn SqlDialect,
    fragments: Vec<String>,
    statement: CommitStatement,
    statement_id: usize,
    /// Inserted nodes with a generated key: statement id and property name.
    generated: HashMap<NodeId, (usize, &'static str)>,
}

impl Builder<'_, '_> {
    fn push(&mut self, fragment: String) {
        if !fragment.is_empty() {
            self.fragments.push(fragment);
        }
    }

    fn inserts(&mut self) -> Result<()> {
        let tree = self.tree;
        let dialect = self.dialect;
        let nodes = parent_first(tree, tree.root_id(), |n| {
            n.state == ChangeState::New && n.is_object()
        });

        for id in nodes {
            let Some(entity_ref) = tree.node(id).entity() else {
                continue;
            };
            let entity = entity_ref.entity;
            let Some(path) = entity_ref.path.clone() else {
                return Err(Error::InvalidArgument(format!(
                    "new {} entity is not part of the tracked graph",
                    entity.table_name()
                )));
            };
            let auto = entity.auto_generated_property();
            let table = self.correlation_table(auto);
            let sid = self.statement_id;

            let mut columns: Vec<(&str, String)> = Vec::new();
            for property in entity.properties().iter().filter(|p| p.is_simple()) {
                if property.auto_generated {
                    continue;
                }
                let value = bindable(scalar(entity, property.name));
                if value.is_null() {
                    if let Some(expr) = self.generated_reference(id, property.name, &table) {
                        columns.push((property.column_name, expr));
                        continue;
                    }
                }
                let name = format!("{}_{}", property.parameter_base(), sid);
                columns.push((property.column_name, dialect.parameter_reference(&name)));
                self.statement.parameters.push(Parameter::new(
                    name,
                    value,
                    property.column_name,
                    property.sql_type,
                ));
            }

            if let Some(auto) = auto {
                let variable = format!("{}_{}", auto.parameter_base(), sid);
                self.push(dialect.declare_variable(&variable, auto.sql_type));
                self.push(dialect.assign_variable(&variable, &auto.sql_type.default_value()));
                self.push(dialect.insert_statement(entity.table_name(), &columns));
                self.push(dialect.compute_auto_increment(&variable));
                let row = [
                    (CorrelationRow::COLUMNS[0], sid.to_string()),
                    (CorrelationRow::COLUMNS[1], dialect.variable_reference(&variable)),
                    (
                        CorrelationRow::COLUMNS[2],
                        dialect.literal(&Value::Text(variable.clone())),
                    ),
                    (
                        CorrelationRow::COLUMNS[3],
                        dialect.literal(&Value::Text(auto.name.to_string())),
                    ),
                ];
                self.push(dialect.insert_statement(&table, &row));
                self.statement.parameters.push(
                    Parameter::new(variable, Value::Null, auto.column_name, auto.sql_type)
                        .auto_generated(true),
                );
                self.generated.insert(id, (sid, auto.name));
                self.statement.correlated += 1;
            } else {
                self.push(dialect.insert_statement(entity.table_name(), &columns));
            }

            tracing::trace!(
                table = entity.table_name(),
                statement_id = sid,
                generated_key = auto.map(|p| p.name),
                "Insert"
            );
            self.statement.inserted.push(path);
            self.statement.inserts += 1;
            self.statement_id += 1;
        }

        if let Some(table) = self.statement.correlation_table.clone() {
            self.push(dialect.select_all(&table));
            if !dialect.supports_temporary_tables() {
                self.push(dialect.drop_table(&table));
            }
        }
        Ok(())
    }

    /// Create the correlation table on first use and return its name.
    fn correlation_table(&mut self, auto: Option<&'static PropertyInfo>) -> String {
        if let Some(table) = &self.statement.correlation_table {
            return table.clone();
        }
        let name = self.dialect.temporary_table_name(CORRELATION_TABLE_HINT);
        let generated_type = auto.map_or(SqlType::Text, |p| p.sql_type);
        let columns = [
            (CorrelationRow::COLUMNS[0], SqlType::Integer),
            (CorrelationRow::COLUMNS[1], generated_type),
            (CorrelationRow::COLUMNS[2], SqlType::VarChar(255)),
            (CorrelationRow::COLUMNS[3], SqlType::VarChar(255)),
        ];
        let stale = self.dialect.discard_stale_table(&name);
        self.push(stale);
        let create = self.dialect.create_temporary_table(&name, &columns);
        self.push(create);
        self.statement.correlation_table = Some(name.clone());
        name
    }

    /// Sub-select reading the key generated for the nearest inserted
    /// ancestor whose generated property is called `property`.
    fn generated_reference(&self, id: NodeId, property: &str, table: &str) -> Option<String> {
        let (sid, _) = self
            .tree
            .ancestors(id)
            .filter_map(|ancestor| self.generated.get(&ancestor))
            .find(|(_, name)| *name == property)?;
        let d = self.dialect;
        Some(format!(
            "(SELECT {} FROM {} WHERE {} = {})",
            d.quote_identifier(CorrelationRow::COLUMNS[1]),
            d.quote_identifier(table),
            d.quote_identifier(CorrelationRow::COLUMNS[0]),
            sid
        ))
    }

    fn updates(&mut self) -> Result<()> {
        let tree = self.tree;
        let dialect = self.dialect;
        let leaves = parent_first(tree, tree.root_id(), |n| {
            n.state == ChangeState::Dirty && n.is_simple_leaf()
        });

        let mut groups: IndexMap<NodeId, Vec<NodeId>> = IndexMap::new();
        for leaf in leaves {
            if let Some(parent) = tree.parent(leaf) {
                groups.entry(parent).or_default().push(leaf);
            }
        }

        for (parent, leaves) in groups {
            let Some(entity_ref) = tree.node(parent).entity() else {
                continue;
            };
            let entity = entity_ref.entity;
            let sid = self.statement_id;

            let mut assignments: Vec<(&str, String)> = Vec::new();
            let mut parameters = Vec::new();
            for leaf in leaves {
                let node = tree.node(leaf);
                let Some(property) = node.property_name().and_then(|n| entity.property_info(n))
                else {
                    tracing::trace!(
                        table = entity.table_name(),
                        property = node.property_name(),
                        "Skipping unmapped property"
                    );
                    continue;
                };
                let value = node.scalar().cloned().map_or(Value::Null, bindable);
                let name = format!("{}_{}", property.parameter_base(), sid);
                assignments.push((property.column_name, dialect.parameter_reference(&name)));
                parameters.push(Parameter::new(
                    name,
                    value,
                    property.column_name,
                    property.sql_type,
                ));
            }
            if assignments.is_empty() {
                continue;
            }

            self.statement.parameters.extend(parameters);
            let key = self.key_parameters(entity, sid)?;
            self.push(dialect.update_statement(entity.table_name(), &assignments, &key));
            tracing::trace!(
                table = entity.table_name(),
                statement_id = sid,
                columns = assignments.len(),
                "Update"
            );
            self.statement.updates += 1;
            self.statement_id += 1;
        }
        Ok(())
    }

    fn deletes(&mut self) -> Result<()> {
        let tree = self.tree;
        let dialect = self.dialect;
        let nodes = child_first(tree, tree.root_id(), |n| {
            n.state == ChangeState::Deleted && n.is_object()
        });

        for id in nodes {
            let Some(entity_ref) = tree.node(id).entity() else {
                continue;
            };
            let entity = entity_ref.entity;
            let sid = self.statement_id;
            let key = self.key_parameters(entity, sid)?;
            self.push(dialect.delete_statement(entity.table_name(), &key));
            tracing::trace!(table = entity.table_name(), statement_id = sid, "Delete");
            self.statement.deletes += 1;
            self.statement_id += 1;
        }
        Ok(())
    }

    /// Bind the entity's current primary key and return the WHERE pairs.
    fn key_parameters(
        &mut self,
        entity: &dyn Entity,
        sid: usize,
    ) -> Result<Vec<(&'static str, String)>> {
        let key = entity.primary_key();
        if key.is_empty() {
            return Err(Error::InvalidArgument(format!(
                "{} has no primary key; cannot target a single row",
                entity.table_name()
            )));
        }
        let mut pairs = Vec::with_capacity(key.len());
        for (property, value) in key {
            let name = format!("{}_{}", property.parameter_base(), sid);
            pairs.push((property.column_name, self.dialect.parameter_reference(&name)));
            self.statement.parameters.push(Parameter::new(
                name,
                value,
                property.column_name,
                property.sql_type,
            ));
        }
        Ok(pairs)
    }

    fn finish(mut self) -> CommitStatement {
        for fragment in &self.fragments {
            self.statement.sql.push_str(fragment);
            self.statement.sql.push_str(";\n");
        }
        tracing::debug!(
            inserts = self.statement.inserts,
            updates = self.statement.updates,
            deletes = self.statement.deletes,
            correlated = self.statement.correlated,
            parameters = self.statement.parameters.len(),
            "Built commit statement"
        );
        self.statement
    }
}

fn scalar(entity: &dyn Entity, name: &str) -> Value {
    match entity.property(name) {
        Some(Property::Scalar(value)) => value,
        _ => Value::Null,
    }
}

/// Simple lists are stored as one delimited text column.
fn bindable(value: Value) -> Value {
    match value {
        Value::Array(_) => Value::Text(value.to_delimited(",")),
        other => other,
    }
}
