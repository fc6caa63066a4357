//! Tracked entities and their property metadata.
//!
//! An [`Entity`] is a business object the change detector can walk: it
//! describes its properties through a static [`PropertyInfo`] table and
//! exposes each property's current value through [`Entity::property`].
//! Nested entities and nested entity lists are reached the same way, so a
//! whole object graph can be compared against its snapshot without any
//! runtime reflection.

use crate::types::SqlType;
use crate::value::Value;

/// What a property holds, as far as change detection is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// A single column value.
    Scalar,
    /// A list of simple values stored in one column.
    SimpleList,
    /// A single nested entity (its own table).
    Entity,
    /// A list of nested entities (child rows).
    EntityList,
}

/// Metadata about one property of an entity.
#[derive(Debug, Clone, Copy)]
pub struct PropertyInfo {
    /// Rust-side property name
    pub name: &'static str,
    /// Database column name (may differ from property name)
    pub column_name: &'static str,
    /// SQL type for this property
    pub sql_type: SqlType,
    /// Scalar, simple list, nested entity or nested list
    pub kind: PropertyKind,
    /// Whether this property is part of the primary key
    pub primary_key: bool,
    /// Whether the server generates the value on insert
    pub auto_generated: bool,
    /// Parameter name override used when binding this property
    pub parameter_name: Option<&'static str>,
}

impl PropertyInfo {
    /// A scalar property mapped to a column of the same name.
    pub const fn new(name: &'static str, sql_type: SqlType) -> Self {
        Self {
            name,
            column_name: name,
            sql_type,
            kind: PropertyKind::Scalar,
            primary_key: false,
            auto_generated: false,
            parameter_name: None,
        }
    }

    /// A property holding a list of simple values.
    pub const fn simple_list(name: &'static str, sql_type: SqlType) -> Self {
        let mut info = Self::new(name, sql_type);
        info.kind = PropertyKind::SimpleList;
        info
    }

    /// A property holding one nested entity.
    pub const fn entity(name: &'static str) -> Self {
        let mut info = Self::new(name, SqlType::Custom("entity"));
        info.kind = PropertyKind::Entity;
        info
    }

    /// A property holding a list of nested entities.
    pub const fn entity_list(name: &'static str) -> Self {
        let mut info = Self::new(name, SqlType::Custom("entity list"));
        info.kind = PropertyKind::EntityList;
        info
    }

    /// Set the database column name.
    pub const fn column(mut self, name: &'static str) -> Self {
        self.column_name = name;
        self
    }

    /// Set whether this is a primary key.
    pub const fn primary_key(mut self, value: bool) -> Self {
        self.primary_key = value;
        self
    }

    /// Set whether the server generates this value.
    pub const fn auto_generated(mut self, value: bool) -> Self {
        self.auto_generated = value;
        self
    }

    /// Override the parameter name used when binding this property.
    pub const fn parameter_name(mut self, name: &'static str) -> Self {
        self.parameter_name = Some(name);
        self
    }

    /// Scalars and simple lists are compared by value; nested entities are
    /// compared recursively.
    pub const fn is_simple(&self) -> bool {
        matches!(self.kind, PropertyKind::Scalar | PropertyKind::SimpleList)
    }

    /// Base name for bound parameters.
    pub fn parameter_base(&self) -> &'static str {
        self.parameter_name.unwrap_or(self.name)
    }
}

/// The value of one property as read from a live or snapshot entity.
pub enum Property<'a> {
    /// Scalar or simple-list value.
    Scalar(Value),
    /// A nested entity, absent when the relationship is empty.
    Entity(Option<&'a dyn Entity>),
    /// A nested entity list, in list order.
    List(Vec<&'a dyn Entity>),
}

impl Property<'_> {
    /// Absent values are skipped by the change detector when both sides
    /// are absent. An empty list still counts as present.
    pub fn is_absent(&self) -> bool {
        match self {
            Property::Scalar(value) => value.is_null(),
            Property::Entity(entity) => entity.is_none(),
            Property::List(_) => false,
        }
    }
}

impl std::fmt::Debug for Property<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Property::Scalar(value) => f.debug_tuple("Scalar").field(value).finish(),
            Property::Entity(entity) => f
                .debug_tuple("Entity")
                .field(&entity.map(|e| e.table_name()))
                .finish(),
            Property::List(items) => f.debug_tuple("List").field(&items.len()).finish(),
        }
    }
}

/// Stable identity used to match entities across two versions of a list.
///
/// The hash must not change when non-identity fields are edited. Entities
/// keyed by their primary key can delegate to [`primary_key_hash`].
pub trait ContentIdentity {
    fn content_hash(&self) -> String;
}

/// A business object whose state can be tracked, diffed and persisted.
pub trait Entity: ContentIdentity + Send + Sync {
    /// The table this entity is stored in.
    fn table_name(&self) -> &'static str;

    /// Ordered property descriptors.
    fn properties(&self) -> &'static [PropertyInfo];

    /// Read a property. `None` when the entity does not expose it.
    fn property(&self, name: &str) -> Option<Property<'_>>;

    /// Assign a scalar property. Returns `false` when the entity has no
    /// such property or the value does not fit it.
    fn set_property(&mut self, name: &str, value: Value) -> bool;

    /// Mutable access to the entities held by a nested property: zero or
    /// one for an entity property, every item in list order for a list.
    fn nested_mut(&mut self, name: &str) -> Vec<&mut dyn Entity> {
        let _ = name;
        Vec::new()
    }

    /// Look up a property descriptor by name.
    fn property_info(&self, name: &str) -> Option<&'static PropertyInfo> {
        self.properties().iter().find(|p| p.name == name)
    }

    /// The first server-generated property, if any.
    fn auto_generated_property(&self) -> Option<&'static PropertyInfo> {
        self.properties().iter().find(|p| p.auto_generated)
    }

    /// Current primary-key values, in property order.
    fn primary_key(&self) -> Vec<(&'static PropertyInfo, Value)> {
        self.properties()
            .iter()
            .filter(|p| p.primary_key)
            .map(|p| {
                let value = match self.property(p.name) {
                    Some(Property::Scalar(value)) => value,
                    _ => Value::Null,
                };
                (p, value)
            })
            .collect()
    }
}

/// Content hash derived from the table name and primary-key values.
pub fn primary_key_hash(entity: &dyn Entity) -> String {
    let key = entity
        .primary_key()
        .iter()
        .map(|(_, value)| value.to_delimited(","))
        .collect::<Vec<_>>()
        .join("|");
    format!("{}:{}", entity.table_name(), key)
}

/// Assign a `Value` into a typed property slot. Returns `false`, leaving the
/// slot untouched, when the value does not convert.
pub fn assign<T>(slot: &mut T, value: Value) -> bool
where
    T: TryFrom<Value>,
{
    match T::try_from(value) {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => false,
    }
}

/// One step from an entity into a nested entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    pub property: &'static str,
    /// Position in the nested list; 0 for a single nested entity.
    pub index: usize,
}

/// Location of a nested entity relative to the tracked root.
pub type EntityPath = Vec<PathStep>;

/// Follow a path from `root` to a nested entity.
pub fn resolve_mut<'a>(root: &'a mut dyn Entity, path: &[PathStep]) -> Option<&'a mut dyn Entity> {
    let Some((first, rest)) = path.split_first() else {
        return Some(root);
    };
    let child = root.nested_mut(first.property).into_iter().nth(first.index)?;
    resolve_mut(child, rest)
}
