//! Reflected entity descriptions.
//!
//! An `EntityType` is built once per Rust type and never changes afterwards;
//! everything else in the crate reads it through an `Arc`.
use std::any::TypeId;
use std::fmt;

/// The in-memory type of a property, as far as query type checking cares.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    Text,
    Timestamp,
    PrimaryKey,
    /// Column holding the primary key of a belongs-to target.
    ForeignKey,
    /// Nullable wrapper around another type.
    Optional(Box<ValueType>),
}

impl ValueType {
    pub fn optional(inner: ValueType) -> Self {
        ValueType::Optional(Box::new(inner))
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, ValueType::Optional(_))
    }

    /// Strip any `Optional` wrappers.
    pub fn base(&self) -> &ValueType {
        match self {
            ValueType::Optional(inner) => inner.base(),
            other => other,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Boolean => write!(f, "boolean"),
            ValueType::Integer => write!(f, "integer"),
            ValueType::Float => write!(f, "float"),
            ValueType::Text => write!(f, "text"),
            ValueType::Timestamp => write!(f, "timestamp"),
            ValueType::PrimaryKey => write!(f, "primary key"),
            ValueType::ForeignKey => write!(f, "foreign key"),
            ValueType::Optional(inner) => write!(f, "optional {}", inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub column: String,
    pub value_type: ValueType,
    pub nullable: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, column: impl Into<String>, value_type: ValueType) -> Self {
        let nullable = value_type.is_nullable();
        Self {
            name: name.into(),
            column: column.into(),
            value_type,
            nullable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationKind {
    /// The foreign key is a column of the owning entity's relation.
    BelongsTo,
    /// The foreign key is a column of the target's relation.
    HasMany,
    /// As `HasMany`, with at most one target row per owner.
    HasOne,
}

/// Forward reference to the entity on the other side of an association.
/// Resolved against a registry when a query is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationTarget {
    pub type_id: TypeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub kind: AssociationKind,
    pub local_property: String,
    pub foreign_key: String,
    pub target: AssociationTarget,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub name: String,
    pub relation: String,
    /// Name of the primary-key property; always one of `properties`.
    pub primary_key: String,
    pub properties: Vec<Property>,
    pub associations: Vec<Association>,
}

impl EntityType {
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_by_column(&self, column: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.column == column)
    }

    pub fn primary_key(&self) -> &Property {
        self.property(&self.primary_key)
            .unwrap_or_else(|| panic!("entity `{}` lost its primary key", self.name))
    }

    pub fn association(&self, name: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.local_property == name)
    }

    /// Resolve a property by name, falling back to the foreign-key column of a
    /// belongs-to association with that name (`author` → `author_id`).
    pub fn resolve_property(&self, name: &str) -> Option<&Property> {
        self.property(name).or_else(|| {
            self.association(name)
                .filter(|a| a.kind == AssociationKind::BelongsTo)
                .and_then(|a| self.property_by_column(&a.foreign_key))
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.properties.iter().map(|p| p.column.as_str())
    }
}
