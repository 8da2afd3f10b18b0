//! Registration blocks for entity types.
use std::any::{self, TypeId};
use std::collections::HashSet;
use std::marker::PhantomData;

use super::types::*;
use crate::error::SchemaError;

/// A Rust type that maps onto a relation.
///
/// # Example
///
/// ```
/// use pgrel::schema::{Entity, EntityTypeBuilder, ValueType};
///
/// struct User;
///
/// impl Entity for User {
///     fn describe(t: &mut EntityTypeBuilder<Self>) {
///         t.property("id", "id", ValueType::PrimaryKey);
///         t.property("email", "email", ValueType::Text);
///     }
/// }
/// ```
pub trait Entity: 'static {
    fn describe(t: &mut EntityTypeBuilder<Self>)
    where
        Self: Sized;
}

/// Collects the declarations of one entity type. Invoked once per type when
/// it is registered.
pub struct EntityTypeBuilder<E> {
    name: String,
    relation: Option<String>,
    properties: Vec<Property>,
    associations: Vec<Association>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> EntityTypeBuilder<E> {
    pub(crate) fn new() -> Self {
        Self {
            name: short_type_name::<E>().to_string(),
            relation: None,
            properties: Vec::new(),
            associations: Vec::new(),
            _entity: PhantomData,
        }
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    pub fn relation(&mut self, table_name: impl Into<String>) -> &mut Self {
        self.relation = Some(table_name.into());
        self
    }

    pub fn property(
        &mut self,
        name: impl Into<String>,
        column: impl Into<String>,
        value_type: ValueType,
    ) -> &mut Self {
        self.properties.push(Property::new(name, column, value_type));
        self
    }

    /// Declare that this entity points at `T` through `key_column`. The key
    /// column becomes a property of this entity as well.
    pub fn belongs_to<T: Entity>(
        &mut self,
        name: impl Into<String>,
        key_column: impl Into<String>,
    ) -> &mut Self {
        let key_column = key_column.into();
        self.associations.push(Association {
            kind: AssociationKind::BelongsTo,
            local_property: name.into(),
            foreign_key: key_column.clone(),
            target: target_of::<T>(),
        });
        self.properties
            .push(Property::new(key_column.clone(), key_column, ValueType::ForeignKey));
        self
    }

    /// Declare that rows of `T` point back at this entity through
    /// `foreign_key`, a column of `T`'s relation.
    pub fn has_many<T: Entity>(
        &mut self,
        name: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> &mut Self {
        self.associations.push(Association {
            kind: AssociationKind::HasMany,
            local_property: name.into(),
            foreign_key: foreign_key.into(),
            target: target_of::<T>(),
        });
        self
    }

    /// Like [`has_many`](Self::has_many) for a single target row.
    pub fn has_one<T: Entity>(
        &mut self,
        name: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> &mut Self {
        self.associations.push(Association {
            kind: AssociationKind::HasOne,
            local_property: name.into(),
            foreign_key: foreign_key.into(),
            target: target_of::<T>(),
        });
        self
    }

    pub(crate) fn build(self) -> Result<EntityType, SchemaError> {
        let mut columns = HashSet::new();
        for property in &self.properties {
            if !columns.insert(property.column.as_str()) {
                return Err(SchemaError::DuplicateColumn {
                    entity: self.name,
                    column: property.column.clone(),
                });
            }
        }

        let mut keys = self
            .properties
            .iter()
            .filter(|p| p.value_type == ValueType::PrimaryKey);
        let primary_key = match (keys.next(), keys.next()) {
            (Some(key), None) => key.name.clone(),
            (None, _) => return Err(SchemaError::MissingPrimaryKey(self.name)),
            (Some(_), Some(_)) => return Err(SchemaError::MultiplePrimaryKeys(self.name)),
        };

        let relation = self
            .relation
            .unwrap_or_else(|| format!("{}s", self.name.to_lowercase()));

        Ok(EntityType {
            name: self.name,
            relation,
            primary_key,
            properties: self.properties,
            associations: self.associations,
        })
    }
}

fn target_of<T: Entity>() -> AssociationTarget {
    AssociationTarget {
        type_id: TypeId::of::<T>(),
        name: short_type_name::<T>().to_string(),
    }
}

/// `my_app::models::Article` → `Article`
pub(crate) fn short_type_name<T>() -> &'static str {
    let full = any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Run an entity's registration block and validate the result.
pub fn describe<E: Entity>() -> Result<EntityType, SchemaError> {
    let mut builder = EntityTypeBuilder::<E>::new();
    E::describe(&mut builder);
    builder.build()
}
