//! Process-wide store of entity types.
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use super::builder::{self, Entity};
use super::types::{Association, EntityType};
use crate::error::SchemaError;

#[derive(Default)]
struct Entries {
    by_type: HashMap<TypeId, Arc<EntityType>>,
    by_name: HashMap<String, TypeId>,
}

/// Holds one `EntityType` per registered Rust type.
///
/// Registration order does not matter, but the registry is sealed by the
/// first successful lookup: new types can no longer be added after that.
#[derive(Default)]
pub struct SchemaRegistry {
    entries: RwLock<Entries>,
    sealed: AtomicBool,
}

static GLOBAL: OnceLock<SchemaRegistry> = OnceLock::new();

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry used by the free-standing `from::<E>()` helper.
    pub fn global() -> &'static SchemaRegistry {
        GLOBAL.get_or_init(SchemaRegistry::new)
    }

    /// Build and store the entity type for `E`. Registering the same type
    /// again returns the stored value.
    pub fn register<E: Entity>(&self) -> Result<Arc<EntityType>, SchemaError> {
        let type_id = TypeId::of::<E>();
        if let Some(existing) = self.read().by_type.get(&type_id) {
            return Ok(Arc::clone(existing));
        }

        let entity = builder::describe::<E>()?;
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have won the race while we were describing.
        if let Some(existing) = entries.by_type.get(&type_id) {
            return Ok(Arc::clone(existing));
        }
        if self.sealed.load(Ordering::Acquire) {
            return Err(SchemaError::RegistrySealed(entity.name));
        }
        if entries.by_name.contains_key(&entity.name) {
            return Err(SchemaError::DuplicateEntityName(entity.name));
        }

        debug!(entity = %entity.name, relation = %entity.relation, "registered entity type");
        let entity = Arc::new(entity);
        entries.by_name.insert(entity.name.clone(), type_id);
        entries.by_type.insert(type_id, Arc::clone(&entity));
        Ok(entity)
    }

    pub fn lookup<E: Entity>(&self) -> Result<Arc<EntityType>, SchemaError> {
        self.lookup_type_id(TypeId::of::<E>())
            .ok_or_else(|| SchemaError::UnknownEntityType(builder::short_type_name::<E>().into()))
    }

    pub fn lookup_by_name(&self, name: &str) -> Result<Arc<EntityType>, SchemaError> {
        let found = {
            let entries = self.read();
            entries
                .by_name
                .get(name)
                .and_then(|type_id| entries.by_type.get(type_id))
                .cloned()
        };
        match found {
            Some(entity) => {
                self.seal();
                Ok(entity)
            }
            None => Err(SchemaError::UnknownEntityType(name.to_string())),
        }
    }

    /// Find the entity on the other side of `association`, declared on `owner`.
    pub fn resolve(
        &self,
        owner: &EntityType,
        association: &Association,
    ) -> Result<Arc<EntityType>, SchemaError> {
        self.lookup_type_id(association.target.type_id)
            .ok_or_else(|| SchemaError::UnresolvedAssociation {
                entity: owner.name.clone(),
                association: association.local_property.clone(),
                target: association.target.name.clone(),
            })
    }

    /// Resolve every association of `entity`, failing on the first target
    /// that was never registered.
    pub fn resolve_all(&self, entity: &EntityType) -> Result<(), SchemaError> {
        for association in &entity.associations {
            self.resolve(entity, association)?;
        }
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.read().by_type.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lookup_type_id(&self, type_id: TypeId) -> Option<Arc<EntityType>> {
        let found = self.read().by_type.get(&type_id).cloned();
        if found.is_some() {
            self.seal();
        }
        found
    }

    fn seal(&self) {
        self.sealed.store(true, Ordering::Release);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Entries> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }
}
