//! Entity type registration and reverse relations.

use std::sync::Arc;

use docshift_bson::{Bson, Document};
use docshift_store::ConnectionRegistry;
use tracing::info;

use crate::entity::{shadow_name, Entity, EntityType};
use crate::error::{CoreError, CoreResult};
use crate::manager::Manager;
use crate::shift::ShiftEngine;

/// A reverse relation derived from a reference field: the target type
/// can query the entities that point at it.
#[derive(Debug, Clone)]
struct ReverseRelation {
    /// The referenced type exposing the relation.
    target: String,
    /// The relation name, `{owner}_set` unless the field overrides it.
    related_name: String,
    /// The type whose field declares the reference.
    owner: String,
    /// The declaring field.
    source_field: String,
}

/// The set of entity types an application registers, with the
/// connection registry they resolve through.
///
/// Registration is explicit; nothing is discovered by scanning. The
/// registry derives reverse relations from reference fields as types
/// come in, so a type must be registered before the types that
/// reference it.
pub struct EntityRegistry {
    connections: Arc<dyn ConnectionRegistry>,
    types: Vec<Arc<EntityType>>,
    reverse: Vec<ReverseRelation>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(connections: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            connections,
            types: Vec::new(),
            reverse: Vec::new(),
        }
    }

    /// Registers an entity type and derives reverse relations from
    /// its reference fields.
    ///
    /// # Errors
    ///
    /// Returns a definition error for a duplicate type name, a
    /// reference to an unregistered type, or a reverse relation name
    /// already taken on the target.
    pub fn register(&mut self, entity_type: Arc<EntityType>) -> CoreResult<()> {
        if self.get(entity_type.name()).is_some() {
            return Err(CoreError::definition(format!(
                "entity type `{}` is already registered",
                entity_type.name()
            )));
        }

        let mut derived = Vec::new();
        for (field_name, field) in entity_type.fields().iter() {
            let Some(target) = field.reference_target() else {
                continue;
            };
            if self.get(target.name()).is_none() {
                return Err(CoreError::definition(format!(
                    "`{}.{field_name}` references unregistered type `{}`",
                    entity_type.name(),
                    target.name()
                )));
            }
            let related_name = match field.kind() {
                crate::field::FieldKind::Reference {
                    related_name: Some(name),
                    ..
                } => name.clone(),
                _ => format!("{}_set", entity_type.name()),
            };
            let taken = self
                .reverse
                .iter()
                .chain(derived.iter())
                .any(|r| r.target == target.name() && r.related_name == related_name);
            if taken {
                return Err(CoreError::definition(format!(
                    "reverse relation `{related_name}` already exists on `{}`",
                    target.name()
                )));
            }
            derived.push(ReverseRelation {
                target: target.name().to_owned(),
                related_name,
                owner: entity_type.name().to_owned(),
                source_field: field_name.to_owned(),
            });
        }

        self.reverse.append(&mut derived);
        self.types.push(entity_type);
        Ok(())
    }

    /// Looks up a registered type by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<EntityType>> {
        self.types.iter().find(|t| t.name() == name)
    }

    /// All registered types, in registration order.
    #[must_use]
    pub fn types(&self) -> &[Arc<EntityType>] {
        &self.types
    }

    /// Creates a manager for a registered type.
    ///
    /// # Errors
    ///
    /// Returns an unknown-entity error for unregistered names.
    pub fn manager(&self, name: &str) -> CoreResult<Manager> {
        let entity_type = self
            .get(name)
            .ok_or_else(|| CoreError::unknown_entity(name))?;
        Ok(Manager::new(
            Arc::clone(entity_type),
            Arc::clone(&self.connections),
        ))
    }

    /// Opens a reverse relation: a read-only manager over the
    /// entities whose reference field points at `entity`.
    ///
    /// # Errors
    ///
    /// Returns an unknown-entity error when no relation with that
    /// name exists on the entity's type, and a validation error when
    /// the entity has no identity yet.
    pub fn related(&self, entity: &Entity, related_name: &str) -> CoreResult<Manager> {
        let type_name = entity.entity_type().name();
        let relation = self
            .reverse
            .iter()
            .find(|r| r.target == type_name && r.related_name == related_name)
            .ok_or_else(|| {
                CoreError::unknown_entity(format!("{type_name}.{related_name}"))
            })?;
        let id = entity.id().ok_or_else(|| {
            CoreError::validation(format!(
                "cannot open `{related_name}` on an unsaved `{type_name}` entity"
            ))
        })?;
        let owner = self
            .get(&relation.owner)
            .ok_or_else(|| CoreError::unknown_entity(relation.owner.clone()))?;

        let scope = Document::from([(
            shadow_name(&relation.source_field),
            Bson::ObjectId(id),
        )]);
        Ok(Manager::restricted(
            Arc::clone(owner),
            Arc::clone(&self.connections),
            scope,
        ))
    }

    /// Installs the derived validator on every collection that has
    /// none yet. Collections already carrying one are left for the
    /// shift engine.
    ///
    /// # Errors
    ///
    /// Returns the store's error for any round trip.
    pub fn ensure_collections(&self) -> CoreResult<()> {
        for entity_type in &self.types {
            let Some(validator) = entity_type.validator() else {
                continue;
            };
            let database = self.connections.database(entity_type.db_alias())?;
            let collection = database.collection(entity_type.collection_name());
            if collection.validator_options()?.is_none() {
                collection.replace_validator(validator, entity_type.validation_level())?;
                info!(
                    entity = entity_type.name(),
                    collection = entity_type.collection_name(),
                    "validator installed"
                );
            }
        }
        Ok(())
    }

    /// Runs the shift engine over every registered type, in
    /// registration order. Returns `(type name, shifted)` pairs;
    /// clean types report `false`.
    ///
    /// # Errors
    ///
    /// Stops at the first failing type; earlier shifts stay applied.
    pub fn shift_all(&self) -> CoreResult<Vec<(String, bool)>> {
        let mut results = Vec::with_capacity(self.types.len());
        for entity_type in &self.types {
            let mut engine =
                ShiftEngine::new(Arc::clone(entity_type), Arc::clone(&self.connections));
            let shifted = match engine.shift() {
                Ok(applied) => applied,
                Err(CoreError::NoShiftRequired) => false,
                Err(other) => return Err(other),
            };
            results.push((entity_type.name().to_owned(), shifted));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDescriptor;
    use docshift_store::MemoryRegistry;

    fn owner_type() -> Arc<EntityType> {
        EntityType::builder("owner", "owners")
            .field("name", FieldDescriptor::string())
            .build()
            .unwrap()
    }

    fn car_type(owner: &Arc<EntityType>) -> Arc<EntityType> {
        EntityType::builder("car", "cars")
            .field("make", FieldDescriptor::string())
            .field("owner", FieldDescriptor::reference(Arc::clone(owner)))
            .build()
            .unwrap()
    }

    fn registry() -> (EntityRegistry, Arc<EntityType>, Arc<EntityType>) {
        let connections: Arc<MemoryRegistry> = Arc::new(MemoryRegistry::new());
        let mut registry = EntityRegistry::new(connections);
        let owner = owner_type();
        let car = car_type(&owner);
        registry.register(Arc::clone(&owner)).unwrap();
        registry.register(Arc::clone(&car)).unwrap();
        (registry, owner, car)
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let (mut registry, owner, _) = registry();
        assert!(registry.register(owner).is_err());
    }

    #[test]
    fn references_require_the_target_first() {
        let mut registry = EntityRegistry::new(Arc::new(MemoryRegistry::new()));
        let owner = owner_type();
        let car = car_type(&owner);
        assert!(registry.register(car).is_err());
    }

    #[test]
    fn manager_lookup_by_name() {
        let (registry, _, _) = registry();
        assert!(registry.manager("car").is_ok());
        assert!(matches!(
            registry.manager("boat"),
            Err(CoreError::UnknownEntity { .. })
        ));
    }

    #[test]
    fn reverse_relations_scope_to_the_target() {
        let (registry, _, _) = registry();
        let owners = registry.manager("owner").unwrap();
        let cars = registry.manager("car").unwrap();

        let mut alice = owners.entity_type().instantiate();
        alice.set("name", "Alice").unwrap();
        owners.insert_one(&mut alice).unwrap();

        let mut bob = owners.entity_type().instantiate();
        bob.set("name", "Bob").unwrap();
        owners.insert_one(&mut bob).unwrap();

        for (make, who) in [("Toyota", &alice), ("Honda", &alice), ("Ford", &bob)] {
            let mut car = cars.entity_type().instantiate();
            car.set("make", make).unwrap();
            car.set_reference("owner", who).unwrap();
            cars.insert_one(&mut car).unwrap();
        }

        let alices_cars = registry.related(&alice, "car_set").unwrap();
        assert_eq!(alices_cars.count(Document::new()).unwrap(), 2);

        // Scope survives caller filters.
        assert_eq!(
            alices_cars.count(Document::from([("make", "Ford")])).unwrap(),
            0
        );

        // Reverse relations are read-only.
        assert!(alices_cars.delete_many(Document::new()).is_err());
    }

    #[test]
    fn reverse_relations_require_a_saved_entity() {
        let (registry, owner, _) = registry();
        let unsaved = owner.instantiate();
        assert!(registry.related(&unsaved, "car_set").is_err());
    }

    #[test]
    fn unknown_reverse_relation_names_are_rejected() {
        let (registry, owner, _) = registry();
        let mut alice = owner.instantiate();
        alice.set("name", "Alice").unwrap();
        registry.manager("owner").unwrap().insert_one(&mut alice).unwrap();

        assert!(registry.related(&alice, "boat_set").is_err());
    }

    #[test]
    fn related_name_overrides_the_default() {
        let connections: Arc<MemoryRegistry> = Arc::new(MemoryRegistry::new());
        let mut registry = EntityRegistry::new(connections);
        let owner = owner_type();
        let car = EntityType::builder("car", "cars")
            .field("make", FieldDescriptor::string())
            .field(
                "owner",
                FieldDescriptor::reference(Arc::clone(&owner)).related_name("garage"),
            )
            .build()
            .unwrap();
        registry.register(Arc::clone(&owner)).unwrap();
        registry.register(car).unwrap();

        let owners = registry.manager("owner").unwrap();
        let mut alice = owner.instantiate();
        alice.set("name", "Alice").unwrap();
        owners.insert_one(&mut alice).unwrap();

        assert!(registry.related(&alice, "garage").is_ok());
        assert!(registry.related(&alice, "car_set").is_err());
    }

    #[test]
    fn colliding_reverse_names_are_rejected() {
        let connections: Arc<MemoryRegistry> = Arc::new(MemoryRegistry::new());
        let mut registry = EntityRegistry::new(connections);
        let owner = owner_type();
        registry.register(Arc::clone(&owner)).unwrap();

        // Two references from the same type to the same target both
        // default to `car_set`.
        let car = EntityType::builder("car", "cars")
            .field("owner", FieldDescriptor::reference(Arc::clone(&owner)))
            .field("seller", FieldDescriptor::reference(Arc::clone(&owner)))
            .build()
            .unwrap();
        assert!(registry.register(car).is_err());
    }

    #[test]
    fn ensure_collections_installs_missing_validators() {
        let connections: Arc<dyn ConnectionRegistry> = Arc::new(MemoryRegistry::new());
        let mut registry = EntityRegistry::new(Arc::clone(&connections));
        let owner = owner_type();
        registry.register(Arc::clone(&owner)).unwrap();

        registry.ensure_collections().unwrap();

        let collection = connections
            .database(owner.db_alias())
            .unwrap()
            .collection(owner.collection_name());
        let options = collection.validator_options().unwrap().unwrap();
        assert_eq!(options.schema, owner.validator().unwrap());
    }

    #[test]
    fn shift_all_reports_per_type_outcomes() {
        let (registry, _, _) = registry();
        // Nothing enforced yet, so both types shift.
        let results = registry.shift_all().unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, shifted)| *shifted));

        // A second pass finds everything clean.
        let results = registry.shift_all().unwrap();
        assert!(results.iter().all(|(_, shifted)| !*shifted));
    }
}
