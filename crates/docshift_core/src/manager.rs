//! Collection managers and cursor-backed result sets.

use std::sync::Arc;

use docshift_bson::{Bson, Document};
use docshift_store::{
    CollectionHandle, ConnectionRegistry, DeleteAck, DocumentCursor, InsertAck, SortOrder,
    StoreError, UpdateAck,
};
use tracing::debug;

use crate::entity::{shadow_name, Entity, EntityType, ID_FIELD};
use crate::error::{CoreError, CoreResult};

/// The persistence gateway for one entity type.
///
/// A manager owns no connection state of its own; every call resolves
/// the collection through the registry it was constructed with. A
/// restricted manager carries a scope filter merged into every query
/// and rejects all writes; reverse relations hand these out.
pub struct Manager {
    entity_type: Arc<EntityType>,
    connections: Arc<dyn ConnectionRegistry>,
    scope: Option<Document>,
    read_only: bool,
}

impl Manager {
    /// Creates a manager for an entity type.
    #[must_use]
    pub fn new(entity_type: Arc<EntityType>, connections: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            entity_type,
            connections,
            scope: None,
            read_only: false,
        }
    }

    /// Creates a read-only manager whose queries are confined to
    /// `scope`.
    #[must_use]
    pub fn restricted(
        entity_type: Arc<EntityType>,
        connections: Arc<dyn ConnectionRegistry>,
        scope: Document,
    ) -> Self {
        Self {
            entity_type,
            connections,
            scope: Some(scope),
            read_only: true,
        }
    }

    /// The managed entity type.
    #[must_use]
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// Whether writes are rejected.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn guard_write(&self, operation: &str) -> CoreResult<()> {
        if self.read_only {
            return Err(CoreError::operation_not_allowed(format!(
                "{operation} on a read-only manager"
            )));
        }
        Ok(())
    }

    fn collection(&self) -> CoreResult<Arc<dyn CollectionHandle>> {
        let database = self.connections.database(self.entity_type.db_alias())?;
        Ok(database.collection(self.entity_type.collection_name()))
    }

    /// Rewrites reference-field keys to their shadow ids and merges
    /// the manager's scope. Scope entries win over caller entries.
    fn normalize_filter(&self, filter: Document) -> Document {
        let mut out = Document::new();
        for (key, value) in filter {
            let is_reference = self
                .entity_type
                .fields()
                .get(&key)
                .is_some_and(|f| f.is_reference());
            if is_reference {
                out.set(shadow_name(&key), value);
            } else {
                out.set(key, value);
            }
        }
        if let Some(scope) = &self.scope {
            for (key, value) in scope.iter() {
                out.set(key, value.clone());
            }
        }
        out
    }

    /// Runs an equality query and wraps the cursor in a result set.
    ///
    /// # Errors
    ///
    /// Returns the store's error for the round trip.
    pub fn find(&self, filter: Document) -> CoreResult<DocumentSet> {
        let collection = self.collection()?;
        let filter = self.normalize_filter(filter);
        let cursor = collection.find(&filter)?;
        let mut prototype = self.entity_type.instantiate();
        prototype.bind(Arc::clone(&collection));
        Ok(DocumentSet { prototype, cursor })
    }

    /// Returns the first entity matching the filter, if any.
    ///
    /// # Errors
    ///
    /// Returns the store's error for the round trip.
    pub fn find_one(&self, filter: Document) -> CoreResult<Option<Entity>> {
        let collection = self.collection()?;
        let filter = self.normalize_filter(filter);
        let Some(stored) = collection.find_one(&filter)? else {
            return Ok(None);
        };
        let mut entity = self.entity_type.instantiate();
        entity.assign_stored(stored);
        entity.bind(collection);
        Ok(Some(entity))
    }

    /// Counts documents matching the filter.
    ///
    /// # Errors
    ///
    /// Returns the store's error for the round trip.
    pub fn count(&self, filter: Document) -> CoreResult<u64> {
        let collection = self.collection()?;
        let filter = self.normalize_filter(filter);
        Ok(collection.count(&filter)?)
    }

    /// Persists a new entity and assigns the generated identity back
    /// onto it, leaving it clean and connected.
    ///
    /// # Errors
    ///
    /// Returns an invalid-document error listing every missing
    /// required field, a validation error for a type mismatch or a
    /// pre-assigned identity, or the store's error for the write.
    pub fn insert_one(&self, entity: &mut Entity) -> CoreResult<InsertAck> {
        self.guard_write("insert_one")?;
        self.check_type(entity)?;
        if entity.has_explicit_id() {
            return Err(CoreError::validation(
                "identities are assigned on insert and cannot be set by the caller",
            ));
        }
        let errors = entity.missing_required();
        if !errors.is_empty() {
            return Err(CoreError::InvalidDocument { errors });
        }

        let mut payload = Document::new();
        for (path, value) in entity.modified_fields(true) {
            payload.set_path(&path, value);
        }

        let collection = self.collection()?;
        let ack = collection.insert_one(payload)?;
        if !ack.acknowledged {
            return Err(StoreError::unacknowledged("insert_one").into());
        }
        debug!(
            entity = self.entity_type.name(),
            id = %ack.inserted_id,
            "inserted"
        );
        entity.assign_identity(ack.inserted_id);
        entity.mark_clean();
        entity.bind(collection);
        Ok(ack)
    }

    /// Inserts a batch, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first entity's error; earlier entities stay
    /// inserted.
    pub fn insert_many(&self, entities: &mut [Entity]) -> CoreResult<Vec<InsertAck>> {
        self.guard_write("insert_many")?;
        let mut acks = Vec::with_capacity(entities.len());
        for entity in entities {
            acks.push(self.insert_one(entity)?);
        }
        Ok(acks)
    }

    /// Applies an update document to the first match.
    ///
    /// The update is the store's operator form (`$set` / `$unset`),
    /// passed through untouched.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or an unacknowledged-write error.
    pub fn update_one(&self, filter: Document, update: Document) -> CoreResult<UpdateAck> {
        self.guard_write("update_one")?;
        let collection = self.collection()?;
        let filter = self.normalize_filter(filter);
        let ack = collection.update_one(&filter, &update)?;
        if !ack.acknowledged {
            return Err(StoreError::unacknowledged("update_one").into());
        }
        Ok(ack)
    }

    /// Applies an update document to every match.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or an unacknowledged-write error.
    pub fn update_many(&self, filter: Document, update: Document) -> CoreResult<UpdateAck> {
        self.guard_write("update_many")?;
        let collection = self.collection()?;
        let filter = self.normalize_filter(filter);
        let ack = collection.update_many(&filter, &update)?;
        if !ack.acknowledged {
            return Err(StoreError::unacknowledged("update_many").into());
        }
        Ok(ack)
    }

    /// Deletes the first match.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or an unacknowledged-write error.
    pub fn delete_one(&self, filter: Document) -> CoreResult<DeleteAck> {
        self.guard_write("delete_one")?;
        let collection = self.collection()?;
        let filter = self.normalize_filter(filter);
        let ack = collection.delete_one(&filter)?;
        if !ack.acknowledged {
            return Err(StoreError::unacknowledged("delete_one").into());
        }
        Ok(ack)
    }

    /// Deletes every match.
    ///
    /// # Errors
    ///
    /// Returns the store's error, or an unacknowledged-write error.
    pub fn delete_many(&self, filter: Document) -> CoreResult<DeleteAck> {
        self.guard_write("delete_many")?;
        let collection = self.collection()?;
        let filter = self.normalize_filter(filter);
        let ack = collection.delete_many(&filter)?;
        if !ack.acknowledged {
            return Err(StoreError::unacknowledged("delete_many").into());
        }
        Ok(ack)
    }

    /// Inserts the entity when it has no identity; otherwise writes
    /// only the fields that changed since load. A clean entity is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns the insert or update path's error.
    pub fn save(&self, entity: &mut Entity) -> CoreResult<()> {
        self.guard_write("save")?;
        self.check_type(entity)?;
        let Some(id) = entity.id() else {
            self.insert_one(entity)?;
            return Ok(());
        };

        let changes = entity.modified_fields(false);
        if changes.is_empty() {
            return Ok(());
        }
        let filter = Document::from([(ID_FIELD, Bson::ObjectId(id))]);
        let update = Document::from([("$set", Bson::Document(changes))]);
        self.update_one(filter, update)?;
        entity.mark_clean();
        Ok(())
    }

    fn check_type(&self, entity: &Entity) -> CoreResult<()> {
        if entity.entity_type().name() != self.entity_type.name() {
            return Err(CoreError::validation(format!(
                "manager for `{}` cannot persist a `{}` entity",
                self.entity_type.name(),
                entity.entity_type().name()
            )));
        }
        Ok(())
    }
}

/// A lazy, cursor-backed set of entities.
///
/// Each document the cursor yields is materialized by cloning the
/// set's prototype and loading the stored values onto it, so every
/// returned entity is independent and already connected.
pub struct DocumentSet {
    prototype: Entity,
    cursor: Box<dyn DocumentCursor>,
}

impl DocumentSet {
    /// Caps the number of entities the set will yield.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.cursor.limit(limit);
        self
    }

    /// Orders the set by a (possibly dotted) key.
    #[must_use]
    pub fn sort(mut self, key: &str, order: SortOrder) -> Self {
        self.cursor.sort(key, order);
        self
    }

    /// Counts the remaining results without consuming this set.
    ///
    /// # Errors
    ///
    /// Returns the store's error for the round trips.
    pub fn count(&self) -> CoreResult<u64> {
        let mut probe = self.cursor.clone_cursor();
        let mut n = 0;
        while probe.next_document()?.is_some() {
            n += 1;
        }
        Ok(n)
    }

    /// Returns the next entity, advancing the cursor.
    ///
    /// # Errors
    ///
    /// Returns the store's error for the round trip.
    pub fn next_entity(&mut self) -> CoreResult<Option<Entity>> {
        let Some(stored) = self.cursor.next_document()? else {
            return Ok(None);
        };
        Ok(Some(self.materialize(stored)))
    }

    /// Returns the first entity and resets the cursor.
    ///
    /// # Errors
    ///
    /// Returns the store's error for the round trip.
    pub fn first(&mut self) -> CoreResult<Option<Entity>> {
        self.cursor.rewind();
        let first = self.next_entity()?;
        self.cursor.rewind();
        Ok(first)
    }

    /// Drains the cursor into a vector of entities.
    ///
    /// # Errors
    ///
    /// Returns the store's error for the round trips.
    pub fn entities(mut self) -> CoreResult<Vec<Entity>> {
        let mut out = Vec::new();
        while let Some(entity) = self.next_entity()? {
            out.push(entity);
        }
        Ok(out)
    }

    fn materialize(&self, stored: Document) -> Entity {
        let mut entity = self.prototype.clone();
        entity.assign_stored(stored);
        entity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldDescriptor;
    use docshift_store::MemoryRegistry;

    fn car_type() -> Arc<EntityType> {
        EntityType::builder("car", "cars")
            .field("make", FieldDescriptor::string())
            .field("year", FieldDescriptor::int().required(false))
            .build()
            .unwrap()
    }

    fn manager() -> Manager {
        Manager::new(car_type(), Arc::new(MemoryRegistry::new()))
    }

    fn insert_car(manager: &Manager, make: &str, year: i64) -> Entity {
        let mut car = manager.entity_type().instantiate();
        car.set("make", make).unwrap();
        car.set("year", Bson::Int(year)).unwrap();
        manager.insert_one(&mut car).unwrap();
        car
    }

    #[test]
    fn insert_assigns_identity_and_clears_dirt() {
        let manager = manager();
        let car = insert_car(&manager, "Toyota", 2015);

        assert!(car.id().is_some());
        assert!(car.is_connected());
        assert!(car.modified_fields(false).is_empty());
    }

    #[test]
    fn insert_rejects_missing_required_fields() {
        let manager = manager();
        let mut car = manager.entity_type().instantiate();

        let err = manager.insert_one(&mut car).unwrap_err();
        let CoreError::InvalidDocument { errors } = err else {
            panic!("expected InvalidDocument, got {err:?}");
        };
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn insert_rejects_preassigned_identities() {
        let manager = manager();
        let mut car = manager.entity_type().instantiate();
        car.set("make", "Toyota").unwrap();
        car.set("_id", Bson::ObjectId(docshift_bson::ObjectId::new()))
            .unwrap();

        assert!(manager.insert_one(&mut car).is_err());
    }

    #[test]
    fn find_one_round_trips() {
        let manager = manager();
        let saved = insert_car(&manager, "Toyota", 2015);

        let found = manager
            .find_one(Document::from([("make", "Toyota")]))
            .unwrap()
            .expect("inserted car");
        assert_eq!(found.id(), saved.id());
        assert_eq!(found.get("year").unwrap(), Some(Bson::Int(2015)));
    }

    #[test]
    fn find_materializes_independent_entities() {
        let manager = manager();
        insert_car(&manager, "Toyota", 2015);
        insert_car(&manager, "Honda", 2018);

        let set = manager.find(Document::new()).unwrap();
        assert_eq!(set.count().unwrap(), 2);
        let mut cars = set.entities().unwrap();
        assert_eq!(cars.len(), 2);

        // Mutating one materialized entity leaves the other alone.
        cars[0].set("year", Bson::Int(1990)).unwrap();
        assert_ne!(
            cars[0].get("year").unwrap(),
            cars[1].get("year").unwrap()
        );
    }

    #[test]
    fn limit_and_sort_shape_the_set() {
        let manager = manager();
        insert_car(&manager, "Toyota", 2015);
        insert_car(&manager, "Honda", 2018);
        insert_car(&manager, "Ford", 2012);

        let mut set = manager
            .find(Document::new())
            .unwrap()
            .sort("year", SortOrder::Descending)
            .limit(2);
        assert_eq!(set.count().unwrap(), 2);
        let first = set.first().unwrap().unwrap();
        assert_eq!(first.get("year").unwrap(), Some(Bson::Int(2018)));
    }

    #[test]
    fn save_updates_only_changed_fields() {
        let manager = manager();
        let mut car = insert_car(&manager, "Toyota", 2015);

        car.set("year", Bson::Int(2016)).unwrap();
        manager.save(&mut car).unwrap();

        let reloaded = manager
            .find_one(Document::from([(ID_FIELD, Bson::ObjectId(car.id().unwrap()))]))
            .unwrap()
            .unwrap();
        assert_eq!(reloaded.get("year").unwrap(), Some(Bson::Int(2016)));
        assert_eq!(reloaded.get("make").unwrap(), Some(Bson::from("Toyota")));
    }

    #[test]
    fn save_on_a_clean_entity_is_a_no_op() {
        let manager = manager();
        let mut car = insert_car(&manager, "Toyota", 2015);
        manager.save(&mut car).unwrap();
    }

    #[test]
    fn reference_filters_rewrite_to_shadow_keys() {
        let connections: Arc<dyn ConnectionRegistry> = Arc::new(MemoryRegistry::new());
        let owner_type = EntityType::builder("owner", "owners")
            .field("name", FieldDescriptor::string())
            .build()
            .unwrap();
        let car_type = EntityType::builder("car", "cars")
            .field("make", FieldDescriptor::string())
            .field("owner", FieldDescriptor::reference(Arc::clone(&owner_type)))
            .build()
            .unwrap();

        let owners = Manager::new(owner_type, Arc::clone(&connections));
        let cars = Manager::new(car_type, connections);

        let mut alice = owners.entity_type().instantiate();
        alice.set("name", "Alice").unwrap();
        owners.insert_one(&mut alice).unwrap();

        let mut car = cars.entity_type().instantiate();
        car.set("make", "Toyota").unwrap();
        car.set_reference("owner", &alice).unwrap();
        cars.insert_one(&mut car).unwrap();

        let found = cars
            .find_one(Document::from([(
                "owner",
                Bson::ObjectId(alice.id().unwrap()),
            )]))
            .unwrap();
        assert!(found.is_some());
    }

    #[test]
    fn read_only_managers_reject_writes() {
        let restricted = Manager::restricted(
            car_type(),
            Arc::new(MemoryRegistry::new()),
            Document::new(),
        );
        let mut car = restricted.entity_type().instantiate();
        car.set("make", "Toyota").unwrap();

        assert!(matches!(
            restricted.insert_one(&mut car),
            Err(CoreError::OperationNotAllowed { .. })
        ));
        assert!(restricted.delete_many(Document::new()).is_err());
    }

    #[test]
    fn manager_rejects_foreign_entities() {
        let manager = manager();
        let other = EntityType::builder("boat", "boats")
            .field("name", FieldDescriptor::string())
            .build()
            .unwrap();
        let mut boat = other.instantiate();
        boat.set("name", "Maria").unwrap();

        assert!(manager.insert_one(&mut boat).is_err());
    }
}
