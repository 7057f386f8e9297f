//! End-to-end scenarios: declaration, persistence, references, and
//! schema shifting over the in-memory store.

use std::sync::Arc;

use docshift_core::{
    Bson, ConnectionRegistry, CoreError, Document, EntityRegistry, EntityType, FieldDescriptor,
    FieldSet, MemoryRegistry, ShiftEngine, SortOrder,
};

fn connections() -> Arc<dyn ConnectionRegistry> {
    Arc::new(MemoryRegistry::new())
}

fn car_type() -> Arc<EntityType> {
    let engine: FieldSet = [
        ("cylinders", FieldDescriptor::int()),
        ("liters", FieldDescriptor::double().required(false)),
    ]
    .into_iter()
    .collect();

    EntityType::builder("car", "cars")
        .field("make", FieldDescriptor::string().min_length(1))
        .field("year", FieldDescriptor::int())
        .field(
            "fuel",
            FieldDescriptor::enumeration(vec![
                (Bson::from("gas"), "Gasoline"),
                (Bson::from("ev"), "Electric"),
            ])
            .unwrap()
            .default_value("gas"),
        )
        .field("engine", FieldDescriptor::object(engine).unwrap().required(false))
        .build()
        .unwrap()
}

#[test]
fn declare_persist_and_query() {
    let connections = connections();
    let mut registry = EntityRegistry::new(connections);
    registry.register(car_type()).unwrap();
    registry.ensure_collections().unwrap();

    let cars = registry.manager("car").unwrap();

    let mut civic = cars.entity_type().instantiate();
    civic
        .set_model_data(Document::from([
            ("make", Bson::from("Honda")),
            ("year", Bson::Int(2020)),
            (
                "engine",
                Bson::Document(Document::from([("cylinders", Bson::Int(4))])),
            ),
        ]))
        .unwrap();
    cars.insert_one(&mut civic).unwrap();
    assert!(civic.id().is_some());

    let mut leaf = cars.entity_type().instantiate();
    leaf.set("make", "Nissan").unwrap();
    leaf.set("year", Bson::Int(2022)).unwrap();
    leaf.set("fuel", "ev").unwrap();
    cars.insert_one(&mut leaf).unwrap();

    // Defaults resolved on insert.
    let found = cars
        .find_one(Document::from([("make", "Honda")]))
        .unwrap()
        .unwrap();
    assert_eq!(found.get("fuel").unwrap(), Some(Bson::from("gas")));
    assert_eq!(
        found.get("engine").unwrap(),
        Some(Bson::Document(Document::from([("cylinders", Bson::Int(4))])))
    );

    // Sorted, limited result sets.
    let newest = cars
        .find(Document::new())
        .unwrap()
        .sort("year", SortOrder::Descending)
        .limit(1)
        .entities()
        .unwrap();
    assert_eq!(newest.len(), 1);
    assert_eq!(newest[0].get("make").unwrap(), Some(Bson::from("Nissan")));
}

#[test]
fn partial_updates_write_only_what_changed() {
    let connections = connections();
    let mut registry = EntityRegistry::new(connections);
    registry.register(car_type()).unwrap();
    registry.ensure_collections().unwrap();

    let cars = registry.manager("car").unwrap();
    let mut car = cars.entity_type().instantiate();
    car.set("make", "Honda").unwrap();
    car.set("year", Bson::Int(2020)).unwrap();
    cars.insert_one(&mut car).unwrap();

    // Nested assignment dirties only the touched leaf.
    car.set(
        "engine",
        Bson::Document(Document::from([("cylinders", Bson::Int(6))])),
    )
    .unwrap();
    let changes = car.modified_fields(false);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes.get("engine.cylinders"), Some(&Bson::Int(6)));

    cars.save(&mut car).unwrap();
    assert!(car.modified_fields(false).is_empty());

    let reloaded = cars
        .find_one(Document::from([("make", "Honda")]))
        .unwrap()
        .unwrap();
    assert_eq!(
        reloaded.get("engine").unwrap(),
        Some(Bson::Document(Document::from([("cylinders", Bson::Int(6))])))
    );
}

#[test]
fn references_resolve_both_directions() {
    let connections = connections();
    let mut registry = EntityRegistry::new(Arc::clone(&connections));

    let owner_type = EntityType::builder("owner", "owners")
        .field("name", FieldDescriptor::string())
        .build()
        .unwrap();
    let car_type = EntityType::builder("car", "cars")
        .field("make", FieldDescriptor::string())
        .field("owner", FieldDescriptor::reference(Arc::clone(&owner_type)))
        .build()
        .unwrap();
    registry.register(owner_type).unwrap();
    registry.register(car_type).unwrap();
    registry.ensure_collections().unwrap();

    let owners = registry.manager("owner").unwrap();
    let cars = registry.manager("car").unwrap();

    let mut alice = owners.entity_type().instantiate();
    alice.set("name", "Alice").unwrap();
    owners.insert_one(&mut alice).unwrap();

    let mut car = cars.entity_type().instantiate();
    car.set("make", "Toyota").unwrap();
    car.set_reference("owner", &alice).unwrap();
    cars.insert_one(&mut car).unwrap();

    // Forward: dereference the owner off the car.
    let loaded = cars
        .find_one(Document::from([("make", "Toyota")]))
        .unwrap()
        .unwrap();
    let resolved = loaded
        .dereference("owner", connections.as_ref())
        .unwrap()
        .unwrap();
    assert_eq!(resolved.get("name").unwrap(), Some(Bson::from("Alice")));
    assert_eq!(resolved.id(), alice.id());

    // Reverse: the owner's car_set sees the car and nothing else.
    let mut bob = owners.entity_type().instantiate();
    bob.set("name", "Bob").unwrap();
    owners.insert_one(&mut bob).unwrap();

    let alices = registry.related(&alice, "car_set").unwrap();
    assert_eq!(alices.count(Document::new()).unwrap(), 1);
    let bobs = registry.related(&bob, "car_set").unwrap();
    assert_eq!(bobs.count(Document::new()).unwrap(), 0);
}

#[test]
fn shifting_an_evolving_declaration() {
    let connections = connections();

    // v1: year is a string.
    let v1 = EntityType::builder("car", "cars")
        .field("make", FieldDescriptor::string())
        .field("year", FieldDescriptor::string())
        .field("color", FieldDescriptor::string().required(false))
        .build()
        .unwrap();
    {
        let mut registry = EntityRegistry::new(Arc::clone(&connections));
        registry.register(Arc::clone(&v1)).unwrap();
        registry.ensure_collections().unwrap();
        let cars = registry.manager("car").unwrap();
        let mut car = cars.entity_type().instantiate();
        car.set("make", "Toyota").unwrap();
        car.set("year", "2015").unwrap();
        car.set("color", "red").unwrap();
        cars.insert_one(&mut car).unwrap();
    }

    // v2: year becomes an int with a default, color is gone, status
    // is new.
    let v2 = EntityType::builder("car", "cars")
        .field("make", FieldDescriptor::string())
        .field("year", FieldDescriptor::int().default_value(Bson::Int(0)))
        .field("status", FieldDescriptor::string().default_value("listed"))
        .build()
        .unwrap();

    let mut engine = ShiftEngine::new(Arc::clone(&v2), Arc::clone(&connections));
    assert!(engine.shift().unwrap());

    let mut registry = EntityRegistry::new(Arc::clone(&connections));
    registry.register(Arc::clone(&v2)).unwrap();
    let cars = registry.manager("car").unwrap();
    let car = cars
        .find_one(Document::from([("make", "Toyota")]))
        .unwrap()
        .unwrap();

    // New field back-filled, removed field gone, retyped field reset.
    assert_eq!(car.get("status").unwrap(), Some(Bson::from("listed")));
    assert_eq!(car.get("year").unwrap(), Some(Bson::Int(0)));
    assert!(matches!(
        car.get("color"),
        Err(CoreError::UnknownField { .. })
    ));

    // Shifting again has nothing to do.
    let results = registry.shift_all().unwrap();
    assert_eq!(results, vec![("car".to_owned(), false)]);
}
