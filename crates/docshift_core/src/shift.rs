//! Schema shifting.
//!
//! A shift reconciles a collection's enforced validator with the
//! validator its entity type currently derives. The engine first
//! examines the two schemas and builds a field-level plan, then
//! applies it: removed fields are unset, added fields are back-filled
//! with their defaults, type-altered fields are reset to their
//! defaults, and finally the stored validator is replaced. Existing
//! values are never coerced across types; a type change means the old
//! values no longer fit the schema and are replaced wholesale.

use std::collections::BTreeMap;
use std::sync::Arc;

use docshift_bson::{Bson, Document};
use docshift_store::{CollectionHandle, ConnectionRegistry, StoreError};
use tracing::{debug, info};

use crate::entity::{EntityType, ID_FIELD};
use crate::error::{CoreError, CoreResult};
use crate::field::FieldKind;

/// The verdict of comparing stored and derived schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Examination {
    /// The schemas agree; nothing to do.
    Clean,
    /// The schemas differ; a shift is required.
    Dirty,
}

/// Where the engine is in its examine-then-apply lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShiftState {
    /// No examination has run yet.
    Unexamined,
    /// An examination has run with the given verdict.
    Examined(Examination),
    /// The shift has been applied.
    Applied,
}

/// How a field present in both schemas changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Alteration {
    /// The structural type changed; stored values are reset to the
    /// field's default. Constraint-only changes (choice lists, bounds,
    /// nullability) leave this unset and keep stored values.
    pub replace: bool,
    /// The field's required flag flipped; carried by the validator
    /// replacement alone.
    pub required_changed: bool,
}

/// The field-level plan an examination produces.
#[derive(Debug, Clone, Default)]
pub struct FieldShift {
    /// Dotted paths present in the derived schema but not the stored
    /// one.
    pub new_fields: Vec<String>,
    /// Dotted paths present in the stored schema but not the derived
    /// one.
    pub removed_fields: Vec<String>,
    /// Dotted paths present in both whose spec or required flag
    /// differs.
    pub altered_fields: BTreeMap<String, Alteration>,
    /// Whether any required flag changed; the per-path deltas live in
    /// `altered_fields`.
    pub constraints_changed: bool,
}

impl FieldShift {
    /// Whether the plan contains no work at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_fields.is_empty()
            && self.removed_fields.is_empty()
            && self.altered_fields.is_empty()
            && !self.constraints_changed
    }

    fn retyped(&self) -> impl Iterator<Item = &str> {
        self.altered_fields
            .iter()
            .filter(|(_, a)| a.replace)
            .map(|(path, _)| path.as_str())
    }
}

/// Reconciles one entity type's collection with its derived schema.
pub struct ShiftEngine {
    entity_type: Arc<EntityType>,
    connections: Arc<dyn ConnectionRegistry>,
    state: ShiftState,
    plan: Option<FieldShift>,
}

impl ShiftEngine {
    /// Creates an engine for an entity type.
    #[must_use]
    pub fn new(entity_type: Arc<EntityType>, connections: Arc<dyn ConnectionRegistry>) -> Self {
        Self {
            entity_type,
            connections,
            state: ShiftState::Unexamined,
            plan: None,
        }
    }

    /// The engine's lifecycle state.
    #[must_use]
    pub fn state(&self) -> ShiftState {
        self.state
    }

    /// The plan the last examination produced.
    #[must_use]
    pub fn plan(&self) -> Option<&FieldShift> {
        self.plan.as_ref()
    }

    fn collection(&self) -> CoreResult<Arc<dyn CollectionHandle>> {
        let database = self.connections.database(self.entity_type.db_alias())?;
        Ok(database.collection(self.entity_type.collection_name()))
    }

    /// Compares the stored validator against the derived one and
    /// builds the shift plan.
    ///
    /// Schemaless types are always clean. A collection with no stored
    /// validator treats every declared top-level field as new.
    ///
    /// # Errors
    ///
    /// Returns an identity-integrity error when the stored schema no
    /// longer types the identity field as an object id, or when the
    /// derived schema would drop it; and the store's error for the
    /// round trip.
    pub fn examine(&mut self) -> CoreResult<Examination> {
        let Some(derived) = self.entity_type.validator() else {
            self.state = ShiftState::Examined(Examination::Clean);
            self.plan = Some(FieldShift::default());
            return Ok(Examination::Clean);
        };
        let derived_schema = unwrap_schema(&derived)?;

        let collection = self.collection()?;
        let stored = collection.validator_options()?;

        let mut plan = FieldShift::default();
        match stored {
            None => {
                // Nothing enforced yet; every declared field except the
                // identity is new.
                for (name, _) in properties(&derived_schema).iter() {
                    if name != ID_FIELD {
                        plan.new_fields.push(name.to_owned());
                    }
                }
            }
            Some(options) => {
                let stored_schema = unwrap_schema(&options.schema)?;
                compare_schemas("", &stored_schema, &derived_schema, &mut plan)?;
            }
        }

        let verdict = if plan.is_empty() {
            Examination::Clean
        } else {
            Examination::Dirty
        };
        debug!(
            entity = self.entity_type.name(),
            new = plan.new_fields.len(),
            removed = plan.removed_fields.len(),
            altered = plan.altered_fields.len(),
            "examined"
        );
        self.plan = Some(plan);
        self.state = ShiftState::Examined(verdict);
        Ok(verdict)
    }

    /// Applies the shift plan and replaces the stored validator.
    ///
    /// Runs an examination first when none has. Order of operations:
    /// removed fields are unset, new fields are back-filled with
    /// their defaults, retyped fields are reset to their defaults,
    /// and the validator is replaced last so every document already
    /// satisfies it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoShiftRequired`] when the schemas already
    /// agree or the shift was already applied, and the store's error
    /// for any round trip.
    pub fn shift(&mut self) -> CoreResult<bool> {
        match self.state {
            ShiftState::Unexamined => {
                self.examine()?;
            }
            ShiftState::Examined(_) => {}
            ShiftState::Applied => return Err(CoreError::NoShiftRequired),
        }
        if self.state == ShiftState::Examined(Examination::Clean) {
            return Err(CoreError::NoShiftRequired);
        }
        let plan = self.plan.clone().unwrap_or_default();

        let collection = self.collection()?;
        let everything = Document::new();

        if !plan.removed_fields.is_empty() {
            let mut unset = Document::new();
            for path in &plan.removed_fields {
                unset.set(path, Bson::from(""));
            }
            let update = Document::from([("$unset", Bson::Document(unset))]);
            let ack = collection.update_many(&everything, &update)?;
            if !ack.acknowledged {
                return Err(StoreError::unacknowledged("shift $unset").into());
            }
        }

        let mut set = Document::new();
        for path in &plan.new_fields {
            set.set(path, self.resolve_default(path));
        }
        for path in plan.retyped() {
            set.set(path, self.resolve_default(path));
        }
        if !set.is_empty() {
            let update = Document::from([("$set", Bson::Document(set))]);
            let ack = collection.update_many(&everything, &update)?;
            if !ack.acknowledged {
                return Err(StoreError::unacknowledged("shift $set").into());
            }
        }

        // Dirty plans always come from a derived validator, so this
        // cannot be absent here.
        if let Some(validator) = self.entity_type.validator() {
            collection.replace_validator(validator, self.entity_type.validation_level())?;
        }

        info!(
            entity = self.entity_type.name(),
            collection = self.entity_type.collection_name(),
            "shift applied"
        );
        self.state = ShiftState::Applied;
        Ok(true)
    }

    /// The back-fill value for a dotted path, from the declared
    /// field defaults.
    fn resolve_default(&self, path: &str) -> Bson {
        let mut fields = self.entity_type.fields();
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let Some(field) = fields.get(segment) else {
                return Bson::Null;
            };
            if segments.peek().is_none() {
                return field.shift_default();
            }
            match field.kind() {
                FieldKind::Object { properties } => fields = properties,
                _ => return Bson::Null,
            }
        }
        Bson::Null
    }
}

fn unwrap_schema(validator: &Document) -> CoreResult<Document> {
    validator
        .get("$jsonSchema")
        .and_then(Bson::as_document)
        .cloned()
        .ok_or_else(|| CoreError::definition("validator has no $jsonSchema document"))
}

fn properties(schema: &Document) -> Document {
    schema
        .get("properties")
        .and_then(Bson::as_document)
        .cloned()
        .unwrap_or_default()
}

fn required_set(schema: &Document) -> Vec<String> {
    let mut names: Vec<String> = schema
        .get("required")
        .and_then(Bson::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Bson::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}.{name}")
    }
}

fn compare_schemas(
    prefix: &str,
    stored: &Document,
    derived: &Document,
    plan: &mut FieldShift,
) -> CoreResult<()> {
    let stored_props = properties(stored);
    let derived_props = properties(derived);
    let stored_required = required_set(stored);
    let derived_required = required_set(derived);
    let top_level = prefix.is_empty();

    for (name, derived_spec) in derived_props.iter() {
        let path = join(prefix, name);
        let Some(stored_spec) = stored_props.get(name) else {
            if !(top_level && name == ID_FIELD) {
                plan.new_fields.push(path);
            }
            continue;
        };

        let was_required = stored_required.iter().any(|n| n == name);
        let is_required = derived_required.iter().any(|n| n == name);
        if was_required != is_required {
            // Presence rules moved for this field; values stay, the
            // validator replacement alone carries it.
            plan.altered_fields
                .entry(path.clone())
                .or_default()
                .required_changed = true;
            plan.constraints_changed = true;
        }

        let (Some(stored_spec), Some(derived_spec)) =
            (stored_spec.as_document(), derived_spec.as_document())
        else {
            continue;
        };

        if top_level && name == ID_FIELD && !types_contain(stored_spec, "objectId") {
            return Err(CoreError::identity_integrity(
                "stored schema no longer types `_id` as an objectId",
            ));
        }

        compare_specs(&path, stored_spec, derived_spec, plan)?;
    }

    for (name, _) in stored_props.iter() {
        if derived_props.contains_key(name) {
            continue;
        }
        if top_level && name == ID_FIELD {
            return Err(CoreError::identity_integrity(
                "shifting would remove the `_id` field",
            ));
        }
        plan.removed_fields.push(join(prefix, name));
    }

    Ok(())
}

fn compare_specs(
    path: &str,
    stored: &Document,
    derived: &Document,
    plan: &mut FieldShift,
) -> CoreResult<()> {
    if stored == derived {
        return Ok(());
    }

    let stored_obj = stored.get("properties").and_then(Bson::as_document);
    let derived_obj = derived.get("properties").and_then(Bson::as_document);
    if stored_obj.is_some() && derived_obj.is_some() {
        return compare_schemas(path, stored, derived, plan);
    }

    let stored_types = stored.get("bsonType").and_then(Bson::as_array);
    let derived_types = derived.get("bsonType").and_then(Bson::as_array);
    let replace = match (stored_types, derived_types) {
        // One side validates by enum, the other by type.
        (None, Some(_)) | (Some(_), None) => true,
        // Same structural type; only bounds, choices, or nullability
        // moved.
        (Some(a), Some(b)) if structural(a) == structural(b) => false,
        (Some(_), Some(_)) => true,
        // Two enums with different choice lists.
        (None, None) => false,
    };
    plan.altered_fields.entry(path.to_owned()).or_default().replace = replace;
    Ok(())
}

/// The structural type of a spec's type array, ignoring `"null"`.
fn structural(types: &[Bson]) -> Option<&str> {
    types
        .iter()
        .filter_map(Bson::as_str)
        .find(|name| *name != "null")
}

fn types_contain(spec: &Document, name: &str) -> bool {
    spec.get("bsonType")
        .and_then(Bson::as_array)
        .is_some_and(|types| types.iter().filter_map(Bson::as_str).any(|t| t == name))
}
