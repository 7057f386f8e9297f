//! Entity instances and their document mapping.
//!
//! An [`Entity`] is a field set cloned from its type's prototype plus
//! an optional collection binding. Values flow in three ways: typed
//! assignment through [`Entity::set`] (validating), stored loads
//! through [`Entity::assign_stored`] (non-validating, clean), and
//! persisted writes through [`Entity::modified_fields`] (dotted-path
//! diff against the stored baseline).

mod model;

pub use model::{shadow_name, EntityType, EntityTypeBuilder, ID_FIELD};

use std::fmt;
use std::sync::Arc;

use docshift_bson::{Bson, Document, ObjectId};
use docshift_store::{CollectionHandle, ConnectionRegistry};

use crate::error::{CoreError, CoreResult};
use crate::field::{FieldKind, FieldSet};

/// A single document instance of an [`EntityType`].
#[derive(Clone)]
pub struct Entity {
    entity_type: Arc<EntityType>,
    fields: FieldSet,
    collection: Option<Arc<dyn CollectionHandle>>,
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("entity_type", &self.entity_type.name())
            .field("fields", &self.fields)
            .field("connected", &self.collection.is_some())
            .finish()
    }
}

impl Entity {
    pub(crate) fn from_prototype(entity_type: Arc<EntityType>) -> Self {
        let fields = entity_type.fields().clone();
        Self {
            entity_type,
            fields,
            collection: None,
        }
    }

    /// The entity's type.
    #[must_use]
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity_type
    }

    /// The entity's fields.
    #[must_use]
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// The stored identity, if the entity has been persisted or
    /// loaded. The generated-id default is deliberately not resolved
    /// here; an unsaved entity has no identity.
    #[must_use]
    pub fn id(&self) -> Option<ObjectId> {
        self.fields
            .get(ID_FIELD)
            .and_then(|f| f.raw_value())
            .and_then(Bson::as_object_id)
    }

    /// Reads a field's resolved value.
    ///
    /// # Errors
    ///
    /// Returns an unknown-field error for undeclared names.
    pub fn get(&self, name: &str) -> CoreResult<Option<Bson>> {
        let field = self
            .fields
            .get(name)
            .ok_or_else(|| CoreError::unknown_field(name))?;
        Ok(field.value())
    }

    /// Assigns a field value, validating it against the field's kind.
    ///
    /// Assigning a reference field mirrors the id onto its shadow
    /// field, and assigning a shadow field mirrors back onto the
    /// reference, so the pair never disagrees.
    ///
    /// # Errors
    ///
    /// Returns an unknown-field error for undeclared names, or the
    /// field's validation error.
    pub fn set(&mut self, name: &str, value: impl Into<Bson>) -> CoreResult<()> {
        let value = value.into();
        let field = self
            .fields
            .get_mut(name)
            .ok_or_else(|| CoreError::unknown_field(name))?;
        let is_reference = field.is_reference();
        field.set_value(value)?;
        let assigned = field.raw_value().cloned();

        if is_reference {
            if let (Some(id), Some(shadow)) = (assigned, self.fields.get_mut(&shadow_name(name))) {
                shadow.set_raw(id);
            }
        } else if let Some(reference) = self.shadow_base(name) {
            if let (Some(id), Some(source)) = (assigned, self.fields.get_mut(&reference)) {
                source.set_raw(id);
            }
        }
        Ok(())
    }

    /// Points a reference field at another entity.
    ///
    /// # Errors
    ///
    /// Returns an unknown-field error for undeclared names, and a
    /// validation error when the field is not a reference, the target
    /// type does not match, or `other` has no identity yet.
    pub fn set_reference(&mut self, name: &str, other: &Entity) -> CoreResult<()> {
        let field = self
            .fields
            .get(name)
            .ok_or_else(|| CoreError::unknown_field(name))?;
        let target = field.reference_target().ok_or_else(|| {
            CoreError::validation(format!("field `{name}` is not a reference"))
        })?;
        if target.name() != other.entity_type.name() {
            return Err(CoreError::validation(format!(
                "field `{name}` references `{}`, not `{}`",
                target.name(),
                other.entity_type.name()
            )));
        }
        let id = other.id().ok_or_else(|| {
            CoreError::validation(format!(
                "cannot reference an unsaved `{}` entity",
                other.entity_type.name()
            ))
        })?;
        self.set(name, Bson::ObjectId(id))
    }

    /// Loads the entity the given reference field points at.
    ///
    /// # Errors
    ///
    /// Returns an unknown-field error for undeclared names, a
    /// validation error when the field is not a reference, or the
    /// store's error for the lookup itself.
    pub fn dereference(
        &self,
        name: &str,
        connections: &dyn ConnectionRegistry,
    ) -> CoreResult<Option<Entity>> {
        let field = self
            .fields
            .get(name)
            .ok_or_else(|| CoreError::unknown_field(name))?;
        let target = field
            .reference_target()
            .ok_or_else(|| {
                CoreError::validation(format!("field `{name}` is not a reference"))
            })?
            .clone();
        let Some(id) = field.raw_value().and_then(Bson::as_object_id) else {
            return Ok(None);
        };

        let database = connections.database(target.db_alias())?;
        let collection = database.collection(target.collection_name());
        let filter = Document::from([(ID_FIELD, Bson::ObjectId(id))]);
        let Some(stored) = collection.find_one(&filter)? else {
            return Ok(None);
        };

        let mut entity = target.instantiate();
        entity.assign_stored(stored);
        entity.collection = Some(collection);
        Ok(Some(entity))
    }

    /// Assigns a batch of values.
    ///
    /// Undeclared keys are ignored. When both a reference field and
    /// its shadow appear in the batch, the explicitly assigned shadow
    /// id wins; shadows are therefore applied after everything else.
    ///
    /// # Errors
    ///
    /// Returns the first validation error.
    pub fn set_model_data(&mut self, data: Document) -> CoreResult<()> {
        let mut shadows = Vec::new();
        for (key, value) in data {
            if !self.fields.contains(&key) {
                continue;
            }
            if self.shadow_base(&key).is_some() {
                shadows.push((key, value));
            } else {
                self.set(&key, value)?;
            }
        }
        for (key, value) in shadows {
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Loads a stored document without validation, leaving every
    /// field clean. Undeclared keys are dropped.
    pub fn assign_stored(&mut self, stored: Document) {
        for (key, value) in stored {
            if let Some(field) = self.fields.get_mut(&key) {
                field.assign_stored(value.clone());
            }
            if let Some(reference) = self.shadow_base(&key) {
                if let Some(source) = self.fields.get_mut(&reference) {
                    source.assign_stored(value);
                }
            }
        }
    }

    /// Collects the fields to persist, keyed by dotted path.
    ///
    /// For an insert this is every resolved value, defaults included;
    /// for an update it is only the values that differ from the
    /// stored baseline. The identity and reference fields never
    /// appear; shadows carry the persisted ids.
    #[must_use]
    pub fn modified_fields(&self, for_insert: bool) -> Document {
        let mut out = Document::new();
        for (name, field) in self.fields.iter() {
            if name == ID_FIELD || field.is_reference() {
                continue;
            }
            collect_paths(&mut out, name, field, for_insert);
        }
        out
    }

    /// Messages for every required field an insert would be missing.
    ///
    /// A populated embedded object is checked property by property, so
    /// nested gaps surface by dotted path; an untouched object is only
    /// reported when it is required itself.
    #[must_use]
    pub fn missing_required(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (name, field) in self.fields.iter() {
            if name == ID_FIELD || field.is_reference() {
                continue;
            }
            collect_missing(&mut errors, name, field);
        }
        errors
    }

    /// Binds the entity to its collection through the registry.
    ///
    /// Reconnecting is a no-op when already bound.
    ///
    /// # Errors
    ///
    /// Returns the registry's error for an unknown alias.
    pub fn connect(&mut self, connections: &dyn ConnectionRegistry) -> CoreResult<()> {
        if self.collection.is_some() {
            return Ok(());
        }
        let database = connections.database(self.entity_type.db_alias())?;
        self.collection = Some(database.collection(self.entity_type.collection_name()));
        Ok(())
    }

    /// Drops the collection binding.
    pub fn disconnect(&mut self) {
        self.collection = None;
    }

    /// Whether the entity is bound to a collection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.collection.is_some()
    }

    pub(crate) fn bind(&mut self, collection: Arc<dyn CollectionHandle>) {
        self.collection = Some(collection);
    }

    pub(crate) fn collection(&self) -> Option<&Arc<dyn CollectionHandle>> {
        self.collection.as_ref()
    }

    /// Adopts all current values as the clean baseline.
    pub fn mark_clean(&mut self) {
        for (_, field) in self.fields.iter_mut() {
            field.mark_clean();
        }
    }

    /// Renders the entity as a document of resolved values.
    ///
    /// With `stringify`, object ids become hex strings and datetimes
    /// become RFC 3339 strings, recursively; useful for JSON-facing
    /// layers.
    #[must_use]
    pub fn to_document(&self, stringify: bool) -> Document {
        let mut out = Document::new();
        for (name, field) in self.fields.iter() {
            if let Some(value) = field.value() {
                let value = if stringify { stringify_value(value) } else { value };
                out.set(name, value);
            }
        }
        out
    }

    /// Assigns the identity returned by the store.
    pub(crate) fn assign_identity(&mut self, id: ObjectId) {
        if let Some(field) = self.fields.get_mut(ID_FIELD) {
            field.assign_stored(Bson::ObjectId(id));
        }
    }

    /// Whether the field set explicitly carries an identity value.
    pub(crate) fn has_explicit_id(&self) -> bool {
        self.fields
            .get(ID_FIELD)
            .is_some_and(|f| f.raw_value().is_some())
    }

    /// Resolves a shadow field name back to its reference field, if
    /// the name is a shadow.
    fn shadow_base(&self, name: &str) -> Option<String> {
        let base = name.strip_suffix("_id")?;
        let field = self.fields.get(base)?;
        field.is_reference().then(|| base.to_owned())
    }
}

fn collect_paths(out: &mut Document, path: &str, field: &crate::field::FieldDescriptor, for_insert: bool) {
    if let FieldKind::Object { properties } = field.kind() {
        for (name, sub) in properties.iter() {
            collect_paths(out, &format!("{path}.{name}"), sub, for_insert);
        }
        return;
    }
    if for_insert {
        if let Some(value) = field.value() {
            out.set(path, value);
        }
    } else if field.is_modified() {
        if let Some(value) = field.raw_value() {
            out.set(path, value.clone());
        }
    }
}

fn collect_missing(errors: &mut Vec<String>, path: &str, field: &crate::field::FieldDescriptor) {
    if let FieldKind::Object { properties } = field.kind() {
        let populated = properties.iter().any(|(_, sub)| sub.value().is_some());
        if populated {
            for (name, sub) in properties.iter() {
                collect_missing(errors, &format!("{path}.{name}"), sub);
            }
            return;
        }
    }
    if field.is_required() && field.value().is_none() {
        errors.push(format!("missing required field `{path}`"));
    }
}

fn stringify_value(value: Bson) -> Bson {
    match value {
        Bson::ObjectId(id) => Bson::String(id.to_hex()),
        Bson::DateTime(dt) => Bson::String(dt.to_rfc3339()),
        Bson::Array(items) => Bson::Array(items.into_iter().map(stringify_value).collect()),
        Bson::Document(doc) => Bson::Document(
            doc.into_iter()
                .map(|(k, v)| (k, stringify_value(v)))
                .collect(),
        ),
        other => other,
    }
}
