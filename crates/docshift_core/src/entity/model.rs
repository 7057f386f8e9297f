//! Entity type declarations.

use std::sync::Arc;

use docshift_bson::Document;
use docshift_store::ValidationLevel;

use crate::entity::Entity;
use crate::error::{CoreError, CoreResult};
use crate::field::{FieldDescriptor, FieldSet};
use crate::schema;

/// The name of the identity field every entity carries.
pub const ID_FIELD: &str = "_id";

/// Suffix appended to a reference field's name to form its shadow
/// id field.
pub const SHADOW_SUFFIX: &str = "_id";

/// The shadow field name persisted alongside a reference field.
#[must_use]
pub fn shadow_name(reference: &str) -> String {
    format!("{reference}{SHADOW_SUFFIX}")
}

/// An immutable entity type: name, collection binding, and the
/// prototype field set every instance is cloned from.
#[derive(Debug)]
pub struct EntityType {
    name: String,
    collection_name: String,
    db_alias: String,
    schemaless: bool,
    validation_level: ValidationLevel,
    fields: FieldSet,
}

impl EntityType {
    /// Starts building an entity type.
    #[must_use]
    pub fn builder(name: impl Into<String>, collection_name: impl Into<String>) -> EntityTypeBuilder {
        EntityTypeBuilder {
            name: name.into(),
            collection_name: collection_name.into(),
            db_alias: "main".to_owned(),
            schemaless: false,
            validation_level: ValidationLevel::Strict,
            fields: FieldSet::new(),
        }
    }

    /// The logical type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The collection the type persists into.
    #[must_use]
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// The connection alias the type resolves its database through.
    #[must_use]
    pub fn db_alias(&self) -> &str {
        &self.db_alias
    }

    /// Whether the type opts out of validator enforcement.
    #[must_use]
    pub fn is_schemaless(&self) -> bool {
        self.schemaless
    }

    /// How strictly the store applies the derived validator.
    #[must_use]
    pub fn validation_level(&self) -> ValidationLevel {
        self.validation_level
    }

    /// The prototype field set.
    #[must_use]
    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Derives the collection validator for this type.
    ///
    /// Schemaless types have none.
    #[must_use]
    pub fn validator(&self) -> Option<Document> {
        if self.schemaless {
            return None;
        }
        schema::build_validator(&self.fields)
    }

    /// Creates a detached instance by cloning the prototype.
    #[must_use]
    pub fn instantiate(self: &Arc<Self>) -> Entity {
        Entity::from_prototype(Arc::clone(self))
    }

    /// Creates a detached instance and assigns the given values.
    ///
    /// # Errors
    ///
    /// Returns a validation error when a value does not fit its field.
    pub fn instantiate_with(self: &Arc<Self>, data: Document) -> CoreResult<Entity> {
        let mut entity = self.instantiate();
        entity.set_model_data(data)?;
        Ok(entity)
    }
}

/// Builder for [`EntityType`].
#[derive(Debug)]
pub struct EntityTypeBuilder {
    name: String,
    collection_name: String,
    db_alias: String,
    schemaless: bool,
    validation_level: ValidationLevel,
    fields: FieldSet,
}

impl EntityTypeBuilder {
    /// Selects the connection alias (defaults to `main`).
    #[must_use]
    pub fn db_alias(mut self, alias: impl Into<String>) -> Self {
        self.db_alias = alias.into();
        self
    }

    /// Opts the type out of validator enforcement.
    #[must_use]
    pub fn schemaless(mut self, schemaless: bool) -> Self {
        self.schemaless = schemaless;
        self
    }

    /// Sets how strictly the store applies the validator.
    #[must_use]
    pub fn validation_level(mut self, level: ValidationLevel) -> Self {
        self.validation_level = level;
        self
    }

    /// Declares a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(name, descriptor);
        self
    }

    /// Finalizes the type.
    ///
    /// The identity field is injected first, and every reference
    /// field gets a shadow `<name>_id` object-id field mirroring its
    /// required and null flags.
    ///
    /// # Errors
    ///
    /// Returns a definition error for an empty collection name, a
    /// field name that starts with `$` or contains `.`, or a declared
    /// field that collides with the identity or a shadow field.
    pub fn build(self) -> CoreResult<Arc<EntityType>> {
        if self.name.is_empty() {
            return Err(CoreError::definition("entity type name must not be empty"));
        }
        if self.collection_name.is_empty() {
            return Err(CoreError::definition("collection name must not be empty"));
        }

        // The identity has no default: it is assigned by the store on
        // insert, and an unsaved entity has none.
        let mut fields = FieldSet::new();
        fields.insert(ID_FIELD, FieldDescriptor::object_id());

        for (name, descriptor) in self.fields.iter() {
            if name.is_empty() || name.starts_with('$') || name.contains('.') {
                return Err(CoreError::definition(format!(
                    "invalid field name `{name}`"
                )));
            }
            if fields.contains(name) {
                return Err(CoreError::definition(format!(
                    "field `{name}` collides with an injected field"
                )));
            }
            let shadow = descriptor.is_reference().then(|| {
                let shadow = FieldDescriptor::object_id()
                    .required(descriptor.is_required())
                    .allow_null(descriptor.allows_null());
                (shadow_name(name), shadow)
            });
            fields.insert(name, descriptor.clone());
            if let Some((shadow_key, shadow)) = shadow {
                if self.fields.contains(&shadow_key) {
                    return Err(CoreError::definition(format!(
                        "field `{shadow_key}` collides with the shadow of reference `{name}`"
                    )));
                }
                fields.insert(shadow_key, shadow);
            }
        }

        Ok(Arc::new(EntityType {
            name: self.name,
            collection_name: self.collection_name,
            db_alias: self.db_alias,
            schemaless: self.schemaless,
            validation_level: self.validation_level,
            fields,
        }))
    }
}
