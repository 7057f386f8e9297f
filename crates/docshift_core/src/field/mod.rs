//! Typed field descriptors.
//!
//! A [`FieldDescriptor`] declares one property of an entity: its
//! structural type, whether it is required, whether `null` is an
//! acceptable value, and an optional default. Descriptors also carry
//! the per-instance value slot, so a connected entity is a field set
//! cloned from its type's prototype.

mod set;

pub use set::FieldSet;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use docshift_bson::{Bson, Document, ObjectId};
use tracing::warn;

use crate::entity::EntityType;
use crate::error::{CoreError, CoreResult};

/// The default applied when a field has no assigned value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDefault {
    /// No default; the field resolves to nothing until assigned.
    None,
    /// A fixed value.
    Value(Bson),
    /// A producer invoked at resolution time, e.g. "now" timestamps
    /// or generated identifiers.
    Producer(fn() -> Bson),
}

impl FieldDefault {
    /// Resolves the default to a value, if one is declared.
    #[must_use]
    pub fn resolve(&self) -> Option<Bson> {
        match self {
            Self::None => None,
            Self::Value(v) => Some(v.clone()),
            Self::Producer(f) => Some(f()),
        }
    }
}

/// The structural type of a field.
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// UTF-8 text, with optional length bounds.
    String {
        /// Minimum length accepted by the derived validator.
        min_length: Option<u32>,
        /// Maximum length accepted by the derived validator.
        max_length: Option<u32>,
    },
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Double,
    /// Boolean.
    Bool,
    /// UTC datetime.
    Date,
    /// A raw object identifier.
    ObjectId,
    /// An embedded document with its own property descriptors.
    Object {
        /// Descriptors for the embedded properties.
        properties: FieldSet,
    },
    /// A list, optionally with a per-element document schema.
    Array {
        /// Element schema; `None` accepts heterogeneous elements.
        items: Option<FieldSet>,
        /// Minimum element count.
        min_items: Option<u32>,
        /// Maximum element count.
        max_items: Option<u32>,
    },
    /// A closed set of `(value, label)` choices.
    Enum {
        /// Accepted values with their display labels.
        choices: Vec<(Bson, String)>,
    },
    /// A link to another entity type, persisted as the target's id.
    Reference {
        /// The referenced entity type.
        target: Arc<EntityType>,
        /// Name the target exposes for the reverse relation.
        related_name: Option<String>,
    },
}

impl FieldKind {
    /// The validator type name for this kind.
    ///
    /// Enumerations validate by value membership rather than by type,
    /// so they have no type name.
    #[must_use]
    pub fn bson_type(&self) -> Option<&'static str> {
        match self {
            Self::String { .. } => Some("string"),
            Self::Int => Some("int"),
            Self::Double => Some("double"),
            Self::Bool => Some("bool"),
            Self::Date => Some("date"),
            Self::ObjectId | Self::Reference { .. } => Some("objectId"),
            Self::Object { .. } => Some("object"),
            Self::Array { .. } => Some("array"),
            Self::Enum { .. } => None,
        }
    }
}

/// One declared property of an entity type, together with the value
/// slot for an instance.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    kind: FieldKind,
    required: bool,
    allow_null: bool,
    default: FieldDefault,
    description: Option<String>,
    value: Option<Bson>,
    initial: Option<Bson>,
}

impl FieldDescriptor {
    fn with_kind(kind: FieldKind) -> Self {
        Self {
            kind,
            required: true,
            allow_null: false,
            default: FieldDefault::None,
            description: None,
            value: None,
            initial: None,
        }
    }

    /// A text field.
    #[must_use]
    pub fn string() -> Self {
        Self::with_kind(FieldKind::String {
            min_length: None,
            max_length: None,
        })
    }

    /// An integer field.
    #[must_use]
    pub fn int() -> Self {
        Self::with_kind(FieldKind::Int)
    }

    /// A float field.
    #[must_use]
    pub fn double() -> Self {
        Self::with_kind(FieldKind::Double)
    }

    /// A boolean field.
    #[must_use]
    pub fn boolean() -> Self {
        Self::with_kind(FieldKind::Bool)
    }

    /// A UTC datetime field.
    #[must_use]
    pub fn date() -> Self {
        Self::with_kind(FieldKind::Date)
    }

    /// A raw object-id field.
    #[must_use]
    pub fn object_id() -> Self {
        Self::with_kind(FieldKind::ObjectId)
    }

    /// An embedded-document field with the given property descriptors.
    ///
    /// # Errors
    ///
    /// Returns a definition error when `properties` is empty or
    /// contains a reference field; references live at the top level
    /// of an entity only.
    pub fn object(properties: FieldSet) -> CoreResult<Self> {
        if properties.is_empty() {
            return Err(CoreError::definition(
                "embedded object must declare at least one property",
            ));
        }
        if let Some(name) = find_reference(&properties) {
            return Err(CoreError::definition(format!(
                "embedded property `{name}` cannot be a reference"
            )));
        }
        Ok(Self::with_kind(FieldKind::Object { properties }))
    }

    /// A list field with no per-element schema.
    #[must_use]
    pub fn array() -> Self {
        Self::with_kind(FieldKind::Array {
            items: None,
            min_items: None,
            max_items: None,
        })
    }

    /// A list field whose elements are documents matching `items`.
    ///
    /// # Errors
    ///
    /// Returns a definition error when `items` is empty or contains a
    /// reference field.
    pub fn structured_array(items: FieldSet) -> CoreResult<Self> {
        if items.is_empty() {
            return Err(CoreError::definition(
                "structured array must declare at least one item property",
            ));
        }
        if let Some(name) = find_reference(&items) {
            return Err(CoreError::definition(format!(
                "array item property `{name}` cannot be a reference"
            )));
        }
        Ok(Self::with_kind(FieldKind::Array {
            items: Some(items),
            min_items: None,
            max_items: None,
        }))
    }

    /// An enumeration over `(value, label)` choices.
    ///
    /// # Errors
    ///
    /// Returns a definition error when `choices` is empty.
    pub fn enumeration<L: Into<String>>(choices: Vec<(Bson, L)>) -> CoreResult<Self> {
        if choices.is_empty() {
            return Err(CoreError::definition(
                "enumeration must declare at least one choice",
            ));
        }
        let choices = choices
            .into_iter()
            .map(|(value, label)| (value, label.into()))
            .collect();
        Ok(Self::with_kind(FieldKind::Enum { choices }))
    }

    /// A reference to another entity type.
    #[must_use]
    pub fn reference(target: Arc<EntityType>) -> Self {
        Self::with_kind(FieldKind::Reference {
            target,
            related_name: None,
        })
    }

    /// Sets whether the field must be present on insert.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets whether `null` is an accepted value.
    #[must_use]
    pub fn allow_null(mut self, allow_null: bool) -> Self {
        if allow_null && matches!(self.kind, FieldKind::Object { .. }) {
            warn!("allow_null on an embedded object is ignored by stores that index properties");
        }
        self.allow_null = allow_null;
        self
    }

    /// Sets a fixed default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<Bson>) -> Self {
        self.default = FieldDefault::Value(value.into());
        self
    }

    /// Sets a default produced at resolution time.
    #[must_use]
    pub fn default_producer(mut self, producer: fn() -> Bson) -> Self {
        self.default = FieldDefault::Producer(producer);
        self
    }

    /// Sets the minimum accepted string length.
    #[must_use]
    pub fn min_length(mut self, len: u32) -> Self {
        if let FieldKind::String { min_length, .. } = &mut self.kind {
            *min_length = Some(len);
        }
        self
    }

    /// Sets the maximum accepted string length.
    #[must_use]
    pub fn max_length(mut self, len: u32) -> Self {
        if let FieldKind::String { max_length, .. } = &mut self.kind {
            *max_length = Some(len);
        }
        self
    }

    /// Sets the minimum accepted element count.
    #[must_use]
    pub fn min_items(mut self, count: u32) -> Self {
        if let FieldKind::Array { min_items, .. } = &mut self.kind {
            *min_items = Some(count);
        }
        self
    }

    /// Sets the maximum accepted element count.
    #[must_use]
    pub fn max_items(mut self, count: u32) -> Self {
        if let FieldKind::Array { max_items, .. } = &mut self.kind {
            *max_items = Some(count);
        }
        self
    }

    /// Names the reverse relation a reference exposes on its target.
    #[must_use]
    pub fn related_name(mut self, name: impl Into<String>) -> Self {
        if let FieldKind::Reference { related_name, .. } = &mut self.kind {
            *related_name = Some(name.into());
        }
        self
    }

    /// Attaches a human-readable description, surfaced in validators.
    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The structural kind.
    #[must_use]
    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    /// Whether the field must be present on insert.
    #[must_use]
    pub fn is_required(&self) -> bool {
        self.required
    }

    /// Whether `null` is an accepted value.
    #[must_use]
    pub fn allows_null(&self) -> bool {
        self.allow_null
    }

    /// The declared default.
    #[must_use]
    pub fn default(&self) -> &FieldDefault {
        &self.default
    }

    /// The human-readable description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether this field links to another entity type.
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self.kind, FieldKind::Reference { .. })
    }

    /// The referenced entity type, for reference fields.
    #[must_use]
    pub fn reference_target(&self) -> Option<&Arc<EntityType>> {
        match &self.kind {
            FieldKind::Reference { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Assigns a value, validating it against the field's kind.
    ///
    /// Lossless coercions are applied: numeric strings become numbers,
    /// hex strings become object ids, RFC 3339 or `YYYY-MM-DD` strings
    /// become dates, and integers widen to doubles. Embedded-object
    /// values are distributed onto the property descriptors.
    ///
    /// # Errors
    ///
    /// Returns a validation error when the value does not fit the
    /// kind, or an invalid-choice error for enumeration misses.
    pub fn set_value(&mut self, value: Bson) -> CoreResult<()> {
        if value.is_null() {
            if self.allow_null {
                self.value = Some(Bson::Null);
                return Ok(());
            }
            return Err(CoreError::validation(format!(
                "null is not accepted by a {} field",
                kind_name(&self.kind)
            )));
        }
        let accepted = self.coerce(value)?;
        match (&mut self.kind, accepted) {
            (FieldKind::Object { properties }, Bson::Document(doc)) => {
                for (key, sub) in doc {
                    match properties.get_mut(&key) {
                        Some(field) => field.set_value(sub)?,
                        None => {
                            return Err(CoreError::validation(format!(
                                "unknown embedded property `{key}`"
                            )))
                        }
                    }
                }
            }
            (_, accepted) => self.value = Some(accepted),
        }
        Ok(())
    }

    fn coerce(&self, value: Bson) -> CoreResult<Bson> {
        match (&self.kind, value) {
            (FieldKind::String { min_length, max_length }, Bson::String(s)) => {
                let chars = s.chars().count() as u32;
                if min_length.is_some_and(|min| chars < min) {
                    return Err(CoreError::validation(format!(
                        "string of length {chars} is shorter than the minimum"
                    )));
                }
                if max_length.is_some_and(|max| chars > max) {
                    return Err(CoreError::validation(format!(
                        "string of length {chars} exceeds the maximum"
                    )));
                }
                Ok(Bson::String(s))
            }
            (FieldKind::Int, Bson::Int(n)) => Ok(Bson::Int(n)),
            (FieldKind::Int, Bson::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Bson::Int)
                .map_err(|_| CoreError::validation(format!("`{s}` is not an integer"))),
            (FieldKind::Double, Bson::Double(d)) => Ok(Bson::Double(d)),
            (FieldKind::Double, Bson::Int(n)) => Ok(Bson::Double(n as f64)),
            (FieldKind::Double, Bson::String(s)) => s
                .trim()
                .parse::<f64>()
                .map(Bson::Double)
                .map_err(|_| CoreError::validation(format!("`{s}` is not a number"))),
            (FieldKind::Bool, Bson::Bool(b)) => Ok(Bson::Bool(b)),
            (FieldKind::Date, Bson::DateTime(dt)) => Ok(Bson::DateTime(dt)),
            (FieldKind::Date, Bson::String(s)) => parse_date(&s),
            (FieldKind::ObjectId | FieldKind::Reference { .. }, Bson::ObjectId(id)) => {
                Ok(Bson::ObjectId(id))
            }
            (FieldKind::ObjectId | FieldKind::Reference { .. }, Bson::String(s)) => {
                Ok(Bson::ObjectId(ObjectId::parse_str(&s)?))
            }
            (FieldKind::Object { .. }, Bson::Document(doc)) => Ok(Bson::Document(doc)),
            (FieldKind::Array { items, min_items, max_items }, Bson::Array(elems)) => {
                let count = elems.len() as u32;
                if min_items.is_some_and(|min| count < min) {
                    return Err(CoreError::validation(format!(
                        "array of {count} elements is below the minimum"
                    )));
                }
                if max_items.is_some_and(|max| count > max) {
                    return Err(CoreError::validation(format!(
                        "array of {count} elements exceeds the maximum"
                    )));
                }
                if let Some(items) = items {
                    for elem in &elems {
                        validate_item(items, elem)?;
                    }
                }
                Ok(Bson::Array(elems))
            }
            (FieldKind::Enum { choices }, value) => {
                if choices.iter().any(|(choice, _)| *choice == value) {
                    Ok(value)
                } else {
                    Err(CoreError::invalid_choice(format!(
                        "{value:?} is not among the declared choices"
                    )))
                }
            }
            (kind, value) => Err(CoreError::validation(format!(
                "{} is not accepted by a {} field",
                value.type_name(),
                kind_name(kind)
            ))),
        }
    }

    /// The resolved value: the assigned value, or the default.
    ///
    /// Embedded objects assemble a document from their property
    /// descriptors.
    #[must_use]
    pub fn value(&self) -> Option<Bson> {
        if let FieldKind::Object { properties } = &self.kind {
            let doc: Document = properties
                .iter()
                .filter_map(|(name, field)| field.value().map(|v| (name.to_owned(), v)))
                .collect();
            if doc.is_empty() {
                return self.default.resolve();
            }
            return Some(Bson::Document(doc));
        }
        match &self.value {
            Some(v) => Some(v.clone()),
            None => self.default.resolve(),
        }
    }

    /// The assigned value, without default resolution.
    #[must_use]
    pub fn raw_value(&self) -> Option<&Bson> {
        self.value.as_ref()
    }

    /// The value loaded from the store, used as the dirty-tracking
    /// baseline.
    #[must_use]
    pub fn initial(&self) -> Option<&Bson> {
        self.initial.as_ref()
    }

    /// Loads a stored value without validating it.
    ///
    /// Stored documents may predate the current schema, so nothing is
    /// rejected here; the field is left clean. Embedded objects
    /// distribute onto matching properties and ignore unknown keys.
    pub fn assign_stored(&mut self, value: Bson) {
        if let (FieldKind::Object { properties }, Bson::Document(doc)) = (&mut self.kind, &value) {
            for (key, sub) in doc.iter() {
                if let Some(field) = properties.get_mut(key) {
                    field.assign_stored(sub.clone());
                }
            }
            return;
        }
        self.value = Some(value.clone());
        self.initial = Some(value);
    }

    /// Clears the assigned and baseline values.
    pub fn clear(&mut self) {
        self.value = None;
        self.initial = None;
        if let FieldKind::Object { properties } = &mut self.kind {
            for (_, field) in properties.iter_mut() {
                field.clear();
            }
        }
    }

    /// Adopts the current value as the clean baseline.
    pub fn mark_clean(&mut self) {
        self.initial = self.value.clone();
        if let FieldKind::Object { properties } = &mut self.kind {
            for (_, field) in properties.iter_mut() {
                field.mark_clean();
            }
        }
    }

    /// Whether the assigned value differs from the stored baseline.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        if let FieldKind::Object { properties } = &self.kind {
            return properties.iter().any(|(_, field)| field.is_modified());
        }
        self.value != self.initial
    }

    /// The value a shift writes into existing documents when this
    /// field is newly added.
    ///
    /// Embedded objects without an explicit default assemble one from
    /// their property defaults; anything else without a default fills
    /// with null.
    #[must_use]
    pub fn shift_default(&self) -> Bson {
        if let Some(v) = self.default.resolve() {
            return v;
        }
        if let FieldKind::Object { properties } = &self.kind {
            let doc: Document = properties
                .iter()
                .map(|(name, field)| (name.to_owned(), field.shift_default()))
                .collect();
            return Bson::Document(doc);
        }
        Bson::Null
    }

    /// The display label of the current value, for enumerations.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        let FieldKind::Enum { choices } = &self.kind else {
            return None;
        };
        let current = self.value.as_ref()?;
        choices
            .iter()
            .find(|(choice, _)| choice == current)
            .map(|(_, label)| label.as_str())
    }

    /// Assigns without validation. Used for shadow-field sync, where
    /// the value is already a vetted object id.
    pub(crate) fn set_raw(&mut self, value: Bson) {
        self.value = Some(value);
    }
}

fn find_reference(fields: &FieldSet) -> Option<&str> {
    fields
        .iter()
        .find(|(_, field)| field.is_reference())
        .map(|(name, _)| name)
}

fn validate_item(items: &FieldSet, elem: &Bson) -> CoreResult<()> {
    let Bson::Document(doc) = elem else {
        return Err(CoreError::validation(format!(
            "array element must be an object, got {}",
            elem.type_name()
        )));
    };
    for (key, sub) in doc.iter() {
        match items.get(key) {
            Some(field) => {
                let mut probe = field.clone();
                probe.set_value(sub.clone())?;
            }
            None => {
                return Err(CoreError::validation(format!(
                    "unknown array item property `{key}`"
                )))
            }
        }
    }
    for (name, field) in items.iter() {
        if field.is_required() && !doc.contains_key(name) {
            return Err(CoreError::validation(format!(
                "array item is missing required property `{name}`"
            )));
        }
    }
    Ok(())
}

fn parse_date(s: &str) -> CoreResult<Bson> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(Bson::DateTime(dt.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc));
        if let Some(dt) = midnight {
            return Ok(Bson::DateTime(dt));
        }
    }
    Err(CoreError::validation(format!("`{s}` is not a date")))
}

fn kind_name(kind: &FieldKind) -> impl fmt::Display + '_ {
    kind.bson_type().unwrap_or("enum")
}
