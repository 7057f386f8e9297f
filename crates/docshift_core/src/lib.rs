//! Object-document mapping with schema shifting.
//!
//! `docshift_core` turns declared entity types into enforced
//! collection schemas and back:
//!
//! - [`FieldDescriptor`]s declare typed fields with defaults,
//!   nullability, and nesting; [`EntityType`] assembles them into a
//!   prototype every instance is cloned from.
//! - [`schema::build_validator`] derives the `$jsonSchema` validator
//!   a collection enforces.
//! - [`Entity`] maps documents to typed values with dirty tracking;
//!   [`Manager`] persists them and hands out cursor-backed
//!   [`DocumentSet`]s.
//! - [`EntityRegistry`] wires types to connections and exposes
//!   reverse relations.
//! - [`ShiftEngine`] reconciles a live collection with a changed
//!   declaration: removed fields are unset, new fields back-filled,
//!   retyped fields reset, and the validator replaced.
//!
//! Everything is synchronous; each store call is one blocking round
//! trip. The connection registry is passed in explicitly wherever it
//! is needed.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod field;
mod manager;
mod registry;
pub mod schema;
mod shift;

pub use entity::{shadow_name, Entity, EntityType, EntityTypeBuilder, ID_FIELD};
pub use error::{CoreError, CoreResult};
pub use field::{FieldDefault, FieldDescriptor, FieldKind, FieldSet};
pub use manager::{DocumentSet, Manager};
pub use registry::EntityRegistry;
pub use shift::{Alteration, Examination, FieldShift, ShiftEngine, ShiftState};

pub use docshift_bson::{Bson, Document, ObjectId};
pub use docshift_store::{
    ConnectionRegistry, DeleteAck, InsertAck, MemoryRegistry, SortOrder, UpdateAck,
    ValidationLevel,
};
