//! # docshift store
//!
//! Store collaborator interfaces for docshift.
//!
//! This crate defines the narrow surface the core consumes from a
//! document store:
//! - [`ConnectionRegistry`] — resolves a database alias to a live handle
//! - [`DatabaseHandle`] / [`CollectionHandle`] — collection resolution and
//!   the CRUD + validator operations
//! - [`DocumentCursor`] — the store's native result cursor
//!
//! plus an in-memory implementation ([`MemoryRegistry`]) used by tests.
//! Every operation is a blocking round trip; retry and timeout policy
//! belong to the implementing driver, never to this layer.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod handle;
mod memory;

pub use error::{StoreError, StoreResult};
pub use handle::{
    CollectionHandle, ConnectionRegistry, DatabaseHandle, DeleteAck, DocumentCursor, InsertAck,
    SortOrder, UpdateAck, ValidationLevel, ValidatorOptions,
};
pub use memory::{MemoryCollection, MemoryDatabase, MemoryRegistry};
