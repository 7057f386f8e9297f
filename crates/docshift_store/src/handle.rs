//! Store collaborator trait definitions.

use crate::error::StoreResult;
use docshift_bson::{Document, ObjectId};
use std::sync::Arc;

/// Validation strictness the store enforces on writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationLevel {
    /// Every insert and update is validated.
    #[default]
    Strict,
    /// Only inserts and updates to already-valid documents are validated.
    Moderate,
}

impl ValidationLevel {
    /// Returns the store-side name of this level.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Strict => "strict",
            ValidationLevel::Moderate => "moderate",
        }
    }
}

/// The validator currently enforced on a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatorOptions {
    /// The enforced schema, as handed to `replace_validator`.
    pub schema: Document,
    /// The enforcement strictness.
    pub level: ValidationLevel,
}

/// Sort direction for cursor ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Smallest value first.
    Ascending,
    /// Largest value first.
    Descending,
}

/// Acknowledgment of a single-document insert.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertAck {
    /// Whether the store acknowledged the write.
    pub acknowledged: bool,
    /// The identity the document was stored under.
    pub inserted_id: ObjectId,
}

/// Acknowledgment of an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateAck {
    /// Whether the store acknowledged the write.
    pub acknowledged: bool,
    /// Number of documents the filter matched.
    pub matched: u64,
    /// Number of documents actually modified.
    pub modified: u64,
}

/// Acknowledgment of a delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteAck {
    /// Whether the store acknowledged the write.
    pub acknowledged: bool,
    /// Number of documents removed.
    pub deleted: u64,
}

/// Resolves database aliases to live database handles.
///
/// This is the only ambient dependency the core takes; it is passed
/// explicitly into every component that needs one (mapper, manager,
/// shift engine) rather than read from global state.
pub trait ConnectionRegistry: Send + Sync {
    /// Resolves a database alias.
    ///
    /// # Errors
    ///
    /// Returns an error if no database is registered under `alias`.
    fn database(&self, alias: &str) -> StoreResult<Arc<dyn DatabaseHandle>>;
}

/// A live database connection.
pub trait DatabaseHandle: Send + Sync {
    /// Returns the database name.
    fn name(&self) -> &str;

    /// Resolves a collection by name, creating it if the store allows.
    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle>;
}

/// A live collection.
///
/// Collections are **opaque document stores**: they match simple equality
/// filters (dotted paths included), apply `$set`/`$unset` updates, and
/// carry an optional enforced validator. Each call is one atomic,
/// blocking round trip; nothing here spans calls transactionally.
pub trait CollectionHandle: Send + Sync {
    /// Returns the collection name.
    fn name(&self) -> &str;

    /// Finds all documents matching an equality filter.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    fn find(&self, filter: &Document) -> StoreResult<Box<dyn DocumentCursor>>;

    /// Finds at most one matching document.
    ///
    /// A miss is `Ok(None)`, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    fn find_one(&self, filter: &Document) -> StoreResult<Option<Document>>;

    /// Inserts one document, generating an `_id` when absent.
    ///
    /// # Errors
    ///
    /// Returns an error on id collision or an unacknowledged write.
    fn insert_one(&self, document: Document) -> StoreResult<InsertAck>;

    /// Applies an update document to the first matching document.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown update operator or a failed
    /// round trip.
    fn update_one(&self, filter: &Document, update: &Document) -> StoreResult<UpdateAck>;

    /// Applies an update document to every matching document.
    ///
    /// # Errors
    ///
    /// Returns an error on an unknown update operator or a failed
    /// round trip.
    fn update_many(&self, filter: &Document, update: &Document) -> StoreResult<UpdateAck>;

    /// Deletes the first matching document.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    fn delete_one(&self, filter: &Document) -> StoreResult<DeleteAck>;

    /// Deletes every matching document.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    fn delete_many(&self, filter: &Document) -> StoreResult<DeleteAck>;

    /// Counts matching documents without materializing them.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    fn count(&self, filter: &Document) -> StoreResult<u64>;

    /// Returns the validator currently enforced on this collection.
    ///
    /// `None` means the collection is schemaless.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    fn validator_options(&self) -> StoreResult<Option<ValidatorOptions>>;

    /// Replaces the enforced validator and its strictness in one command.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    fn replace_validator(&self, schema: Document, level: ValidationLevel) -> StoreResult<()>;
}

/// The store's native result cursor.
///
/// Cursors are forward-only. [`DocumentCursor::clone_cursor`] produces an
/// independent cursor positioned at the start with the same limit and
/// sort; result sets use it to count without consuming the original.
pub trait DocumentCursor: Send {
    /// Returns the next document, or `None` when exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    fn next_document(&mut self) -> StoreResult<Option<Document>>;

    /// Caps the number of documents the cursor will yield.
    fn limit(&mut self, limit: u64);

    /// Orders the remaining results by a (possibly dotted) key.
    fn sort(&mut self, key: &str, order: SortOrder);

    /// Resets the cursor to the start of its results.
    fn rewind(&mut self);

    /// Produces an independent cursor over the same results.
    fn clone_cursor(&self) -> Box<dyn DocumentCursor>;
}
