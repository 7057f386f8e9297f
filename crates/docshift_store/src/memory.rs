//! In-memory store implementation for testing.

use crate::error::{StoreError, StoreResult};
use crate::handle::{
    CollectionHandle, ConnectionRegistry, DatabaseHandle, DeleteAck, DocumentCursor, InsertAck,
    SortOrder, UpdateAck, ValidationLevel, ValidatorOptions,
};
use docshift_bson::{Bson, Document, ObjectId};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory connection registry.
///
/// Databases and collections are created on first resolution, which is
/// what tests want. Suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral fixtures that don't need persistence
///
/// Validator options are stored and returned but **not enforced** on
/// writes; enforcement is a real server's job.
#[derive(Default)]
pub struct MemoryRegistry {
    databases: RwLock<HashMap<String, Arc<MemoryDatabase>>>,
}

impl MemoryRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectionRegistry for MemoryRegistry {
    fn database(&self, alias: &str) -> StoreResult<Arc<dyn DatabaseHandle>> {
        let mut databases = self.databases.write();
        let database = databases
            .entry(alias.to_string())
            .or_insert_with(|| Arc::new(MemoryDatabase::new(alias)))
            .clone();
        Ok(database)
    }
}

/// An in-memory database.
pub struct MemoryDatabase {
    name: String,
    collections: RwLock<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }
}

impl DatabaseHandle for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn CollectionHandle> {
        let mut collections = self.collections.write();
        collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryCollection::new(name)))
            .clone()
    }
}

/// An in-memory collection.
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
    validator: RwLock<Option<ValidatorOptions>>,
}

impl MemoryCollection {
    /// Creates an empty collection.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
            validator: RwLock::new(None),
        }
    }

    /// Returns a copy of every stored document, in insertion order.
    ///
    /// Useful for asserting on migration results in tests.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.documents.read().clone()
    }
}

impl CollectionHandle for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn find(&self, filter: &Document) -> StoreResult<Box<dyn DocumentCursor>> {
        let matched: Vec<Document> = self
            .documents
            .read()
            .iter()
            .filter(|doc| matches_filter(doc, filter))
            .cloned()
            .collect();
        Ok(Box::new(MemoryCursor::new(matched)))
    }

    fn find_one(&self, filter: &Document) -> StoreResult<Option<Document>> {
        Ok(self
            .documents
            .read()
            .iter()
            .find(|doc| matches_filter(doc, filter))
            .cloned())
    }

    fn insert_one(&self, mut document: Document) -> StoreResult<InsertAck> {
        let id = match document.get("_id") {
            Some(Bson::ObjectId(id)) => *id,
            Some(other) => {
                return Err(StoreError::invalid_update(format!(
                    "_id must be an objectId, got {}",
                    other.type_name()
                )))
            }
            None => {
                let id = ObjectId::new();
                document.set("_id", Bson::ObjectId(id));
                id
            }
        };

        let mut documents = self.documents.write();
        let collides = documents
            .iter()
            .any(|doc| doc.get("_id") == Some(&Bson::ObjectId(id)));
        if collides {
            return Err(StoreError::duplicate_id(id.to_hex()));
        }

        documents.push(document);
        Ok(InsertAck {
            acknowledged: true,
            inserted_id: id,
        })
    }

    fn update_one(&self, filter: &Document, update: &Document) -> StoreResult<UpdateAck> {
        self.apply_update(filter, update, true)
    }

    fn update_many(&self, filter: &Document, update: &Document) -> StoreResult<UpdateAck> {
        self.apply_update(filter, update, false)
    }

    fn delete_one(&self, filter: &Document) -> StoreResult<DeleteAck> {
        let mut documents = self.documents.write();
        let index = documents.iter().position(|doc| matches_filter(doc, filter));
        let deleted = match index {
            Some(index) => {
                documents.remove(index);
                1
            }
            None => 0,
        };
        Ok(DeleteAck {
            acknowledged: true,
            deleted,
        })
    }

    fn delete_many(&self, filter: &Document) -> StoreResult<DeleteAck> {
        let mut documents = self.documents.write();
        let before = documents.len();
        documents.retain(|doc| !matches_filter(doc, filter));
        Ok(DeleteAck {
            acknowledged: true,
            deleted: (before - documents.len()) as u64,
        })
    }

    fn count(&self, filter: &Document) -> StoreResult<u64> {
        Ok(self
            .documents
            .read()
            .iter()
            .filter(|doc| matches_filter(doc, filter))
            .count() as u64)
    }

    fn validator_options(&self) -> StoreResult<Option<ValidatorOptions>> {
        Ok(self.validator.read().clone())
    }

    fn replace_validator(&self, schema: Document, level: ValidationLevel) -> StoreResult<()> {
        *self.validator.write() = Some(ValidatorOptions { schema, level });
        Ok(())
    }
}

impl MemoryCollection {
    fn apply_update(
        &self,
        filter: &Document,
        update: &Document,
        single: bool,
    ) -> StoreResult<UpdateAck> {
        let mut documents = self.documents.write();
        let mut matched = 0;
        let mut modified = 0;

        for doc in documents.iter_mut() {
            if !matches_filter(doc, filter) {
                continue;
            }
            matched += 1;
            if apply_operators(doc, update)? {
                modified += 1;
            }
            if single {
                break;
            }
        }

        Ok(UpdateAck {
            acknowledged: true,
            matched,
            modified,
        })
    }
}

/// Applies `$set`/`$unset` operators; returns whether the document changed.
fn apply_operators(doc: &mut Document, update: &Document) -> StoreResult<bool> {
    let mut changed = false;
    for (operator, spec) in update.iter() {
        let spec = spec.as_document().ok_or_else(|| {
            StoreError::invalid_update(format!("{operator} expects a document"))
        })?;
        match operator {
            "$set" => {
                for (path, value) in spec.iter() {
                    if doc.get_path(path) != Some(value) {
                        doc.set_path(path, value.clone());
                        changed = true;
                    }
                }
            }
            "$unset" => {
                for (path, _) in spec.iter() {
                    if doc.unset_path(path).is_some() {
                        changed = true;
                    }
                }
            }
            other => {
                return Err(StoreError::invalid_update(format!(
                    "unsupported update operator {other}"
                )))
            }
        }
    }
    Ok(changed)
}

/// Equality filter matching on top-level and dotted-path keys.
///
/// A `null` filter value matches both an explicit null and a missing
/// field, as the real store does.
fn matches_filter(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(path, expected)| match doc.get_path(path) {
        Some(actual) => actual == expected,
        None => expected.is_null(),
    })
}

/// Cursor over a snapshot of matched documents.
struct MemoryCursor {
    documents: Vec<Document>,
    position: usize,
    limit: Option<u64>,
    sort: Option<(String, SortOrder)>,
}

impl MemoryCursor {
    fn new(documents: Vec<Document>) -> Self {
        Self {
            documents,
            position: 0,
            limit: None,
            sort: None,
        }
    }
}

impl DocumentCursor for MemoryCursor {
    fn next_document(&mut self) -> StoreResult<Option<Document>> {
        if let Some(limit) = self.limit {
            if self.position as u64 >= limit {
                return Ok(None);
            }
        }
        let doc = self.documents.get(self.position).cloned();
        if doc.is_some() {
            self.position += 1;
        }
        Ok(doc)
    }

    fn limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    fn sort(&mut self, key: &str, order: SortOrder) {
        self.sort = Some((key.to_string(), order));
        self.documents.sort_by(|a, b| {
            let ord = compare_values(a.get_path(key), b.get_path(key));
            match order {
                SortOrder::Ascending => ord,
                SortOrder::Descending => ord.reverse(),
            }
        });
    }

    fn rewind(&mut self) {
        self.position = 0;
    }

    fn clone_cursor(&self) -> Box<dyn DocumentCursor> {
        Box::new(MemoryCursor {
            documents: self.documents.clone(),
            position: 0,
            limit: self.limit,
            sort: self.sort.clone(),
        })
    }
}

/// Total order over optional values: by type rank first, then content.
fn compare_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => compare_bson(a, b),
    }
}

fn type_rank(value: &Bson) -> u8 {
    match value {
        Bson::Null => 0,
        Bson::Bool(_) => 1,
        Bson::Int(_) | Bson::Double(_) => 2,
        Bson::String(_) => 3,
        Bson::DateTime(_) => 4,
        Bson::ObjectId(_) => 5,
        Bson::Array(_) => 6,
        Bson::Document(_) => 7,
    }
}

fn compare_bson(a: &Bson, b: &Bson) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }
    match (a, b) {
        (Bson::Bool(a), Bson::Bool(b)) => a.cmp(b),
        (Bson::Int(a), Bson::Int(b)) => a.cmp(b),
        (Bson::Double(a), Bson::Double(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (Bson::Int(a), Bson::Double(b)) => {
            (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
        }
        (Bson::Double(a), Bson::Int(b)) => {
            a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
        }
        (Bson::String(a), Bson::String(b)) => a.cmp(b),
        (Bson::DateTime(a), Bson::DateTime(b)) => a.cmp(b),
        (Bson::ObjectId(a), Bson::ObjectId(b)) => a.cmp(b),
        (Bson::Array(a), Bson::Array(b)) => {
            for (av, bv) in a.iter().zip(b.iter()) {
                let ord = compare_bson(av, bv);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            a.len().cmp(&b.len())
        }
        _ => Ordering::Equal,
    }
}
