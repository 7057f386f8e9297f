//! Insertion-ordered document type.

use crate::value::Bson;

/// An insertion-ordered map of field names to values.
///
/// `Document` preserves the order keys were first inserted, which keeps
/// derived validators deterministic. Lookup is linear; documents here are
/// declaration-sized, not data-sized.
///
/// Dotted paths (`"engine.cylinders"`) address nested documents the way
/// the store's update operators do.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    entries: Vec<(String, Bson)>,
}

impl Document {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of top-level keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks whether the document has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a top-level key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Looks up a top-level key mutably.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Bson> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Checks whether a top-level key is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Sets a top-level key, replacing any existing value in place.
    ///
    /// New keys append, so insertion order is preserved.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Bson>) {
        let key = key.into();
        let value = value.into();
        match self.get_mut(&key) {
            Some(slot) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes a top-level key, returning its value if present.
    pub fn remove(&mut self, key: &str) -> Option<Bson> {
        let index = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(index).1)
    }

    /// Iterates over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Bson)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Iterates over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// Looks up a dotted path, descending through nested documents.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&Bson> {
        let mut current = self;
        let mut segments = path.split('.').peekable();

        while let Some(segment) = segments.next() {
            let value = current.get(segment)?;
            if segments.peek().is_none() {
                return Some(value);
            }
            current = value.as_document()?;
        }
        None
    }

    /// Sets a dotted path, creating intermediate documents as needed.
    ///
    /// A non-document intermediate value is replaced by a document, the
    /// same way the store's `$set` behaves.
    pub fn set_path(&mut self, path: &str, value: impl Into<Bson>) {
        let segments: Vec<&str> = path.split('.').collect();
        Self::set_path_segments(self, &segments, value.into());
    }

    fn set_path_segments(doc: &mut Document, segments: &[&str], value: Bson) {
        let (head, rest) = match segments.split_first() {
            Some(split) => split,
            None => return,
        };

        if rest.is_empty() {
            doc.set(*head, value);
            return;
        }

        let needs_document = !matches!(doc.get(head), Some(Bson::Document(_)));
        if needs_document {
            doc.set(*head, Bson::Document(Document::new()));
        }
        if let Some(Bson::Document(inner)) = doc.get_mut(head) {
            Self::set_path_segments(inner, rest, value);
        }
    }

    /// Removes a dotted path, returning the removed value if present.
    pub fn unset_path(&mut self, path: &str) -> Option<Bson> {
        match path.split_once('.') {
            None => self.remove(path),
            Some((head, rest)) => match self.get_mut(head)? {
                Bson::Document(inner) => inner.unset_path(rest),
                _ => None,
            },
        }
    }
}

impl<K: Into<String>, V: Into<Bson>, const N: usize> From<[(K, V); N]> for Document {
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<Bson>> FromIterator<(K, V)> for Document {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.set(k, v);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Bson);
    type IntoIter = std::vec::IntoIter<(String, Bson)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut doc = Document::new();
        doc.set("name", "Alice");
        doc.set("age", 30);

        assert_eq!(doc.get("name"), Some(&Bson::from("Alice")));
        assert_eq!(doc.get("age"), Some(&Bson::Int(30)));
        assert_eq!(doc.get("missing"), None);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut doc = Document::from([("a", 1i64), ("b", 2i64)]);
        doc.set("a", 10i64);

        assert_eq!(doc.get("a"), Some(&Bson::Int(10)));
        // Order unchanged
        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn insertion_order_preserved() {
        let mut doc = Document::new();
        doc.set("z", 1i64);
        doc.set("a", 2i64);
        doc.set("m", 3i64);

        let keys: Vec<&str> = doc.keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn remove_key() {
        let mut doc = Document::from([("a", 1i64), ("b", 2i64)]);
        assert_eq!(doc.remove("a"), Some(Bson::Int(1)));
        assert_eq!(doc.remove("a"), None);
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn get_path_descends() {
        let mut doc = Document::new();
        doc.set_path("engine.cylinders", 6i64);
        doc.set_path("engine.fuel.kind", "diesel");

        assert_eq!(doc.get_path("engine.cylinders"), Some(&Bson::Int(6)));
        assert_eq!(doc.get_path("engine.fuel.kind"), Some(&Bson::from("diesel")));
        assert_eq!(doc.get_path("engine.missing"), None);
        assert_eq!(doc.get_path("missing.path"), None);
    }

    #[test]
    fn set_path_replaces_non_document_intermediate() {
        let mut doc = Document::from([("engine", 1i64)]);
        doc.set_path("engine.cylinders", 4i64);
        assert_eq!(doc.get_path("engine.cylinders"), Some(&Bson::Int(4)));
    }

    #[test]
    fn unset_path_removes_leaf() {
        let mut doc = Document::new();
        doc.set_path("engine.cylinders", 6i64);
        doc.set_path("engine.liters", Bson::Double(3.0));

        assert_eq!(doc.unset_path("engine.cylinders"), Some(Bson::Int(6)));
        assert_eq!(doc.get_path("engine.cylinders"), None);
        // Sibling untouched
        assert_eq!(doc.get_path("engine.liters"), Some(&Bson::Double(3.0)));
        // Unsetting again is a no-op
        assert_eq!(doc.unset_path("engine.cylinders"), None);
    }

    #[test]
    fn from_array_literal() {
        let doc = Document::from([("make", Bson::from("Civic")), ("year", Bson::Int(2020))]);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.get("year"), Some(&Bson::Int(2020)));
    }
}
