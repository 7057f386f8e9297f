//! Ordered field collections.

use crate::field::FieldDescriptor;

/// An insertion-ordered map of field names to descriptors.
///
/// Declaration order is preserved so derived validators come out
/// deterministic. `Clone` is the explicit prototype operation: every
/// descriptor owns its values, so a clone shares no mutable state with
/// its source.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: Vec<(String, FieldDescriptor)>,
}

impl FieldSet {
    /// Creates an empty field set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Checks whether the set has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Checks whether a field name is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    /// Looks up a field by name, mutably.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldDescriptor> {
        self.fields
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    /// Adds a field, replacing any existing descriptor in place.
    ///
    /// New names append, so declaration order is preserved.
    pub fn insert(&mut self, name: impl Into<String>, field: FieldDescriptor) {
        let name = name.into();
        match self.get_mut(&name) {
            Some(slot) => *slot = field,
            None => self.fields.push((name, field)),
        }
    }

    /// Iterates over `(name, descriptor)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldDescriptor)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Iterates mutably over `(name, descriptor)` pairs.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut FieldDescriptor)> {
        self.fields.iter_mut().map(|(n, f)| (n.as_str(), f))
    }

    /// Iterates over field names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }
}

impl<K: Into<String>> FromIterator<(K, FieldDescriptor)> for FieldSet {
    fn from_iter<I: IntoIterator<Item = (K, FieldDescriptor)>>(iter: I) -> Self {
        let mut set = FieldSet::new();
        for (name, field) in iter {
            set.insert(name, field);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docshift_bson::Bson;

    #[test]
    fn declaration_order_preserved() {
        let mut set = FieldSet::new();
        set.insert("make", FieldDescriptor::string());
        set.insert("year", FieldDescriptor::int());
        set.insert("active", FieldDescriptor::boolean());

        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["make", "year", "active"]);
    }

    #[test]
    fn clone_is_independent() {
        let mut set = FieldSet::new();
        set.insert("make", FieldDescriptor::string());

        let mut copy = set.clone();
        copy.get_mut("make")
            .unwrap()
            .set_value(Bson::from("Civic"))
            .unwrap();

        // The source descriptor is untouched.
        assert_eq!(set.get("make").unwrap().raw_value(), None);
        assert_eq!(
            copy.get("make").unwrap().raw_value(),
            Some(&Bson::from("Civic"))
        );
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut set = FieldSet::new();
        set.insert("year", FieldDescriptor::string());
        set.insert("year", FieldDescriptor::int());

        assert_eq!(set.len(), 1);
        set.get_mut("year").unwrap().set_value(Bson::Int(2020)).unwrap();
    }
}
