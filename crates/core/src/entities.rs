//! `Entities` — the insertion-ordered entity map attached to every parsed path.
//!
//! Values are always strings; key order records the position at which each
//! entity was discovered in the source path (directory keys first, then
//! basename keys, then suffix and extension).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An ordered mapping from long entity names to string values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entities(IndexMap<String, String>);

impl Entities {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    /// Insert a pair. Re-inserting an existing key updates the value in place
    /// without changing its position.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(|s| s.as_str())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    /// A copy with the named keys removed, preserving the order of the rest.
    pub fn without(&self, exclude: &[&str]) -> Entities {
        Entities(
            self.0
                .iter()
                .filter(|(k, _)| !exclude.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// True if every pair of `self` also appears in `other` with equal value.
    pub fn is_subset_of(&self, other: &Entities) -> bool {
        self.iter().all(|(k, v)| other.get(k) == Some(v))
    }

    /// True if at least one (name, value) pair appears in both maps.
    pub fn intersects(&self, other: &Entities) -> bool {
        self.iter().any(|(k, v)| other.get(k) == Some(v))
    }
}

impl FromIterator<(String, String)> for Entities {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Entities {
    type Item = (&'a String, &'a String);
    type IntoIter = indexmap::map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Entities {
        let mut e = Entities::new();
        e.insert("subject", "01");
        e.insert("task", "rest");
        e.insert("suffix", "bold");
        e.insert("extension", ".nii.gz");
        e
    }

    #[test]
    fn test_insertion_order_preserved() {
        let e = sample();
        let keys: Vec<&str> = e.keys().collect();
        assert_eq!(keys, vec!["subject", "task", "suffix", "extension"]);
    }

    #[test]
    fn test_reinsert_keeps_position() {
        let mut e = sample();
        e.insert("subject", "02");
        let keys: Vec<&str> = e.keys().collect();
        assert_eq!(keys[0], "subject");
        assert_eq!(e.get("subject"), Some("02"));
    }

    #[test]
    fn test_without() {
        let e = sample().without(&["extension"]);
        assert!(!e.contains_key("extension"));
        assert_eq!(e.len(), 3);
    }

    #[test]
    fn test_subset_and_overlap() {
        let full = sample();
        let sub = full.without(&["subject", "extension"]);
        assert!(sub.is_subset_of(&full));
        assert!(!full.is_subset_of(&sub));
        assert!(sub.intersects(&full));

        let mut other = Entities::new();
        other.insert("task", "nback");
        assert!(!other.is_subset_of(&full));
        assert!(!other.intersects(&full));
    }

    #[test]
    fn test_serde_round_trip_keeps_order() {
        let e = sample();
        let json = serde_json::to_string(&e).unwrap();
        let back: Entities = serde_json::from_str(&json).unwrap();
        let keys: Vec<&str> = back.keys().collect();
        assert_eq!(keys, vec!["subject", "task", "suffix", "extension"]);
        assert_eq!(back, e);
    }

    #[test]
    fn test_equality_ignores_order() {
        let mut a = Entities::new();
        a.insert("subject", "01");
        a.insert("task", "rest");
        let mut b = Entities::new();
        b.insert("task", "rest");
        b.insert("subject", "01");
        assert_eq!(a, b);
    }
}
