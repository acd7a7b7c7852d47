//! Tag sets and per-key tag diffs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Mapping of tag key to tag value.
pub type TagSet = BTreeMap<String, String>;

/// Minimal set of tag mutations that turns one tag set into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDiff {
    /// Keys present only in the desired set.
    pub added: TagSet,
    /// Keys present in both sets with a different desired value.
    pub changed: TagSet,
    /// Keys present only in the observed set.
    pub removed: BTreeSet<String>,
}

impl TagDiff {
    /// Computes the per-key difference from `observed` to `desired`.
    #[must_use]
    pub fn compute(observed: &TagSet, desired: &TagSet) -> Self {
        let mut diff = Self::default();

        for (key, value) in desired {
            match observed.get(key) {
                None => {
                    diff.added.insert(key.clone(), value.clone());
                }
                Some(current) if current != value => {
                    diff.changed.insert(key.clone(), value.clone());
                }
                Some(_) => {}
            }
        }

        diff.removed = observed
            .keys()
            .filter(|key| !desired.contains_key(*key))
            .cloned()
            .collect();

        diff
    }

    /// Returns true if no tag needs to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    /// Returns the number of keys touched.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.changed.len() + self.removed.len()
    }

    /// Returns every key/value that must be written (added and changed).
    #[must_use]
    pub fn upserts(&self) -> TagSet {
        self.added
            .iter()
            .chain(&self.changed)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Applies the diff to a tag set in place.
    ///
    /// Remotes that only support full replacement use this to derive the
    /// complete desired set from the last observed one.
    pub fn apply_to(&self, tags: &mut TagSet) {
        for key in &self.removed {
            tags.remove(key);
        }
        tags.extend(self.upserts());
    }
}

impl std::fmt::Display for TagDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        for key in self.added.keys() {
            parts.push(format!("+{key}"));
        }
        for key in self.changed.keys() {
            parts.push(format!("~{key}"));
        }
        for key in &self.removed {
            parts.push(format!("-{key}"));
        }
        write!(f, "tags[{}]", parts.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> TagSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_diff_reports_added_changed_removed() {
        let observed = tags(&[("a", "1"), ("b", "2")]);
        let desired = tags(&[("a", "1"), ("c", "3")]);

        let diff = TagDiff::compute(&observed, &desired);

        assert_eq!(diff.added, tags(&[("c", "3")]));
        assert!(diff.changed.is_empty());
        assert_eq!(diff.removed, BTreeSet::from([String::from("b")]));
    }

    #[test]
    fn test_diff_changed_value() {
        let observed = tags(&[("key1", "value1")]);
        let desired = tags(&[("key1", "value1updated"), ("key2", "value2")]);

        let diff = TagDiff::compute(&observed, &desired);

        assert_eq!(diff.changed, tags(&[("key1", "value1updated")]));
        assert_eq!(diff.added, tags(&[("key2", "value2")]));
        assert!(diff.removed.is_empty());
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn test_identical_sets_are_empty() {
        let set = tags(&[("env", "dev")]);
        assert!(TagDiff::compute(&set, &set).is_empty());
    }

    #[test]
    fn test_apply_to_converges() {
        let observed = tags(&[("key1", "value1updated"), ("key2", "value2")]);
        let desired = tags(&[("key2", "value2")]);

        let diff = TagDiff::compute(&observed, &desired);
        let mut current = observed;
        diff.apply_to(&mut current);

        assert_eq!(current, desired);
    }

    #[test]
    fn test_display() {
        let diff = TagDiff::compute(&tags(&[("b", "2")]), &tags(&[("c", "3")]));
        assert_eq!(diff.to_string(), "tags[+c -b]");
    }
}
