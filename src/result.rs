//! Query results aggregated across files.
//!
//! A [`QueryResult`] is built in two phases.  While open it accepts
//! [`QueryResult::add`]; instances are keyed by `(type code, id)` and the
//! first instance added for a key wins.  [`QueryResult::finalize`] then sorts
//! by id (stable, so ties keep insertion order) and freezes the result.

use std::collections::HashMap;

use crate::error::{ResourceError, Result};
use crate::hashing;
use crate::instance::Instance;

#[derive(Debug, Clone, Default)]
pub struct QueryResult<'a> {
    entries:   HashMap<u64, &'a Instance>,
    order:     Vec<u64>,
    finalized: bool,
}

/// Composite key of a type code and an id.
fn key(code: &str, id: i64) -> u64 {
    let mut bytes = Vec::with_capacity(code.len() + 8);
    bytes.extend_from_slice(code.as_bytes());
    bytes.extend_from_slice(&id.to_be_bytes());
    hashing::hash(&bytes)
}

impl<'a> QueryResult<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect `instances` (first per key wins) and finalize.
    pub fn from_instances<I>(instances: I) -> Self
    where
        I: IntoIterator<Item = &'a Instance>,
    {
        let mut result = Self::new();
        for instance in instances {
            result.insert(instance);
        }
        result.finalize();
        result
    }

    /// Add `instance`.  Returns `Ok(false)` when an instance with the same
    /// type code and id is already present.
    pub fn add(&mut self, instance: &'a Instance) -> Result<bool> {
        if self.finalized {
            return Err(ResourceError::ResultFinalized);
        }
        Ok(self.insert(instance))
    }

    fn insert(&mut self, instance: &'a Instance) -> bool {
        let key = key(instance.type_code(), instance.id());
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, instance);
        self.order.push(key);
        true
    }

    /// Sort by ascending id and stop accepting additions.  Idempotent.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        let entries = &self.entries;
        self.order.sort_by_key(|k| entries[k].id());
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool { self.finalized }

    /// A new finalized result holding the instances that satisfy `predicate`.
    pub fn filter(&self, predicate: impl Fn(&Instance) -> bool) -> QueryResult<'a> {
        QueryResult::from_instances(self.iter().filter(|i| predicate(i)))
    }

    /// Instances in id order once finalized, insertion order before.
    pub fn iter(&self) -> impl Iterator<Item = &'a Instance> + '_ {
        self.order.iter().map(|k| self.entries[k])
    }

    pub fn get(&self, index: usize) -> Option<&'a Instance> {
        self.order.get(index).map(|k| self.entries[k])
    }

    pub fn first(&self) -> Option<&'a Instance> {
        self.get(0)
    }

    pub fn len(&self) -> usize { self.order.len() }

    pub fn is_empty(&self) -> bool { self.order.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Block;

    fn instance(code: &str, id: i64, name: &str) -> Instance {
        Instance::new(code, id, name, Block::empty())
    }

    #[test]
    fn finalize_sorts_by_id_stably() {
        let items = [instance("PICT", 5, "e"), instance("PICT", -1, "a"), instance("snd ", 5, "f")];
        let mut result = QueryResult::new();
        for i in &items {
            assert!(result.add(i).unwrap());
        }
        let before: Vec<_> = result.iter().map(|i| i.name()).collect();
        assert_eq!(before, ["e", "a", "f"]);

        result.finalize();
        let after: Vec<_> = result.iter().map(|i| i.name()).collect();
        assert_eq!(after, ["a", "e", "f"]);
    }

    #[test]
    fn first_add_wins_per_key() {
        let items = [instance("PICT", 1, "new"), instance("PICT", 1, "old")];
        let mut result = QueryResult::new();
        assert!(result.add(&items[0]).unwrap());
        assert!(!result.add(&items[1]).unwrap());
        assert_eq!(result.len(), 1);
        assert_eq!(result.first().unwrap().name(), "new");
    }

    #[test]
    fn finalized_result_refuses_additions() {
        let item = instance("PICT", 1, "");
        let mut result = QueryResult::new();
        result.finalize();
        assert!(matches!(result.add(&item), Err(ResourceError::ResultFinalized)));
    }

    #[test]
    fn filter_produces_finalized_result() {
        let items: Vec<_> = (0..6).rev().map(|id| instance("TEXT", id, "")).collect();
        let result = QueryResult::from_instances(&items);
        let even = result.filter(|i| i.id() % 2 == 0);
        assert!(even.is_finalized());
        let ids: Vec<_> = even.iter().map(Instance::id).collect();
        assert_eq!(ids, [0, 2, 4]);
        assert!(result.get(6).is_none());
    }
}
