//! A resource type: a 4-character code, optional attributes and the
//! instances filed under it.
//!
//! Lookup by id and by name goes through hashed indices.  Duplicate ids and
//! names are tolerated; the index always points at the first instance
//! inserted with that key.

use std::collections::HashMap;

use crate::attribute::{self, Attributes};
use crate::data::Block;
use crate::hashing;
use crate::instance::Instance;

#[derive(Debug, Clone)]
pub struct ResourceType {
    code:       String,
    attributes: Attributes,
    instances:  Vec<Instance>,
    by_id:      HashMap<i64, usize>,
    by_name:    HashMap<String, usize>,
}

impl ResourceType {
    pub fn new(code: impl Into<String>, attributes: Attributes) -> Self {
        Self {
            code: code.into(),
            attributes,
            instances: Vec::new(),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
        }
    }

    /// Identity hash of a type: the code alone when there are no attributes,
    /// otherwise the code followed by the canonical attribute string.
    pub fn hash_for_code(code: &str, attributes: &Attributes) -> u64 {
        let mut key = code.to_owned();
        key.push_str(&attribute::canonical_string(attributes));
        hashing::hash_str(&key)
    }

    pub fn hash(&self) -> u64 {
        Self::hash_for_code(&self.code, &self.attributes)
    }

    pub fn code(&self) -> &str { &self.code }

    pub fn attributes(&self) -> &Attributes { &self.attributes }

    pub fn attribute_string(&self) -> String {
        attribute::canonical_string(&self.attributes)
    }

    pub fn instances(&self) -> &[Instance] { &self.instances }

    pub fn len(&self) -> usize { self.instances.len() }

    pub fn is_empty(&self) -> bool { self.instances.is_empty() }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Append a new instance and return it.
    pub fn add_resource(&mut self, id: i64, name: impl Into<String>, data: Block) -> &mut Instance {
        let instance = Instance::new(self.code.clone(), id, name, data);
        self.push(instance)
    }

    pub(crate) fn push(&mut self, instance: Instance) -> &mut Instance {
        let index = self.instances.len();
        self.by_id.entry(instance.id()).or_insert(index);
        if !instance.name().is_empty() {
            self.by_name.entry(instance.name().to_owned()).or_insert(index);
        }
        self.instances.push(instance);
        &mut self.instances[index]
    }

    /// Remove the first instance with `id`, returning it.
    pub fn remove_resource(&mut self, id: i64) -> Option<Instance> {
        let index = *self.by_id.get(&id)?;
        let removed = self.instances.remove(index);
        self.reindex();
        Some(removed)
    }

    /// Rename the first instance with `id`.  Returns false if there is none.
    pub fn rename_resource(&mut self, id: i64, name: impl Into<String>) -> bool {
        let Some(&index) = self.by_id.get(&id) else {
            return false;
        };
        self.instances[index].set_name(name);
        self.reindex();
        true
    }

    fn reindex(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
        for (index, instance) in self.instances.iter().enumerate() {
            self.by_id.entry(instance.id()).or_insert(index);
            if !instance.name().is_empty() {
                self.by_name.entry(instance.name().to_owned()).or_insert(index);
            }
        }
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    pub fn resource_with_id(&self, id: i64) -> Option<&Instance> {
        self.by_id.get(&id).map(|&i| &self.instances[i])
    }

    pub fn resource_with_id_mut(&mut self, id: i64) -> Option<&mut Instance> {
        let index = *self.by_id.get(&id)?;
        self.instances.get_mut(index)
    }

    pub fn resource_with_name(&self, name: &str) -> Option<&Instance> {
        self.by_name.get(name).map(|&i| &self.instances[i])
    }

    /// Instances whose name starts with `prefix`, in insertion order.
    pub fn resources_with_name_prefix<'a: 'q, 'q>(
        &'a self,
        prefix: &'q str,
    ) -> impl Iterator<Item = &'a Instance> + 'q {
        self.instances.iter().filter(move |i| i.name().starts_with(prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{from_pairs, namespace};

    fn payload(bytes: &[u8]) -> Block {
        Block::from(bytes)
    }

    #[test]
    fn hash_depends_on_attributes() {
        let plain = ResourceType::hash_for_code("snd ", &Attributes::new());
        let custom = ResourceType::hash_for_code("snd ", &namespace("custom"));
        assert_ne!(plain, custom);
        assert_eq!(plain, crate::hashing::hash_str("snd "));
    }

    #[test]
    fn hash_ignores_attribute_insertion_order() {
        let a = from_pairs([("namespace", "x"), ("bank", "1")]);
        let b = from_pairs([("bank", "1"), ("namespace", "x")]);
        assert_eq!(
            ResourceType::hash_for_code("PICT", &a),
            ResourceType::hash_for_code("PICT", &b)
        );
    }

    #[test]
    fn first_insertion_wins() {
        let mut ty = ResourceType::new("TEXT", Attributes::new());
        ty.add_resource(128, "intro", payload(b"one"));
        ty.add_resource(128, "intro", payload(b"two"));
        assert_eq!(ty.len(), 2);
        assert_eq!(ty.resource_with_id(128).unwrap().data().to_vec(), b"one");
        assert_eq!(ty.resource_with_name("intro").unwrap().data().to_vec(), b"one");
        assert!(ty.resource_with_id(129).is_none());
        assert!(ty.resource_with_name("").is_none());
    }

    #[test]
    fn remove_promotes_next_duplicate() {
        let mut ty = ResourceType::new("TEXT", Attributes::new());
        ty.add_resource(1, "a", payload(b"1"));
        ty.add_resource(2, "b", payload(b"2"));
        ty.add_resource(1, "c", payload(b"3"));
        assert_eq!(ty.remove_resource(1).unwrap().name(), "a");
        assert_eq!(ty.resource_with_id(1).unwrap().name(), "c");
        assert_eq!(ty.resource_with_id(2).unwrap().name(), "b");
        assert!(ty.resource_with_name("a").is_none());
    }

    #[test]
    fn rename_updates_name_index() {
        let mut ty = ResourceType::new("TEXT", Attributes::new());
        ty.add_resource(1, "old", payload(b""));
        assert!(ty.rename_resource(1, "new"));
        assert!(ty.resource_with_name("old").is_none());
        assert_eq!(ty.resource_with_name("new").unwrap().id(), 1);
        assert!(!ty.rename_resource(9, "x"));
    }

    #[test]
    fn prefix_search() {
        let mut ty = ResourceType::new("snd ", Attributes::new());
        ty.add_resource(1, "Beep", payload(b""));
        ty.add_resource(2, "Boing", payload(b""));
        ty.add_resource(3, "Click", payload(b""));
        let names: Vec<_> = ty.resources_with_name_prefix("B").map(|i| i.name()).collect();
        assert_eq!(names, ["Beep", "Boing"]);
    }
}
