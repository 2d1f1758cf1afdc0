//! Key/value attributes that namespace a resource type.
//!
//! Attributes live in a [`BTreeMap`], so iteration is always in key order and
//! the canonical string is independent of insertion order.

use std::collections::BTreeMap;

pub type Attributes = BTreeMap<String, String>;

/// Attribute key used to place a type in a namespace.
pub const NAMESPACE: &str = "namespace";

/// Namespace value that matches every namespace variant in a query.
pub const UNIVERSAL_NAMESPACE: &str = "*";

/// Concatenation of `<name:value>` for every attribute in key order.  Empty
/// when there are no attributes.
pub fn canonical_string(attributes: &Attributes) -> String {
    attributes
        .iter()
        .map(|(name, value)| format!("<{name}:{value}>"))
        .collect()
}

/// Build an attribute map from borrowed pairs.
pub fn from_pairs<'a, I>(pairs: I) -> Attributes
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

pub fn namespace(name: &str) -> Attributes {
    from_pairs([(NAMESPACE, name)])
}

/// True when `candidate` satisfies `filter`.  Every filter entry must be
/// present with the same value, except `namespace = "*"` which accepts any
/// namespace (or none).  Extra candidate attributes fail the match unless
/// the universal namespace absorbs them.
pub fn matches(filter: &Attributes, candidate: &Attributes) -> bool {
    let universal = filter.get(NAMESPACE).map(String::as_str) == Some(UNIVERSAL_NAMESPACE);
    let relevant = |key: &str| !(universal && key == NAMESPACE);

    let filter_ok = filter
        .iter()
        .filter(|(k, _)| relevant(k))
        .all(|(k, v)| candidate.get(k) == Some(v));
    let candidate_ok = candidate
        .keys()
        .filter(|k| relevant(k))
        .all(|k| filter.contains_key(k));
    filter_ok && candidate_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_string_is_key_ordered() {
        let a = from_pairs([("namespace", "game"), ("bank", "2")]);
        let b = from_pairs([("bank", "2"), ("namespace", "game")]);
        assert_eq!(canonical_string(&a), "<bank:2><namespace:game>");
        assert_eq!(canonical_string(&a), canonical_string(&b));
        assert_eq!(canonical_string(&Attributes::new()), "");
    }

    #[test]
    fn exact_match_required_without_wildcard() {
        let custom = namespace("custom");
        assert!(matches(&custom, &custom));
        assert!(!matches(&Attributes::new(), &custom));
        assert!(!matches(&custom, &Attributes::new()));
        assert!(!matches(&custom, &namespace("other")));
    }

    #[test]
    fn universal_namespace_matches_every_variant() {
        let any = namespace(UNIVERSAL_NAMESPACE);
        assert!(matches(&any, &Attributes::new()));
        assert!(matches(&any, &namespace("custom")));

        let mut any_bank = any.clone();
        any_bank.insert("bank".into(), "2".into());
        let mut candidate = namespace("x");
        assert!(!matches(&any_bank, &candidate));
        candidate.insert("bank".into(), "2".into());
        assert!(matches(&any_bank, &candidate));
    }
}
