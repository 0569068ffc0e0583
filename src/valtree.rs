//! Value-tree algebra: nesting a leaf under a path, merging two trees and
//! looking a path up.
//!
//! All three are pure. `merge` recurses through objects key by key and lets
//! the right operand win on any other conflict, so module trees only ever
//! grow by building new nodes.

use std::collections::BTreeMap;

use crate::names::{Accessor, Segment};
use crate::value::Value;

/// Wraps `leaf` in one object per path segment.
pub fn nest(path: &[String], leaf: Value) -> Value {
    path.iter().rev().fold(leaf, |acc, key| {
        Value::Object(BTreeMap::from([(key.clone(), acc)]))
    })
}

pub fn merge(left: Value, right: Value) -> Value {
    match (left, right) {
        (Value::Object(mut l), Value::Object(r)) => {
            for (key, rv) in r {
                let merged = match l.remove(&key) {
                    Some(lv) => merge(lv, rv),
                    None => rv,
                };
                l.insert(key, merged);
            }
            Value::Object(l)
        }
        (_, right) => right,
    }
}

/// Follows `path` through nested objects. A missing key yields `Null`;
/// running into an unknown yields `Unknown`.
pub fn lookup(tree: &Value, path: &[String]) -> Value {
    let mut current = tree;
    for key in path {
        match current {
            Value::Object(map) => match map.get(key) {
                Some(next) => current = next,
                None => return Value::Null,
            },
            Value::Unknown => return Value::Unknown,
            _ => return Value::Null,
        }
    }
    current.clone()
}

/// Whether following `accessor` through `tree` runs into an unknown value.
pub fn reaches_unknown(tree: &Value, accessor: &Accessor) -> bool {
    let mut current = tree;
    for segment in accessor.segments() {
        let next = match (current, segment) {
            (Value::Unknown, _) => return true,
            (Value::Object(map), Segment::Key(k)) => map.get(k),
            (Value::List(items), Segment::Index(i)) => items.get(*i),
            _ => None,
        };
        match next {
            Some(v) => current = v,
            None => return false,
        }
    }
    current.is_unknown()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(pairs: &[(&str, Value)]) -> Value {
        Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn nest_builds_objects() {
        let v = nest(&path(&["a", "b"]), Value::from(1));
        assert_eq!(v, obj(&[("a", obj(&[("b", Value::from(1))]))]));
        assert_eq!(nest(&[], Value::from("x")), Value::from("x"));
    }

    #[test]
    fn merge_recurses_into_objects() {
        let left = obj(&[("a", obj(&[("x", Value::from(1))]))]);
        let right = obj(&[("a", obj(&[("y", Value::from(2))]))]);
        let expected = obj(&[("a", obj(&[("x", Value::from(1)), ("y", Value::from(2))]))]);
        assert_eq!(merge(left, right), expected);
    }

    #[test]
    fn merge_right_wins_on_conflict() {
        let merged = merge(obj(&[("a", Value::from(1))]), obj(&[("a", Value::from(2))]));
        assert_eq!(merged, obj(&[("a", Value::from(2))]));

        let merged = merge(obj(&[("a", obj(&[]))]), obj(&[("a", Value::Unknown)]));
        assert_eq!(merged, obj(&[("a", Value::Unknown)]));
    }

    #[test]
    fn merge_is_associative_for_disjoint_keys() {
        let a = obj(&[("a", Value::from(1))]);
        let b = obj(&[("b", Value::from(2))]);
        let c = obj(&[("c", Value::from(3))]);
        assert_eq!(
            merge(merge(a.clone(), b.clone()), c.clone()),
            merge(a, merge(b, c))
        );
    }

    #[test]
    fn lookup_missing_and_unknown() {
        let tree = obj(&[
            ("var", obj(&[("x", Value::from("ok"))])),
            ("module", Value::Unknown),
        ]);
        assert_eq!(lookup(&tree, &path(&["var", "x"])), Value::from("ok"));
        assert_eq!(lookup(&tree, &path(&["var", "y"])), Value::Null);
        assert_eq!(lookup(&tree, &path(&["module", "a", "b"])), Value::Unknown);
    }

    #[test]
    fn reaches_unknown_through_lists() {
        let tree = obj(&[("r", Value::List(vec![obj(&[("id", Value::Unknown)])]))]);
        let hit = Accessor::new(vec!["r".into(), 0.into(), "id".into()]);
        let miss = Accessor::new(vec!["r".into(), 1.into(), "id".into()]);
        assert!(reaches_unknown(&tree, &hit));
        assert!(!reaches_unknown(&tree, &miss));
    }
}
