//! Phantom attributes: attributes other terms read from a resource that the
//! resource's own configuration may not set (`aws_s3_bucket.b.arn`, say).
//!
//! They are collected from every term's references before evaluation and
//! spliced into each resource's value as a back-reference string so that
//! policies can still follow the link.

use std::collections::{BTreeMap, BTreeSet};

use crate::eval::expr::Reference;
use crate::eval::term::TermTree;
use crate::names::{Accessor, FullName, LocalName, Segment};
use crate::valtree::{merge, nest};
use crate::value::Value;

#[derive(Debug, Default, Clone)]
pub struct PhantomAttrs {
    attrs: BTreeMap<FullName, BTreeSet<LocalName>>,
}

impl PhantomAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analyze(terms: &TermTree) -> Self {
        let mut phantom = Self::new();
        for (name, term) in terms.terms() {
            for reference in term.dependencies() {
                phantom.record(&name.module, &reference);
            }
        }
        phantom
    }

    /// Records the attribute `reference` reads, if it reads one from a
    /// resource.
    pub fn record(&mut self, module: &[String], reference: &Reference) {
        let (local, rest) = reference.accessor.to_local_name();
        let Ok(name) = FullName::from_accessor_in(module, &Accessor::from_local(&local)) else {
            return;
        };
        let Some((resource, trailing)) = name.as_resource_name() else {
            return;
        };

        let attr = if !trailing.is_empty() {
            trailing
        } else {
            let after_index = keys_after_index(&rest);
            if after_index.is_empty() {
                reference.relative.clone()
            } else {
                after_index
            }
        };
        if !attr.is_empty() {
            self.attrs.entry(resource).or_default().insert(attr);
        }
    }

    pub fn attributes(&self, resource: &FullName) -> impl Iterator<Item = &LocalName> {
        self.attrs.get(resource).into_iter().flatten()
    }

    /// Adds the recorded attributes to `value` without touching anything the
    /// configuration set. Replicated resources are patched element by element.
    pub fn patch(&self, resource: &FullName, value: Value) -> Value {
        let Some(attrs) = self.attrs.get(resource) else {
            return value;
        };
        match value {
            Value::Object(_) => patch_instance(attrs, &resource.to_string(), value),
            Value::List(items) => Value::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| patch_instance(attrs, &format!("{resource}[{i}]"), item))
                    .collect(),
            ),
            other => other,
        }
    }
}

fn keys_after_index(rest: &Accessor) -> LocalName {
    rest.segments()
        .iter()
        .skip_while(|s| matches!(s, Segment::Index(_)))
        .map_while(|s| s.as_key().map(str::to_string))
        .collect()
}

fn patch_instance(attrs: &BTreeSet<LocalName>, back_ref: &str, value: Value) -> Value {
    if !matches!(value, Value::Object(_)) {
        return value;
    }
    attrs.iter().fold(value, |acc, path| {
        merge(nest(path, Value::String(back_ref.to_string())), acc)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::expr::references;

    fn phantom(exprs: &[&str]) -> PhantomAttrs {
        let mut p = PhantomAttrs::new();
        for e in exprs {
            for r in references(&e.parse().unwrap()) {
                p.record(&[], &r);
            }
        }
        p
    }

    fn attrs(p: &PhantomAttrs, resource: &str) -> Vec<String> {
        p.attributes(&resource.parse().unwrap())
            .map(|a| a.join("."))
            .collect()
    }

    #[test]
    fn records_attributes_read_from_resources() {
        let p = phantom(&[
            "aws_s3_bucket.b.arn",
            "aws_s3_bucket.b[\"id\"]",
            "aws_instance.web[0].private_ip",
            "aws_instance.web[*].id",
            "data.aws_iam_policy_document.p.json",
            "var.x.y",
            "local.z",
        ]);
        assert_eq!(attrs(&p, "aws_s3_bucket.b"), vec!["arn", "id"]);
        assert_eq!(attrs(&p, "aws_instance.web"), vec!["id", "private_ip"]);
        assert_eq!(attrs(&p, "data.aws_iam_policy_document.p"), vec!["json"]);
        assert!(p.attrs.keys().all(|k| k.local[0] != "var" && k.local[0] != "local"));
    }

    #[test]
    fn patch_keeps_configured_values() {
        let p = phantom(&["aws_s3_bucket.b.arn", "aws_s3_bucket.b.bucket"]);
        let value = Value::Object(BTreeMap::from([("bucket".to_string(), Value::from("logs"))]));
        let patched = p.patch(&"aws_s3_bucket.b".parse().unwrap(), value);
        let object = patched.as_object().unwrap();
        assert_eq!(object["bucket"], Value::from("logs"));
        assert_eq!(object["arn"], Value::from("aws_s3_bucket.b"));
    }

    #[test]
    fn patch_is_per_element_for_replicated_resources() {
        let p = phantom(&["aws_instance.web[0].id"]);
        let value = Value::List(vec![Value::object(), Value::object(), Value::Unknown]);
        let patched = p.patch(&"aws_instance.web".parse().unwrap(), value);
        let items = patched.as_list().unwrap();
        assert_eq!(items[0].as_object().unwrap()["id"], Value::from("aws_instance.web[0]"));
        assert_eq!(items[1].as_object().unwrap()["id"], Value::from("aws_instance.web[1]"));
        assert_eq!(items[2], Value::Unknown);
    }

    #[test]
    fn unknown_and_null_are_left_alone() {
        let p = phantom(&["aws_s3_bucket.b.arn"]);
        let name: FullName = "aws_s3_bucket.b".parse().unwrap();
        assert_eq!(p.patch(&name, Value::Unknown), Value::Unknown);
        assert_eq!(p.patch(&name, Value::Null), Value::Null);
    }
}
