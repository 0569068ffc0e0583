//! Addressing for everything the interpreter evaluates.
//!
//! A [`FullName`] pairs a [`ModuleName`] (the chain of module calls leading
//! to a module, empty for the root) with a [`LocalName`] (the dotted path of
//! an object inside that module, e.g. `var.region` or `aws_s3_bucket.logs`).
//! An [`Accessor`] is a mixed key/index path such as `tags["env"]` or
//! `ingress[0].cidr_blocks` used to reach into values and source bodies.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use anyhow::{anyhow, bail, Result};
use regex::Regex;

pub type ModuleName = Vec<String>;
pub type LocalName = Vec<String>;

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\.?([^.\[]+)").unwrap());
static INDEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[([0-9]+)\]").unwrap());

/// Reference heads that never name a resource.
const NON_RESOURCE_HEADS: &[&str] = &[
    "var", "local", "module", "count", "each", "path", "terraform", "self", "input", "output",
    "variable", "provider",
];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(k) => Some(k),
            Segment::Index(_) => None,
        }
    }
}

impl From<&str> for Segment {
    fn from(s: &str) -> Self {
        Segment::Key(s.to_string())
    }
}

impl From<String> for Segment {
    fn from(s: String) -> Self {
        Segment::Key(s)
    }
}

impl From<usize> for Segment {
    fn from(i: usize) -> Self {
        Segment::Index(i)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Accessor(pub Vec<Segment>);

impl Accessor {
    pub fn new(segments: Vec<Segment>) -> Self {
        Accessor(segments)
    }

    pub fn from_local(local: &[String]) -> Self {
        Accessor(local.iter().cloned().map(Segment::Key).collect())
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn push(&mut self, segment: impl Into<Segment>) {
        self.0.push(segment.into());
    }

    /// Splits off the leading run of string keys.
    ///
    /// `aws_s3_bucket.logs[0].id` yields `[aws_s3_bucket, logs]` and the
    /// remainder `[0].id`.
    pub fn to_local_name(&self) -> (LocalName, Accessor) {
        let cut = self
            .0
            .iter()
            .position(|s| matches!(s, Segment::Index(_)))
            .unwrap_or(self.0.len());
        let local = self.0[..cut]
            .iter()
            .filter_map(|s| s.as_key().map(str::to_string))
            .collect();
        (local, Accessor(self.0[cut..].to_vec()))
    }
}

impl fmt::Display for Accessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                Segment::Key(k) if i == 0 => write!(f, "{k}")?,
                Segment::Key(k) => write!(f, ".{k}")?,
                Segment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Accessor {
    type Err = anyhow::Error;

    fn from_str(input: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = input;
        while !rest.is_empty() {
            if let Some(caps) = INDEX_RE.captures(rest) {
                let idx: usize = caps[1]
                    .parse()
                    .map_err(|e| anyhow!("bad index in accessor '{input}': {e}"))?;
                segments.push(Segment::Index(idx));
                rest = &rest[caps[0].len()..];
            } else if rest.starts_with('[') {
                bail!("unmatched or non-numeric index in accessor '{input}'");
            } else if let Some(caps) = KEY_RE.captures(rest) {
                segments.push(Segment::Key(caps[1].to_string()));
                rest = &rest[caps[0].len()..];
            } else {
                bail!("malformed accessor '{input}'");
            }
        }
        Ok(Accessor(segments))
    }
}

/// `module.a.module.b` for `[a, b]`; empty for the root module.
pub fn module_name_to_string(module: &[String]) -> String {
    module
        .iter()
        .map(|m| format!("module.{m}"))
        .collect::<Vec<_>>()
        .join(".")
}

pub fn local_name_to_string(local: &[String]) -> String {
    local.join(".")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FullName {
    pub module: ModuleName,
    pub local: LocalName,
}

impl FullName {
    pub fn new(module: ModuleName, local: LocalName) -> Self {
        FullName { module, local }
    }

    pub fn local(module: &[String], parts: &[&str]) -> Self {
        FullName {
            module: module.to_vec(),
            local: parts.iter().map(|p| p.to_string()).collect(),
        }
    }

    /// Builds a name from an accessor, consuming leading `module.<name>`
    /// pairs into the module part. The rest must be plain keys.
    pub fn from_accessor(accessor: &Accessor) -> Result<Self> {
        Self::from_accessor_in(&[], accessor)
    }

    /// Like [`FullName::from_accessor`] but relative to `module`.
    pub fn from_accessor_in(module: &[String], accessor: &Accessor) -> Result<Self> {
        let segments = accessor.segments();
        let mut module = module.to_vec();
        let mut i = 0;
        while i + 1 < segments.len() {
            match (&segments[i], &segments[i + 1]) {
                (Segment::Key(head), Segment::Key(name)) if head == "module" => {
                    module.push(name.clone());
                    i += 2;
                }
                _ => break,
            }
        }
        let mut local = Vec::with_capacity(segments.len() - i);
        for segment in &segments[i..] {
            match segment {
                Segment::Key(k) => local.push(k.clone()),
                Segment::Index(_) => bail!("'{accessor}' is not a valid name: unexpected index"),
            }
        }
        Ok(FullName { module, local })
    }

    pub fn to_accessor(&self) -> Accessor {
        Accessor::from_local(&self.local)
    }

    /// `module.X.Y...` inside module M becomes `output.Y...` inside `M.X`.
    pub fn as_module_output(&self) -> Option<FullName> {
        if self.local.len() < 3 || self.local[0] != "module" {
            return None;
        }
        let mut module = self.module.clone();
        module.push(self.local[1].clone());
        let mut local = vec!["output".to_string()];
        local.extend(self.local[2..].iter().cloned());
        Some(FullName { module, local })
    }

    /// `var.Y...` inside child module X becomes `input.X.Y...` in the parent.
    /// Root-module variables have no caller and yield `None`.
    pub fn as_module_input(&self) -> Option<FullName> {
        if self.local.len() < 2 || self.local[0] != "var" {
            return None;
        }
        let (call, parent) = self.module.split_last()?;
        let mut local = vec!["input".to_string(), call.clone()];
        local.extend(self.local[1..].iter().cloned());
        Some(FullName {
            module: parent.to_vec(),
            local,
        })
    }

    /// Splits `var.Y...` into the definition name `variable.Y`, the reference
    /// name `var.Y` and whatever trails it.
    pub fn as_variable(&self) -> Option<(FullName, FullName, LocalName)> {
        if self.local.len() < 2 || self.local[0] != "var" {
            return None;
        }
        let name = self.local[1].clone();
        Some((
            FullName::new(self.module.clone(), vec!["variable".into(), name.clone()]),
            FullName::new(self.module.clone(), vec!["var".into(), name]),
            self.local[2..].to_vec(),
        ))
    }

    /// Splits `type.name...` (or `data.type.name...`) into the resource name
    /// and the trailing attribute path.
    pub fn as_resource_name(&self) -> Option<(FullName, LocalName)> {
        let head = self.local.first()?;
        if NON_RESOURCE_HEADS.contains(&head.as_str()) {
            return None;
        }
        let cut = if head == "data" { 3 } else { 2 };
        if self.local.len() < cut {
            return None;
        }
        Some((
            FullName::new(self.module.clone(), self.local[..cut].to_vec()),
            self.local[cut..].to_vec(),
        ))
    }
}

impl fmt::Display for FullName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let module = module_name_to_string(&self.module);
        let local = local_name_to_string(&self.local);
        match (module.is_empty(), local.is_empty()) {
            (true, _) => f.write_str(&local),
            (false, true) => f.write_str(&module),
            (false, false) => write!(f, "{module}.{local}"),
        }
    }
}

impl FromStr for FullName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let accessor: Accessor = s.parse()?;
        FullName::from_accessor(&accessor)
    }
}

/// Name of the term holding the configuration of `provider_name`
/// (`aws`, `aws.west`) inside `module`.
pub fn provider_config_name(module: &[String], provider_name: &str) -> FullName {
    let escaped = provider_name.replace('_', "__").replace('.', "_");
    FullName::new(module.to_vec(), vec!["provider".into(), escaped])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn accessor_round_trip() {
        let accessor = Accessor::new(vec!["foo".into(), "bar".into(), 3.into(), "qux".into()]);
        assert_eq!(accessor.to_string(), "foo.bar[3].qux");
        assert_eq!("foo.bar[3].qux".parse::<Accessor>().unwrap(), accessor);
    }

    #[test]
    fn accessor_consecutive_indices() {
        let parsed: Accessor = "[1][2][3]".parse().unwrap();
        assert_eq!(parsed, Accessor::new(vec![1.into(), 2.into(), 3.into()]));
    }

    #[test]
    fn accessor_rejects_bad_indices() {
        assert!("foo[3.qux".parse::<Accessor>().is_err());
        assert!("foo.bar[three].qux".parse::<Accessor>().is_err());
        assert!("foo..bar".parse::<Accessor>().is_err());
    }

    #[test]
    fn to_local_name_stops_at_first_index() {
        let accessor = Accessor::new(vec![
            "aws_s3_bucket".into(),
            "my_bucket".into(),
            0.into(),
            "id".into(),
        ]);
        let (local, trailing) = accessor.to_local_name();
        assert_eq!(local, keys(&["aws_s3_bucket", "my_bucket"]));
        assert_eq!(trailing, Accessor::new(vec![0.into(), "id".into()]));
    }

    #[test]
    fn full_name_round_trip() {
        let name: FullName = "module.foo.module.bar.aws_s3_bucket.bucket".parse().unwrap();
        assert_eq!(name.module, keys(&["foo", "bar"]));
        assert_eq!(name.local, keys(&["aws_s3_bucket", "bucket"]));
        assert_eq!(name.to_string(), "module.foo.module.bar.aws_s3_bucket.bucket");
    }

    #[test]
    fn full_name_rejects_indices_in_local_part() {
        assert!("aws_instance.web[0]".parse::<FullName>().is_err());
    }

    #[test]
    fn module_output_rewrite() {
        let name = FullName::local(&[], &["module", "vpc", "subnet_ids"]);
        let out = name.as_module_output().unwrap();
        assert_eq!(out.module, keys(&["vpc"]));
        assert_eq!(out.local, keys(&["output", "subnet_ids"]));
        assert!(FullName::local(&[], &["module", "vpc"]).as_module_output().is_none());
    }

    #[test]
    fn module_input_rewrite() {
        let name = FullName::local(&keys(&["child1"]), &["var", "myvar"]);
        let input = name.as_module_input().unwrap();
        assert!(input.module.is_empty());
        assert_eq!(input.local, keys(&["input", "child1", "myvar"]));

        let root = FullName::local(&[], &["var", "myvar"]);
        assert!(root.as_module_input().is_none());
    }

    #[test]
    fn variable_split() {
        let name = FullName::local(&[], &["var", "tags", "env"]);
        let (def, reference, trailing) = name.as_variable().unwrap();
        assert_eq!(def.to_string(), "variable.tags");
        assert_eq!(reference.to_string(), "var.tags");
        assert_eq!(trailing, keys(&["env"]));
    }

    #[test]
    fn resource_names() {
        let (res, rest) = FullName::local(&[], &["aws_s3_bucket", "b", "arn"])
            .as_resource_name()
            .unwrap();
        assert_eq!(res.to_string(), "aws_s3_bucket.b");
        assert_eq!(rest, keys(&["arn"]));

        let (res, rest) = FullName::local(&[], &["data", "aws_iam_policy", "p", "json"])
            .as_resource_name()
            .unwrap();
        assert_eq!(res.to_string(), "data.aws_iam_policy.p");
        assert_eq!(rest, keys(&["json"]));

        assert!(FullName::local(&[], &["var", "x"]).as_resource_name().is_none());
        assert!(FullName::local(&[], &["local", "x"]).as_resource_name().is_none());
        assert!(FullName::local(&[], &["aws_s3_bucket"]).as_resource_name().is_none());
    }

    #[test]
    fn provider_config_names_are_escaped() {
        let name = provider_config_name(&[], "aws.west");
        assert_eq!(name.to_string(), "provider.aws_west");
        let name = provider_config_name(&keys(&["m"]), "google_beta");
        assert_eq!(name.to_string(), "module.m.provider.google__beta");
    }
}
