//! One pass over the module tree: index modules, resources and terms, then
//! resolve every term's references into dependency edges.

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use log::debug;

use crate::error::InterpreterError;
use crate::eval::expr::Reference;
use crate::eval::term::{Term, TermTree};
use crate::eval::topsort::Graph;
use crate::frontend::moduletree::{ModuleMeta, ModuleTree, ResourceMeta, Visitor};
use crate::names::{local_name_to_string, module_name_to_string, FullName, ModuleName};
use crate::value::Value;

/// Reference roots that are injected into every scope or bound by the term
/// itself, and so never become edges.
const CONTEXT_ROOTS: &[&str] = &["path", "terraform", "self", "count", "each"];

/// How one reference of a term gets its value.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    /// Where the value appears in the dependent term's scope.
    pub destination: FullName,
    /// Term that produces the value, or `None` for a missing reference.
    pub source: Option<FullName>,
    /// Stand-in value used when there is no source.
    pub value: Option<Value>,
}

impl Dependency {
    fn found(name: FullName) -> Self {
        Dependency {
            destination: name.clone(),
            source: Some(name),
            value: None,
        }
    }

    fn remapped(destination: FullName, source: FullName) -> Self {
        Dependency {
            destination,
            source: Some(source),
            value: None,
        }
    }

    /// Whether the value has to be copied into the scope rather than being
    /// there already.
    pub fn is_remapped(&self) -> bool {
        self.source.as_ref() != Some(&self.destination)
    }
}

#[derive(Debug, Default)]
pub struct Analysis {
    modules: BTreeMap<ModuleName, ModuleMeta>,
    resources: BTreeMap<FullName, ResourceMeta>,
    terms: TermTree,
    dependencies: BTreeMap<FullName, Vec<Dependency>>,
    bad_keys: Vec<String>,
    missing_terms: BTreeSet<String>,
    load_errors: Vec<InterpreterError>,
}

impl Visitor for Analysis {
    fn visit_module(&mut self, name: &ModuleName, meta: &ModuleMeta) {
        self.modules.insert(name.clone(), meta.clone());
    }

    fn visit_resource(&mut self, name: &FullName, meta: &ResourceMeta) {
        self.resources.insert(name.clone(), meta.clone());
    }

    fn visit_term(&mut self, name: FullName, term: Term) {
        self.terms.add_term(name, term);
    }
}

impl Analysis {
    pub fn new(tree: &ModuleTree) -> Self {
        let mut analysis = Analysis {
            load_errors: tree.errors(),
            ..Default::default()
        };
        tree.walk(&mut analysis);

        let names: Vec<FullName> = analysis.terms.terms().into_iter().map(|(n, _)| n).collect();
        for name in names {
            let references = match analysis.terms.get(&name) {
                Some(term) => term.dependencies(),
                None => continue,
            };
            let mut deps: Vec<Dependency> = Vec::new();
            for reference in &references {
                if let Some(dep) = analysis.resolve(&name, reference) {
                    if !deps.contains(&dep) {
                        deps.push(dep);
                    }
                }
            }
            analysis.dependencies.insert(name, deps);
        }
        debug!(
            "analysis: {} modules, {} resources, {} terms, {} missing references",
            analysis.modules.len(),
            analysis.resources.len(),
            analysis.dependencies.len(),
            analysis.missing_terms.len()
        );
        analysis
    }

    fn resolve(&mut self, owner: &FullName, reference: &Reference) -> Option<Dependency> {
        if CONTEXT_ROOTS.contains(&reference.root()) {
            return None;
        }
        let (local, _) = reference.accessor.to_local_name();
        let target = FullName::new(owner.module.clone(), local);

        if let Some((found, _)) = self.terms.lookup_by_prefix(&target) {
            return Some(Dependency::found(found));
        }

        if let Some(output) = target.as_module_output() {
            if let Some((found, _)) = self.terms.lookup_by_prefix(&output) {
                let mut local = target.local[..2].to_vec();
                local.extend(found.local[1..].iter().cloned());
                let destination = FullName::new(owner.module.clone(), local);
                return Some(Dependency::remapped(destination, found));
            }
        }

        if let Some((definition, var_ref, _)) = target.as_variable() {
            if let Some(input) = var_ref.as_module_input() {
                if self.terms.get(&input).is_some() {
                    return Some(Dependency::remapped(var_ref, input));
                }
            }
            if self.terms.get(&definition).is_some() {
                return Some(Dependency::remapped(var_ref, definition));
            }
        }

        self.missing_terms.insert(target.to_string());
        let placeholder = Value::String(local_name_to_string(&target.local));
        Some(Dependency {
            destination: target,
            source: None,
            value: Some(placeholder),
        })
    }

    /// Evaluation order over every term. A cycle is fatal; keys that do not
    /// read back as the term they were printed from are recorded and skipped.
    pub fn order(&mut self) -> Result<Vec<FullName>> {
        let mut graph = Graph::new();
        for (name, deps) in &self.dependencies {
            let key = name.to_string();
            graph.add_node(key.clone());
            for dep in deps {
                match &dep.source {
                    Some(source) if source != name => graph.add_edge(source.to_string(), key.clone()),
                    _ => {}
                }
            }
        }

        let mut order = Vec::with_capacity(graph.len());
        for key in graph.topsort()? {
            // A label containing `.` or `[` prints to a key naming some other term
            match key.parse::<FullName>() {
                Ok(name) if self.dependencies.contains_key(&name) => order.push(name),
                _ => self.bad_keys.push(key),
            }
        }
        Ok(order)
    }

    pub fn modules(&self) -> &BTreeMap<ModuleName, ModuleMeta> {
        &self.modules
    }

    pub fn module(&self, name: &[String]) -> Option<&ModuleMeta> {
        self.modules.get(name)
    }

    /// Module metadata by its printed name (`module.a.module.b`, `""` for
    /// the root).
    pub fn module_by_key(&self, key: &str) -> Option<&ModuleMeta> {
        self.modules
            .iter()
            .find(|(name, _)| module_name_to_string(name) == key)
            .map(|(_, meta)| meta)
    }

    pub fn resources(&self) -> &BTreeMap<FullName, ResourceMeta> {
        &self.resources
    }

    pub fn resource(&self, key: &str) -> Option<&ResourceMeta> {
        let name: FullName = key.parse().ok()?;
        self.resources.get(&name)
    }

    pub fn terms(&self) -> &TermTree {
        &self.terms
    }

    pub fn dependencies(&self, name: &FullName) -> &[Dependency] {
        self.dependencies
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn bad_keys(&self) -> &[String] {
        &self.bad_keys
    }

    pub fn missing_terms(&self) -> &BTreeSet<String> {
        &self.missing_terms
    }

    /// Load errors, bad keys and missing references.
    pub fn errors(&self) -> Vec<InterpreterError> {
        let mut out = self.load_errors.clone();
        out.extend(
            self.bad_keys
                .iter()
                .cloned()
                .map(InterpreterError::BadDependencyKey),
        );
        out.extend(
            self.missing_terms
                .iter()
                .cloned()
                .map(InterpreterError::MissingTerm),
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::moduletree::LoadOptions;
    use crate::frontend::registry::ModuleRegistry;
    use crate::fs::MemoryFilesystem;
    use std::path::Path;

    fn analyze(fs: &MemoryFilesystem) -> Analysis {
        let tree = ModuleTree::load_dir(
            fs,
            &ModuleRegistry::new(),
            Path::new("/r"),
            &LoadOptions::default(),
        )
        .unwrap();
        Analysis::new(&tree)
    }

    fn deps(analysis: &Analysis, name: &str) -> Vec<(String, Option<String>)> {
        analysis
            .dependencies(&name.parse().unwrap())
            .iter()
            .map(|d| (d.destination.to_string(), d.source.as_ref().map(|s| s.to_string())))
            .collect()
    }

    fn order(analysis: &mut Analysis) -> Vec<String> {
        analysis.order().unwrap().into_iter().map(|n| n.to_string()).collect()
    }

    fn position(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn labels_that_do_not_read_back_are_bad_keys() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            resource "aws_s3_bucket" "a.b" { bucket = "dotted" }
            resource "aws_s3_bucket" "ok" { bucket = "plain" }
            "#,
        );
        let mut analysis = analyze(&fs);
        assert_eq!(order(&mut analysis), vec!["aws_s3_bucket.ok"]);
        assert_eq!(analysis.bad_keys(), ["aws_s3_bucket.a.b".to_string()]);
        assert!(matches!(
            analysis.errors().as_slice(),
            [InterpreterError::BadDependencyKey(key)] if key == "aws_s3_bucket.a.b"
        ));
    }

    #[test]
    fn chain_orders_producers_first() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            locals {
              a = local.b
              b = local.c
              c = "leaf"
            }
            "#,
        );
        let mut analysis = analyze(&fs);
        let order = order(&mut analysis);
        assert!(position(&order, "local.c") < position(&order, "local.b"));
        assert!(position(&order, "local.b") < position(&order, "local.a"));
    }

    #[test]
    fn attribute_access_resolves_by_prefix() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            resource "aws_vpc" "main" {}
            resource "aws_subnet" "a" {
              vpc_id = aws_vpc.main.id
              other  = aws_vpc.main[0].arn
            }
            "#,
        );
        let analysis = analyze(&fs);
        assert_eq!(
            deps(&analysis, "aws_subnet.a"),
            vec![("aws_vpc.main".to_string(), Some("aws_vpc.main".to_string()))]
        );
    }

    #[test]
    fn variables_prefer_caller_values() {
        let fs = MemoryFilesystem::new()
            .with_file(
                "/r/main.tf",
                r#"
                variable "name" { default = "x" }
                locals { n = var.name }
                module "child" {
                  source = "./child"
                  cidr   = "10.0.0.0/8"
                }
                output "vpc" { value = module.child.vpc_id }
                "#,
            )
            .with_file(
                "/r/child/main.tf",
                r#"
                variable "cidr" {}
                variable "region" { default = "eu-west-1" }
                locals { all = "${var.cidr}-${var.region}" }
                output "vpc_id" { value = local.all }
                "#,
            );
        let mut analysis = analyze(&fs);
        assert_eq!(
            deps(&analysis, "local.n"),
            vec![("var.name".to_string(), Some("variable.name".to_string()))]
        );
        assert_eq!(
            deps(&analysis, "module.child.local.all"),
            vec![
                ("module.child.var.cidr".to_string(), Some("input.child.cidr".to_string())),
                (
                    "module.child.var.region".to_string(),
                    Some("module.child.variable.region".to_string())
                ),
            ]
        );
        assert_eq!(
            deps(&analysis, "output.vpc"),
            vec![(
                "module.child.vpc_id".to_string(),
                Some("module.child.output.vpc_id".to_string())
            )]
        );
        assert!(analysis.missing_terms().is_empty());

        let order = order(&mut analysis);
        assert!(position(&order, "input.child.cidr") < position(&order, "module.child.local.all"));
        assert!(position(&order, "module.child.output.vpc_id") < position(&order, "output.vpc"));
    }

    #[test]
    fn missing_references_get_placeholders() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            resource "aws_instance" "web" {
              ami    = data.aws_ami.ubuntu.id
              subnet = var.undeclared
              dir    = path.module
            }
            "#,
        );
        let analysis = analyze(&fs);
        let deps = analysis.dependencies(&"aws_instance.web".parse().unwrap());
        assert_eq!(deps.len(), 2);
        assert!(deps.iter().all(|d| d.source.is_none()));
        assert_eq!(deps[0].value, Some(Value::from("data.aws_ami.ubuntu.id")));
        let missing: Vec<_> = analysis.missing_terms().iter().cloned().collect();
        assert_eq!(missing, vec!["data.aws_ami.ubuntu.id", "var.undeclared"]);
        assert!(matches!(
            analysis.errors().as_slice(),
            [InterpreterError::MissingTerm(_), InterpreterError::MissingTerm(_)]
        ));
    }

    #[test]
    fn cycles_are_fatal() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            locals {
              a = local.b
              b = local.a
            }
            "#,
        );
        let err = analyze(&fs).order().unwrap_err();
        assert!(err.downcast_ref::<InterpreterError>().unwrap().is_fatal());
    }

    #[test]
    fn self_references_are_not_edges() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            resource "aws_instance" "web" {
              count = 2
              name  = "web-${count.index}"
              peer  = aws_instance.web[0].id
            }
            "#,
        );
        let mut analysis = analyze(&fs);
        assert_eq!(order(&mut analysis), vec!["aws_instance.web"]);
    }

    #[test]
    fn module_metadata_by_key() {
        let fs = MemoryFilesystem::new()
            .with_file("/r/main.tf", "module \"a\" { source = \"./a\" }")
            .with_file("/r/a/main.tf", "");
        let analysis = analyze(&fs);
        assert_eq!(analysis.module_by_key("").unwrap().dir, Path::new("/r"));
        assert!(analysis.module_by_key("module.a").unwrap().location.is_some());
        assert!(analysis.resource("aws_instance.x").is_none());
    }
}
