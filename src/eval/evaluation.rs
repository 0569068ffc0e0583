//! Runs every term in dependency order and turns resource values into flat
//! records.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::Result;
use log::debug;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value as Json};

use crate::error::InterpreterError;
use crate::eval::analysis::Analysis;
use crate::eval::expr::ExprEvaluator;
use crate::eval::phantom::PhantomAttrs;
use crate::eval::schema::SchemaCoercer;
use crate::frontend::moduletree::ResourceMeta;
use crate::frontend::source::SourceRange;
use crate::names::{provider_config_name, Accessor, FullName, ModuleName};
use crate::valtree::{lookup, merge, nest};
use crate::value::Value;

static INDEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

/// One resource instance as handed to policies.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceState {
    pub id: String,
    pub resource_type: String,
    pub attributes: Map<String, Json>,
    pub meta: Map<String, Json>,
}

#[derive(Debug)]
pub struct Evaluation {
    analysis: Analysis,
    order: Vec<FullName>,
    modules: BTreeMap<ModuleName, Value>,
    values: BTreeMap<String, Value>,
    phantom: PhantomAttrs,
    errors: Vec<InterpreterError>,
}

impl Evaluation {
    /// Evaluates every term of `analysis`. Fails only on a dependency cycle.
    pub fn new(mut analysis: Analysis, evaluator: &dyn ExprEvaluator) -> Result<Self> {
        let order = analysis.order()?;
        let phantom = PhantomAttrs::analyze(analysis.terms());
        let mut evaluation = Evaluation {
            analysis,
            order: Vec::new(),
            modules: BTreeMap::new(),
            values: BTreeMap::new(),
            phantom,
            errors: Vec::new(),
        };
        for name in &order {
            evaluation.evaluate_term(name, evaluator);
        }
        debug!("evaluated {} terms", order.len());
        evaluation.order = order;
        Ok(evaluation)
    }

    fn evaluate_term(&mut self, name: &FullName, evaluator: &dyn ExprEvaluator) {
        let Some(term) = self.analysis.terms().get(name) else {
            return;
        };
        let scope = self.scope(name);
        let (value, diagnostics) =
            term.evaluate(&scope, &mut |expr, scope| evaluator.evaluate(expr, scope));
        if !diagnostics.is_empty() {
            self.errors.push(InterpreterError::Evaluation {
                term: name.to_string(),
                diagnostics,
            });
        }

        let patched = self.phantom.patch(name, value.clone());
        self.values.insert(name.to_string(), value);
        let tree = self.modules.remove(&name.module).unwrap_or_else(Value::object);
        self.modules
            .insert(name.module.clone(), merge(tree, nest(&name.local, patched)));
    }

    /// The module's value tree plus fixed context values plus every remapped
    /// dependency of `name`.
    fn scope(&self, name: &FullName) -> Value {
        let mut scope = merge(
            self.context_values(&name.module),
            self.modules.get(&name.module).cloned().unwrap_or_else(Value::object),
        );
        for dep in self.analysis.dependencies(name) {
            if !dep.is_remapped() {
                continue;
            }
            let value = match (&dep.source, &dep.value) {
                (Some(source), _) => self
                    .modules
                    .get(&source.module)
                    .map(|tree| lookup(tree, &source.local))
                    .unwrap_or(Value::Null),
                (None, Some(placeholder)) => placeholder.clone(),
                (None, None) => continue,
            };
            scope = merge(scope, nest(&dep.destination.local, value));
        }
        scope
    }

    fn context_values(&self, module: &[String]) -> Value {
        let module_dir = match (self.analysis.module(&[]), self.analysis.module(module)) {
            (Some(root), Some(meta)) => relative_dir(&root.dir, &meta.dir),
            _ => ".".to_string(),
        };
        let path = Value::Object(BTreeMap::from([
            ("module".to_string(), Value::String(module_dir)),
            ("root".to_string(), Value::from(".")),
            ("cwd".to_string(), Value::from(".")),
        ]));
        let terraform = Value::Object(BTreeMap::from([(
            "workspace".to_string(),
            Value::from("default"),
        )]));
        Value::Object(BTreeMap::from([
            ("path".to_string(), path),
            ("terraform".to_string(), terraform),
        ]))
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn order(&self) -> &[FullName] {
        &self.order
    }

    /// Value of a term as evaluated, before phantom attributes.
    pub fn value(&self, name: &FullName) -> Option<&Value> {
        self.values.get(&name.to_string())
    }

    /// Value tree of a module after the pass.
    pub fn module_value(&self, module: &[String]) -> Option<&Value> {
        self.modules.get(module)
    }

    /// Analysis errors followed by evaluation diagnostics.
    pub fn errors(&self) -> Vec<InterpreterError> {
        let mut out = self.analysis.errors();
        out.extend(self.errors.iter().cloned());
        out
    }

    /// Flat records for every resource instance, ordered by name.
    pub fn resources(&self, schema: &dyn SchemaCoercer) -> Vec<ResourceState> {
        let mut out = Vec::new();
        for (name, meta) in self.analysis.resources() {
            let resource_type = if meta.data {
                format!("data.{}", meta.resource_type)
            } else {
                meta.resource_type.clone()
            };
            let resource_meta = self.resource_meta(name, meta);
            let mut push = |id: String, value: &Value| {
                let attributes = match value.to_json() {
                    Json::Object(map) => map,
                    _ => Map::new(),
                };
                out.push(ResourceState {
                    id,
                    resource_type: resource_type.clone(),
                    attributes: schema.coerce(&resource_type, attributes),
                    meta: resource_meta.clone(),
                });
            };

            match self.value(name) {
                Some(Value::List(items)) => {
                    for (i, item) in items.iter().enumerate() {
                        push(format!("{name}[{i}]"), item);
                    }
                }
                Some(value @ Value::Object(_)) => push(name.to_string(), value),
                other => debug!("resource {name} has no materializable value: {other:?}"),
            }
        }
        out
    }

    /// `terraform.provider_config` is present only when the owning module
    /// configures the provider; `region` is lifted out of it.
    fn resource_meta(&self, name: &FullName, resource: &ResourceMeta) -> Map<String, Json> {
        let mut terraform = Map::new();
        let mut meta = Map::new();

        let config_name = provider_config_name(&name.module, &resource.provider_name);
        if let Some(config) = self.value(&config_name) {
            let region = config
                .as_object()
                .and_then(|c| c.get("region"))
                .and_then(Value::as_str);
            if let Some(region) = region {
                meta.insert("region".to_string(), Json::from(region));
            }
            terraform.insert("provider_config".to_string(), config.to_json());
        }
        if let Some(version) = &resource.provider_version_constraint {
            terraform.insert(
                "provider_version_constraint".to_string(),
                Json::from(version.as_str()),
            );
        }
        terraform.insert(
            "provider_type".to_string(),
            Json::from(resource.provider_type.as_str()),
        );

        meta.insert("terraform".to_string(), Json::Object(terraform));
        meta
    }

    /// Where `path` inside resource `id` is declared, most specific first,
    /// followed by each enclosing module call out to the root.
    pub fn location(&self, id: &str, path: &Accessor) -> Vec<SourceRange> {
        let base = INDEX_RE.replace_all(id, "");
        let Ok(name) = base.parse::<FullName>() else {
            return Vec::new();
        };
        let Some(meta) = self.analysis.resources().get(&name) else {
            return Vec::new();
        };

        let mut out = vec![meta.body.locate(path)];
        for depth in (1..=name.module.len()).rev() {
            if let Some(location) = self
                .analysis
                .module(&name.module[..depth])
                .and_then(|m| m.location.clone())
            {
                out.push(location);
            }
        }
        out
    }
}

fn relative_dir(root: &Path, dir: &Path) -> String {
    match dir.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.display().to_string(),
        Err(_) => dir.display().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::expr::HclEvaluator;
    use crate::eval::schema::Passthrough;
    use crate::frontend::moduletree::{LoadOptions, ModuleTree};
    use crate::frontend::registry::ModuleRegistry;
    use crate::fs::MemoryFilesystem;
    use serde_json::json;

    fn evaluate(fs: &MemoryFilesystem) -> Evaluation {
        let tree = ModuleTree::load_dir(
            fs,
            &ModuleRegistry::new(),
            Path::new("/r"),
            &LoadOptions::default(),
        )
        .unwrap();
        Evaluation::new(Analysis::new(&tree), &HclEvaluator).unwrap()
    }

    fn value(e: &Evaluation, name: &str) -> Value {
        e.value(&name.parse().unwrap()).cloned().unwrap()
    }

    #[test]
    fn variable_flows_through_local_into_resource() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            variable "x" { default = "ok" }
            locals { y = var.x }
            resource "aws_s3_bucket" "b" { bucket = local.y }
            "#,
        );
        let e = evaluate(&fs);
        assert!(e.errors().is_empty(), "{:?}", e.errors());
        assert_eq!(
            value(&e, "aws_s3_bucket.b").as_object().unwrap()["bucket"],
            Value::from("ok")
        );
    }

    #[test]
    fn module_inputs_and_outputs() {
        let fs = MemoryFilesystem::new()
            .with_file(
                "/r/main.tf",
                r#"
                module "net" {
                  source = "./modules/net"
                  name   = "prod"
                }
                resource "aws_instance" "web" { subnet_id = module.net.subnet }
                "#,
            )
            .with_file(
                "/r/modules/net/main.tf",
                r#"
                variable "name" {}
                variable "suffix" { default = "a" }
                resource "aws_subnet" "s" { tags = { Name = "${var.name}-${var.suffix}" } }
                output "subnet" { value = "${var.name}-subnet" }
                output "dir" { value = path.module }
                "#,
            );
        let e = evaluate(&fs);
        assert!(e.errors().is_empty(), "{:?}", e.errors());
        assert_eq!(
            value(&e, "aws_instance.web").as_object().unwrap()["subnet_id"],
            Value::from("prod-subnet")
        );
        assert_eq!(value(&e, "module.net.output.dir"), Value::from("modules/net"));

        let resources = e.resources(&Passthrough);
        let subnet = resources.iter().find(|r| r.id == "module.net.aws_subnet.s").unwrap();
        assert_eq!(subnet.attributes["tags"], json!({"Name": "prod-a"}));
    }

    #[test]
    fn unset_variables_stay_unknown() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            variable "env" {}
            resource "aws_s3_bucket" "b" {
              bucket = "logs-${var.env}"
              acl    = "private"
            }
            "#,
        );
        let e = evaluate(&fs);
        let b = value(&e, "aws_s3_bucket.b");
        assert_eq!(b.as_object().unwrap()["bucket"], Value::Unknown);
        assert_eq!(b.as_object().unwrap()["acl"], Value::from("private"));
    }

    #[test]
    fn replicated_resources_expand_into_instances() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            provider "aws" { region = "eu-west-1" }
            resource "aws_instance" "web" {
              count = 2
              name  = "web-${count.index}"
            }
            resource "aws_eip" "ip" { instance = aws_instance.web[1].id }
            "#,
        );
        let e = evaluate(&fs);
        let resources = e.resources(&Passthrough);
        let ids: Vec<_> = resources.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["aws_eip.ip", "aws_instance.web[0]", "aws_instance.web[1]"]);

        // Materialized records keep the configured attributes only
        assert!(!resources[1].attributes.contains_key("id"));
        assert_eq!(
            resources[0].attributes["instance"],
            json!("aws_instance.web[1]")
        );
        assert_eq!(resources[1].meta["region"], json!("eu-west-1"));
        assert_eq!(
            resources[1].meta["terraform"]["provider_config"],
            json!({"region": "eu-west-1"})
        );
    }

    #[test]
    fn resource_meta_nests_terraform_provider_details() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            terraform {
              required_providers {
                aws = { source = "hashicorp/aws", version = "~> 5.0" }
              }
            }
            provider "aws" { region = "eu-west-1" }
            resource "aws_s3_bucket" "b" { bucket = "logs" }
            resource "google_storage_bucket" "g" { name = "logs" }
            "#,
        );
        let e = evaluate(&fs);
        let resources = e.resources(&Passthrough);

        let aws = &resources[0];
        assert_eq!(aws.id, "aws_s3_bucket.b");
        assert_eq!(
            Json::Object(aws.meta.clone()),
            json!({
                "region": "eu-west-1",
                "terraform": {
                    "provider_config": {"region": "eu-west-1"},
                    "provider_version_constraint": "~> 5.0",
                    "provider_type": "aws",
                },
            })
        );

        // No provider block: no config and no region
        let google = &resources[1];
        assert_eq!(google.id, "google_storage_bucket.g");
        assert!(!google.meta.contains_key("region"));
        assert_eq!(google.meta["terraform"], json!({"provider_type": "google"}));
    }

    #[test]
    fn missing_references_become_placeholders() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            "resource \"aws_instance\" \"web\" { ami = data.aws_ami.ubuntu.id }",
        );
        let e = evaluate(&fs);
        assert_eq!(
            value(&e, "aws_instance.web").as_object().unwrap()["ami"],
            Value::from("data.aws_ami.ubuntu.id")
        );
        assert!(matches!(e.errors().as_slice(), [InterpreterError::MissingTerm(_)]));
    }

    #[test]
    fn evaluation_failures_are_collected() {
        let fs = MemoryFilesystem::new().with_file(
            "/r/main.tf",
            r#"
            resource "aws_instance" "web" {
              ami  = upper(1, 2, 3)
              name = "fine"
            }
            "#,
        );
        let e = evaluate(&fs);
        let web = value(&e, "aws_instance.web");
        assert_eq!(web.as_object().unwrap()["ami"], Value::Null);
        assert_eq!(web.as_object().unwrap()["name"], Value::from("fine"));
        assert!(matches!(
            e.errors().as_slice(),
            [InterpreterError::Evaluation { term, .. }] if term == "aws_instance.web"
        ));
    }

    #[test]
    fn locations_include_module_calls() {
        let fs = MemoryFilesystem::new()
            .with_file(
                "/r/main.tf",
                "\nmodule \"store\" {\n  source = \"./store\"\n}\n",
            )
            .with_file(
                "/r/store/main.tf",
                "resource \"aws_s3_bucket\" \"b\" {\n  count  = 1\n  bucket = \"x\"\n}\n",
            );
        let e = evaluate(&fs);
        let stack = e.location(
            "module.store.aws_s3_bucket.b[0]",
            &"bucket".parse().unwrap(),
        );
        assert_eq!(stack.len(), 2);
        assert_eq!(stack[0].start.line, 3);
        assert!(stack[0].file.ends_with("store/main.tf"));
        assert_eq!(stack[1].start.line, 2);
        assert!(e.location("aws_s3_bucket.nope", &Accessor::default()).is_empty());
    }
}
