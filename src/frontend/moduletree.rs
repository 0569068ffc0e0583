//! Recursive discovery and decoding of configuration modules.
//!
//! A [`ModuleTree`] owns everything read from one module directory plus the
//! child modules reached through `module` blocks. Loading only fails for the
//! root module's own files; problems further down are collected and returned
//! by [`ModuleTree::errors`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hcl::{Body, Expression};
use log::{debug, warn};
use path_absolutize::Absolutize;

use crate::error::InterpreterError;
use crate::eval::expr::{literal_value, references};
use crate::eval::term::Term;
use crate::frontend::registry::ModuleRegistry;
use crate::frontend::source::{SourceBlock, SourceBody, SourceRange};
use crate::frontend::varfiles::{find_var_files, load_var_file};
use crate::fs::Filesystem;
use crate::names::{provider_config_name, FullName, LocalName, ModuleName};
use crate::value::Value;

/// Arguments of a `module` block that configure the call itself.
const MODULE_CALL_META: &[&str] = &[
    "source",
    "version",
    "count",
    "for_each",
    "providers",
    "depends_on",
];

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Variable files applied after the auto-discovered ones.
    pub var_files: Vec<PathBuf>,
    /// Literal variable values, applied last.
    pub vars: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleMeta {
    pub dir: PathBuf,
    pub files: Vec<PathBuf>,
    pub missing_remote_modules: Vec<String>,
    /// Range of the `module` block that loaded this module; `None` for the root.
    pub location: Option<SourceRange>,
}

#[derive(Debug, Clone)]
pub struct ResourceMeta {
    pub data: bool,
    pub resource_type: String,
    pub provider_name: String,
    pub provider_type: String,
    pub provider_version_constraint: Option<String>,
    pub replicated: bool,
    pub location: SourceRange,
    pub body: SourceBlock,
}

#[derive(Debug, Clone)]
struct Resource {
    name: LocalName,
    meta: ResourceMeta,
    term: Term,
}

#[derive(Debug, Clone)]
struct ModuleCall {
    name: String,
    source: Option<String>,
    arguments: BTreeMap<String, Expression>,
    count: Option<Expression>,
    for_each: Option<Expression>,
    location: SourceRange,
}

#[derive(Debug, Clone, Default)]
struct RequiredProvider {
    source: Option<String>,
    version: Option<String>,
}

/// Callbacks for [`ModuleTree::walk`].
pub trait Visitor {
    fn visit_module(&mut self, name: &ModuleName, meta: &ModuleMeta);
    fn visit_resource(&mut self, name: &FullName, meta: &ResourceMeta);
    fn visit_term(&mut self, name: FullName, term: Term);
}

#[derive(Debug, Clone, Default)]
pub struct ModuleTree {
    meta: ModuleMeta,
    variables: BTreeMap<String, Option<Expression>>,
    overrides: BTreeMap<String, Value>,
    locals: BTreeMap<String, Expression>,
    resources: Vec<Resource>,
    outputs: BTreeMap<String, Expression>,
    providers: BTreeMap<String, Term>,
    required_providers: BTreeMap<String, RequiredProvider>,
    calls: Vec<ModuleCall>,
    children: BTreeMap<String, ModuleTree>,
    errors: Vec<InterpreterError>,
}

impl ModuleTree {
    /// Loads the module in `dir` and everything it calls.
    pub fn load_dir(
        fs: &dyn Filesystem,
        registry: &ModuleRegistry,
        dir: &Path,
        options: &LoadOptions,
    ) -> Result<ModuleTree> {
        let files = primary_files(fs, dir)?;
        Self::load_files(fs, registry, dir, &files, options)
    }

    /// Loads a root module made of exactly `files`, resolving relative
    /// module sources against `dir`.
    pub fn load_files(
        fs: &dyn Filesystem,
        registry: &ModuleRegistry,
        dir: &Path,
        files: &[PathBuf],
        options: &LoadOptions,
    ) -> Result<ModuleTree> {
        let mut ancestors = Vec::new();
        let mut tree = Self::load_module(fs, registry, dir, files, None, &mut ancestors)?;
        tree.apply_variable_values(fs, options);
        Ok(tree)
    }

    pub fn meta(&self) -> &ModuleMeta {
        &self.meta
    }

    pub fn child(&self, name: &str) -> Option<&ModuleTree> {
        self.children.get(name)
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &ModuleTree)> {
        self.children.iter()
    }

    /// Non-fatal load errors of this module and all of its descendants.
    pub fn errors(&self) -> Vec<InterpreterError> {
        let mut out = self.errors.clone();
        for child in self.children.values() {
            out.extend(child.errors());
        }
        out
    }

    fn load_module(
        fs: &dyn Filesystem,
        registry: &ModuleRegistry,
        dir: &Path,
        files: &[PathBuf],
        location: Option<SourceRange>,
        ancestors: &mut Vec<PathBuf>,
    ) -> Result<ModuleTree> {
        ancestors.push(normalize(dir));
        let result = Self::load_module_inner(fs, registry, dir, files, location, ancestors);
        ancestors.pop();
        result
    }

    fn load_module_inner(
        fs: &dyn Filesystem,
        registry: &ModuleRegistry,
        dir: &Path,
        files: &[PathBuf],
        location: Option<SourceRange>,
        ancestors: &mut Vec<PathBuf>,
    ) -> Result<ModuleTree> {
        debug!("loading module {} ({} files)", dir.display(), files.len());
        let mut tree = ModuleTree {
            meta: ModuleMeta {
                dir: dir.to_path_buf(),
                files: files.to_vec(),
                missing_remote_modules: Vec::new(),
                location,
            },
            ..Default::default()
        };

        for path in files {
            let text = fs.read_to_string(path)?;
            let body: Body = hcl::from_str(&text).map_err(|e| InterpreterError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?;
            let source = SourceBody::parse(path, &text)
                .map_err(|message| InterpreterError::Parse {
                    path: path.clone(),
                    message,
                })?;
            tree.decode(&body, &source);
        }
        tree.resolve_providers();
        tree.load_children(fs, registry, ancestors);
        Ok(tree)
    }

    fn load_children(
        &mut self,
        fs: &dyn Filesystem,
        registry: &ModuleRegistry,
        ancestors: &mut Vec<PathBuf>,
    ) {
        let calls = self.calls.clone();
        for call in calls {
            let Some(source) = &call.source else {
                warn!("module '{}' has no static source, skipping", call.name);
                continue;
            };
            let Some(child_dir) = resolve_source(registry, &self.meta.dir, source) else {
                warn!("remote module '{}' ({source}) is not installed", call.name);
                self.meta.missing_remote_modules.push(source.clone());
                continue;
            };
            if ancestors.contains(&normalize(&child_dir)) {
                warn!("module '{}' at {} is already being loaded", call.name, child_dir.display());
                self.errors.push(InterpreterError::ModuleCycle {
                    name: call.name.clone(),
                    dir: child_dir,
                });
                continue;
            }

            let loaded = primary_files(fs, &child_dir).and_then(|files| {
                Self::load_module(
                    fs,
                    registry,
                    &child_dir,
                    &files,
                    Some(call.location.clone()),
                    ancestors,
                )
            });
            match loaded {
                Ok(child) => {
                    self.children.insert(call.name.clone(), child);
                }
                Err(e) => {
                    warn!("skipping submodule '{}': {e:#}", call.name);
                    self.errors.push(InterpreterError::SubmoduleLoad {
                        name: call.name.clone(),
                        message: format!("{e:#}"),
                    });
                }
            }
        }

        if !self.meta.missing_remote_modules.is_empty() {
            self.errors.push(InterpreterError::MissingRemoteSubmodules {
                dir: self.meta.dir.display().to_string(),
                sources: self.meta.missing_remote_modules.clone(),
            });
        }
    }

    fn decode(&mut self, body: &Body, source: &SourceBody) {
        for block in body.blocks() {
            let ident = block.identifier();
            let labels: Vec<&str> = block.labels().iter().map(|l| l.as_str()).collect();
            let source_block = source.find_block(ident, &labels);
            let inner = block.body();

            match (ident, labels.as_slice()) {
                ("variable", [name]) => {
                    let default = find_attr(inner, "default").cloned();
                    self.variables.insert(name.to_string(), default);
                }
                ("locals", []) => {
                    for attr in inner.attributes() {
                        self.locals.insert(attr.key().to_string(), attr.expr().clone());
                    }
                }
                ("resource", [ty, name]) => {
                    self.decode_resource(false, ty, name, inner, source_block);
                }
                ("data", [ty, name]) => {
                    self.decode_resource(true, ty, name, inner, source_block);
                }
                ("output", [name]) => {
                    if let Some(value) = find_attr(inner, "value") {
                        self.outputs.insert(name.to_string(), value.clone());
                    }
                }
                ("provider", [name]) => {
                    let provider_name = match find_attr(inner, "alias").and_then(static_string) {
                        Some(alias) => format!("{name}.{alias}"),
                        None => name.to_string(),
                    };
                    self.providers.insert(provider_name, Term::from_body(inner));
                }
                ("module", [name]) => {
                    let arguments = inner
                        .attributes()
                        .filter(|a| !MODULE_CALL_META.contains(&a.key()))
                        .map(|a| (a.key().to_string(), a.expr().clone()))
                        .collect();
                    self.calls.push(ModuleCall {
                        name: name.to_string(),
                        source: find_attr(inner, "source").and_then(static_string),
                        arguments,
                        count: find_attr(inner, "count").cloned(),
                        for_each: find_attr(inner, "for_each").cloned(),
                        location: source_block.map(|b| b.range.clone()).unwrap_or_default(),
                    });
                }
                ("terraform", []) => {
                    for required in inner.blocks().filter(|b| b.identifier() == "required_providers") {
                        for attr in required.body().attributes() {
                            self.required_providers
                                .insert(attr.key().to_string(), required_provider(attr.expr()));
                        }
                    }
                }
                (other, _) => debug!("ignoring '{other}' block"),
            }
        }
    }

    fn decode_resource(
        &mut self,
        data: bool,
        resource_type: &str,
        name: &str,
        body: &Body,
        source_block: Option<&SourceBlock>,
    ) {
        let provider_name = find_attr(body, "provider")
            .and_then(|expr| references(expr).into_iter().next())
            .map(|r| r.accessor.to_string())
            .unwrap_or_else(|| implied_provider(resource_type));
        let term = Term::from_body(body);
        let body = source_block.cloned().unwrap_or_default();

        let mut local = Vec::with_capacity(3);
        if data {
            local.push("data".to_string());
        }
        local.push(resource_type.to_string());
        local.push(name.to_string());

        self.resources.push(Resource {
            name: local,
            meta: ResourceMeta {
                data,
                resource_type: resource_type.to_string(),
                provider_type: String::new(),
                provider_version_constraint: None,
                provider_name,
                replicated: term.count().is_some() || term.for_each().is_some(),
                location: body.range.clone(),
                body,
            },
            term,
        });
    }

    /// Fills provider type and version once every file's `required_providers`
    /// is known.
    fn resolve_providers(&mut self) {
        for resource in &mut self.resources {
            let local = resource
                .meta
                .provider_name
                .split('.')
                .next()
                .unwrap_or_default()
                .to_string();
            let required = self.required_providers.get(&local);
            resource.meta.provider_type = required
                .and_then(|r| r.source.as_deref())
                .and_then(|s| s.rsplit('/').next())
                .map(str::to_string)
                .unwrap_or(local);
            resource.meta.provider_version_constraint = required.and_then(|r| r.version.clone());
        }
    }

    fn apply_variable_values(&mut self, fs: &dyn Filesystem, options: &LoadOptions) {
        let mut files = match find_var_files(fs, &self.meta.dir) {
            Ok(files) => files,
            Err(e) => {
                warn!("cannot list variable files in {}: {e:#}", self.meta.dir.display());
                Vec::new()
            }
        };
        files.extend(options.var_files.iter().cloned());

        for path in files {
            debug!("applying variable file {}", path.display());
            match load_var_file(fs, &path) {
                Ok(values) => self.overrides.extend(values),
                Err(e) => self.errors.push(InterpreterError::VarFile {
                    path,
                    message: format!("{e:#}"),
                }),
            }
        }
        self.overrides
            .extend(options.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Visits this module, its terms and resources, then each child by call
    /// name.
    pub fn walk(&self, visitor: &mut dyn Visitor) {
        self.walk_in(&mut Vec::new(), visitor);
    }

    fn walk_in(&self, module: &mut ModuleName, visitor: &mut dyn Visitor) {
        visitor.visit_module(module, &self.meta);
        let name = |parts: &[&str]| FullName::local(module, parts);

        for (var, default) in &self.variables {
            let term = match (self.overrides.get(var), default) {
                (Some(value), _) => Term::from_value(value.clone()),
                (None, Some(expr)) => Term::from_expr(expr.clone()),
                (None, None) => Term::from_value(Value::Unknown),
            };
            visitor.visit_term(name(&["variable", var.as_str()]), term);
        }
        for (local, expr) in &self.locals {
            visitor.visit_term(name(&["local", local.as_str()]), Term::from_expr(expr.clone()));
        }
        for resource in &self.resources {
            let full = FullName::new(module.clone(), resource.name.clone());
            visitor.visit_resource(&full, &resource.meta);
            visitor.visit_term(full, resource.term.clone());
        }
        for (output, expr) in &self.outputs {
            visitor.visit_term(name(&["output", output.as_str()]), Term::from_expr(expr.clone()));
        }
        for (provider, term) in &self.providers {
            visitor.visit_term(provider_config_name(module, provider), term.clone());
        }
        for call in &self.calls {
            for (arg, expr) in &call.arguments {
                let term = Term::from_expr(expr.clone())
                    .with_count(call.count.clone())
                    .with_for_each(call.for_each.clone())
                    .first_instance();
                visitor.visit_term(name(&["input", call.name.as_str(), arg.as_str()]), term);
            }
        }

        for (call, child) in &self.children {
            module.push(call.clone());
            child.walk_in(module, visitor);
            module.pop();
        }
    }
}

/// `*.tf` files directly inside `dir`, sorted, without override files.
pub fn primary_files(fs: &dyn Filesystem, dir: &Path) -> Result<Vec<PathBuf>> {
    let names = fs
        .read_dir(dir)
        .with_context(|| format!("reading module directory {}", dir.display()))?;
    Ok(names
        .into_iter()
        .filter(|n| n.ends_with(".tf"))
        .filter(|n| n != "override.tf" && !n.ends_with("_override.tf"))
        .map(|n| dir.join(n))
        .collect())
}

fn resolve_source(registry: &ModuleRegistry, dir: &Path, source: &str) -> Option<PathBuf> {
    if let Some(resolved) = registry.resolve(source) {
        return Some(resolved.to_path_buf());
    }
    if source.starts_with("./") || source.starts_with("../") || Path::new(source).is_absolute() {
        return Some(dir.join(source));
    }
    None
}

fn normalize(path: &Path) -> PathBuf {
    path.absolutize()
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_path_buf())
}

fn find_attr<'a>(body: &'a Body, name: &str) -> Option<&'a Expression> {
    body.attributes()
        .find(|a| a.key() == name)
        .map(|a| a.expr())
}

fn static_string(expr: &Expression) -> Option<String> {
    match literal_value(expr) {
        Ok(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// `aws_s3_bucket` is served by `aws`.
fn implied_provider(resource_type: &str) -> String {
    resource_type
        .split('_')
        .next()
        .unwrap_or(resource_type)
        .to_string()
}

fn required_provider(expr: &Expression) -> RequiredProvider {
    match literal_value(expr) {
        Ok(Value::String(version)) => RequiredProvider {
            source: None,
            version: Some(version),
        },
        Ok(Value::Object(fields)) => RequiredProvider {
            source: fields.get("source").and_then(Value::as_str).map(str::to_string),
            version: fields.get("version").and_then(Value::as_str).map(str::to_string),
        },
        _ => RequiredProvider::default(),
    }
}
