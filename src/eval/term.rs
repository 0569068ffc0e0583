//! Terms: the unit of evaluation.
//!
//! A term is a single expression, a fixed value, or a block body made of
//! attribute expressions plus named lists of nested terms. Any term may
//! replicate through `count` or `for_each`; nested `dynamic` blocks are
//! desugared into replicated nested terms with their own iterator name.

use std::collections::BTreeMap;

use hcl::{Body, Expression};

use crate::error::Diagnostic;
use crate::eval::expr::{is_call_to, references, Reference};
use crate::names::{FullName, ModuleName};
use crate::valtree;
use crate::value::Value;

/// Top-level arguments that steer how a block is evaluated rather than
/// describing the object itself.
const META_ARGUMENTS: &[&str] = &[
    "count",
    "for_each",
    "depends_on",
    "provider",
    "lifecycle",
    "provisioner",
    "connection",
];

#[derive(Debug, Clone, PartialEq)]
pub enum TermBody {
    Expr(Expression),
    Value(Value),
    Block {
        attributes: BTreeMap<String, Expression>,
        blocks: BTreeMap<String, Vec<Term>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Term {
    body: TermBody,
    count: Option<Expression>,
    for_each: Option<Expression>,
    iterator: Option<String>,
    first_instance: bool,
}

pub type EvalFn<'a> = dyn FnMut(&Expression, &Value) -> (Value, Vec<Diagnostic>) + 'a;

impl Term {
    fn new(body: TermBody) -> Self {
        Term {
            body,
            count: None,
            for_each: None,
            iterator: None,
            first_instance: false,
        }
    }

    pub fn from_expr(expr: Expression) -> Self {
        Term::new(TermBody::Expr(expr))
    }

    pub fn from_value(value: Value) -> Self {
        Term::new(TermBody::Value(value))
    }

    /// Term for a top-level block body such as a resource or provider.
    /// Meta-arguments are dropped from the body; `count` and `for_each`
    /// become the term's replication.
    pub fn from_body(body: &Body) -> Self {
        let count = find_attr(body, "count").cloned();
        let for_each = find_attr(body, "for_each").cloned();
        let mut term = Term::new(block_body(body, META_ARGUMENTS));
        term.count = count;
        term.for_each = for_each;
        term
    }

    pub fn with_count(mut self, count: Option<Expression>) -> Self {
        self.count = count;
        self
    }

    pub fn with_for_each(mut self, for_each: Option<Expression>) -> Self {
        self.for_each = for_each;
        self
    }

    /// Evaluate only the first replicated instance and return it unwrapped.
    pub fn first_instance(mut self) -> Self {
        self.first_instance = true;
        self
    }

    pub fn body(&self) -> &TermBody {
        &self.body
    }

    pub fn count(&self) -> Option<&Expression> {
        self.count.as_ref()
    }

    pub fn for_each(&self) -> Option<&Expression> {
        self.for_each.as_ref()
    }

    pub fn iterator_name(&self) -> &str {
        self.iterator.as_deref().unwrap_or("each")
    }

    /// Whether evaluation yields a list of instances.
    pub fn is_replicated(&self) -> bool {
        !self.first_instance && (self.count.is_some() || self.for_each.is_some())
    }

    fn binds(&self, root: &str) -> bool {
        (self.count.is_some() && root == "count")
            || (self.for_each.is_some() && root == self.iterator_name())
    }

    /// Free references of this term and its nested blocks. Names the term
    /// binds itself (`count.index`, the iterator) are left out.
    pub fn dependencies(&self) -> Vec<Reference> {
        let mut deps = Vec::new();
        if let Some(count) = &self.count {
            deps.extend(references(count));
        }
        if let Some(for_each) = &self.for_each {
            deps.extend(references(for_each));
        }

        let mut body_deps = Vec::new();
        match &self.body {
            TermBody::Expr(expr) => body_deps.extend(references(expr)),
            TermBody::Value(_) => {}
            TermBody::Block { attributes, blocks } => {
                for expr in attributes.values() {
                    body_deps.extend(references(expr));
                }
                for term in blocks.values().flatten() {
                    body_deps.extend(term.dependencies());
                }
            }
        }
        body_deps.retain(|r| !self.binds(r.root()));
        deps.extend(body_deps);
        deps
    }

    /// Evaluates the term against `scope`.
    ///
    /// Diagnostics from every expression are collected and returned; a
    /// failing expression contributes `Null` and evaluation carries on.
    pub fn evaluate(&self, scope: &Value, eval: &mut EvalFn<'_>) -> (Value, Vec<Diagnostic>) {
        let mut diags = Vec::new();

        if let Some(count_expr) = &self.count {
            let (count, d) = eval(count_expr, scope);
            diags.extend(d);
            let bindings = match count_instances(&count) {
                Some(n) => (0..n)
                    .map(|i| {
                        let path = ["count".to_string(), "index".to_string()];
                        valtree::nest(&path, Value::from(i))
                    })
                    .collect(),
                None => {
                    diags.push(Diagnostic::new(format!(
                        "count must be a non-negative whole number, got {}",
                        count.kind()
                    )));
                    Vec::new()
                }
            };
            return self.replicate(bindings, scope, eval, diags);
        }

        if let Some(for_each_expr) = &self.for_each {
            let (collection, d) = eval(for_each_expr, scope);
            diags.extend(d);
            let as_set = is_call_to(for_each_expr, "toset");
            let iterator = vec![self.iterator_name().to_string()];
            let binding = |key: Option<Value>, value: Value| {
                let mut pair = BTreeMap::new();
                if let Some(key) = key {
                    pair.insert("key".to_string(), key);
                }
                pair.insert("value".to_string(), value);
                valtree::nest(&iterator, Value::Object(pair))
            };
            let bindings = match collection {
                Value::Unknown => vec![binding(Some(Value::Unknown), Value::Unknown)],
                Value::Object(map) => map
                    .into_iter()
                    .map(|(k, v)| binding(Some(Value::String(k)), v))
                    .collect(),
                Value::List(items) if as_set => items
                    .into_iter()
                    .map(|v| binding(Some(v.clone()), v))
                    .collect(),
                Value::List(items) => items.into_iter().map(|v| binding(None, v)).collect(),
                other => {
                    diags.push(Diagnostic::new(format!(
                        "for_each expects a map, set or list, got {}",
                        other.kind()
                    )));
                    Vec::new()
                }
            };
            return self.replicate(bindings, scope, eval, diags);
        }

        let (value, d) = self.evaluate_body(scope, eval);
        diags.extend(d);
        (value, diags)
    }

    fn replicate(
        &self,
        bindings: Vec<Value>,
        scope: &Value,
        eval: &mut EvalFn<'_>,
        mut diags: Vec<Diagnostic>,
    ) -> (Value, Vec<Diagnostic>) {
        let mut items = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let scope = valtree::merge(scope.clone(), binding);
            let (value, d) = self.evaluate_body(&scope, eval);
            diags.extend(d);
            items.push(value);
            if self.first_instance {
                break;
            }
        }
        if self.first_instance {
            return (items.pop().unwrap_or(Value::Unknown), diags);
        }
        (Value::List(items), diags)
    }

    fn evaluate_body(&self, scope: &Value, eval: &mut EvalFn<'_>) -> (Value, Vec<Diagnostic>) {
        match &self.body {
            TermBody::Expr(expr) => eval(expr, scope),
            TermBody::Value(value) => (value.clone(), Vec::new()),
            TermBody::Block { attributes, blocks } => {
                let mut diags = Vec::new();
                let mut object = BTreeMap::new();
                for (name, expr) in attributes {
                    let (value, d) = eval(expr, scope);
                    diags.extend(d);
                    object.insert(name.clone(), value);
                }
                for (name, terms) in blocks {
                    let mut list = Vec::new();
                    for term in terms {
                        let (value, d) = term.evaluate(scope, eval);
                        diags.extend(d);
                        match value {
                            Value::List(items) if term.is_replicated() => list.extend(items),
                            other => list.push(other),
                        }
                    }
                    object.insert(name.clone(), Value::List(list));
                }
                (Value::Object(object), diags)
            }
        }
    }
}

fn count_instances(count: &Value) -> Option<i64> {
    match count {
        Value::Unknown | Value::Null => Some(1),
        Value::Number(n) => match n.as_i64() {
            Some(i) if i >= 0 => Some(i),
            Some(_) => None,
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                .map(|f| f as i64),
        },
        _ => None,
    }
}

fn find_attr<'a>(body: &'a Body, name: &str) -> Option<&'a Expression> {
    body.attributes()
        .find(|a| a.key() == name)
        .map(|a| a.expr())
}

fn block_body(body: &Body, skip: &[&str]) -> TermBody {
    let mut attributes = BTreeMap::new();
    let mut blocks: BTreeMap<String, Vec<Term>> = BTreeMap::new();

    for attr in body.attributes() {
        if !skip.contains(&attr.key()) {
            attributes.insert(attr.key().to_string(), attr.expr().clone());
        }
    }
    for block in body.blocks() {
        let ident = block.identifier();
        if skip.contains(&ident) {
            continue;
        }
        if ident == "dynamic" {
            if let Some((name, term)) = dynamic_block(block) {
                blocks.entry(name).or_default().push(term);
            }
            continue;
        }
        blocks
            .entry(ident.to_string())
            .or_default()
            .push(Term::new(block_body(block.body(), &[])));
    }

    TermBody::Block { attributes, blocks }
}

/// `dynamic "ingress" { for_each = ..., iterator = rule, content { ... } }`
/// becomes a replicated `ingress` term bound to `rule` (default `ingress`).
fn dynamic_block(block: &hcl::Block) -> Option<(String, Term)> {
    let name = block.labels().first()?.as_str().to_string();
    let body = block.body();
    let content = body
        .blocks()
        .find(|b| b.identifier() == "content")
        .map(|b| block_body(b.body(), &[]))
        .unwrap_or(TermBody::Block {
            attributes: BTreeMap::new(),
            blocks: BTreeMap::new(),
        });
    let iterator = match find_attr(body, "iterator") {
        Some(Expression::Variable(v)) => v.as_str().to_string(),
        _ => name.clone(),
    };
    let mut term = Term::new(content);
    term.for_each = find_attr(body, "for_each").cloned();
    term.iterator = Some(iterator);
    Some((name, term))
}

#[derive(Debug, Default)]
struct TermNode {
    term: Option<Term>,
    children: BTreeMap<String, TermNode>,
}

/// Terms indexed per module by their local-name segments.
#[derive(Debug, Default)]
pub struct TermTree {
    modules: BTreeMap<ModuleName, TermNode>,
}

impl TermTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_term(&mut self, name: FullName, term: Term) {
        let mut node = self.modules.entry(name.module).or_default();
        for segment in name.local {
            node = node.children.entry(segment).or_default();
        }
        node.term = Some(term);
    }

    pub fn get(&self, name: &FullName) -> Option<&Term> {
        let mut node = self.modules.get(&name.module)?;
        for segment in &name.local {
            node = node.children.get(segment)?;
        }
        node.term.as_ref()
    }

    /// The term whose name is the longest prefix of `name`, with that name.
    pub fn lookup_by_prefix(&self, name: &FullName) -> Option<(FullName, &Term)> {
        let mut node = self.modules.get(&name.module)?;
        let mut best = None;
        for (depth, segment) in name.local.iter().enumerate() {
            match node.children.get(segment) {
                Some(child) => node = child,
                None => break,
            }
            if let Some(term) = &node.term {
                best = Some((depth + 1, term));
            }
        }
        best.map(|(depth, term)| {
            (
                FullName::new(name.module.clone(), name.local[..depth].to_vec()),
                term,
            )
        })
    }

    /// All terms, ordered by module then by local name.
    pub fn terms(&self) -> Vec<(FullName, &Term)> {
        fn walk<'a>(
            node: &'a TermNode,
            module: &ModuleName,
            local: &mut Vec<String>,
            out: &mut Vec<(FullName, &'a Term)>,
        ) {
            if let Some(term) = &node.term {
                out.push((FullName::new(module.clone(), local.clone()), term));
            }
            for (segment, child) in &node.children {
                local.push(segment.clone());
                walk(child, module, local, out);
                local.pop();
            }
        }

        let mut out = Vec::new();
        for (module, root) in &self.modules {
            walk(root, module, &mut Vec::new(), &mut out);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.terms().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.values().all(|n| n.term.is_none() && n.children.is_empty())
    }
}
