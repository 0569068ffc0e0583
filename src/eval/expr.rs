//! Reference extraction over `hcl` expressions and the evaluator the
//! interpreter calls into.

use hcl::eval::Evaluate;
use hcl::expr::{ObjectKey, Operation, TemplateExpr, TraversalOperator};
use hcl::template::{Directive, Element, Template};
use hcl::Expression;

use crate::error::Diagnostic;
use crate::eval::builtins;
use crate::names::{Accessor, Segment};
use crate::valtree;
use crate::value::Value;

/// A free variable reference found in an expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Root variable followed by every statically known attribute or index.
    pub accessor: Accessor,
    /// Attribute names read right after the first dynamic operator, e.g.
    /// `[id]` for `aws_instance.web[*].id`.
    pub relative: Vec<String>,
}

impl Reference {
    pub fn root(&self) -> &str {
        self.accessor
            .segments()
            .first()
            .and_then(Segment::as_key)
            .unwrap_or_default()
    }
}

/// Every free reference in `expr`, in source order.
pub fn references(expr: &Expression) -> Vec<Reference> {
    let mut out = Vec::new();
    collect(expr, &mut Vec::new(), &mut out);
    out
}

fn collect(expr: &Expression, bound: &mut Vec<String>, out: &mut Vec<Reference>) {
    match expr {
        Expression::Variable(v) => push_reference(v.as_str(), &[], bound, out),
        Expression::Traversal(t) => {
            match &t.expr {
                Expression::Variable(v) => push_reference(v.as_str(), &t.operators, bound, out),
                other => collect(other, bound, out),
            }
            for op in &t.operators {
                if let TraversalOperator::Index(index) = op {
                    collect(index, bound, out);
                }
            }
        }
        Expression::Array(items) => {
            for item in items {
                collect(item, bound, out);
            }
        }
        Expression::Object(map) => {
            for (key, value) in map {
                if let ObjectKey::Expression(key) = key {
                    collect(key, bound, out);
                }
                collect(value, bound, out);
            }
        }
        Expression::TemplateExpr(t) => {
            if let Ok(template) = Template::from_expr(t as &TemplateExpr) {
                collect_template(&template, bound, out);
            }
        }
        Expression::FuncCall(call) => {
            for arg in &call.args {
                collect(arg, bound, out);
            }
        }
        Expression::Parenthesis(inner) => collect(inner, bound, out),
        Expression::Conditional(c) => {
            collect(&c.cond_expr, bound, out);
            collect(&c.true_expr, bound, out);
            collect(&c.false_expr, bound, out);
        }
        Expression::Operation(op) => match &**op {
            Operation::Unary(u) => collect(&u.expr, bound, out),
            Operation::Binary(b) => {
                collect(&b.lhs_expr, bound, out);
                collect(&b.rhs_expr, bound, out);
            }
        },
        Expression::ForExpr(fe) => {
            collect(&fe.collection_expr, bound, out);
            let depth = bound.len();
            if let Some(key_var) = &fe.key_var {
                bound.push(key_var.as_str().to_string());
            }
            bound.push(fe.value_var.as_str().to_string());
            if let Some(key_expr) = &fe.key_expr {
                collect(key_expr, bound, out);
            }
            collect(&fe.value_expr, bound, out);
            if let Some(cond_expr) = &fe.cond_expr {
                collect(cond_expr, bound, out);
            }
            bound.truncate(depth);
        }
        _ => {}
    }
}

fn collect_template(template: &Template, bound: &mut Vec<String>, out: &mut Vec<Reference>) {
    for element in template.elements() {
        match element {
            Element::Literal(_) => {}
            Element::Interpolation(interp) => collect(&interp.expr, bound, out),
            Element::Directive(directive) => collect_directive(directive, bound, out),
        }
    }
}

fn collect_directive(directive: &Directive, bound: &mut Vec<String>, out: &mut Vec<Reference>) {
    match directive {
        Directive::If(d) => {
            collect(&d.cond_expr, bound, out);
            collect_template(&d.true_template, bound, out);
            if let Some(false_template) = &d.false_template {
                collect_template(false_template, bound, out);
            }
        }
        Directive::For(d) => {
            collect(&d.collection_expr, bound, out);
            let depth = bound.len();
            if let Some(key_var) = &d.key_var {
                bound.push(key_var.as_str().to_string());
            }
            bound.push(d.value_var.as_str().to_string());
            collect_template(&d.template, bound, out);
            bound.truncate(depth);
        }
    }
}

fn push_reference(
    root: &str,
    operators: &[TraversalOperator],
    bound: &[String],
    out: &mut Vec<Reference>,
) {
    if bound.iter().any(|b| b == root) {
        return;
    }
    let mut accessor = Accessor::new(vec![Segment::Key(root.to_string())]);
    let mut relative = Vec::new();
    let mut ops = operators.iter();

    for op in ops.by_ref() {
        match static_segment(op) {
            Some(segment) => accessor.push(segment),
            None => break,
        }
    }
    for op in ops {
        match static_segment(op) {
            Some(Segment::Key(k)) => relative.push(k),
            Some(Segment::Index(_)) => break,
            None if relative.is_empty() => continue,
            None => break,
        }
    }

    out.push(Reference { accessor, relative });
}

fn static_segment(op: &TraversalOperator) -> Option<Segment> {
    match op {
        TraversalOperator::GetAttr(id) => Some(Segment::Key(id.as_str().to_string())),
        TraversalOperator::Index(Expression::String(s)) => Some(Segment::Key(s.clone())),
        TraversalOperator::Index(Expression::Number(n)) => {
            n.as_u64().map(|i| Segment::Index(i as usize))
        }
        TraversalOperator::LegacyIndex(i) => Some(Segment::Index(*i as usize)),
        _ => None,
    }
}

/// Whether `expr` is a call to the function `name`.
pub fn is_call_to(expr: &Expression, name: &str) -> bool {
    match expr {
        Expression::FuncCall(call) => call.name.to_string() == name,
        Expression::Parenthesis(inner) => is_call_to(inner, name),
        _ => false,
    }
}

/// Evaluates a single expression against a scope object.
///
/// Failures never abort: the value becomes `Null` and the problem is
/// reported as a diagnostic.
pub trait ExprEvaluator {
    fn evaluate(&self, expr: &Expression, scope: &Value) -> (Value, Vec<Diagnostic>);
}

/// Evaluator backed by `hcl::eval` and the builtin function table.
#[derive(Debug, Default, Clone, Copy)]
pub struct HclEvaluator;

impl ExprEvaluator for HclEvaluator {
    fn evaluate(&self, expr: &Expression, scope: &Value) -> (Value, Vec<Diagnostic>) {
        if references(expr)
            .iter()
            .any(|r| valtree::reaches_unknown(scope, &r.accessor))
        {
            return (Value::Unknown, Vec::new());
        }

        let mut ctx = builtins::create_context();
        if let Value::Object(vars) = scope {
            for (name, value) in vars {
                ctx.declare_var(name.as_str(), value.to_hcl());
            }
        }
        match expr.evaluate(&ctx) {
            Ok(v) => (Value::from(v), Vec::new()),
            Err(e) => (Value::Null, vec![Diagnostic::new(e.to_string())]),
        }
    }
}

/// Evaluates an expression that may call functions but reads no variables.
pub fn literal_value(expr: &Expression) -> Result<Value, Diagnostic> {
    let (value, mut diagnostics) = HclEvaluator.evaluate(expr, &Value::object());
    match diagnostics.pop() {
        Some(d) => Err(d),
        None => Ok(value),
    }
}
