//! Strict template rendering with named filters.
//!
//! Every variable, key and filter a template references must exist;
//! nothing renders as an empty string by accident.
//!
//! ```
//! use scd_pattern::template::{render, Context, FilterSet};
//! use serde_json::json;
//!
//! let mut context = Context::new();
//! context.insert("columns".into(), json!(["id", "name"]));
//!
//! let filters = FilterSet::new().with("upper", |s| s.to_uppercase());
//! let sql = render("demo", "SELECT {{ columns | upper | join(\", \") }}", &context, &filters).unwrap();
//! assert_eq!(sql, "SELECT ID, NAME");
//! ```

mod parser;

use crate::backend::{Backend, Quoting};
use crate::columns::strip_indentation;
use crate::error::{ScdError, ScdResult};
use parser::{Cond, Expr, FilterCall, Node, Segment};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Variables visible to a template.
pub type Context = serde_json::Map<String, Value>;

type FilterFn = Box<dyn Fn(&str) -> String + Send + Sync>;

/// Named string filters available to templates.
///
/// Filters apply to scalars, and element-wise to lists. `join` is built in.
#[derive(Default)]
pub struct FilterSet {
    filters: BTreeMap<String, FilterFn>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        name: impl Into<String>,
        filter: impl Fn(&str) -> String + Send + Sync + 'static,
    ) -> Self {
        self.filters.insert(name.into(), Box::new(filter));
        self
    }

    /// `quoteIdentifier`, `quoteValue` and `stripIndentation` for a backend.
    pub fn for_backend(backend: Backend) -> Self {
        let quoting = Quoting::for_backend(backend);
        Self::new()
            .with("quoteIdentifier", quoting.quote_identifier)
            .with("quoteValue", quoting.quote_value)
            .with("stripIndentation", strip_indentation)
    }

    fn get(&self, name: &str) -> Option<&FilterFn> {
        self.filters.get(name)
    }
}

impl fmt::Debug for FilterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.filters.keys()).finish()
    }
}

/// A parsed template, reusable across renders.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<Node>,
}

impl Template {
    pub fn parse(name: &str, source: &str) -> ScdResult<Self> {
        let nodes = parser::parse_template(source)
            .map_err(|(line, message)| ScdError::template(name, line, message))?;
        Ok(Self {
            name: name.to_string(),
            nodes,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn render(&self, context: &Context, filters: &FilterSet) -> ScdResult<String> {
        let mut renderer = Renderer {
            template: &self.name,
            context,
            filters,
            locals: Vec::new(),
        };
        let mut out = String::new();
        renderer.render_nodes(&self.nodes, &mut out)?;
        Ok(out)
    }
}

/// Parse and render in one step.
pub fn render(name: &str, source: &str, context: &Context, filters: &FilterSet) -> ScdResult<String> {
    Template::parse(name, source)?.render(context, filters)
}

struct Renderer<'a> {
    template: &'a str,
    context: &'a Context,
    filters: &'a FilterSet,
    /// Loop variables, innermost last.
    locals: Vec<(String, Value)>,
}

impl Renderer<'_> {
    fn error(&self, line: usize, message: impl Into<String>) -> ScdError {
        ScdError::template(self.template, line, message)
    }

    fn render_nodes(&mut self, nodes: &[Node], out: &mut String) -> ScdResult<()> {
        for node in nodes {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Output { line, expr, filters } => {
                    let mut value = self.eval(expr, *line)?;
                    for filter in filters {
                        value = self.apply_filter(filter, value, *line)?;
                    }
                    out.push_str(&self.display(&value, expr, *line)?);
                }
                Node::If { branches, otherwise } => {
                    let mut taken = None;
                    for branch in branches {
                        if self.test(&branch.cond, branch.line)? {
                            taken = Some(&branch.body);
                            break;
                        }
                    }
                    self.render_nodes(taken.unwrap_or(otherwise), out)?;
                }
                Node::For {
                    line,
                    var,
                    iterable,
                    body,
                } => {
                    let items = match self.eval(iterable, *line)? {
                        Value::Array(items) => items,
                        other => {
                            return Err(self.error(
                                *line,
                                format!("\"{}\" is not a list, given {}", iterable, other),
                            ))
                        }
                    };
                    let length = items.len();
                    for (i, item) in items.into_iter().enumerate() {
                        self.locals.push((var.clone(), item));
                        self.locals.push((
                            "loop".to_string(),
                            json!({
                                "index": i + 1,
                                "index0": i,
                                "first": i == 0,
                                "last": i + 1 == length,
                                "length": length,
                            }),
                        ));
                        let result = self.render_nodes(body, out);
                        self.locals.truncate(self.locals.len() - 2);
                        result?;
                    }
                }
            }
        }
        Ok(())
    }

    fn lookup_root(&self, name: &str) -> Option<&Value> {
        self.locals
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .or_else(|| self.context.get(name))
    }

    fn eval(&self, expr: &Expr, line: usize) -> ScdResult<Value> {
        match expr {
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Int(n) => Ok(Value::from(*n)),
            Expr::Path { root, segments } => {
                let mut current = self
                    .lookup_root(root)
                    .ok_or_else(|| self.error(line, format!("Variable \"{}\" does not exist", root)))?;
                let mut walked = root.clone();

                for segment in segments {
                    let next = match segment {
                        Segment::Key(key) => current.get(key.as_str()),
                        Segment::Index(index) => current.get(*index),
                        Segment::Lookup(inner) => match self.eval(inner, line)? {
                            Value::String(key) => current.get(key.as_str()),
                            Value::Number(n) => n.as_u64().and_then(|i| current.get(i as usize)),
                            other => {
                                return Err(self.error(
                                    line,
                                    format!("Cannot use {} as a key of \"{}\"", other, walked),
                                ))
                            }
                        },
                    };
                    walked = match segment {
                        Segment::Key(key) => format!("{}.{}", walked, key),
                        Segment::Index(index) => format!("{}.{}", walked, index),
                        Segment::Lookup(inner) => format!("{}[{}]", walked, inner),
                    };
                    current = next.ok_or_else(|| {
                        self.error(line, format!("Key \"{}\" does not exist", walked))
                    })?;
                }

                Ok(current.clone())
            }
        }
    }

    fn test(&self, cond: &Cond, line: usize) -> ScdResult<bool> {
        Ok(match cond {
            Cond::Test(expr) => truthy(&self.eval(expr, line)?),
            Cond::Eq(a, b) => loosely_equal(&self.eval(a, line)?, &self.eval(b, line)?),
            Cond::Ne(a, b) => !loosely_equal(&self.eval(a, line)?, &self.eval(b, line)?),
            Cond::Not(c) => !self.test(c, line)?,
            Cond::And(a, b) => self.test(a, line)? && self.test(b, line)?,
            Cond::Or(a, b) => self.test(a, line)? || self.test(b, line)?,
        })
    }

    fn apply_filter(&self, call: &FilterCall, value: Value, line: usize) -> ScdResult<Value> {
        if call.name == "join" {
            let separator = match call.args.first() {
                Some(arg) => scalar_text(&self.eval(arg, line)?)
                    .ok_or_else(|| self.error(line, "join separator must be a scalar"))?,
                None => String::new(),
            };
            return match value {
                Value::Array(items) => {
                    let parts = items
                        .iter()
                        .map(|item| {
                            scalar_text(item)
                                .ok_or_else(|| self.error(line, "Cannot join nested values"))
                        })
                        .collect::<ScdResult<Vec<_>>>()?;
                    Ok(Value::String(parts.join(&separator)))
                }
                other => Err(self.error(line, format!("Cannot join {}, expected a list", other))),
            };
        }

        let filter = self
            .filters
            .get(&call.name)
            .ok_or_else(|| self.error(line, format!("Unknown filter \"{}\"", call.name)))?;
        if !call.args.is_empty() {
            return Err(self.error(
                line,
                format!("Filter \"{}\" takes no arguments", call.name),
            ));
        }

        let apply = |v: &Value| {
            scalar_text(v)
                .map(|s| Value::String(filter(&s)))
                .ok_or_else(|| self.error(line, format!("Filter \"{}\" expects text", call.name)))
        };

        match &value {
            Value::Array(items) => Ok(Value::Array(
                items.iter().map(apply).collect::<ScdResult<Vec<_>>>()?,
            )),
            scalar => apply(scalar),
        }
    }

    fn display(&self, value: &Value, expr: &Expr, line: usize) -> ScdResult<String> {
        scalar_text(value).ok_or_else(|| {
            self.error(
                line,
                format!("Cannot print \"{}\" directly, it is not a scalar (use \"join\")", expr),
            )
        })
    }
}

/// Text form of a scalar. `None` for lists and objects.
fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Scalars compare by their text, so `1 == "1"`.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (scalar_text(a), scalar_text(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}
