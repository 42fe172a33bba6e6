use std::borrow::Cow;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Read access to values by path, used to evaluate expressions.
pub trait ValueSource {
    fn lookup(&self, path: &str) -> Option<Cow<'_, Value>>;
}

impl ValueSource for Value {
    /// Dotted lookup into a nested object (`products.items`).
    fn lookup(&self, path: &str) -> Option<Cow<'_, Value>> {
        lookup_dotted(self, path).map(Cow::Borrowed)
    }
}

/// Follows a dotted path through nested objects. A full key match wins over splitting, so objects
/// that carry dotted keys still resolve.
pub fn lookup_dotted<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let object = value.as_object()?;
    if let Some(found) = object.get(path) {
        return Some(found);
    }
    let (head, rest) = path.split_once('.')?;
    lookup_dotted(object.get(head)?, rest)
}

/// Predicate AST used for field and step conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Expr {
    Literal { value: bool },
    Equals { path: String, value: Value },
    Contains { path: String, value: Value },
    Exists { path: String },
    And { expressions: Vec<Expr> },
    Or { expressions: Vec<Expr> },
    Not { expression: Box<Expr> },
}

impl Expr {
    /// Evaluates the expression, resolving each referenced path through `resolve` first.
    ///
    /// Paths that do not resolve behave as missing values: `equals` and `contains` are false,
    /// `exists` is false.
    pub fn evaluate_with<S, F>(&self, source: &S, resolve: &F) -> bool
    where
        S: ValueSource + ?Sized,
        F: Fn(&str) -> String,
    {
        match self {
            Expr::Literal { value } => *value,
            Expr::Equals { path, value } => source
                .lookup(&resolve(path))
                .is_some_and(|found| *found == *value),
            Expr::Contains { path, value } => source
                .lookup(&resolve(path))
                .is_some_and(|found| contains(&found, value)),
            Expr::Exists { path } => source
                .lookup(&resolve(path))
                .is_some_and(|found| !is_empty_value(&found)),
            Expr::And { expressions } => expressions
                .iter()
                .all(|expr| expr.evaluate_with(source, resolve)),
            Expr::Or { expressions } => expressions
                .iter()
                .any(|expr| expr.evaluate_with(source, resolve)),
            Expr::Not { expression } => !expression.evaluate_with(source, resolve),
        }
    }

    /// Evaluates with every path taken as written.
    pub fn evaluate<S: ValueSource + ?Sized>(&self, source: &S) -> bool {
        self.evaluate_with(source, &|path: &str| path.to_string())
    }

    /// Every path referenced by the expression, in declaration order.
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal { .. } => {}
            Expr::Equals { path, .. } | Expr::Contains { path, .. } | Expr::Exists { path } => {
                out.push(path)
            }
            Expr::And { expressions } | Expr::Or { expressions } => {
                for expr in expressions {
                    expr.collect_paths(out);
                }
            }
            Expr::Not { expression } => expression.collect_paths(out),
        }
    }

    pub fn and(self, other: Expr) -> Expr {
        match self {
            Expr::And { mut expressions } => {
                expressions.push(other);
                Expr::And { expressions }
            }
            expr => Expr::And {
                expressions: vec![expr, other],
            },
        }
    }

    pub fn or(self, other: Expr) -> Expr {
        match self {
            Expr::Or { mut expressions } => {
                expressions.push(other);
                Expr::Or { expressions }
            }
            expr => Expr::Or {
                expressions: vec![expr, other],
            },
        }
    }

    pub fn negate(self) -> Expr {
        Expr::Not {
            expression: Box::new(self),
        }
    }
}

/// Starts a condition on `path`: `when("type").equals(json!("physical"))`.
pub fn when(path: impl Into<String>) -> When {
    When { path: path.into() }
}

pub struct When {
    path: String,
}

impl When {
    pub fn equals(self, value: impl Into<Value>) -> Expr {
        Expr::Equals {
            path: self.path,
            value: value.into(),
        }
    }

    pub fn contains(self, value: impl Into<Value>) -> Expr {
        Expr::Contains {
            path: self.path,
            value: value.into(),
        }
    }

    pub fn exists(self) -> Expr {
        Expr::Exists { path: self.path }
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match (haystack, needle) {
        (Value::Array(items), _) => items.contains(needle),
        (Value::String(text), Value::String(part)) => text.contains(part.as_str()),
        _ => false,
    }
}

/// Null, empty strings (after trimming), empty arrays and empty objects count as empty.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
