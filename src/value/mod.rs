mod render;

pub use render::summary;

use crate::eval::{Context, Scope};
use crate::syntax::{Expr, OperatorDef};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Infinite sets that support membership but cannot be enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Universe {
    Nat,
    Int,
    Str,
}

#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Str(Arc<str>),
    Set(BTreeSet<Value>),
    /// `lo..hi`, kept symbolic; enumerated only when iterated.
    Interval(i64, i64),
    Func(BTreeMap<Value, Value>),
    Tuple(Vec<Value>),
    Record(BTreeMap<Arc<str>, Value>),
    Universe(Universe),
    Operator(Arc<Closure>),
    /// Deferred value. Never stored inside aggregates; only bound in a Context.
    Lazy(Arc<LazyValue>),
}

/// An operator used as a value (passed as an argument or bound by LET).
pub struct Closure {
    pub def: Arc<OperatorDef>,
    pub context: Context,
}

/// An expression whose evaluation is postponed until first logical use.
pub struct LazyValue {
    pub expr: Arc<Expr>,
    pub scope: Scope,
    forced: OnceLock<Value>,
}

impl LazyValue {
    pub fn new(expr: Arc<Expr>, scope: Scope) -> Self {
        Self {
            expr,
            scope,
            forced: OnceLock::new(),
        }
    }

    pub fn cached(&self) -> Option<&Value> {
        self.forced.get()
    }

    pub(crate) fn store(&self, value: Value) {
        let _ = self.forced.set(value);
    }
}

impl Value {
    pub fn str(s: &str) -> Self {
        Value::Str(Arc::from(s))
    }

    pub fn set(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(items.into_iter().collect())
    }

    pub fn tuple(items: impl IntoIterator<Item = Value>) -> Self {
        Value::Tuple(items.into_iter().collect())
    }

    pub fn record<'a>(fields: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Value::Record(fields.into_iter().map(|(k, v)| (Arc::from(k), v)).collect())
    }

    pub fn func(pairs: impl IntoIterator<Item = (Value, Value)>) -> Self {
        Value::Func(pairs.into_iter().collect())
    }

    pub fn boolean_set() -> Self {
        Value::set([Value::Bool(false), Value::Bool(true)])
    }

    pub fn lazy(expr: Arc<Expr>, scope: Scope) -> Self {
        Value::Lazy(Arc::new(LazyValue::new(expr, scope)))
    }

    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Str(_) => "String",
            Value::Set(_) | Value::Interval(..) => "Set",
            Value::Func(_) => "Function",
            Value::Tuple(_) => "Tuple",
            Value::Record(_) => "Record",
            Value::Universe(_) => "Universe",
            Value::Operator(_) => "Operator",
            Value::Lazy(_) => "Lazy",
        }
    }

    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Set(s) => Some(s.len()),
            Value::Interval(lo, hi) => Some(interval_len(*lo, *hi)),
            Value::Func(f) => Some(f.len()),
            Value::Tuple(t) => Some(t.len()),
            Value::Record(r) => Some(r.len()),
            _ => None,
        }
    }

    /// Named children shown when an aggregate is expanded by a client.
    pub fn children(&self) -> Vec<(String, Value)> {
        match self {
            Value::Set(s) => s
                .iter()
                .enumerate()
                .map(|(i, v)| ((i + 1).to_string(), v.clone()))
                .collect(),
            Value::Interval(lo, hi) => (*lo..=*hi)
                .enumerate()
                .map(|(i, n)| ((i + 1).to_string(), Value::Int(n)))
                .collect(),
            Value::Func(f) => f.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            Value::Tuple(t) => t
                .iter()
                .enumerate()
                .map(|(i, v)| ((i + 1).to_string(), v.clone()))
                .collect(),
            Value::Record(r) => r.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
            _ => Vec::new(),
        }
    }

    /// Membership test for set-like values; `None` when `self` is not a set.
    pub fn has_member(&self, v: &Value) -> Option<bool> {
        match self {
            Value::Set(s) => Some(s.contains(v)),
            Value::Interval(lo, hi) => Some(matches!(v, Value::Int(n) if lo <= n && n <= hi)),
            Value::Universe(Universe::Nat) => Some(matches!(v, Value::Int(n) if *n >= 0)),
            Value::Universe(Universe::Int) => Some(matches!(v, Value::Int(_))),
            Value::Universe(Universe::Str) => Some(matches!(v, Value::Str(_))),
            _ => None,
        }
    }

    /// Decodes the JSON encoding used for constants and states in spec documents:
    /// scalars map directly, arrays are tuples, `{"set": [...]}` is a set,
    /// `{"fn": [[k, v], ...]}` is a function, any other object is a record.
    pub fn from_json(json: &serde_json::Value) -> Result<Value, String> {
        use serde_json::Value as Json;
        match json {
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => n
                .as_i64()
                .map(Value::Int)
                .ok_or_else(|| format!("{} is not an integer", n)),
            Json::String(s) => Ok(Value::str(s)),
            Json::Array(items) => items.iter().map(Value::from_json).collect::<Result<_, _>>().map(Value::Tuple),
            Json::Object(map) if map.len() == 1 && map.contains_key("set") => match &map["set"] {
                Json::Array(items) => items
                    .iter()
                    .map(Value::from_json)
                    .collect::<Result<BTreeSet<_>, _>>()
                    .map(Value::Set),
                other => Err(format!("`set` must be an array, found {}", other)),
            },
            Json::Object(map) if map.len() == 1 && map.contains_key("fn") => match &map["fn"] {
                Json::Array(pairs) => pairs
                    .iter()
                    .map(|pair| match pair {
                        Json::Array(kv) if kv.len() == 2 => {
                            Ok((Value::from_json(&kv[0])?, Value::from_json(&kv[1])?))
                        }
                        other => Err(format!("function entry must be [key, value], found {}", other)),
                    })
                    .collect::<Result<BTreeMap<_, _>, _>>()
                    .map(Value::Func),
                other => Err(format!("`fn` must be an array, found {}", other)),
            },
            Json::Object(map) => map
                .iter()
                .map(|(k, v)| Ok((Arc::from(k.as_str()), Value::from_json(v)?)))
                .collect::<Result<BTreeMap<_, _>, String>>()
                .map(Value::Record),
            Json::Null => Err("null is not a value".to_string()),
        }
    }

    /// The graph of a function-like value in ascending key order. Tuples are
    /// functions on `1..n` and records functions on their field names.
    fn graph(&self) -> Option<Box<dyn Iterator<Item = (Value, Value)> + '_>> {
        match self {
            Value::Tuple(items) => Some(Box::new(
                items
                    .iter()
                    .zip(1..)
                    .map(|(v, i)| (Value::Int(i), v.clone())),
            )),
            Value::Record(fields) => Some(Box::new(
                fields.iter().map(|(k, v)| (Value::Str(k.clone()), v.clone())),
            )),
            Value::Func(map) => Some(Box::new(map.iter().map(|(k, v)| (k.clone(), v.clone())))),
            _ => None,
        }
    }

    /// Elements of a finite set in ascending order.
    fn members(&self) -> Option<Box<dyn Iterator<Item = Value> + '_>> {
        match self {
            Value::Set(s) => Some(Box::new(s.iter().cloned())),
            Value::Interval(lo, hi) => Some(Box::new((*lo..=*hi).map(Value::Int))),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Int(_) => 1,
            Value::Str(_) => 2,
            Value::Tuple(_) | Value::Record(_) | Value::Func(_) => 3,
            Value::Set(_) | Value::Interval(..) => 4,
            Value::Universe(_) => 5,
            Value::Operator(_) => 6,
            Value::Lazy(_) => 7,
        }
    }
}

pub(crate) fn interval_len(lo: i64, hi: i64) -> usize {
    if hi < lo {
        0
    } else {
        usize::try_from(hi.abs_diff(lo)).map_or(usize::MAX, |d| d.saturating_add(1))
    }
}

/// Intervals compare like the sets they denote, without enumerating them.
fn cmp_intervals((a_lo, a_hi): (i64, i64), (b_lo, b_hi): (i64, i64)) -> Ordering {
    match (a_hi < a_lo, b_hi < b_lo) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a_lo.cmp(&b_lo).then(a_hi.cmp(&b_hi)),
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Tuple(a), Value::Tuple(b)) => a.cmp(b),
            (Value::Record(a), Value::Record(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Interval(a_lo, a_hi), Value::Interval(b_lo, b_hi)) => {
                cmp_intervals((*a_lo, *a_hi), (*b_lo, *b_hi))
            }
            (Value::Func(a), Value::Func(b)) => a.cmp(b),
            (Value::Universe(a), Value::Universe(b)) => a.cmp(b),
            // Identity order; these never take part in the program's own comparisons.
            (Value::Operator(a), Value::Operator(b)) => {
                (Arc::as_ptr(a) as usize).cmp(&(Arc::as_ptr(b) as usize))
            }
            (Value::Lazy(a), Value::Lazy(b)) => {
                (Arc::as_ptr(a) as usize).cmp(&(Arc::as_ptr(b) as usize))
            }
            _ if self.rank() != other.rank() => self.rank().cmp(&other.rank()),
            _ => {
                if let (Some(a), Some(b)) = (self.members(), other.members()) {
                    return Iterator::cmp(a, b);
                }
                match (self.graph(), other.graph()) {
                    (Some(a), Some(b)) => Iterator::cmp(a, b),
                    _ => Ordering::Equal,
                }
            }
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_tag(), self)
    }
}

impl fmt::Debug for LazyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyValue")
            .field("expr", &self.expr.to_string())
            .field("forced", &self.forced.get())
            .finish()
    }
}
