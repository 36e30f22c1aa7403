//! Strict built-in operators. Short-circuiting connectives (`/\`, `\/`, `=>`)
//! are handled by the evaluator since they must not evaluate every operand.

use crate::error::{EvalError, EvalResult};
use crate::syntax::SourceLocation;
use crate::value::{interval_len, Value};
use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub(crate) const SHORT_CIRCUIT: &[&str] = &["/\\", "\\/", "=>"];

pub(crate) fn arity(op: &str) -> Option<usize> {
    match op {
        "+" | "-" | "*" | "\\div" | "%" | "<" | "<=" | ">" | ">=" | "=" | "/=" | "<=>" | "\\in"
        | "\\notin" | "\\cup" | "\\cap" | "\\" | "\\subseteq" | ".." | "\\o" | ":>" | "@@"
        | "Append" | "/\\" | "\\/" | "=>" => Some(2),
        "~" | "neg" | "SUBSET" | "UNION" | "Cardinality" | "DOMAIN" | "Len" | "Head" | "Tail" => {
            Some(1)
        }
        "SubSeq" => Some(3),
        _ => None,
    }
}

/// Names that resolve to values when nothing else binds them.
pub(crate) fn constant(name: &str) -> Option<Value> {
    use crate::value::Universe;
    match name {
        "Nat" => Some(Value::Universe(Universe::Nat)),
        "Int" => Some(Value::Universe(Universe::Int)),
        "STRING" => Some(Value::Universe(Universe::Str)),
        "BOOLEAN" => Some(Value::boolean_set()),
        _ => None,
    }
}

pub(crate) fn int(v: &Value, loc: &SourceLocation) -> EvalResult<i64> {
    match v {
        Value::Int(n) => Ok(*n),
        other => Err(EvalError::mismatch("an integer", other, loc)),
    }
}

pub(crate) fn boolean(v: &Value, loc: &SourceLocation) -> EvalResult<bool> {
    match v {
        Value::Bool(b) => Ok(*b),
        other => Err(EvalError::mismatch("a boolean", other, loc)),
    }
}

fn finite_set<'v>(v: &'v Value, loc: &SourceLocation) -> EvalResult<Cow<'v, BTreeSet<Value>>> {
    match v {
        Value::Set(s) => Ok(Cow::Borrowed(s)),
        Value::Interval(lo, hi) => Ok(Cow::Owned((*lo..=*hi).map(Value::Int).collect())),
        other => Err(not_enumerable(other, loc)),
    }
}

/// Streams the elements of a finite set in value order without building it.
pub(crate) fn elements<'v>(
    v: &'v Value,
    loc: &SourceLocation,
) -> EvalResult<Box<dyn Iterator<Item = Value> + 'v>> {
    match v {
        Value::Set(s) => Ok(Box::new(s.iter().cloned())),
        Value::Interval(lo, hi) => Ok(Box::new((*lo..=*hi).map(Value::Int))),
        other => Err(not_enumerable(other, loc)),
    }
}

fn not_enumerable(v: &Value, loc: &SourceLocation) -> EvalError {
    match v {
        Value::Universe(_) => EvalError::NonEnumerableDomain {
            domain: v.to_string(),
            location: loc.clone(),
        },
        other => EvalError::mismatch("a set", other, loc),
    }
}

/// The graph of a function, tuple or record.
fn function(v: &Value, loc: &SourceLocation) -> EvalResult<BTreeMap<Value, Value>> {
    match v {
        Value::Func(map) => Ok(map.clone()),
        Value::Tuple(items) => Ok((1..).map(Value::Int).zip(items.iter().cloned()).collect()),
        Value::Record(fields) => Ok(fields.iter().map(|(k, v)| (Value::Str(k.clone()), v.clone())).collect()),
        other => Err(EvalError::mismatch("a function", other, loc)),
    }
}

/// Sequences are tuples, or functions whose domain is `1..n`.
pub(crate) fn sequence(v: &Value, loc: &SourceLocation) -> EvalResult<Vec<Value>> {
    match v {
        Value::Tuple(items) => Ok(items.clone()),
        Value::Func(map) => {
            let dense = map
                .keys()
                .enumerate()
                .all(|(i, k)| *k == Value::Int(i as i64 + 1));
            if dense {
                Ok(map.values().cloned().collect())
            } else {
                Err(EvalError::mismatch("a sequence", v, loc))
            }
        }
        other => Err(EvalError::mismatch("a sequence", other, loc)),
    }
}

fn checked(result: Option<i64>, loc: &SourceLocation) -> EvalResult<Value> {
    result
        .map(Value::Int)
        .ok_or_else(|| EvalError::mismatch("an integer within 64 bits", "an overflowing result", loc))
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

const MAX_SUBSET_BASE: usize = 20;

fn power_set(s: &Value, loc: &SourceLocation) -> EvalResult<BTreeSet<Value>> {
    if let Some(n) = s.len().filter(|n| *n > MAX_SUBSET_BASE) {
        return Err(EvalError::NonEnumerableDomain {
            domain: format!("SUBSET of a {}-element set", n),
            location: loc.clone(),
        });
    }
    let items: Vec<Value> = elements(s, loc)?.collect();
    let mut subsets = BTreeSet::new();
    for mask in 0u64..(1u64 << items.len()) {
        let subset = items
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, v)| v.clone())
            .collect();
        subsets.insert(Value::Set(subset));
    }
    Ok(subsets)
}

pub(crate) fn apply(op: &str, args: &[Value], loc: &SourceLocation) -> EvalResult<Value> {
    let expected = arity(op).ok_or_else(|| EvalError::undefined(op, loc))?;
    if args.len() != expected {
        return Err(EvalError::ArityMismatch {
            op: Arc::from(op),
            expected,
            got: args.len(),
            location: loc.clone(),
        });
    }

    match op {
        "+" => checked(int(&args[0], loc)?.checked_add(int(&args[1], loc)?), loc),
        "-" => checked(int(&args[0], loc)?.checked_sub(int(&args[1], loc)?), loc),
        "*" => checked(int(&args[0], loc)?.checked_mul(int(&args[1], loc)?), loc),
        "neg" => checked(int(&args[0], loc)?.checked_neg(), loc),
        "\\div" | "%" => {
            let (a, b) = (int(&args[0], loc)?, int(&args[1], loc)?);
            if b == 0 {
                return Err(EvalError::DivisionByZero {
                    location: loc.clone(),
                });
            }
            if op == "%" {
                Ok(Value::Int(a.rem_euclid(b)))
            } else {
                Ok(Value::Int(floor_div(a, b)))
            }
        }
        "<" => Ok(Value::Bool(int(&args[0], loc)? < int(&args[1], loc)?)),
        "<=" => Ok(Value::Bool(int(&args[0], loc)? <= int(&args[1], loc)?)),
        ">" => Ok(Value::Bool(int(&args[0], loc)? > int(&args[1], loc)?)),
        ">=" => Ok(Value::Bool(int(&args[0], loc)? >= int(&args[1], loc)?)),
        "=" => Ok(Value::Bool(args[0] == args[1])),
        "/=" => Ok(Value::Bool(args[0] != args[1])),
        "~" => Ok(Value::Bool(!boolean(&args[0], loc)?)),
        "<=>" => Ok(Value::Bool(boolean(&args[0], loc)? == boolean(&args[1], loc)?)),
        "\\in" | "\\notin" => {
            let member = args[1]
                .has_member(&args[0])
                .ok_or_else(|| EvalError::mismatch("a set", &args[1], loc))?;
            Ok(Value::Bool(if op == "\\in" { member } else { !member }))
        }
        "\\cup" => {
            let (a, b) = (finite_set(&args[0], loc)?, finite_set(&args[1], loc)?);
            Ok(Value::Set(a.union(&b).cloned().collect()))
        }
        "\\cap" => {
            let b = &args[1];
            let mut out = BTreeSet::new();
            for v in elements(&args[0], loc)? {
                if b.has_member(&v).ok_or_else(|| EvalError::mismatch("a set", b, loc))? {
                    out.insert(v);
                }
            }
            Ok(Value::Set(out))
        }
        "\\" => {
            let b = &args[1];
            let mut out = BTreeSet::new();
            for v in elements(&args[0], loc)? {
                if !b.has_member(&v).ok_or_else(|| EvalError::mismatch("a set", b, loc))? {
                    out.insert(v);
                }
            }
            Ok(Value::Set(out))
        }
        "\\subseteq" => {
            let b = &args[1];
            for v in elements(&args[0], loc)? {
                if !b.has_member(&v).ok_or_else(|| EvalError::mismatch("a set", b, loc))? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        ".." => {
            let (lo, hi) = (int(&args[0], loc)?, int(&args[1], loc)?);
            Ok(Value::Interval(lo, hi))
        }
        "SUBSET" => Ok(Value::Set(power_set(&args[0], loc)?)),
        "UNION" => {
            let mut out = BTreeSet::new();
            for inner in elements(&args[0], loc)? {
                out.extend(elements(&inner, loc)?);
            }
            Ok(Value::Set(out))
        }
        "Cardinality" => match &args[0] {
            Value::Interval(lo, hi) => checked(i64::try_from(interval_len(*lo, *hi)).ok(), loc),
            other => Ok(Value::Int(finite_set(other, loc)?.len() as i64)),
        },
        "DOMAIN" => match &args[0] {
            Value::Func(map) => Ok(Value::Set(map.keys().cloned().collect())),
            Value::Tuple(items) => Ok(Value::Interval(1, items.len() as i64)),
            Value::Record(fields) => Ok(Value::Set(fields.keys().map(|k| Value::Str(k.clone())).collect())),
            other => Err(EvalError::mismatch("a function", other, loc)),
        },
        "Len" => Ok(Value::Int(sequence(&args[0], loc)?.len() as i64)),
        "Head" => sequence(&args[0], loc)?
            .into_iter()
            .next()
            .ok_or_else(|| EvalError::mismatch("a non-empty sequence", "<<>>", loc)),
        "Tail" => {
            let items = sequence(&args[0], loc)?;
            if items.is_empty() {
                return Err(EvalError::mismatch("a non-empty sequence", "<<>>", loc));
            }
            Ok(Value::Tuple(items[1..].to_vec()))
        }
        "Append" => {
            let mut items = sequence(&args[0], loc)?;
            items.push(args[1].clone());
            Ok(Value::Tuple(items))
        }
        "\\o" => {
            let mut items = sequence(&args[0], loc)?;
            items.extend(sequence(&args[1], loc)?);
            Ok(Value::Tuple(items))
        }
        "SubSeq" => {
            let items = sequence(&args[0], loc)?;
            let (m, n) = (int(&args[1], loc)?, int(&args[2], loc)?);
            if m > n {
                return Ok(Value::Tuple(Vec::new()));
            }
            if m < 1 || n as usize > items.len() {
                return Err(EvalError::FunctionDomain {
                    arg: format!("{}..{}", m, n),
                    location: loc.clone(),
                });
            }
            Ok(Value::Tuple(items[(m - 1) as usize..n as usize].to_vec()))
        }
        ":>" => Ok(Value::Func(BTreeMap::from([(args[0].clone(), args[1].clone())]))),
        "@@" => {
            let (left, mut merged) = (function(&args[0], loc)?, function(&args[1], loc)?);
            merged.extend(left);
            Ok(Value::Func(merged))
        }
        _ => Err(EvalError::undefined(op, loc)),
    }
}
