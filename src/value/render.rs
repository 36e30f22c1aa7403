use super::{Universe, Value};
use crate::syntax::Quoted;
use std::fmt::{self, Write};

/// Writes `value` in TLA+ syntax, emitting at most `budget` aggregate
/// elements overall. Elements past the budget collapse into `...`.
fn write_value(out: &mut dyn Write, value: &Value, budget: &mut usize) -> fmt::Result {
    match value {
        Value::Bool(b) => out.write_str(if *b { "TRUE" } else { "FALSE" }),
        Value::Int(n) => write!(out, "{}", n),
        Value::Str(s) => write!(out, "{}", Quoted(s)),
        Value::Set(items) => {
            out.write_str("{")?;
            write_items(out, items.iter(), ", ", budget, |out, v, budget| write_value(out, v, budget))?;
            out.write_str("}")
        }
        Value::Interval(lo, hi) => write!(out, "{}..{}", lo, hi),
        Value::Tuple(items) => write_tuple(out, items.iter(), budget),
        Value::Func(map) if is_sequence(map.keys()) => write_tuple(out, map.values(), budget),
        Value::Func(map) => {
            out.write_str("(")?;
            write_items(out, map.iter(), " @@ ", budget, |out, (k, v), budget| {
                write_value(out, k, budget)?;
                out.write_str(" :> ")?;
                write_value(out, v, budget)
            })?;
            out.write_str(")")
        }
        Value::Record(fields) => {
            out.write_str("[")?;
            write_items(out, fields.iter(), ", ", budget, |out, (k, v), budget| {
                write!(out, "{} |-> ", k)?;
                write_value(out, v, budget)
            })?;
            out.write_str("]")
        }
        Value::Universe(Universe::Nat) => out.write_str("Nat"),
        Value::Universe(Universe::Int) => out.write_str("Int"),
        Value::Universe(Universe::Str) => out.write_str("STRING"),
        Value::Operator(closure) => write!(out, "{}", closure.def),
        // Rendering never forces; the debugger forces under the guard before rendering.
        Value::Lazy(lazy) => match lazy.cached() {
            Some(v) => write_value(out, v, budget),
            None => write!(out, "LAZY {}", lazy.expr),
        },
    }
}

fn write_items<T, I, F>(out: &mut dyn Write, items: I, sep: &str, budget: &mut usize, mut item: F) -> fmt::Result
where
    I: Iterator<Item = T>,
    F: FnMut(&mut dyn Write, T, &mut usize) -> fmt::Result,
{
    for (i, next) in items.enumerate() {
        if i > 0 {
            out.write_str(sep)?;
        }
        if *budget == 0 {
            return out.write_str("...");
        }
        *budget -= 1;
        item(out, next, budget)?;
    }
    Ok(())
}

fn write_tuple<'a>(out: &mut dyn Write, items: impl Iterator<Item = &'a Value>, budget: &mut usize) -> fmt::Result {
    out.write_str("<<")?;
    write_items(out, items, ", ", budget, |out, v, budget| write_value(out, v, budget))?;
    out.write_str(">>")
}

/// Keys `1..n`: the function is a sequence and prints as one.
fn is_sequence<'a>(keys: impl Iterator<Item = &'a Value>) -> bool {
    keys.zip(1..).all(|(k, i)| matches!(k, Value::Int(n) if *n == i))
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, &mut usize::MAX)
    }
}

/// Inline rendering for a variables view: aggregates larger than `limit`
/// elements are summarized and left for on-demand expansion. Smaller ones are
/// written out with at most `limit` elements across all nesting levels.
pub fn summary(value: &Value, limit: usize) -> String {
    match value.len() {
        Some(n) if n > limit => format!("{}({})", value.type_tag(), n),
        _ => {
            let mut out = String::new();
            let mut budget = limit;
            // Writing into a String cannot fail.
            let _ = write_value(&mut out, value, &mut budget);
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_in_tla_syntax() {
        let token = Value::record([
            ("pos", Value::Int(0)),
            ("q", Value::Int(0)),
            ("color", Value::str("black")),
        ]);
        assert_eq!(token.to_string(), "[color |-> \"black\", pos |-> 0, q |-> 0]");
        let active = Value::func((0..3).map(|i| (Value::Int(i), Value::Bool(false))));
        assert_eq!(active.to_string(), "(0 :> FALSE @@ 1 :> FALSE @@ 2 :> FALSE)");
        assert_eq!(Value::tuple([Value::record([("type", Value::str("pl"))])]).to_string(), "<<[type |-> \"pl\"]>>");
        let seq = Value::func((1..=2).map(|i| (Value::Int(i), Value::Int(i * 10))));
        assert_eq!(seq.to_string(), "<<10, 20>>");
        assert_eq!(Value::Interval(1, 5).to_string(), "1..5");
    }

    #[test]
    fn test_strings_keep_unicode_and_escape_quotes() {
        assert_eq!(Value::str("café").to_string(), "\"café\"");
        assert_eq!(Value::str("say \"hi\"\\").to_string(), r#""say \"hi\"\\""#);
        assert_eq!(Value::str("a\nb").to_string(), "\"a\nb\"");
        assert_eq!(Value::str("→").to_string(), "\"→\"");
    }

    #[test]
    fn test_summary_elides_large_aggregates() {
        let big = Value::set((0..100).map(Value::Int));
        assert_eq!(summary(&big, 10), "Set(100)");
        let small = Value::set((0..3).map(Value::Int));
        assert_eq!(summary(&small, 10), "{0, 1, 2}");
        assert_eq!(summary(&Value::Int(7), 0), "7");
    }

    #[test]
    fn test_summary_bounds_nested_aggregates() {
        let wrapped = Value::record([("all", Value::set((0..100_000).map(Value::Int)))]);
        let shown = summary(&wrapped, 4);
        assert_eq!(shown, "[all |-> {0, 1, 2, ...}]");

        let nested = Value::tuple([Value::tuple((0..50).map(Value::Int)), Value::tuple([Value::Int(9)])]);
        assert_eq!(summary(&nested, 3), "<<<<0, 1, ...>>, ...>>");
    }
}
