//! Programmatic construction of annotated trees, for embedders that produce
//! specs without going through a JSON document.

use super::{Bound, CaseArm, ExceptUpdate, Expr, ExprKind, OperatorDef, SourceLocation};
use std::sync::Arc;

/// The whole of `line` in `module`.
pub fn line(module: &str, line: u32) -> SourceLocation {
    SourceLocation::new(module, (line, 1), (line, 80))
}

pub fn span(module: &str, begin: (u32, u32), end: (u32, u32)) -> SourceLocation {
    SourceLocation::new(module, begin, end)
}

fn node(at: &SourceLocation, kind: ExprKind) -> Expr {
    Expr::new(at.clone(), kind)
}

pub fn boolean(at: &SourceLocation, value: bool) -> Expr {
    node(at, ExprKind::Bool { value })
}

pub fn int(at: &SourceLocation, value: i64) -> Expr {
    node(at, ExprKind::Int { value })
}

pub fn string(at: &SourceLocation, value: &str) -> Expr {
    node(at, ExprKind::Str { value: value.to_string() })
}

pub fn name(at: &SourceLocation, name: &str) -> Expr {
    node(at, ExprKind::Name { name: Arc::from(name) })
}

pub fn primed(at: &SourceLocation, name: &str) -> Expr {
    node(at, ExprKind::Primed { name: Arc::from(name) })
}

pub fn apply(at: &SourceLocation, op: &str, args: Vec<Expr>) -> Expr {
    node(
        at,
        ExprKind::Apply {
            op: Arc::from(op),
            args: args.into_iter().map(Arc::new).collect(),
        },
    )
}

pub fn if_then_else(at: &SourceLocation, cond: Expr, then: Expr, otherwise: Expr) -> Expr {
    node(
        at,
        ExprKind::If {
            cond: Box::new(cond),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        },
    )
}

pub fn case(at: &SourceLocation, arms: Vec<(Expr, Expr)>, other: Option<Expr>) -> Expr {
    node(
        at,
        ExprKind::Case {
            arms: arms
                .into_iter()
                .map(|(guard, body)| CaseArm { guard, body })
                .collect(),
            other: other.map(Box::new),
        },
    )
}

pub fn def(at: &SourceLocation, name: &str, params: &[&str], body: Expr) -> OperatorDef {
    OperatorDef {
        name: Arc::from(name),
        params: params.iter().map(|p| Arc::from(*p)).collect(),
        body: Arc::new(body),
        location: at.clone(),
    }
}

pub fn let_in(at: &SourceLocation, defs: Vec<OperatorDef>, body: Expr) -> Expr {
    node(
        at,
        ExprKind::Let {
            defs: defs.into_iter().map(Arc::new).collect(),
            body: Box::new(body),
        },
    )
}

fn bounds(pairs: Vec<(&str, Expr)>) -> Vec<Bound> {
    pairs
        .into_iter()
        .map(|(name, domain)| Bound {
            name: Arc::from(name),
            domain,
        })
        .collect()
}

pub fn forall(at: &SourceLocation, vars: Vec<(&str, Expr)>, body: Expr) -> Expr {
    node(
        at,
        ExprKind::Forall {
            bounds: bounds(vars),
            body: Box::new(body),
        },
    )
}

pub fn exists(at: &SourceLocation, vars: Vec<(&str, Expr)>, body: Expr) -> Expr {
    node(
        at,
        ExprKind::Exists {
            bounds: bounds(vars),
            body: Box::new(body),
        },
    )
}

pub fn choose(at: &SourceLocation, var: &str, domain: Expr, body: Expr) -> Expr {
    node(
        at,
        ExprKind::Choose {
            bound: Box::new(Bound {
                name: Arc::from(var),
                domain,
            }),
            body: Box::new(body),
        },
    )
}

pub fn set(at: &SourceLocation, elems: Vec<Expr>) -> Expr {
    node(at, ExprKind::SetEnum { elems })
}

pub fn set_filter(at: &SourceLocation, var: &str, domain: Expr, pred: Expr) -> Expr {
    node(
        at,
        ExprKind::SetFilter {
            bound: Box::new(Bound {
                name: Arc::from(var),
                domain,
            }),
            pred: Box::new(pred),
        },
    )
}

pub fn set_map(at: &SourceLocation, body: Expr, vars: Vec<(&str, Expr)>) -> Expr {
    node(
        at,
        ExprKind::SetMap {
            body: Box::new(body),
            bounds: bounds(vars),
        },
    )
}

pub fn func_def(at: &SourceLocation, vars: Vec<(&str, Expr)>, body: Expr) -> Expr {
    node(
        at,
        ExprKind::FuncDef {
            bounds: bounds(vars),
            body: Box::new(body),
        },
    )
}

pub fn func_apply(at: &SourceLocation, func: Expr, arg: Expr) -> Expr {
    node(
        at,
        ExprKind::FuncApply {
            func: Box::new(func),
            arg: Box::new(arg),
        },
    )
}

pub fn tuple(at: &SourceLocation, elems: Vec<Expr>) -> Expr {
    node(at, ExprKind::Tuple { elems })
}

pub fn record(at: &SourceLocation, fields: Vec<(&str, Expr)>) -> Expr {
    node(
        at,
        ExprKind::Record {
            fields: fields.into_iter().map(|(k, v)| (Arc::from(k), v)).collect(),
        },
    )
}

pub fn field(at: &SourceLocation, record: Expr, field: &str) -> Expr {
    node(
        at,
        ExprKind::Field {
            record: Box::new(record),
            field: Arc::from(field),
        },
    )
}

pub fn except(at: &SourceLocation, func: Expr, updates: Vec<(Expr, Expr)>) -> Expr {
    node(
        at,
        ExprKind::Except {
            func: Box::new(func),
            updates: updates
                .into_iter()
                .map(|(key, value)| ExceptUpdate { key, value })
                .collect(),
        },
    )
}

pub fn conj(at: &SourceLocation, items: Vec<Expr>) -> Expr {
    node(at, ExprKind::Conj { items })
}

pub fn disj(at: &SourceLocation, items: Vec<Expr>) -> Expr {
    node(at, ExprKind::Disj { items })
}

pub fn unchanged(at: &SourceLocation, vars: &[&str]) -> Expr {
    node(
        at,
        ExprKind::Unchanged {
            vars: vars.iter().map(|v| Arc::from(*v)).collect(),
        },
    )
}
