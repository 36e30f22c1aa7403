use super::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Built-in operators written infix when rendered.
pub const INFIX_OPERATORS: &[&str] = &[
    "+", "-", "*", "\\div", "%", "<", "<=", ">", ">=", "=", "/=", "/\\", "\\/", "=>", "<=>",
    "\\in", "\\notin", "\\cup", "\\cap", "\\", "\\subseteq", "..", "\\o", ":>", "@@",
];

/// An annotated expression node as supplied by the parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub location: SourceLocation,
    #[serde(flatten)]
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExprKind {
    Bool {
        value: bool,
    },
    Int {
        value: i64,
    },
    Str {
        value: String,
    },
    Name {
        name: Arc<str>,
    },
    Primed {
        name: Arc<str>,
    },
    Apply {
        op: Arc<str>,
        #[serde(default)]
        args: Vec<Arc<Expr>>,
    },
    If {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Case {
        arms: Vec<CaseArm>,
        #[serde(default)]
        other: Option<Box<Expr>>,
    },
    Let {
        defs: Vec<Arc<OperatorDef>>,
        body: Box<Expr>,
    },
    Forall {
        bounds: Vec<Bound>,
        body: Box<Expr>,
    },
    Exists {
        bounds: Vec<Bound>,
        body: Box<Expr>,
    },
    Choose {
        bound: Box<Bound>,
        body: Box<Expr>,
    },
    SetEnum {
        #[serde(default)]
        elems: Vec<Expr>,
    },
    SetFilter {
        bound: Box<Bound>,
        pred: Box<Expr>,
    },
    SetMap {
        body: Box<Expr>,
        bounds: Vec<Bound>,
    },
    FuncDef {
        bounds: Vec<Bound>,
        body: Box<Expr>,
    },
    FuncApply {
        func: Box<Expr>,
        arg: Box<Expr>,
    },
    Tuple {
        #[serde(default)]
        elems: Vec<Expr>,
    },
    Record {
        fields: Vec<(Arc<str>, Expr)>,
    },
    Field {
        record: Box<Expr>,
        field: Arc<str>,
    },
    Except {
        func: Box<Expr>,
        updates: Vec<ExceptUpdate>,
    },
    Conj {
        items: Vec<Expr>,
    },
    Disj {
        items: Vec<Expr>,
    },
    Unchanged {
        vars: Vec<Arc<str>>,
    },
}

/// `x \in S` in a quantifier, CHOOSE, set or function constructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub name: Arc<str>,
    pub domain: Expr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseArm {
    pub guard: Expr,
    pub body: Expr,
}

/// `![key] = value`; `@` is bound to the previous value while `value` is evaluated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptUpdate {
    pub key: Expr,
    pub value: Expr,
}

/// `name(params) == body`, either module level or inside a LET.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorDef {
    pub name: Arc<str>,
    #[serde(default)]
    pub params: Vec<Arc<str>>,
    pub body: Arc<Expr>,
    pub location: SourceLocation,
}

impl Expr {
    pub fn new(location: SourceLocation, kind: ExprKind) -> Self {
        Self { location, kind }
    }

    /// Literals can be bound eagerly; everything else is passed to operators lazily.
    pub fn is_literal(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Bool { .. } | ExprKind::Int { .. } | ExprKind::Str { .. }
        )
    }

    /// Whether any of `names` occurs anywhere in the tree. Shadowing is not
    /// considered, so a rebound name still counts.
    pub fn mentions(&self, names: &[Arc<str>]) -> bool {
        let hit = |e: &Expr| e.mentions(names);
        match &self.kind {
            ExprKind::Bool { .. } | ExprKind::Int { .. } | ExprKind::Str { .. } | ExprKind::Unchanged { .. } => {
                false
            }
            ExprKind::Name { name } | ExprKind::Primed { name } => names.contains(name),
            ExprKind::Apply { op, args } => names.contains(op) || args.iter().any(|a| hit(a)),
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => hit(cond) || hit(then) || hit(otherwise),
            ExprKind::Case { arms, other } => {
                arms.iter().any(|arm| hit(&arm.guard) || hit(&arm.body)) || other.as_deref().is_some_and(hit)
            }
            ExprKind::Let { defs, body } => defs.iter().any(|d| hit(&d.body)) || hit(body),
            ExprKind::Forall { bounds, body }
            | ExprKind::Exists { bounds, body }
            | ExprKind::SetMap { bounds, body }
            | ExprKind::FuncDef { bounds, body } => bounds.iter().any(|b| hit(&b.domain)) || hit(body),
            ExprKind::Choose { bound, body } | ExprKind::SetFilter { bound, pred: body } => {
                hit(&bound.domain) || hit(body)
            }
            ExprKind::SetEnum { elems }
            | ExprKind::Tuple { elems }
            | ExprKind::Conj { items: elems }
            | ExprKind::Disj { items: elems } => elems.iter().any(hit),
            ExprKind::FuncApply { func, arg } => hit(func) || hit(arg),
            ExprKind::Record { fields } => fields.iter().any(|(_, e)| hit(e)),
            ExprKind::Field { record, .. } => hit(record),
            ExprKind::Except { func, updates } => {
                hit(func) || updates.iter().any(|u| hit(&u.key) || hit(&u.value))
            }
        }
    }

    fn is_infix(&self) -> bool {
        match &self.kind {
            ExprKind::Apply { op, args } => args.len() == 2 && INFIX_OPERATORS.contains(&&**op),
            ExprKind::Conj { .. } | ExprKind::Disj { .. } => true,
            _ => false,
        }
    }
}

/// A string literal in TLA+ form: only `"` and `\` are escaped.
pub(crate) struct Quoted<'a>(pub &'a str);

impl fmt::Display for Quoted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        for c in self.0.chars() {
            match c {
                '"' | '\\' => write!(f, "\\{}", c)?,
                c => write!(f, "{}", c)?,
            }
        }
        f.write_str("\"")
    }
}

struct Operand<'a>(&'a Expr);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_infix() {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \\in {}", self.name, self.domain)
    }
}

impl fmt::Display for OperatorDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.params.is_empty() {
            f.write_str("(")?;
            join(f, &self.params, ", ")?;
            f.write_str(")")?;
        }
        write!(f, " == {}", self.body)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Bool { value } => f.write_str(if *value { "TRUE" } else { "FALSE" }),
            ExprKind::Int { value } => write!(f, "{}", value),
            ExprKind::Str { value } => write!(f, "{}", Quoted(value)),
            ExprKind::Name { name } => f.write_str(name),
            ExprKind::Primed { name } => write!(f, "{}'", name),
            ExprKind::Apply { op, args } => {
                if args.len() == 2 && INFIX_OPERATORS.contains(&&**op) {
                    write!(f, "{} {} {}", Operand(&args[0]), op, Operand(&args[1]))
                } else if args.len() == 1 && &**op == "~" {
                    write!(f, "~{}", Operand(&args[0]))
                } else if args.len() == 1 && &**op == "neg" {
                    write!(f, "-{}", Operand(&args[0]))
                } else if args.is_empty() {
                    f.write_str(op)
                } else {
                    write!(f, "{}(", op)?;
                    let args: Vec<&Expr> = args.iter().map(|a| &**a).collect();
                    join(f, &args, ", ")?;
                    f.write_str(")")
                }
            }
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => write!(f, "IF {} THEN {} ELSE {}", cond, then, otherwise),
            ExprKind::Case { arms, other } => {
                f.write_str("CASE ")?;
                for (i, arm) in arms.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" [] ")?;
                    }
                    write!(f, "{} -> {}", arm.guard, arm.body)?;
                }
                if let Some(other) = other {
                    write!(f, " [] OTHER -> {}", other)?;
                }
                Ok(())
            }
            ExprKind::Let { defs, body } => {
                f.write_str("LET ")?;
                let defs: Vec<&OperatorDef> = defs.iter().map(|d| &**d).collect();
                join(f, &defs, " ")?;
                write!(f, " IN {}", body)
            }
            ExprKind::Forall { bounds, body } => {
                f.write_str("\\A ")?;
                join(f, bounds, ", ")?;
                write!(f, " : {}", body)
            }
            ExprKind::Exists { bounds, body } => {
                f.write_str("\\E ")?;
                join(f, bounds, ", ")?;
                write!(f, " : {}", body)
            }
            ExprKind::Choose { bound, body } => write!(f, "CHOOSE {} : {}", bound, body),
            ExprKind::SetEnum { elems } => {
                f.write_str("{")?;
                join(f, elems, ", ")?;
                f.write_str("}")
            }
            ExprKind::SetFilter { bound, pred } => write!(f, "{{{} : {}}}", bound, pred),
            ExprKind::SetMap { body, bounds } => {
                write!(f, "{{{} : ", body)?;
                join(f, bounds, ", ")?;
                f.write_str("}")
            }
            ExprKind::FuncDef { bounds, body } => {
                f.write_str("[")?;
                join(f, bounds, ", ")?;
                write!(f, " |-> {}]", body)
            }
            ExprKind::FuncApply { func, arg } => write!(f, "{}[{}]", Operand(func), arg),
            ExprKind::Tuple { elems } => {
                f.write_str("<<")?;
                join(f, elems, ", ")?;
                f.write_str(">>")
            }
            ExprKind::Record { fields } => {
                f.write_str("[")?;
                for (i, (name, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} |-> {}", name, value)?;
                }
                f.write_str("]")
            }
            ExprKind::Field { record, field } => write!(f, "{}.{}", Operand(record), field),
            ExprKind::Except { func, updates } => {
                write!(f, "[{} EXCEPT ", func)?;
                for (i, update) in updates.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "![{}] = {}", update.key, update.value)?;
                }
                f.write_str("]")
            }
            ExprKind::Conj { items } => {
                let items: Vec<Operand<'_>> = items.iter().map(Operand).collect();
                join(f, &items, " /\\ ")
            }
            ExprKind::Disj { items } => {
                let items: Vec<Operand<'_>> = items.iter().map(Operand).collect();
                join(f, &items, " \\/ ")
            }
            ExprKind::Unchanged { vars } => {
                f.write_str("UNCHANGED <<")?;
                join(f, vars, ", ")?;
                f.write_str(">>")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(kind: ExprKind) -> Expr {
        Expr::new(SourceLocation::new("M", (1, 1), (1, 10)), kind)
    }

    fn name(n: &str) -> Expr {
        at(ExprKind::Name { name: n.into() })
    }

    #[test]
    fn test_mentions_finds_names_in_nested_positions() {
        let names: Vec<Arc<str>> = vec![Arc::from("x")];
        let inner = at(ExprKind::Apply {
            op: "..".into(),
            args: vec![Arc::new(at(ExprKind::Int { value: 1 })), Arc::new(name("x"))],
        });
        let record = at(ExprKind::Record {
            fields: vec![("f".into(), at(ExprKind::SetEnum { elems: vec![inner] }))],
        });
        assert!(record.mentions(&names));
        assert!(!name("y").mentions(&names));
        assert!(!at(ExprKind::Unchanged { vars: vec!["x".into()] }).mentions(&names));
    }

    #[test]
    fn test_operator_definition_renders_like_source() {
        let def = OperatorDef {
            name: "sum".into(),
            params: vec!["a".into(), "b".into()],
            body: Arc::new(at(ExprKind::Apply {
                op: "+".into(),
                args: vec![Arc::new(name("a")), Arc::new(name("b"))],
            })),
            location: SourceLocation::new("M", (1, 1), (1, 16)),
        };
        assert_eq!(def.to_string(), "sum(a, b) == a + b");
    }

    #[test]
    fn test_nested_infix_operands_are_parenthesized() {
        let inner = at(ExprKind::Apply {
            op: "+".into(),
            args: vec![Arc::new(name("x")), Arc::new(name("y"))],
        });
        let outer = at(ExprKind::Apply {
            op: "*".into(),
            args: vec![Arc::new(inner), Arc::new(at(ExprKind::Int { value: 2 }))],
        });
        assert_eq!(outer.to_string(), "(x + y) * 2");
    }

    #[test]
    fn test_deserializes_tagged_json() {
        let json = r#"{
            "location": {"module": "M", "begin": {"line": 3, "column": 1}, "end": {"line": 3, "column": 7}},
            "kind": "apply", "op": "Len",
            "args": [{
                "location": {"module": "M", "begin": {"line": 3, "column": 5}, "end": {"line": 3, "column": 6}},
                "kind": "name", "name": "s"
            }]
        }"#;
        let expr: Expr = serde_json::from_str(json).unwrap();
        assert_eq!(expr.to_string(), "Len(s)");
        assert_eq!(expr.location.begin.line, 3);
    }
}
