use super::builtins;
use super::hook::{FrameHook, FrameKind, FramePush, PushedFrame};
use super::{Context, Scope, StateLevel};
use crate::config::DEFAULT_MAX_CALL_DEPTH;
use crate::error::{EvalError, EvalResult};
use crate::spec::Spec;
use crate::syntax::{Bound, Expr, ExprKind, OperatorDef, SourceLocation};
use crate::value::{Closure, Value};
use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::sync::Arc;

const LABEL_WIDTH: usize = 60;

thread_local! {
    /// Operator calls currently active on this thread.
    static CALL_DEPTH: Cell<usize> = const { Cell::new(0) };
}

/// Holds one level of [`CALL_DEPTH`] until dropped.
struct CallDepth;

impl CallDepth {
    fn enter(op: &str, limit: usize, location: &SourceLocation) -> EvalResult<Self> {
        CALL_DEPTH.with(|depth| {
            if depth.get() >= limit {
                return Err(EvalError::RecursionLimit {
                    op: Arc::from(op),
                    limit,
                    location: location.clone(),
                });
            }
            depth.set(depth.get() + 1);
            Ok(CallDepth)
        })
    }
}

impl Drop for CallDepth {
    fn drop(&mut self) {
        CALL_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// A bound's domain within one quantifier. Domains that mention no earlier
/// bound name are evaluated on first use and then reused.
enum Domain {
    PerBinding,
    Shared(Option<Rc<Value>>),
}

/// Who is driving an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Guard {
    /// The checker's own evaluation. Steppable constructs announce frames and
    /// forced lazy values are cached.
    Traced,
    /// Evaluation on behalf of the debugger itself, e.g. rendering a variable.
    /// Nothing is announced and nothing is cached.
    Suppressed,
}

/// Tree-walking evaluator. Frames are reported to the hook before recursing
/// into each steppable construct and popped when the construct finishes.
pub struct Evaluator {
    spec: Arc<Spec>,
    hook: Arc<dyn FrameHook>,
    max_call_depth: usize,
}

impl Evaluator {
    pub fn new(spec: Arc<Spec>, hook: Arc<dyn FrameHook>) -> Self {
        Self {
            spec,
            hook,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Nested operator calls beyond `limit` fail with a recursion error.
    pub fn with_max_call_depth(mut self, limit: usize) -> Self {
        self.max_call_depth = limit;
        self
    }

    pub fn spec(&self) -> &Arc<Spec> {
        &self.spec
    }

    pub fn evaluate(&self, expr: &Expr, context: &Context, level: StateLevel) -> EvalResult<Value> {
        let scope = Scope::new(context.clone(), level);
        self.eval(expr, &scope, Guard::Traced)
    }

    /// Evaluates a zero-arity module operator inside a frame at its definition.
    pub fn evaluate_operator(&self, name: &str, level: StateLevel) -> EvalResult<Value> {
        let def = self
            .spec
            .operator(name)
            .cloned()
            .ok_or_else(|| EvalError::undefined(name, &SourceLocation::unknown()))?;
        if !def.params.is_empty() {
            return Err(EvalError::ArityMismatch {
                op: def.name.clone(),
                expected: def.params.len(),
                got: 0,
                location: def.location.clone(),
            });
        }
        let scope = Scope::new(Context::empty(), level);
        let _frame = self.enter(&def.location, def.name.to_string(), &scope, Guard::Traced)?;
        self.eval(&def.body, &scope, Guard::Traced)
    }

    /// Produces a displayable value for the debugger. Runs with frames
    /// suppressed and leaves lazy caches untouched, so inspecting a variable
    /// never alters the frames the evaluation will later announce.
    pub fn force_for_display(&self, value: &Value) -> EvalResult<Value> {
        self.force(value, Guard::Suppressed)
    }

    fn enter(
        &self,
        location: &SourceLocation,
        name: String,
        scope: &Scope,
        guard: Guard,
    ) -> EvalResult<Option<PushedFrame<'_>>> {
        if guard == Guard::Suppressed {
            return Ok(None);
        }
        self.hook.push(FramePush {
            location: location.clone(),
            kind: FrameKind::for_level(&scope.level),
            name,
            scope: scope.clone(),
        })?;
        Ok(Some(PushedFrame::new(&*self.hook)))
    }

    fn force(&self, value: &Value, guard: Guard) -> EvalResult<Value> {
        match value {
            Value::Lazy(lazy) => {
                if let Some(cached) = lazy.cached() {
                    return Ok(cached.clone());
                }
                let forced = self.eval(&lazy.expr, &lazy.scope, guard)?;
                if guard == Guard::Traced {
                    lazy.store(forced.clone());
                }
                Ok(forced)
            }
            other => Ok(other.clone()),
        }
    }

    fn eval(&self, expr: &Expr, scope: &Scope, guard: Guard) -> EvalResult<Value> {
        let loc = &expr.location;
        match &expr.kind {
            ExprKind::Bool { value } => Ok(Value::Bool(*value)),
            ExprKind::Int { value } => Ok(Value::Int(*value)),
            ExprKind::Str { value } => Ok(Value::str(value)),
            ExprKind::Name { name } => self.lookup(name, loc, scope, guard),
            ExprKind::Primed { name } => scope
                .level
                .next()
                .and_then(|next| next.get(name))
                .cloned()
                .ok_or_else(|| EvalError::undefined(&format!("{}'", name), loc)),
            ExprKind::Apply { op, args } => self.apply(op, args, expr, scope, guard),
            ExprKind::If {
                cond,
                then,
                otherwise,
            } => {
                if builtins::boolean(&self.eval(cond, scope, guard)?, &cond.location)? {
                    self.eval(then, scope, guard)
                } else {
                    self.eval(otherwise, scope, guard)
                }
            }
            ExprKind::Case { arms, other } => {
                for arm in arms {
                    if builtins::boolean(&self.eval(&arm.guard, scope, guard)?, &arm.guard.location)? {
                        return self.eval(&arm.body, scope, guard);
                    }
                }
                match other {
                    Some(other) => self.eval(other, scope, guard),
                    None => Err(EvalError::mismatch("a CASE arm with a TRUE guard", "none", loc)),
                }
            }
            ExprKind::Let { defs, body } => {
                let mut inner = scope.clone();
                for def in defs {
                    let bound = if def.params.is_empty() {
                        Value::lazy(Arc::clone(&def.body), inner.clone())
                    } else {
                        Value::Operator(Arc::new(Closure {
                            def: Arc::clone(def),
                            context: inner.context.clone(),
                        }))
                    };
                    inner = inner.bind(def.name.clone(), bound);
                }
                let _frame = self.enter(loc, "LET".to_string(), &inner, guard)?;
                self.eval(body, &inner, guard)
            }
            ExprKind::Forall { bounds, body } => {
                let label = quantifier_label("\\A", bounds);
                let mut holds = true;
                self.for_each_binding(
                    bounds,
                    scope,
                    guard,
                    &mut |inner: &Scope, _: &[Value]| -> EvalResult<bool> {
                        let _frame = self.enter(&body.location, label.clone(), inner, guard)?;
                        holds = builtins::boolean(&self.eval(body, inner, guard)?, &body.location)?;
                        Ok(holds)
                    },
                )?;
                Ok(Value::Bool(holds))
            }
            ExprKind::Exists { bounds, body } => {
                let label = quantifier_label("\\E", bounds);
                let mut witnessed = false;
                self.for_each_binding(
                    bounds,
                    scope,
                    guard,
                    &mut |inner: &Scope, _: &[Value]| -> EvalResult<bool> {
                        let _frame = self.enter(&body.location, label.clone(), inner, guard)?;
                        witnessed = builtins::boolean(&self.eval(body, inner, guard)?, &body.location)?;
                        Ok(!witnessed)
                    },
                )?;
                Ok(Value::Bool(witnessed))
            }
            ExprKind::Choose { bound, body } => {
                let label = format!("CHOOSE {}", bound);
                let mut chosen = None;
                self.for_each_binding(
                    std::slice::from_ref(&**bound),
                    scope,
                    guard,
                    &mut |inner: &Scope, values: &[Value]| -> EvalResult<bool> {
                        let _frame = self.enter(&body.location, label.clone(), inner, guard)?;
                        if builtins::boolean(&self.eval(body, inner, guard)?, &body.location)? {
                            chosen = values.first().cloned();
                            return Ok(false);
                        }
                        Ok(true)
                    },
                )?;
                chosen.ok_or_else(|| EvalError::ChooseFailed { location: loc.clone() })
            }
            ExprKind::SetEnum { elems } => elems
                .iter()
                .map(|e| self.eval(e, scope, guard))
                .collect::<EvalResult<BTreeSet<_>>>()
                .map(Value::Set),
            ExprKind::SetFilter { bound, pred } => {
                let mut kept = BTreeSet::new();
                self.for_each_binding(
                    std::slice::from_ref(&**bound),
                    scope,
                    guard,
                    &mut |inner: &Scope, values: &[Value]| -> EvalResult<bool> {
                        if builtins::boolean(&self.eval(pred, inner, guard)?, &pred.location)? {
                            kept.extend(values.first().cloned());
                        }
                        Ok(true)
                    },
                )?;
                Ok(Value::Set(kept))
            }
            ExprKind::SetMap { body, bounds } => {
                let mut image = BTreeSet::new();
                self.for_each_binding(
                    bounds,
                    scope,
                    guard,
                    &mut |inner: &Scope, _: &[Value]| -> EvalResult<bool> {
                        image.insert(self.eval(body, inner, guard)?);
                        Ok(true)
                    },
                )?;
                Ok(Value::Set(image))
            }
            ExprKind::FuncDef { bounds, body } => {
                let mut graph = BTreeMap::new();
                self.for_each_binding(
                    bounds,
                    scope,
                    guard,
                    &mut |inner: &Scope, values: &[Value]| -> EvalResult<bool> {
                        let key = match values {
                            [single] => single.clone(),
                            many => Value::Tuple(many.to_vec()),
                        };
                        graph.insert(key, self.eval(body, inner, guard)?);
                        Ok(true)
                    },
                )?;
                Ok(Value::Func(graph))
            }
            ExprKind::FuncApply { func, arg } => {
                let _frame = self.enter(loc, label(expr), scope, guard)?;
                let f = self.eval(func, scope, guard)?;
                let a = self.eval(arg, scope, guard)?;
                apply_function(&f, &a, loc)
            }
            ExprKind::Tuple { elems } => elems
                .iter()
                .map(|e| self.eval(e, scope, guard))
                .collect::<EvalResult<Vec<_>>>()
                .map(Value::Tuple),
            ExprKind::Record { fields } => fields
                .iter()
                .map(|(k, e)| Ok((k.clone(), self.eval(e, scope, guard)?)))
                .collect::<EvalResult<BTreeMap<_, _>>>()
                .map(Value::Record),
            ExprKind::Field { record, field } => match self.eval(record, scope, guard)? {
                Value::Record(fields) => fields.get(field).cloned().ok_or_else(|| EvalError::FunctionDomain {
                    arg: field.to_string(),
                    location: loc.clone(),
                }),
                other => Err(EvalError::mismatch("a record", other.type_tag(), loc)),
            },
            ExprKind::Except { func, updates } => {
                let mut updated = self.eval(func, scope, guard)?;
                for update in updates {
                    let key = self.eval(&update.key, scope, guard)?;
                    let Some(old) = entry(&updated, &key) else {
                        continue;
                    };
                    let value = self.eval(&update.value, &scope.bind("@", old), guard)?;
                    set_entry(&mut updated, key, value, loc)?;
                }
                Ok(updated)
            }
            ExprKind::Conj { items } => {
                for item in items {
                    let _frame = self.enter(&item.location, label(item), scope, guard)?;
                    if !builtins::boolean(&self.eval(item, scope, guard)?, &item.location)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            ExprKind::Disj { items } => {
                for item in items {
                    let _frame = self.enter(&item.location, label(item), scope, guard)?;
                    if builtins::boolean(&self.eval(item, scope, guard)?, &item.location)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            ExprKind::Unchanged { vars } => {
                let (Some(current), Some(next)) = (scope.level.current(), scope.level.next()) else {
                    return Err(EvalError::undefined("UNCHANGED", loc));
                };
                for var in vars {
                    let before = current.get(var).ok_or_else(|| EvalError::undefined(var, loc))?;
                    let after = next
                        .get(var)
                        .ok_or_else(|| EvalError::undefined(&format!("{}'", var), loc))?;
                    if before != after {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
        }
    }

    /// Name resolution: local bindings, then state variables, then constants,
    /// then module operators, then built-in constants.
    fn lookup(&self, name: &str, loc: &SourceLocation, scope: &Scope, guard: Guard) -> EvalResult<Value> {
        if let Some(bound) = scope.context.lookup(name) {
            return self.force(bound, guard);
        }
        if let Some(value) = scope.level.current().and_then(|state| state.get(name)) {
            return Ok(value.clone());
        }
        if let Some(value) = self.spec.constant(name) {
            return Ok(value.clone());
        }
        if let Some(def) = self.spec.operator(name) {
            if def.params.is_empty() {
                let _depth = CallDepth::enter(name, self.max_call_depth, loc)?;
                let body_scope = scope.with_context(Context::empty());
                let _frame = self.enter(loc, name.to_string(), &body_scope, guard)?;
                return self.eval(&def.body, &body_scope, guard);
            }
            return Ok(Value::Operator(Arc::new(Closure {
                def: Arc::clone(def),
                context: Context::empty(),
            })));
        }
        if let Some(value) = builtins::constant(name) {
            return Ok(value);
        }
        Err(EvalError::undefined(name, loc))
    }

    fn apply(
        &self,
        op: &Arc<str>,
        args: &[Arc<Expr>],
        call: &Expr,
        scope: &Scope,
        guard: Guard,
    ) -> EvalResult<Value> {
        let loc = &call.location;

        if let Some(bound) = scope.context.lookup(op) {
            return match self.force(bound, guard)? {
                Value::Operator(closure) => {
                    self.call(&closure.def, &closure.context, args, call, scope, guard)
                }
                other => Err(EvalError::mismatch("an operator", other.type_tag(), loc)),
            };
        }

        if let Some(def) = self.spec.operator(op) {
            return self.call(def, &Context::empty(), args, call, scope, guard);
        }

        let Some(expected) = builtins::arity(op) else {
            return Err(EvalError::undefined(op, loc));
        };
        let _frame = self.enter(loc, op.to_string(), scope, guard)?;
        if args.len() != expected {
            return Err(EvalError::ArityMismatch {
                op: op.clone(),
                expected,
                got: args.len(),
                location: loc.clone(),
            });
        }

        if builtins::SHORT_CIRCUIT.contains(&&**op) {
            let lhs = builtins::boolean(&self.eval(&args[0], scope, guard)?, &args[0].location)?;
            let decided = match &**op {
                "/\\" if !lhs => Some(false),
                "\\/" if lhs => Some(true),
                "=>" if !lhs => Some(true),
                _ => None,
            };
            if let Some(result) = decided {
                return Ok(Value::Bool(result));
            }
            let rhs = builtins::boolean(&self.eval(&args[1], scope, guard)?, &args[1].location)?;
            return Ok(Value::Bool(rhs));
        }

        let values = args
            .iter()
            .map(|a| self.eval(a, scope, guard))
            .collect::<EvalResult<Vec<_>>>()?;
        builtins::apply(op, &values, loc)
    }

    /// Applies a user operator. Literal arguments are bound eagerly; all
    /// others are bound as lazy values over the caller's scope.
    fn call(
        &self,
        def: &Arc<OperatorDef>,
        closure: &Context,
        args: &[Arc<Expr>],
        call: &Expr,
        scope: &Scope,
        guard: Guard,
    ) -> EvalResult<Value> {
        if def.params.len() != args.len() {
            return Err(EvalError::ArityMismatch {
                op: def.name.clone(),
                expected: def.params.len(),
                got: args.len(),
                location: call.location.clone(),
            });
        }

        let _depth = CallDepth::enter(&def.name, self.max_call_depth, &call.location)?;
        let mut context = closure.clone();
        for (param, arg) in def.params.iter().zip(args) {
            let value = if arg.is_literal() {
                self.eval(arg, scope, guard)?
            } else {
                Value::lazy(Arc::clone(arg), scope.clone())
            };
            context = context.cons(param.clone(), value);
        }

        let body_scope = scope.with_context(context);
        let _frame = self.enter(&call.location, def.name.to_string(), &body_scope, guard)?;
        self.eval(&def.body, &body_scope, guard)
    }

    /// Runs `f` for every combination of bound values, first bound outermost,
    /// each domain in ascending value order. `f` returns `false` to stop.
    fn for_each_binding(
        &self,
        bounds: &[Bound],
        scope: &Scope,
        guard: Guard,
        f: &mut dyn FnMut(&Scope, &[Value]) -> EvalResult<bool>,
    ) -> EvalResult<bool> {
        let mut domains: Vec<Domain> = bounds
            .iter()
            .enumerate()
            .map(|(i, bound)| {
                let earlier: Vec<Arc<str>> = bounds[..i].iter().map(|b| b.name.clone()).collect();
                if i > 0 && !bound.domain.mentions(&earlier) {
                    Domain::Shared(None)
                } else {
                    Domain::PerBinding
                }
            })
            .collect();
        let mut values = Vec::with_capacity(bounds.len());
        self.bind_next(bounds, &mut domains, scope, guard, &mut values, f)
    }

    fn bind_next(
        &self,
        bounds: &[Bound],
        domains: &mut [Domain],
        scope: &Scope,
        guard: Guard,
        values: &mut Vec<Value>,
        f: &mut dyn FnMut(&Scope, &[Value]) -> EvalResult<bool>,
    ) -> EvalResult<bool> {
        let (Some((first, rest)), Some((slot, rest_domains))) = (bounds.split_first(), domains.split_first_mut())
        else {
            return f(scope, values.as_slice());
        };
        let domain = match slot {
            Domain::Shared(Some(cached)) => Rc::clone(cached),
            Domain::Shared(empty) => {
                let evaluated = Rc::new(self.eval(&first.domain, scope, guard)?);
                *empty = Some(Rc::clone(&evaluated));
                evaluated
            }
            Domain::PerBinding => Rc::new(self.eval(&first.domain, scope, guard)?),
        };
        for value in builtins::elements(&domain, &first.domain.location)? {
            let inner = scope.bind(first.name.clone(), value.clone());
            values.push(value);
            let go_on = self.bind_next(rest, rest_domains, &inner, guard, values, f)?;
            values.pop();
            if !go_on {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn label(expr: &Expr) -> String {
    let text = expr.to_string();
    if text.chars().count() <= LABEL_WIDTH {
        return text;
    }
    let mut short: String = text.chars().take(LABEL_WIDTH).collect();
    short.push_str("...");
    short
}

fn quantifier_label(symbol: &str, bounds: &[Bound]) -> String {
    let names: Vec<&str> = bounds.iter().map(|b| &*b.name).collect();
    format!("{} {}", symbol, names.join(", "))
}

fn apply_function(f: &Value, arg: &Value, loc: &SourceLocation) -> EvalResult<Value> {
    match f {
        Value::Func(_) | Value::Tuple(_) | Value::Record(_) => {
            entry(f, arg).ok_or_else(|| EvalError::FunctionDomain {
                arg: arg.to_string(),
                location: loc.clone(),
            })
        }
        other => Err(EvalError::mismatch("a function", other.type_tag(), loc)),
    }
}

fn entry(f: &Value, key: &Value) -> Option<Value> {
    match (f, key) {
        (Value::Func(map), _) => map.get(key).cloned(),
        (Value::Tuple(items), Value::Int(i)) if *i >= 1 => items.get((*i - 1) as usize).cloned(),
        (Value::Record(fields), Value::Str(name)) => fields.get(name).cloned(),
        _ => None,
    }
}

fn set_entry(f: &mut Value, key: Value, value: Value, loc: &SourceLocation) -> EvalResult<()> {
    match (f, key) {
        (Value::Func(map), key) => {
            map.insert(key, value);
        }
        (Value::Tuple(items), Value::Int(i)) if i >= 1 && (i as usize) <= items.len() => {
            items[(i - 1) as usize] = value;
        }
        (Value::Record(fields), Value::Str(name)) => {
            fields.insert(name, value);
        }
        (other, _) => return Err(EvalError::mismatch("a function", other.type_tag(), loc)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvalErrorKind;
    use crate::eval::{NoopHook, State};
    use crate::syntax::build::*;
    use parking_lot::Mutex;

    /// Records `push name@line` / `pop` in order.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl FrameHook for Recorder {
        fn push(&self, frame: FramePush) -> EvalResult<()> {
            self.events
                .lock()
                .push(format!("push {}@{}", frame.name, frame.location.begin.line));
            Ok(())
        }

        fn pop(&self) {
            self.events.lock().push("pop".to_string());
        }
    }

    fn evaluator(spec: Spec) -> (Evaluator, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        (Evaluator::new(Arc::new(spec), recorder.clone()), recorder)
    }

    fn pushes(recorder: &Recorder) -> Vec<String> {
        recorder
            .events
            .lock()
            .iter()
            .filter(|e| e.starts_with("push"))
            .cloned()
            .collect()
    }

    #[test]
    fn test_operator_application_binds_arguments() {
        let at = line("Main", 2);
        let spec = Spec::builder("Main")
            .operator(def(
                &at,
                "Sum",
                &["a", "b"],
                apply(&at, "+", vec![name(&at, "a"), name(&at, "b")]),
            ))
            .build()
            .unwrap();
        let (ev, recorder) = evaluator(spec);
        let call_at = line("Main", 9);
        let call = apply(
            &call_at,
            "Sum",
            vec![int(&call_at, 2), apply(&call_at, "*", vec![int(&call_at, 3), int(&call_at, 4)])],
        );
        let v = ev.evaluate(&call, &Context::empty(), StateLevel::Constant).unwrap();
        assert_eq!(v, Value::Int(14));
        assert_eq!(
            pushes(&recorder),
            vec!["push Sum@9", "push +@2", "push *@9"]
        );
        let events = recorder.events.lock();
        assert_eq!(events.iter().filter(|e| *e == "pop").count(), 3);
    }

    #[test]
    fn test_quantifier_visits_bindings_in_order() {
        let at = line("Main", 4);
        let body = apply(&at, "<", vec![name(&at, "x"), int(&at, 10)]);
        let q = forall(
            &at,
            vec![("x", set(&at, vec![int(&at, 3), int(&at, 1), int(&at, 2)]))],
            body,
        );
        let (ev, recorder) = evaluator(Spec::builder("Main").build().unwrap());
        assert_eq!(
            ev.evaluate(&q, &Context::empty(), StateLevel::Constant).unwrap(),
            Value::Bool(true)
        );
        // One body frame plus the `<` application per element.
        assert_eq!(pushes(&recorder).len(), 6);
    }

    #[test]
    fn test_exists_stops_at_first_witness() {
        let at = line("Main", 4);
        let body = apply(&at, "=", vec![name(&at, "x"), int(&at, 2)]);
        let q = exists(
            &at,
            vec![("x", apply(&at, "..", vec![int(&at, 1), int(&at, 5)]))],
            body,
        );
        let (ev, recorder) = evaluator(Spec::builder("Main").build().unwrap());
        assert_eq!(
            ev.evaluate(&q, &Context::empty(), StateLevel::Constant).unwrap(),
            Value::Bool(true)
        );
        let bodies = pushes(&recorder).iter().filter(|p| p.starts_with("push \\E")).count();
        assert_eq!(bodies, 2);
    }

    #[test]
    fn test_independent_inner_domain_is_evaluated_once() {
        let at = line("Main", 4);
        let outer = line("Main", 2);
        let inner = line("Main", 3);
        let q = forall(
            &at,
            vec![
                ("x", apply(&outer, "..", vec![int(&outer, 1), int(&outer, 3)])),
                ("y", apply(&inner, "..", vec![int(&inner, 1), int(&inner, 2)])),
            ],
            boolean(&at, true),
        );
        let (ev, recorder) = evaluator(Spec::builder("Main").build().unwrap());
        assert_eq!(
            ev.evaluate(&q, &Context::empty(), StateLevel::Constant).unwrap(),
            Value::Bool(true)
        );
        let inner_domains = pushes(&recorder).iter().filter(|p| *p == "push ..@3").count();
        assert_eq!(inner_domains, 1);

        // A domain over an earlier bound is evaluated for every outer value.
        let dependent = forall(
            &at,
            vec![
                ("x", apply(&outer, "..", vec![int(&outer, 1), int(&outer, 3)])),
                ("y", apply(&inner, "..", vec![int(&inner, 1), name(&inner, "x")])),
            ],
            boolean(&at, true),
        );
        let (ev, recorder) = evaluator(Spec::builder("Main").build().unwrap());
        ev.evaluate(&dependent, &Context::empty(), StateLevel::Constant).unwrap();
        let inner_domains = pushes(&recorder).iter().filter(|p| *p == "push ..@3").count();
        assert_eq!(inner_domains, 3);
    }

    #[test]
    fn test_inner_domain_is_skipped_when_outer_is_empty() {
        let at = line("Main", 4);
        let q = exists(
            &at,
            vec![
                ("x", set(&at, vec![])),
                ("y", apply(&at, "\\div", vec![int(&at, 1), int(&at, 0)])),
            ],
            boolean(&at, true),
        );
        let ev = Evaluator::new(Arc::new(Spec::builder("Main").build().unwrap()), Arc::new(NoopHook));
        assert_eq!(
            ev.evaluate(&q, &Context::empty(), StateLevel::Constant).unwrap(),
            Value::Bool(false)
        );
    }

    fn countdown_spec(at: &SourceLocation) -> Spec {
        // F(n) == IF n = 0 THEN 0 ELSE F(n - 1)
        let body = if_then_else(
            at,
            apply(at, "=", vec![name(at, "n"), int(at, 0)]),
            int(at, 0),
            apply(at, "F", vec![apply(at, "-", vec![name(at, "n"), int(at, 1)])]),
        );
        Spec::builder("Main").operator(def(at, "F", &["n"], body)).build().unwrap()
    }

    #[test]
    fn test_recursion_is_bounded_by_call_depth() {
        let at = line("Main", 3);
        let ev = Evaluator::new(Arc::new(countdown_spec(&at)), Arc::new(NoopHook)).with_max_call_depth(50);
        let shallow = apply(&at, "F", vec![int(&at, 20)]);
        assert_eq!(
            ev.evaluate(&shallow, &Context::empty(), StateLevel::Constant).unwrap(),
            Value::Int(0)
        );
        let deep = apply(&at, "F", vec![int(&at, 100)]);
        let err = ev.evaluate(&deep, &Context::empty(), StateLevel::Constant).unwrap_err();
        assert_eq!(err.kind(), EvalErrorKind::RecursionLimit);
        // The depth is released on the way out, so the evaluator stays usable.
        assert_eq!(
            ev.evaluate(&shallow, &Context::empty(), StateLevel::Constant).unwrap(),
            Value::Int(0)
        );
    }

    #[test]
    fn test_self_referential_operator_fails_cleanly() {
        let at = line("Main", 2);
        let spec = Spec::builder("Main")
            .operator(def(&at, "Loop", &[], apply(&at, "+", vec![name(&at, "Loop"), int(&at, 1)])))
            .build()
            .unwrap();
        let ev = Evaluator::new(Arc::new(spec), Arc::new(NoopHook)).with_max_call_depth(40);
        let err = ev
            .evaluate(&name(&at, "Loop"), &Context::empty(), StateLevel::Constant)
            .unwrap_err();
        assert_eq!(err.kind(), EvalErrorKind::RecursionLimit);
    }

    #[test]
    fn test_sequences_compare_as_functions() {
        let at = line("Main", 5);
        let ev = Evaluator::new(Arc::new(Spec::builder("Main").build().unwrap()), Arc::new(NoopHook));
        let as_function = func_def(
            &at,
            vec![("i", apply(&at, "..", vec![int(&at, 1), int(&at, 2)]))],
            name(&at, "i"),
        );
        let literal = tuple(&at, vec![int(&at, 1), int(&at, 2)]);
        let same = apply(&at, "=", vec![literal.clone(), as_function.clone()]);
        assert_eq!(ev.evaluate(&same, &Context::empty(), StateLevel::Constant).unwrap(), Value::Bool(true));
        let member = apply(&at, "\\in", vec![literal, set(&at, vec![as_function])]);
        assert_eq!(ev.evaluate(&member, &Context::empty(), StateLevel::Constant).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_membership_in_a_huge_interval() {
        let at = line("Main", 5);
        let ev = Evaluator::new(Arc::new(Spec::builder("Main").build().unwrap()), Arc::new(NoopHook));
        let huge = apply(&at, "..", vec![int(&at, 1), int(&at, 1_000_000_000)]);
        let member = apply(&at, "\\in", vec![int(&at, 999_999_999), huge.clone()]);
        assert_eq!(ev.evaluate(&member, &Context::empty(), StateLevel::Constant).unwrap(), Value::Bool(true));
        let first = exists(&at, vec![("x", huge)], apply(&at, ">", vec![name(&at, "x"), int(&at, 2)]));
        assert_eq!(ev.evaluate(&first, &Context::empty(), StateLevel::Constant).unwrap(), Value::Bool(true));
    }

    #[test]
    fn test_display_forcing_leaves_lazy_unforced() {
        let at = line("Main", 3);
        let lazy = Value::lazy(
            Arc::new(apply(&at, "+", vec![int(&at, 1), int(&at, 1)])),
            Scope::constant(),
        );
        let (ev, recorder) = evaluator(Spec::builder("Main").build().unwrap());
        assert_eq!(ev.force_for_display(&lazy).unwrap(), Value::Int(2));
        assert!(recorder.events.lock().is_empty());
        let Value::Lazy(inner) = &lazy else { unreachable!() };
        assert!(inner.cached().is_none());
    }

    #[test]
    fn test_errors_pop_every_frame() {
        let at = line("Main", 5);
        let expr = apply(
            &at,
            "+",
            vec![int(&at, 1), apply(&at, "\\div", vec![int(&at, 1), int(&at, 0)])],
        );
        let (ev, recorder) = evaluator(Spec::builder("Main").build().unwrap());
        let err = ev
            .evaluate(&expr, &Context::empty(), StateLevel::Constant)
            .unwrap_err();
        assert_eq!(err.kind(), EvalErrorKind::DivisionByZero);
        let events = recorder.events.lock();
        let pushed = events.iter().filter(|e| e.starts_with("push")).count();
        let popped = events.iter().filter(|e| *e == "pop").count();
        assert_eq!(pushed, popped);
    }

    #[test]
    fn test_let_and_except() {
        let at = line("Main", 7);
        let f = func_def(
            &at,
            vec![("i", apply(&at, "..", vec![int(&at, 1), int(&at, 3)]))],
            int(&at, 0),
        );
        let expr = let_in(
            &at,
            vec![def(&at, "f", &[], f)],
            func_apply(
                &at,
                except(
                    &at,
                    name(&at, "f"),
                    vec![(int(&at, 2), apply(&at, "+", vec![name(&at, "@"), int(&at, 5)]))],
                ),
                int(&at, 2),
            ),
        );
        let ev = Evaluator::new(Arc::new(Spec::builder("Main").build().unwrap()), Arc::new(NoopHook));
        assert_eq!(
            ev.evaluate(&expr, &Context::empty(), StateLevel::Constant).unwrap(),
            Value::Int(5)
        );
    }

    #[test]
    fn test_primed_and_unchanged_need_an_action() {
        let at = line("Main", 8);
        let vars: Arc<[Arc<str>]> = vec![Arc::from("x")].into();
        let s0 = Arc::new(State::new(vars.clone(), vec![Value::Int(0)]));
        let s1 = Arc::new(State::new(vars, vec![Value::Int(1)]));
        let ev = Evaluator::new(
            Arc::new(Spec::builder("Main").variables(&["x"]).build().unwrap()),
            Arc::new(NoopHook),
        );
        let step = apply(
            &at,
            "=",
            vec![primed(&at, "x"), apply(&at, "+", vec![name(&at, "x"), int(&at, 1)])],
        );
        let action = StateLevel::Action(s0.clone(), s1);
        assert_eq!(ev.evaluate(&step, &Context::empty(), action.clone()).unwrap(), Value::Bool(true));
        assert_eq!(
            ev.evaluate(&unchanged(&at, &["x"]), &Context::empty(), action).unwrap(),
            Value::Bool(false)
        );
        let err = ev
            .evaluate(&step, &Context::empty(), StateLevel::State(s0))
            .unwrap_err();
        assert_eq!(err.kind(), EvalErrorKind::UndefinedSymbol);
    }

    #[test]
    fn test_choose_and_undefined_names() {
        let at = line("Main", 6);
        let ev = Evaluator::new(Arc::new(Spec::builder("Main").build().unwrap()), Arc::new(NoopHook));
        let pick = choose(
            &at,
            "x",
            apply(&at, "..", vec![int(&at, 1), int(&at, 9)]),
            apply(&at, ">", vec![name(&at, "x"), int(&at, 4)]),
        );
        assert_eq!(
            ev.evaluate(&pick, &Context::empty(), StateLevel::Constant).unwrap(),
            Value::Int(5)
        );
        let none = choose(&at, "x", set(&at, vec![]), boolean(&at, true));
        assert_eq!(
            ev.evaluate(&none, &Context::empty(), StateLevel::Constant).unwrap_err().kind(),
            EvalErrorKind::ChooseFailed
        );
        assert_eq!(
            ev.evaluate(&name(&at, "y"), &Context::empty(), StateLevel::Constant)
                .unwrap_err()
                .kind(),
            EvalErrorKind::UndefinedSymbol
        );
    }
}
