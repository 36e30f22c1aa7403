use super::Context;
use crate::value::Value;
use std::sync::Arc;

/// A complete binding of every declared variable, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    variables: Arc<[Arc<str>]>,
    values: Vec<Value>,
}

impl State {
    /// `values` must line up with `variables`.
    pub fn new(variables: Arc<[Arc<str>]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(variables.len(), values.len());
        Self { variables, values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables
            .iter()
            .position(|v| &**v == name)
            .map(|i| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Arc<str>, &Value)> {
        self.variables.iter().zip(self.values.iter())
    }
}

/// What the expression is evaluated against.
#[derive(Debug, Clone)]
pub enum StateLevel {
    /// Constant level: ASSUME and other state-free expressions.
    Constant,
    State(Arc<State>),
    /// A transition: unprimed and primed states.
    Action(Arc<State>, Arc<State>),
}

impl StateLevel {
    pub fn current(&self) -> Option<&State> {
        match self {
            StateLevel::Constant => None,
            StateLevel::State(s) | StateLevel::Action(s, _) => Some(s),
        }
    }

    pub fn next(&self) -> Option<&State> {
        match self {
            StateLevel::Action(_, next) => Some(next),
            _ => None,
        }
    }
}

/// Everything an expression's value depends on besides the spec itself.
#[derive(Debug, Clone)]
pub struct Scope {
    pub context: Context,
    pub level: StateLevel,
}

impl Scope {
    pub fn new(context: Context, level: StateLevel) -> Self {
        Self { context, level }
    }

    pub fn constant() -> Self {
        Self::new(Context::empty(), StateLevel::Constant)
    }

    pub fn bind(&self, name: impl Into<Arc<str>>, value: Value) -> Self {
        Self {
            context: self.context.cons(name, value),
            level: self.level.clone(),
        }
    }

    pub fn with_context(&self, context: Context) -> Self {
        Self {
            context,
            level: self.level.clone(),
        }
    }
}
