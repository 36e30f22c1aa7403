//! Drives the evaluator the way a model-checking core would: assumptions,
//! the initial predicate, invariants over every state, then the next-state
//! relation over consecutive states.

use crate::error::{EvalError, EvalResult};
use crate::eval::{Context, Evaluator, StateLevel};
use crate::syntax::SourceLocation;
use crate::value::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Success,
    AssumptionViolated { index: usize },
    InitViolated,
    InvariantViolated { name: String, state: usize },
    ActionViolated { step: usize },
    Error(EvalError),
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Success)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Success => f.write_str("success"),
            Verdict::AssumptionViolated { index } => write!(f, "assumption {} is violated", index),
            Verdict::InitViolated => f.write_str("the initial state violates the initial predicate"),
            Verdict::InvariantViolated { name, state } => {
                write!(f, "invariant {} is violated in state {}", name, state)
            }
            Verdict::ActionViolated { step } => {
                write!(f, "step {} -> {} is not allowed by the next-state relation", step, step + 1)
            }
            Verdict::Error(err) => write!(f, "evaluation failed: {}", err),
        }
    }
}

pub struct Checker {
    evaluator: Arc<Evaluator>,
}

impl Checker {
    pub fn new(evaluator: Arc<Evaluator>) -> Self {
        Self { evaluator }
    }

    pub fn run(&self) -> Verdict {
        let verdict = match self.check() {
            Ok(verdict) => verdict,
            Err(err) => Verdict::Error(err),
        };
        info!(%verdict, "check finished");
        verdict
    }

    fn check(&self) -> EvalResult<Verdict> {
        let spec = Arc::clone(self.evaluator.spec());

        for (index, assumption) in spec.assumptions().iter().enumerate() {
            debug!(index, "checking assumption");
            let value = self
                .evaluator
                .evaluate(assumption, &Context::empty(), StateLevel::Constant)?;
            if !truth(value, &assumption.location)? {
                return Ok(Verdict::AssumptionViolated { index });
            }
        }

        let trace = spec.trace();
        if let (Some(init), Some(first)) = (spec.init(), trace.first()) {
            debug!(init, "checking initial state");
            if !self.holds(init, StateLevel::State(Arc::clone(first)))? {
                return Ok(Verdict::InitViolated);
            }
        }

        for (index, state) in trace.iter().enumerate() {
            for invariant in spec.invariants() {
                debug!(%invariant, state = index, "checking invariant");
                if !self.holds(invariant, StateLevel::State(Arc::clone(state)))? {
                    return Ok(Verdict::InvariantViolated {
                        name: invariant.to_string(),
                        state: index,
                    });
                }
            }
        }

        if let Some(next) = spec.next() {
            for (step, pair) in trace.windows(2).enumerate() {
                debug!(next, step, "checking transition");
                let level = StateLevel::Action(Arc::clone(&pair[0]), Arc::clone(&pair[1]));
                if !self.holds(next, level)? {
                    return Ok(Verdict::ActionViolated { step });
                }
            }
        }

        Ok(Verdict::Success)
    }

    fn holds(&self, operator: &str, level: StateLevel) -> EvalResult<bool> {
        let value = self.evaluator.evaluate_operator(operator, level)?;
        let location = self
            .evaluator
            .spec()
            .operator(operator)
            .map(|def| def.location.clone())
            .unwrap_or_else(SourceLocation::unknown);
        truth(value, &location)
    }
}

fn truth(value: Value, location: &SourceLocation) -> EvalResult<bool> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(EvalError::mismatch("a boolean", other.type_tag(), location)),
    }
}
