use crate::syntax::SourceLocation;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub type EvalResult<T> = Result<T, EvalError>;

/// Specification-evaluation failures. These unwind through the frame stack to
/// whoever called the evaluator; the debugger never swallows them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("{location}: undefined symbol `{name}`")]
    UndefinedSymbol {
        name: Arc<str>,
        location: SourceLocation,
    },
    #[error("{location}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
        location: SourceLocation,
    },
    #[error("{location}: `{op}` takes {expected} argument(s) but was given {got}")]
    ArityMismatch {
        op: Arc<str>,
        expected: usize,
        got: usize,
        location: SourceLocation,
    },
    #[error("{location}: cannot enumerate {domain}")]
    NonEnumerableDomain {
        domain: String,
        location: SourceLocation,
    },
    #[error("{location}: division by zero")]
    DivisionByZero { location: SourceLocation },
    #[error("{location}: no value satisfies the CHOOSE predicate")]
    ChooseFailed { location: SourceLocation },
    #[error("{location}: {arg} is not in the domain of the function")]
    FunctionDomain {
        arg: String,
        location: SourceLocation,
    },
    #[error("{location}: `{op}` exceeded the call depth limit of {limit}")]
    RecursionLimit {
        op: Arc<str>,
        limit: usize,
        location: SourceLocation,
    },
    #[error("evaluation aborted by the debugger")]
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalErrorKind {
    UndefinedSymbol,
    TypeMismatch,
    ArityMismatch,
    NonEnumerableDomain,
    DivisionByZero,
    ChooseFailed,
    FunctionDomain,
    RecursionLimit,
    Aborted,
}

impl EvalError {
    pub fn kind(&self) -> EvalErrorKind {
        match self {
            EvalError::UndefinedSymbol { .. } => EvalErrorKind::UndefinedSymbol,
            EvalError::TypeMismatch { .. } => EvalErrorKind::TypeMismatch,
            EvalError::ArityMismatch { .. } => EvalErrorKind::ArityMismatch,
            EvalError::NonEnumerableDomain { .. } => EvalErrorKind::NonEnumerableDomain,
            EvalError::DivisionByZero { .. } => EvalErrorKind::DivisionByZero,
            EvalError::ChooseFailed { .. } => EvalErrorKind::ChooseFailed,
            EvalError::FunctionDomain { .. } => EvalErrorKind::FunctionDomain,
            EvalError::RecursionLimit { .. } => EvalErrorKind::RecursionLimit,
            EvalError::Aborted => EvalErrorKind::Aborted,
        }
    }

    pub fn undefined(name: &str, location: &SourceLocation) -> Self {
        EvalError::UndefinedSymbol {
            name: Arc::from(name),
            location: location.clone(),
        }
    }

    pub fn mismatch(expected: &'static str, found: impl ToString, location: &SourceLocation) -> Self {
        EvalError::TypeMismatch {
            expected,
            found: found.to_string(),
            location: location.clone(),
        }
    }
}

/// Errors returned to a debug client. The session stays usable after any of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown command `{0}`")]
    UnknownCommand(String),
    #[error("invalid breakpoint location {module}:{line}")]
    InvalidBreakpointLocation { module: String, line: u32 },
    #[error("frame {0} is no longer on the stack")]
    StaleFrameReference(u64),
    #[error("unknown variables reference {0}")]
    UnknownHandle(u64),
    #[error("the evaluator is not paused")]
    NotPaused,
    #[error("the debug session has terminated")]
    SessionTerminated,
    #[error("no debug session has been launched")]
    NoSession,
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("failed to start the evaluator: {0}")]
    Launch(String),
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed spec document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown module `{0}`")]
    UnknownModule(String),
    #[error("operator `{0}` is defined more than once")]
    DuplicateOperator(String),
    #[error("operator `{0}` is not defined")]
    UnknownOperator(String),
    #[error("invalid value for `{name}`: {reason}")]
    InvalidValue { name: String, reason: String },
    #[error("state {index} does not bind variable `{variable}`")]
    IncompleteState { index: usize, variable: String },
}
