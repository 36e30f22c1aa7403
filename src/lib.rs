//! Interactive debugger for a TLA+-style specification evaluator: suspend
//! evaluation at breakpoints, step through it frame by frame and inspect the
//! bindings of every in-progress evaluation.

pub mod checker;
pub mod config;
pub mod console;
pub mod dap;
pub mod debugger;
pub mod error;
pub mod eval;
pub mod spec;
pub mod syntax;
pub mod value;
