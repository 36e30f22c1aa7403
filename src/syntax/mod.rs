pub mod build;
mod expr;
mod location;

pub use expr::{Bound, CaseArm, ExceptUpdate, Expr, ExprKind, OperatorDef, INFIX_OPERATORS};
pub use location::{Position, SourceLocation};
pub(crate) use expr::Quoted;
