use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 1-based line/column pair as reported by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Source range of a syntax node. Produced by the parser, never recomputed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub module: Arc<str>,
    pub begin: Position,
    pub end: Position,
}

impl SourceLocation {
    pub fn new(module: &str, begin: (u32, u32), end: (u32, u32)) -> Self {
        Self {
            module: Arc::from(module),
            begin: Position::new(begin.0, begin.1),
            end: Position::new(end.0, end.1),
        }
    }

    /// Location used for values and errors that have no syntax node behind them.
    pub fn unknown() -> Self {
        Self::new("<unknown>", (0, 0), (0, 0))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}-{}:{}",
            self.module, self.begin.line, self.begin.column, self.end.line, self.end.column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_module_and_span() {
        let loc = SourceLocation::new("Utils", (11, 1), (14, 20));
        assert_eq!(loc.to_string(), "Utils:11:1-14:20");
    }
}
