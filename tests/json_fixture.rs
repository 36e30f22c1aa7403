mod common;

use common::*;
use std::sync::Arc;
use tla_debugger::checker::{Checker, Verdict};
use tla_debugger::debugger::StopReason;
use tla_debugger::eval::{Evaluator, NoopHook};
use tla_debugger::spec;

#[cfg(test)]
mod fixture_tests {
    use super::*;

    #[test]
    fn test_fixture_matches_the_built_counter() {
        let loaded = spec::load_file(&fixture("counter.json")).unwrap();
        let built = counter_spec(&[0, 1, 2]);

        assert_eq!(loaded.root(), built.root());
        assert_eq!(loaded.variables(), built.variables());
        assert_eq!(loaded.constants(), built.constants());
        assert_eq!(loaded.invariants(), built.invariants());
        assert_eq!(loaded.trace().len(), 3);
        assert_eq!(loaded.assumptions().len(), 1);
        assert!(loaded.module("Counter").and_then(|m| m.path.as_ref()).is_some());
    }

    #[test]
    fn test_fixture_checks_without_a_debugger() {
        let loaded = Arc::new(spec::load_file(&fixture("counter.json")).unwrap());
        let evaluator = Arc::new(Evaluator::new(loaded, Arc::new(NoopHook)));
        assert_eq!(Checker::new(evaluator).run(), Verdict::Success);
    }

    #[test]
    fn test_fixture_breakpoint_in_the_next_state_relation() {
        let loaded = spec::load_file(&fixture("counter.json")).unwrap();
        let mut session = session(loaded, false);
        session.set_breakpoints("Counter", &[7]).unwrap();
        session.launch().unwrap();

        let (reason, frames) = expect_stop(&mut session);
        assert_eq!(reason, StopReason::Breakpoint);
        assert_eq!((frames[0].begin_line, frames[0].begin_column), (7, 7));
        assert_eq!(frames.last().map(|f| f.name.as_str()), Some("Next"));

        let vars = session.variables(frames[0].id).unwrap();
        let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["x", "x'", "N"]);

        session.unset_breakpoints();
        session.continue_().unwrap();
        assert_eq!(expect_terminated(&mut session), Verdict::Success);
    }
}
