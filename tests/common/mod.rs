#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tla_debugger::checker::Verdict;
use tla_debugger::config::{DebuggerConfig, DisconnectPolicy};
use tla_debugger::debugger::{DebugEvent, DebugSession, FrameView, StopReason};
use tla_debugger::spec::Spec;
use tla_debugger::syntax::build::*;
use tla_debugger::value::Value;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// ```text
/// 3  Init == x = 0
/// 5  Next ==
/// 6    /\ x' = x + 1
/// 7    /\ x' <= N
/// 9  TypeOK == x \in 0..N
/// ```
pub fn counter_spec(trace: &[i64]) -> Spec {
    const M: &str = "Counter";
    let l = |n| line(M, n);
    let mut builder = Spec::builder(M)
        .constant("N", Value::Int(3))
        .variables(&["x"])
        .operator(def(
            &l(3),
            "Init",
            &[],
            apply(&l(3), "=", vec![name(&l(3), "x"), int(&l(3), 0)]),
        ))
        .operator(def(
            &l(5),
            "Next",
            &[],
            conj(
                &span(M, (6, 4), (7, 14)),
                vec![
                    apply(
                        &l(6),
                        "=",
                        vec![
                            primed(&l(6), "x"),
                            apply(&l(6), "+", vec![name(&l(6), "x"), int(&l(6), 1)]),
                        ],
                    ),
                    apply(&l(7), "<=", vec![primed(&l(7), "x"), name(&l(7), "N")]),
                ],
            ),
        ))
        .operator(def(
            &l(9),
            "TypeOK",
            &[],
            apply(
                &l(9),
                "\\in",
                vec![
                    name(&l(9), "x"),
                    apply(&l(9), "..", vec![int(&l(9), 0), name(&l(9), "N")]),
                ],
            ),
        ))
        .init("Init")
        .next("Next")
        .invariant("TypeOK");
    for x in trace {
        builder = builder.state([("x", Value::Int(*x))]);
    }
    builder.build().unwrap()
}

pub fn session(spec: Spec, stop_on_entry: bool) -> DebugSession {
    let config = DebuggerConfig::new(DisconnectPolicy::Release).with_stop_on_entry(stop_on_entry);
    DebugSession::new(Arc::new(spec), config)
}

pub fn launched(spec: Spec, stop_on_entry: bool) -> DebugSession {
    let mut session = session(spec, stop_on_entry);
    session.launch().unwrap();
    session
}

/// Waits for the next stop and returns its reason with the live stack.
pub fn expect_stop(session: &mut DebugSession) -> (StopReason, Vec<FrameView>) {
    match session.next_event(TIMEOUT) {
        Some(DebugEvent::Stopped { reason, .. }) => (reason, session.stack_trace().unwrap()),
        other => panic!("expected a stop, got {:?}", other),
    }
}

pub fn expect_terminated(session: &mut DebugSession) -> Verdict {
    match session.next_event(TIMEOUT) {
        Some(DebugEvent::Terminated { verdict }) => verdict,
        other => panic!("expected termination, got {:?}", other),
    }
}

pub fn names(frames: &[FrameView]) -> Vec<&str> {
    frames.iter().map(|f| f.name.as_str()).collect()
}
