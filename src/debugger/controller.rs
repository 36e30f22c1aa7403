use super::breakpoints::{Breakpoint, BreakpointRegistry};
use super::frames::{Frame, FrameId, StackFrameTracker};
use super::stepping::{RunMode, StopReason};
use crate::checker::Verdict;
use crate::error::{EvalError, EvalResult, ProtocolError};
use crate::eval::{FrameHook, FramePush};
use parking_lot::{Condvar, Mutex};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Running,
    Paused,
    Terminated,
}

#[derive(Debug, Clone)]
pub enum DebugEvent {
    Stopped {
        reason: StopReason,
        frames: Vec<Arc<Frame>>,
    },
    Terminated {
        verdict: Verdict,
    },
}

struct Monitor {
    state: ExecutionState,
    tracker: StackFrameTracker,
    breakpoints: BreakpointRegistry,
    mode: RunMode,
    stop_on_entry: bool,
    entered: bool,
    aborted: bool,
    /// Bumped on every resume so a waiting evaluator can tell a real wakeup
    /// from a spurious one.
    resumes: u64,
    events: Sender<DebugEvent>,
}

/// Decides on each frame push whether the evaluating thread suspends, and
/// serves the controlling side while it is suspended.
pub struct DebugController {
    monitor: Mutex<Monitor>,
    resumed: Condvar,
}

impl DebugController {
    pub fn new(stop_on_entry: bool, events: Sender<DebugEvent>) -> Self {
        Self {
            monitor: Mutex::new(Monitor {
                state: ExecutionState::Running,
                tracker: StackFrameTracker::new(),
                breakpoints: BreakpointRegistry::new(),
                mode: RunMode::Continue,
                stop_on_entry,
                entered: false,
                aborted: false,
                resumes: 0,
                events,
            }),
            resumed: Condvar::new(),
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.monitor.lock().state
    }

    pub fn current_depth(&self) -> usize {
        self.monitor.lock().tracker.current_depth()
    }

    pub fn with_breakpoints<T>(&self, f: impl FnOnce(&mut BreakpointRegistry) -> T) -> T {
        f(&mut self.monitor.lock().breakpoints)
    }

    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.monitor.lock().breakpoints.list()
    }

    pub fn continue_(&self) -> Result<(), ProtocolError> {
        self.resume(|_| RunMode::Continue)
    }

    pub fn step_in(&self, count: u32) -> Result<(), ProtocolError> {
        self.resume(|_| RunMode::StepIn {
            remaining: count.max(1),
        })
    }

    pub fn step_over(&self) -> Result<(), ProtocolError> {
        self.resume(|depth| RunMode::StepOver { depth })
    }

    pub fn step_out(&self) -> Result<(), ProtocolError> {
        self.resume(|depth| RunMode::StepOut { depth })
    }

    fn resume(&self, mode: impl FnOnce(usize) -> RunMode) -> Result<(), ProtocolError> {
        let mut m = self.monitor.lock();
        match m.state {
            ExecutionState::Terminated => Err(ProtocolError::SessionTerminated),
            ExecutionState::Running => Err(ProtocolError::NotPaused),
            ExecutionState::Paused => {
                m.mode = mode(m.tracker.current_depth());
                debug!(mode = ?m.mode, "resuming");
                m.state = ExecutionState::Running;
                m.resumes += 1;
                self.resumed.notify_all();
                Ok(())
            }
        }
    }

    /// Lets the evaluation run to completion unattended.
    pub fn release(&self) {
        let mut m = self.monitor.lock();
        m.breakpoints.unset_all();
        m.stop_on_entry = false;
        m.mode = RunMode::Continue;
        if m.state == ExecutionState::Paused {
            m.state = ExecutionState::Running;
            m.resumes += 1;
            self.resumed.notify_all();
        }
        info!("evaluation released");
    }

    /// Fails the suspended push, and every later one, with `Aborted`.
    pub fn abort(&self) {
        let mut m = self.monitor.lock();
        if m.state == ExecutionState::Terminated {
            return;
        }
        m.aborted = true;
        if m.state == ExecutionState::Paused {
            m.state = ExecutionState::Running;
        }
        m.resumes += 1;
        self.resumed.notify_all();
        info!("evaluation aborted");
    }

    pub fn terminate(&self, verdict: Verdict) {
        let mut m = self.monitor.lock();
        m.state = ExecutionState::Terminated;
        info!(%verdict, "session terminated");
        if m.events.send(DebugEvent::Terminated { verdict }).is_err() {
            debug!("no client is listening for the termination event");
        }
    }

    fn ensure_paused(&self, state: ExecutionState) -> Result<(), ProtocolError> {
        match state {
            ExecutionState::Paused => Ok(()),
            ExecutionState::Running => Err(ProtocolError::NotPaused),
            ExecutionState::Terminated => Err(ProtocolError::SessionTerminated),
        }
    }

    /// The live stack, innermost first.
    pub fn snapshot(&self) -> Result<Vec<Arc<Frame>>, ProtocolError> {
        let m = self.monitor.lock();
        self.ensure_paused(m.state)?;
        Ok(m.tracker.snapshot())
    }

    pub fn frame(&self, id: FrameId) -> Result<Arc<Frame>, ProtocolError> {
        let m = self.monitor.lock();
        self.ensure_paused(m.state)?;
        m.tracker.find(id).ok_or(ProtocolError::StaleFrameReference(id))
    }
}

impl FrameHook for DebugController {
    fn push(&self, frame: FramePush) -> EvalResult<()> {
        let mut m = self.monitor.lock();
        if m.aborted {
            return Err(EvalError::Aborted);
        }

        let location = frame.location.clone();
        let id = m.tracker.push(frame);
        let depth = m.tracker.current_depth();

        let reason = if !m.entered && m.stop_on_entry {
            Some(StopReason::Entry)
        } else if m.breakpoints.contains(&location) {
            Some(StopReason::Breakpoint)
        } else if m.mode.on_push(depth) {
            Some(StopReason::Step)
        } else {
            None
        };
        m.entered = true;

        let Some(reason) = reason else {
            return Ok(());
        };

        debug!(frame = id, depth, reason = reason.as_str(), %location, "pausing");
        m.state = ExecutionState::Paused;
        m.mode = RunMode::Continue;
        let frames = m.tracker.snapshot();
        if m.events.send(DebugEvent::Stopped { reason, frames }).is_err() {
            // Nobody could ever resume this stop.
            debug!(frame = id, "no client is listening; not pausing");
            m.state = ExecutionState::Running;
            return Ok(());
        }

        let generation = m.resumes;
        while m.resumes == generation {
            self.resumed.wait(&mut m);
        }

        if m.aborted {
            m.tracker.pop();
            return Err(EvalError::Aborted);
        }
        Ok(())
    }

    fn pop(&self) {
        self.monitor.lock().tracker.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{FrameKind, Scope};
    use crate::syntax::SourceLocation;
    use std::sync::mpsc::{channel, Receiver};
    use std::thread;
    use std::time::Duration;

    fn frame(line: u32) -> FramePush {
        FramePush {
            location: SourceLocation::new("Main", (line, 1), (line, 30)),
            kind: FrameKind::Expression,
            name: format!("line{}", line),
            scope: Scope::constant(),
        }
    }

    fn stopped(events: &Receiver<DebugEvent>) -> (StopReason, usize) {
        match events.recv_timeout(Duration::from_secs(5)) {
            Ok(DebugEvent::Stopped { reason, frames }) => (reason, frames.len()),
            other => panic!("expected a stop, got {:?}", other),
        }
    }

    #[test]
    fn test_commands_need_a_paused_evaluator() {
        let (tx, _rx) = channel();
        let controller = DebugController::new(false, tx);
        assert_eq!(controller.continue_(), Err(ProtocolError::NotPaused));
        assert_eq!(controller.snapshot().unwrap_err(), ProtocolError::NotPaused);
        controller.terminate(Verdict::Success);
        assert_eq!(controller.step_in(1), Err(ProtocolError::SessionTerminated));
    }

    #[test]
    fn test_entry_stop_then_step() {
        let (tx, rx) = channel();
        let controller = Arc::new(DebugController::new(true, tx));
        let worker = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || {
                controller.push(frame(1))?;
                controller.push(frame(2))?;
                controller.pop();
                controller.pop();
                Ok::<(), EvalError>(())
            })
        };

        assert_eq!(stopped(&rx), (StopReason::Entry, 1));
        controller.step_in(1).unwrap();
        assert_eq!(stopped(&rx), (StopReason::Step, 2));
        controller.continue_().unwrap();
        worker.join().unwrap().unwrap();
        assert_eq!(controller.current_depth(), 0);
    }

    #[test]
    fn test_abort_fails_the_suspended_push() {
        let (tx, rx) = channel();
        let controller = Arc::new(DebugController::new(true, tx));
        let worker = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.push(frame(1)))
        };
        stopped(&rx);
        controller.abort();
        assert_eq!(worker.join().unwrap(), Err(EvalError::Aborted));
        assert_eq!(controller.current_depth(), 0);
        assert_eq!(controller.push(frame(2)), Err(EvalError::Aborted));
    }

    #[test]
    fn test_events_without_a_listener_do_not_block() {
        let (tx, rx) = channel();
        drop(rx);
        let controller = DebugController::new(true, tx);
        assert_eq!(controller.push(frame(1)), Ok(()));
        assert_eq!(controller.state(), ExecutionState::Running);
        controller.pop();
        controller.terminate(Verdict::Success);
        assert_eq!(controller.state(), ExecutionState::Terminated);
    }
}
