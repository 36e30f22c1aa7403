use super::variables::BindingGroup;
use crate::eval::{FrameKind, FramePush, Scope};
use crate::syntax::SourceLocation;
use std::sync::{Arc, OnceLock};

pub type FrameId = u64;

/// One in-progress evaluation. Immutable once pushed apart from the bindings
/// cache, which is filled the first time a client asks for its variables.
#[derive(Debug)]
pub struct Frame {
    pub id: FrameId,
    pub parent: Option<FrameId>,
    pub location: SourceLocation,
    pub kind: FrameKind,
    pub name: String,
    pub scope: Scope,
    bindings: OnceLock<Vec<BindingGroup>>,
}

impl Frame {
    pub fn bindings_or_init(&self, materialize: impl FnOnce(&Scope) -> Vec<BindingGroup>) -> &[BindingGroup] {
        self.bindings.get_or_init(|| materialize(&self.scope))
    }
}

/// The live stack, root first. Ids are never reused within a session.
#[derive(Debug)]
pub struct StackFrameTracker {
    live: Vec<Arc<Frame>>,
    next_id: FrameId,
}

impl Default for StackFrameTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StackFrameTracker {
    pub fn new() -> Self {
        Self {
            live: Vec::new(),
            next_id: 1,
        }
    }

    pub fn push(&mut self, frame: FramePush) -> FrameId {
        let id = self.next_id;
        self.next_id += 1;
        let parent = self.live.last().map(|f| f.id);
        self.live.push(Arc::new(Frame {
            id,
            parent,
            location: frame.location,
            kind: frame.kind,
            name: frame.name,
            scope: frame.scope,
            bindings: OnceLock::new(),
        }));
        id
    }

    pub fn pop(&mut self) -> Option<Arc<Frame>> {
        self.live.pop()
    }

    pub fn current_depth(&self) -> usize {
        self.live.len()
    }

    /// Innermost first. The returned vector is independent of later pushes and pops.
    pub fn snapshot(&self) -> Vec<Arc<Frame>> {
        self.live.iter().rev().cloned().collect()
    }

    pub fn find(&self, id: FrameId) -> Option<Arc<Frame>> {
        self.live.iter().find(|f| f.id == id).cloned()
    }
}
