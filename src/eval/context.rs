use crate::value::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Persistent chain of local bindings. Extending never mutates: `cons` returns
/// a new head that shares the existing chain as its tail.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Node>>,
}

struct Node {
    name: Arc<str>,
    value: Value,
    next: Context,
}

impl Context {
    pub fn empty() -> Self {
        Self { head: None }
    }

    pub fn cons(&self, name: impl Into<Arc<str>>, value: Value) -> Self {
        Self {
            head: Some(Arc::new(Node {
                name: name.into(),
                value,
                next: self.clone(),
            })),
        }
    }

    /// Innermost binding wins.
    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.iter().find(|(n, _)| &***n == name).map(|(_, v)| v)
    }

    /// Innermost first, shadowed bindings included.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            cursor: self.head.as_deref(),
        }
    }

    /// Visible bindings in the order they were introduced, shadowed ones dropped.
    pub fn visible_bindings(&self) -> Vec<(Arc<str>, Value)> {
        let mut seen = HashSet::new();
        let mut visible: Vec<(Arc<str>, Value)> = self
            .iter()
            .filter(|(name, _)| seen.insert(Arc::clone(name)))
            .map(|(name, value)| (Arc::clone(name), value.clone()))
            .collect();
        visible.reverse();
        visible
    }
}

pub struct Iter<'a> {
    cursor: Option<&'a Node>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a Arc<str>, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.cursor?;
        self.cursor = node.next.head.as_deref();
        Some((&node.name, &node.value))
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(n, v)| format!("{} = {}", n, v)))
            .finish()
    }
}
