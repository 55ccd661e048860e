//! Task nodes and their position-derived identity

use std::fmt;
use std::str::FromStr;

use super::TreeError;

/// Stable identity of a task node
///
/// Derived from where the node first appeared: `0.2` is the third child of the
/// first root. Identity is never derived from content because titles are still
/// growing while the model streams them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Vec<usize>);

impl NodeId {
    /// Identity of a root node in the given slot
    pub fn root(slot: usize) -> Self {
        Self(vec![slot])
    }

    /// Identity of a child of this node in the given slot
    pub fn child(&self, slot: usize) -> Self {
        let mut path = self.0.clone();
        path.push(slot);
        Self(path)
    }

    /// Slot indices from the root down to this node
    pub fn path(&self) -> &[usize] {
        &self.0
    }

    /// Depth in the tree (0 = root)
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1)
    }

    /// Identity of the parent, or None for a root
    pub fn parent(&self) -> Option<NodeId> {
        if self.0.len() <= 1 {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, slot) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", slot)?;
        }
        Ok(())
    }
}

impl FromStr for NodeId {
    type Err = TreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s
            .split('.')
            .map(|part| part.trim().parse::<usize>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| TreeError::InvalidNodeId(s.to_string()))?;
        if path.is_empty() {
            return Err(TreeError::InvalidNodeId(s.to_string()));
        }
        Ok(Self(path))
    }
}

/// One task or subtask in a rendered tree
///
/// Nodes are owned by the tree's arena. `children` and `parent` are keys into
/// that arena, so no node holds another by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskNode {
    id: NodeId,
    title: String,
    completed: bool,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    /// Slot handed to the next child; never reused within a session
    next_slot: usize,
}

impl TaskNode {
    pub(crate) fn new(id: NodeId, parent: Option<NodeId>, title: String) -> Self {
        Self {
            id,
            title,
            completed: false,
            children: Vec::new(),
            parent,
            next_slot: 0,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Title as streamed so far; may be partial or empty while streaming
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// Child identities in document order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<&NodeId> {
        self.parent.as_ref()
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// True for a node that has not received any title text yet
    pub fn is_placeholder(&self) -> bool {
        self.title.trim().is_empty()
    }

    pub(crate) fn set_title(&mut self, title: String) {
        self.title = title;
    }

    pub(crate) fn set_completed(&mut self, completed: bool) {
        self.completed = completed;
    }

    pub(crate) fn children_mut(&mut self) -> &mut Vec<NodeId> {
        &mut self.children
    }

    pub(crate) fn take_slot(&mut self) -> usize {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }
}
