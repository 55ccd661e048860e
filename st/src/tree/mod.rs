//! Task tree materialized from streamed plans
//!
//! The tree is an arena of [`TaskNode`]s keyed by [`NodeId`]. Each node lists
//! its children by key and names its parent by key; the arena is the only
//! owner. A node's identity is fixed when it first appears and survives every
//! later reconciliation of the same session.

use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

mod export;
mod node;
mod reconcile;

pub use export::{StepRecord, TreeExport};
pub use node::{NodeId, TaskNode};
pub use reconcile::{ReconcileMode, ReconcileOutcome, ReconcileStats, reconcile, reconcile_final};

/// Errors from tree operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("Task not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid task id: '{0}'")]
    InvalidNodeId(String),
}

/// Aggregate task counts over a whole tree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    /// Every node, at every depth
    #[serde(rename = "stepCount")]
    pub total: usize,
    /// Nodes marked completed by the user
    #[serde(rename = "stepCompleteCount")]
    pub completed: usize,
}

impl TaskCounts {
    /// Progress string for display (e.g. "[2/5]")
    pub fn progress_string(&self) -> String {
        format!("[{}/{}]", self.completed, self.total)
    }
}

/// The tree of tasks for one generation session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskTree {
    /// All nodes indexed by ID
    nodes: HashMap<NodeId, TaskNode>,
    /// Root node IDs in document order
    roots: Vec<NodeId>,
    /// Slot handed to the next root
    next_root_slot: usize,
}

impl TaskTree {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes at every depth
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    /// Root nodes in document order
    pub fn root_nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.roots.iter().filter_map(move |id| self.nodes.get(id))
    }

    /// Children of a node in document order
    pub fn children(&self, id: &NodeId) -> impl Iterator<Item = &TaskNode> {
        self.nodes
            .get(id)
            .map(|n| n.children())
            .unwrap_or_default()
            .iter()
            .filter_map(move |child| self.nodes.get(child))
    }

    /// All nodes in pre-order with their depth (0 = root)
    pub fn iter_depth_first(&self) -> Vec<(usize, &TaskNode)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(usize, &NodeId)> = self.roots.iter().rev().map(|id| (0, id)).collect();

        while let Some((depth, id)) = stack.pop() {
            if let Some(node) = self.nodes.get(id) {
                out.push((depth, node));
                stack.extend(node.children().iter().rev().map(|child| (depth + 1, child)));
            }
        }
        out
    }

    /// Mark a task completed or not completed (user action)
    pub fn set_completed(&mut self, id: &NodeId, completed: bool) -> Result<(), TreeError> {
        debug!(%id, completed, "set_completed: called");
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| TreeError::NodeNotFound(id.clone()))?;
        node.set_completed(completed);
        Ok(())
    }

    /// Flip a task's completed flag and return the new value
    pub fn toggle_completed(&mut self, id: &NodeId) -> Result<bool, TreeError> {
        let completed = !self.get(id).ok_or_else(|| TreeError::NodeNotFound(id.clone()))?.is_completed();
        self.set_completed(id, completed)?;
        Ok(completed)
    }

    /// Count all tasks and completed tasks with a full-tree walk
    pub fn counts(&self) -> TaskCounts {
        self.roots.iter().fold(TaskCounts::default(), |acc, id| {
            let sub = self.count_from(id);
            TaskCounts {
                total: acc.total + sub.total,
                completed: acc.completed + sub.completed,
            }
        })
    }

    fn count_from(&self, id: &NodeId) -> TaskCounts {
        let Some(node) = self.nodes.get(id) else {
            return TaskCounts::default();
        };
        let own = TaskCounts {
            total: 1,
            completed: usize::from(node.is_completed()),
        };
        node.children().iter().fold(own, |acc, child| {
            let sub = self.count_from(child);
            TaskCounts {
                total: acc.total + sub.total,
                completed: acc.completed + sub.completed,
            }
        })
    }

    /// Child IDs under `parent`, or the roots when `parent` is None
    fn child_ids(&self, parent: Option<&NodeId>) -> Vec<NodeId> {
        match parent {
            Some(id) => self.nodes.get(id).map(|n| n.children().to_vec()).unwrap_or_default(),
            None => self.roots.clone(),
        }
    }

    /// Allocate a node with a fresh identity under `parent`
    fn insert(&mut self, parent: Option<&NodeId>, title: String) -> Option<NodeId> {
        let id = match parent {
            Some(parent_id) => {
                let parent_node = self.nodes.get_mut(parent_id)?;
                let id = parent_id.child(parent_node.take_slot());
                parent_node.children_mut().push(id.clone());
                id
            }
            None => {
                let id = NodeId::root(self.next_root_slot);
                self.next_root_slot += 1;
                self.roots.push(id.clone());
                id
            }
        };
        debug!(%id, "insert: allocated node");
        self.nodes
            .insert(id.clone(), TaskNode::new(id.clone(), parent.cloned(), title));
        Some(id)
    }

    /// Remove a node and all its descendants; returns how many were removed
    fn remove_subtree(&mut self, id: &NodeId) -> usize {
        let Some(node) = self.nodes.remove(id) else {
            return 0;
        };

        match node.parent() {
            Some(parent_id) => {
                if let Some(parent) = self.nodes.get_mut(parent_id) {
                    parent.children_mut().retain(|c| c != id);
                }
            }
            None => self.roots.retain(|r| r != id),
        }

        let mut removed = 1;
        let mut pending: Vec<NodeId> = node.children().to_vec();
        while let Some(child) = pending.pop() {
            if let Some(child_node) = self.nodes.remove(&child) {
                removed += 1;
                pending.extend(child_node.children().iter().cloned());
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> TaskTree {
        let mut tree = TaskTree::new();
        let a = tree.insert(None, "A".to_string()).unwrap();
        let a0 = tree.insert(Some(&a), "A0".to_string()).unwrap();
        tree.insert(Some(&a0), "A00".to_string()).unwrap();
        tree.insert(Some(&a), "A1".to_string()).unwrap();
        tree.insert(None, "B".to_string()).unwrap();
        tree
    }

    #[test]
    fn test_insert_assigns_positional_ids() {
        let tree = sample_tree();
        let ids: Vec<String> = tree.iter_depth_first().iter().map(|(_, n)| n.id().to_string()).collect();
        assert_eq!(ids, vec!["0", "0.0", "0.0.0", "0.1", "1"]);
    }

    #[test]
    fn test_iter_depth_first_depths() {
        let tree = sample_tree();
        let depths: Vec<(usize, &str)> = tree.iter_depth_first().iter().map(|(d, n)| (*d, n.title())).collect();
        assert_eq!(depths, vec![(0, "A"), (1, "A0"), (2, "A00"), (1, "A1"), (0, "B")]);
    }

    #[test]
    fn test_root_nodes_and_children_in_document_order() {
        let tree = sample_tree();
        let roots: Vec<&str> = tree.root_nodes().map(|n| n.title()).collect();
        assert_eq!(roots, vec!["A", "B"]);

        let children: Vec<&str> = tree.children(&NodeId::root(0)).map(|n| n.title()).collect();
        assert_eq!(children, vec!["A0", "A1"]);
        assert_eq!(tree.children(&NodeId::root(1)).count(), 0);
    }

    #[test]
    fn test_parent_back_reference() {
        let tree = sample_tree();
        let node = tree.get(&NodeId::root(0).child(0).child(0)).unwrap();
        assert_eq!(node.parent(), Some(&NodeId::root(0).child(0)));
        assert!(tree.get(&NodeId::root(1)).unwrap().parent().is_none());
    }

    #[test]
    fn test_counts() {
        let mut tree = sample_tree();
        assert_eq!(tree.counts(), TaskCounts { total: 5, completed: 0 });

        tree.set_completed(&NodeId::root(0).child(1), true).unwrap();
        tree.set_completed(&NodeId::root(1), true).unwrap();
        let counts = tree.counts();
        assert_eq!(counts, TaskCounts { total: 5, completed: 2 });
        assert_eq!(counts.progress_string(), "[2/5]");
    }

    #[test]
    fn test_set_completed_unknown_node() {
        let mut tree = sample_tree();
        let missing = NodeId::root(9);
        assert_eq!(
            tree.set_completed(&missing, true),
            Err(TreeError::NodeNotFound(missing))
        );
    }

    #[test]
    fn test_toggle_completed() {
        let mut tree = sample_tree();
        let id = NodeId::root(1);
        assert_eq!(tree.toggle_completed(&id), Ok(true));
        assert_eq!(tree.toggle_completed(&id), Ok(false));
    }

    #[test]
    fn test_remove_subtree() {
        let mut tree = sample_tree();
        let removed = tree.remove_subtree(&NodeId::root(0).child(0));
        assert_eq!(removed, 2);
        assert_eq!(tree.len(), 3);
        let children: Vec<&str> = tree.children(&NodeId::root(0)).map(|n| n.title()).collect();
        assert_eq!(children, vec!["A1"]);
    }

    #[test]
    fn test_slots_not_reused_after_removal() {
        let mut tree = sample_tree();
        tree.remove_subtree(&NodeId::root(1));
        let id = tree.insert(None, "C".to_string()).unwrap();
        assert_eq!(id, NodeId::root(2));
    }

    #[test]
    fn test_counts_serialize_with_storage_names() {
        let json = serde_json::to_value(TaskCounts { total: 3, completed: 1 }).unwrap();
        assert_eq!(json, serde_json::json!({"stepCount": 3, "stepCompleteCount": 1}));
    }
}
