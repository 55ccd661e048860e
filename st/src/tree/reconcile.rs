//! Merging repaired plan snapshots into a task tree
//!
//! Every chunk produces a fresh snapshot of the whole plan. The snapshot is
//! walked against the tree in lockstep by position: a position that already
//! has a node updates that node's title, a new position allocates a node.
//! Positions missing from an intermediate snapshot are left alone, because a
//! truncated document can briefly look shorter than what was already seen.
//! Only the final snapshot is allowed to remove anything.

use std::borrow::Cow;

use serde_json::Value;
use tracing::debug;

use super::{NodeId, TaskTree};

/// Field holding the ordered list of steps at every level
const STEPS_FIELD: &str = "steps";

/// Field holding a step's title
const TITLE_FIELD: &str = "title";

/// Whether a snapshot is one of many or the last word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Mid-stream snapshot: grow and update only
    Intermediate,
    /// Snapshot of the complete stream: also prune what never materialized
    Final,
}

/// What a reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub added: usize,
    pub updated: usize,
    pub pruned: usize,
}

impl ReconcileStats {
    pub fn is_unchanged(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.pruned == 0
    }
}

/// Result of reconciling one snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The snapshot had the expected shape and was merged
    Applied(ReconcileStats),
    /// The snapshot was not `{"steps": [...]}`; the tree was not touched
    /// except for the final prune of blank placeholders
    ShapeMismatch { pruned: usize },
}

impl ReconcileOutcome {
    pub fn stats(&self) -> ReconcileStats {
        match self {
            ReconcileOutcome::Applied(stats) => *stats,
            ReconcileOutcome::ShapeMismatch { pruned } => ReconcileStats {
                pruned: *pruned,
                ..ReconcileStats::default()
            },
        }
    }
}

/// Reconcile an intermediate snapshot into a copy of `previous`
pub fn reconcile(previous: &TaskTree, doc: &Value) -> TaskTree {
    let mut tree = previous.clone();
    tree.reconcile(doc, ReconcileMode::Intermediate);
    tree
}

/// Reconcile the final snapshot into a copy of `previous`
pub fn reconcile_final(previous: &TaskTree, doc: &Value) -> TaskTree {
    let mut tree = previous.clone();
    tree.reconcile(doc, ReconcileMode::Final);
    tree
}

/// One step as read from a snapshot
struct StepView<'a> {
    title: Cow<'a, str>,
    steps: &'a [Value],
}

impl<'a> StepView<'a> {
    /// Read a step leniently; anything that is not an object is a blank
    /// placeholder so that later positions stay aligned
    fn read(value: &'a Value) -> Self {
        let title = match value.get(TITLE_FIELD) {
            Some(Value::String(s)) => Cow::Borrowed(s.as_str()),
            Some(Value::Null) | None => Cow::Borrowed(""),
            Some(other) => Cow::Owned(other.to_string()),
        };
        let steps = value
            .get(STEPS_FIELD)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Self { title, steps }
    }
}

impl TaskTree {
    /// Merge a repaired snapshot into this tree
    ///
    /// Identities of existing nodes never change and `completed` is never
    /// written. In [`ReconcileMode::Final`], positions absent from the snapshot
    /// and blank leaves are removed afterwards.
    pub fn reconcile(&mut self, doc: &Value, mode: ReconcileMode) -> ReconcileOutcome {
        debug!(?mode, nodes = self.len(), "reconcile: called");
        let Some(steps) = doc.get(STEPS_FIELD).and_then(Value::as_array) else {
            debug!("reconcile: snapshot has no steps array, keeping tree");
            let pruned = match mode {
                ReconcileMode::Final => self.prune_placeholders(),
                ReconcileMode::Intermediate => 0,
            };
            return ReconcileOutcome::ShapeMismatch { pruned };
        };

        let mut stats = ReconcileStats::default();
        self.merge_level(None, steps, mode, &mut stats);

        if mode == ReconcileMode::Final {
            stats.pruned += self.prune_placeholders();
        }

        debug!(?stats, nodes = self.len(), "reconcile: done");
        ReconcileOutcome::Applied(stats)
    }

    fn merge_level(
        &mut self,
        parent: Option<&NodeId>,
        steps: &[Value],
        mode: ReconcileMode,
        stats: &mut ReconcileStats,
    ) {
        let existing = self.child_ids(parent);

        for (i, value) in steps.iter().enumerate() {
            let step = StepView::read(value);
            let id = match existing.get(i) {
                Some(id) => {
                    self.update_title(id, &step.title, mode, stats);
                    id.clone()
                }
                None => match self.insert(parent, step.title.into_owned()) {
                    Some(id) => {
                        stats.added += 1;
                        id
                    }
                    None => {
                        debug!(?parent, "merge_level: parent vanished, skipping");
                        return;
                    }
                },
            };
            self.merge_level(Some(&id), step.steps, mode, stats);
        }

        if mode == ReconcileMode::Final && existing.len() > steps.len() {
            for id in &existing[steps.len()..] {
                debug!(%id, "merge_level: pruning position absent from final snapshot");
                stats.pruned += self.remove_subtree(id);
            }
        }
    }

    fn update_title(&mut self, id: &NodeId, title: &str, mode: ReconcileMode, stats: &mut ReconcileStats) {
        let Some(node) = self.nodes.get_mut(id) else {
            return;
        };
        if node.title() == title {
            return;
        }
        // A shorter prefix mid-stream is a truncation artifact, not an edit
        if mode == ReconcileMode::Intermediate && node.title().starts_with(title) {
            debug!(%id, "update_title: ignoring shrink to prefix");
            return;
        }
        node.set_title(title.to_string());
        stats.updated += 1;
    }

    /// Remove blank leaves, bottom-up, so a parent left with only blank
    /// children goes too
    fn prune_placeholders(&mut self) -> usize {
        let roots = self.roots.clone();
        roots.iter().map(|id| self.prune_placeholders_from(id)).sum()
    }

    fn prune_placeholders_from(&mut self, id: &NodeId) -> usize {
        let children = self.child_ids(Some(id));
        let mut pruned: usize = children.iter().map(|child| self.prune_placeholders_from(child)).sum();

        if let Some(node) = self.nodes.get(id)
            && !node.has_children()
            && node.is_placeholder()
        {
            debug!(%id, "prune_placeholders_from: pruning blank leaf");
            pruned += self.remove_subtree(id);
        }
        pruned
    }
}
