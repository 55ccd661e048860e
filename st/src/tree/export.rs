//! Snapshot of a tree for storage and for feeding back to the model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{NodeId, TaskTree};

/// One stored step with a globally unique identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub uuid: Uuid,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_id: Option<Uuid>,
    pub title: String,
    pub is_completed: bool,
    #[serde(default)]
    pub steps: Vec<StepRecord>,
}

/// A whole tree ready to be written out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeExport {
    pub steps: Vec<StepRecord>,
    pub step_count: usize,
    pub step_complete_count: usize,
    pub exported_at: DateTime<Utc>,
}

impl TaskTree {
    /// Convert the tree into records, assigning a fresh UUID to every node
    pub fn to_records(&self) -> Vec<StepRecord> {
        self.root_nodes()
            .filter_map(|node| self.record_from(node.id(), None))
            .collect()
    }

    fn record_from(&self, id: &NodeId, parent: Option<Uuid>) -> Option<StepRecord> {
        let node = self.nodes.get(id)?;
        let uuid = Uuid::now_v7();
        Some(StepRecord {
            uuid,
            parent_id: parent,
            title: node.title().to_string(),
            is_completed: node.is_completed(),
            steps: node
                .children()
                .iter()
                .filter_map(|child| self.record_from(child, Some(uuid)))
                .collect(),
        })
    }

    /// Records plus aggregate counts and a timestamp
    pub fn export(&self) -> TreeExport {
        let counts = self.counts();
        TreeExport {
            steps: self.to_records(),
            step_count: counts.total,
            step_complete_count: counts.completed,
            exported_at: Utc::now(),
        }
    }

    /// The tree in the same `{"steps": [{"title", "steps"}]}` shape the model
    /// produces, without identities or completion
    pub fn to_document(&self) -> Value {
        json!({ "steps": self.document_level(&self.roots) })
    }

    fn document_level(&self, ids: &[NodeId]) -> Vec<Value> {
        ids.iter()
            .filter_map(|id| self.nodes.get(id))
            .map(|node| {
                json!({
                    "title": node.title(),
                    "steps": self.document_level(node.children()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::reconcile_final;

    fn plan() -> TaskTree {
        let doc = json!({
            "steps": [
                {"title": "Pick a city", "steps": [{"title": "Compare rents", "steps": []}]},
                {"title": "Book movers", "steps": []}
            ]
        });
        reconcile_final(&TaskTree::new(), &doc)
    }

    #[test]
    fn test_to_document_matches_model_shape() {
        let tree = plan();
        assert_eq!(
            tree.to_document(),
            json!({
                "steps": [
                    {"title": "Pick a city", "steps": [{"title": "Compare rents", "steps": []}]},
                    {"title": "Book movers", "steps": []}
                ]
            })
        );
    }

    #[test]
    fn test_to_document_reconciles_to_same_tree() {
        let tree = plan();
        let again = reconcile_final(&TaskTree::new(), &tree.to_document());
        assert_eq!(again, tree);
    }

    #[test]
    fn test_records_link_parents() {
        let records = plan().to_records();
        assert_eq!(records.len(), 2);
        assert!(records[0].parent_id.is_none());
        assert_eq!(records[0].steps[0].parent_id, Some(records[0].uuid));
        assert_ne!(records[0].uuid, records[1].uuid);
    }

    #[test]
    fn test_export_counts_and_field_names() {
        let mut tree = plan();
        tree.set_completed(&NodeId::root(1), true).unwrap();
        let export = tree.export();

        assert_eq!(export.step_count, 3);
        assert_eq!(export.step_complete_count, 1);

        let value = serde_json::to_value(&export).unwrap();
        assert!(value.get("stepCount").is_some());
        assert!(value.get("exportedAt").is_some());
        assert_eq!(value["steps"][1]["isCompleted"], json!(true));
        assert!(value["steps"][0].get("parentId").is_none());
        assert!(value["steps"][0]["steps"][0].get("parentId").is_some());
    }
}
