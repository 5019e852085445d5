//! Work-item data model for the prompt list.

use serde::{Deserialize, Serialize};

/// Recorded processing status for a work item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }
}

/// A single entry of the prompt list.
///
/// Items are authored externally; the runner only ever mutates `status`.
/// Field order matches the on-disk record so a load/save cycle round-trips
/// byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier, also used verbatim as the output directory name.
    pub id: String,
    /// Free-text instruction passed to the generation capability.
    pub prompt: String,
    /// Recorded status. Absent means pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    /// Reserved. Round-tripped untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
}

impl WorkItem {
    /// Status with the absent-means-pending rule applied.
    pub fn effective_status(&self) -> ItemStatus {
        self.status.unwrap_or(ItemStatus::Pending)
    }
}

/// Check collection invariants, returning one message per violation.
pub fn validate_items(items: &[WorkItem]) -> Vec<String> {
    let mut errors = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for item in items {
        if !seen.insert(item.id.as_str()) {
            errors.push(format!("duplicate id '{}'", item.id));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::work_item;

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ItemStatus::InProgress).expect("serialize");
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn absent_status_is_pending() {
        let item = work_item("a", "prompt a");
        assert_eq!(item.effective_status(), ItemStatus::Pending);
    }

    #[test]
    fn absent_status_is_omitted_from_serialization() {
        let item = work_item("a", "prompt a");
        let json = serde_json::to_string(&item).expect("serialize");
        assert_eq!(json, "{\"id\":\"a\",\"prompt\":\"prompt a\"}");
    }

    #[test]
    fn validate_items_reports_duplicates() {
        let items = vec![
            work_item("a", "first"),
            work_item("b", "second"),
            work_item("a", "third"),
        ];
        let errors = validate_items(&items);
        assert_eq!(errors, vec!["duplicate id 'a'"]);
    }

    #[test]
    fn validate_items_accepts_unique_ids() {
        let items = vec![work_item("a", "first"), work_item("b", "second")];
        assert!(validate_items(&items).is_empty());
    }
}
