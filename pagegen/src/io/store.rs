//! Prompt list load/save helpers with schema + invariant validation.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::debug;

use crate::item::{ItemStatus, WorkItem, validate_items};

const PROMPTS_SCHEMA: &str = include_str!("../../schemas/prompts.schema.json");

/// Raised when the durable record is unreadable or not a well-formed list
/// of work items. Fatal: the batch aborts before any item is processed.
#[derive(Debug)]
pub struct MalformedStoreError {
    pub path: PathBuf,
    pub reason: String,
}

impl fmt::Display for MalformedStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "malformed prompt list {}: {}",
            self.path.display(),
            self.reason
        )
    }
}

impl std::error::Error for MalformedStoreError {}

/// Handle to the durable work-item record.
///
/// All mutations go through full-collection read-modify-write. Single-writer
/// use is assumed; nothing here guards against concurrent external edits.
#[derive(Debug, Clone)]
pub struct PromptStore {
    path: PathBuf,
}

impl PromptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the ordered work-item collection (schema + invariants).
    pub fn load(&self) -> Result<Vec<WorkItem>> {
        let contents = fs::read_to_string(&self.path)
            .map_err(|err| self.malformed(format!("read: {err}")))?;
        let value: Value = serde_json::from_str(&contents)
            .map_err(|err| self.malformed(format!("parse json: {err}")))?;
        self.validate_schema(&value)?;
        let items: Vec<WorkItem> = serde_json::from_value(value)
            .map_err(|err| self.malformed(format!("deserialize: {err}")))?;
        let errors = validate_items(&items);
        if !errors.is_empty() {
            return Err(self.malformed(errors.join("; ")).into());
        }
        debug!(items = items.len(), "prompt list loaded");
        Ok(items)
    }

    /// Write the full ordered collection back to disk.
    ///
    /// Complete overwrite (temp file + rename), never an append, so removed
    /// or reordered items are reflected exactly.
    pub fn save(&self, items: &[WorkItem]) -> Result<()> {
        let mut buf = serde_json::to_string_pretty(items).context("serialize prompt list")?;
        buf.push('\n');
        write_atomic(&self.path, &buf)
    }

    /// Mutate a single item's status and persist the collection.
    ///
    /// No-op (no write) when `id` is not present.
    pub fn set_status(&self, id: &str, status: ItemStatus) -> Result<()> {
        let mut items = self.load()?;
        let Some(item) = items.iter_mut().find(|item| item.id == id) else {
            debug!(id, "set_status: id not found, record left untouched");
            return Ok(());
        };
        item.status = Some(status);
        self.save(&items)
            .with_context(|| format!("persist status {} for '{id}'", status.as_str()))
    }

    fn malformed(&self, reason: String) -> MalformedStoreError {
        MalformedStoreError {
            path: self.path.clone(),
            reason,
        }
    }

    fn validate_schema(&self, instance: &Value) -> Result<()> {
        let schema: Value =
            serde_json::from_str(PROMPTS_SCHEMA).context("parse embedded prompts schema")?;
        let compiled =
            validator_for(&schema).map_err(|err| anyhow!("invalid embedded schema: {err}"))?;
        if !compiled.is_valid(instance) {
            let messages = compiled
                .iter_errors(instance)
                .map(|err| err.to_string())
                .collect::<Vec<_>>();
            return Err(self
                .malformed(format!("schema validation failed: {}", messages.join("; ")))
                .into());
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("prompt list path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp prompt list {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace prompt list {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::work_item;

    fn store_in(dir: &Path) -> PromptStore {
        PromptStore::new(dir.join("prompts.json"))
    }

    /// Verifies save → load → save round-trips byte for byte, preserving
    /// item order and field presence.
    #[test]
    fn save_load_round_trip_preserves_order_and_bytes() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());

        let mut second = work_item("b", "second prompt");
        second.status = Some(ItemStatus::Completed);
        second.folder = Some("b-folder".to_string());
        let items = vec![work_item("z", "first prompt"), second];

        store.save(&items).expect("save");
        let first_bytes = fs::read_to_string(store.path()).expect("read");
        let loaded = store.load().expect("load");
        assert_eq!(loaded, items);

        store.save(&loaded).expect("save again");
        let second_bytes = fs::read_to_string(store.path()).expect("read");
        assert_eq!(first_bytes, second_bytes);
    }

    /// Guards against accidental changes to the on-disk record format.
    #[test]
    fn serialization_format_is_stable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());

        let mut item = work_item("a", "prompt a");
        item.status = Some(ItemStatus::InProgress);
        store.save(&[item]).expect("save");

        let contents = fs::read_to_string(store.path()).expect("read");
        let expected = "[\n  {\n    \"id\": \"a\",\n    \"prompt\": \"prompt a\",\n    \"status\": \"in_progress\"\n  }\n]\n";
        assert_eq!(contents, expected);
    }

    #[test]
    fn load_rejects_non_list_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());
        fs::write(store.path(), "{\"id\": \"a\"}\n").expect("write");

        let err = store.load().unwrap_err();
        let malformed = err
            .downcast_ref::<MalformedStoreError>()
            .expect("expected MalformedStoreError");
        assert!(malformed.reason.contains("schema validation failed"));
    }

    #[test]
    fn load_rejects_item_missing_prompt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());
        fs::write(store.path(), "[{\"id\": \"a\"}]\n").expect("write");

        let err = store.load().unwrap_err();
        assert!(err.downcast_ref::<MalformedStoreError>().is_some());
    }

    #[test]
    fn load_rejects_duplicate_ids() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());
        store
            .save(&[work_item("a", "one"), work_item("a", "two")])
            .expect("save");

        let err = store.load().unwrap_err();
        let malformed = err
            .downcast_ref::<MalformedStoreError>()
            .expect("expected MalformedStoreError");
        assert!(malformed.reason.contains("duplicate id 'a'"));
    }

    #[test]
    fn set_status_mutates_only_the_matching_item() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());
        store
            .save(&[work_item("a", "one"), work_item("b", "two")])
            .expect("save");

        store
            .set_status("b", ItemStatus::InProgress)
            .expect("set status");

        let items = store.load().expect("load");
        assert_eq!(items[0].status, None);
        assert_eq!(items[1].status, Some(ItemStatus::InProgress));
    }

    #[test]
    fn set_status_is_noop_for_unknown_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());
        store.save(&[work_item("a", "one")]).expect("save");
        let before = fs::read_to_string(store.path()).expect("read");

        store
            .set_status("missing", ItemStatus::Failed)
            .expect("set status");

        let after = fs::read_to_string(store.path()).expect("read");
        assert_eq!(before, after);
    }

    #[test]
    fn save_is_a_complete_overwrite() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = store_in(temp.path());
        store
            .save(&[work_item("a", "one"), work_item("b", "two")])
            .expect("save");

        store.save(&[work_item("b", "two")]).expect("save shorter");

        let items = store.load().expect("load");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "b");
    }
}
