//! Canonical filesystem layout for a batch root.

use std::path::PathBuf;

/// All canonical paths within a project root.
#[derive(Debug, Clone)]
pub struct BatchPaths {
    pub root: PathBuf,
    /// The durable work-item record.
    pub prompts_path: PathBuf,
    /// Output root; artifacts land at `pages/<id>/index.html`.
    pub pages_dir: PathBuf,
    /// Generator transcripts, one per attempted item.
    pub logs_dir: PathBuf,
    /// Optional runner tuning file.
    pub config_path: PathBuf,
}

impl BatchPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            prompts_path: root.join("prompts.json"),
            pages_dir: root.join("pages"),
            logs_dir: root.join(".pagegen").join("logs"),
            config_path: root.join("pagegen.toml"),
            root,
        }
    }

    /// Expected artifact location for a work item.
    pub fn artifact_path(&self, id: &str) -> PathBuf {
        self.pages_dir.join(id).join("index.html")
    }

    /// Generator transcript location for a work item.
    pub fn log_path(&self, id: &str) -> PathBuf {
        self.logs_dir.join(format!("{id}.log"))
    }
}
