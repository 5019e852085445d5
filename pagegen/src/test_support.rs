//! Test-only helpers: scripted generation backends, a recording pacer, and
//! a temporary batch fixture.

use std::cell::{Ref, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};

use crate::io::config::{BatchConfig, write_config};
use crate::io::generator::{GenerateRequest, GenerationError, Generator};
use crate::io::pacer::Pacer;
use crate::io::paths::BatchPaths;
use crate::io::store::PromptStore;
use crate::item::WorkItem;

/// Create a deterministic work item with no status or folder.
pub fn work_item(id: &str, prompt: &str) -> WorkItem {
    WorkItem {
        id: id.to_string(),
        prompt: prompt.to_string(),
        status: None,
        folder: None,
    }
}

/// One scripted generation response.
pub struct ScriptedGen {
    /// Write the artifact before returning.
    pub write_artifact: bool,
    /// Stream events to surface before returning.
    pub events: u32,
    /// Error to return instead of success.
    pub error: Option<GenerationError>,
}

impl ScriptedGen {
    pub fn success() -> Self {
        Self {
            write_artifact: true,
            events: 1,
            error: None,
        }
    }

    pub fn failure(error: GenerationError) -> Self {
        Self {
            write_artifact: false,
            events: 0,
            error: Some(error),
        }
    }

    /// The backend "completes" without producing the artifact.
    pub fn silent_success() -> Self {
        Self {
            write_artifact: false,
            events: 1,
            error: None,
        }
    }
}

/// Record of one generator invocation.
pub struct RecordedCall {
    pub request: GenerateRequest,
    /// Raw store contents at the moment the call was made.
    pub store_snapshot: String,
}

/// Generator that replays scripted responses and records every call.
pub struct ScriptedGenerator {
    script: RefCell<VecDeque<ScriptedGen>>,
    calls: RefCell<Vec<RecordedCall>>,
    store_path: PathBuf,
}

impl ScriptedGenerator {
    pub fn new(store_path: impl Into<PathBuf>, script: Vec<ScriptedGen>) -> Self {
        Self {
            script: RefCell::new(script.into()),
            calls: RefCell::new(Vec::new()),
            store_path: store_path.into(),
        }
    }

    pub fn calls(&self) -> Ref<'_, Vec<RecordedCall>> {
        self.calls.borrow()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    /// Item directory names (the work-item ids) of the recorded calls.
    pub fn called_ids(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|call| {
                call.request
                    .output_path
                    .parent()
                    .and_then(Path::file_name)
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .collect()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, request: &GenerateRequest, on_event: &mut dyn FnMut(&str)) -> Result<()> {
        let store_snapshot = fs::read_to_string(&self.store_path).unwrap_or_default();
        self.calls.borrow_mut().push(RecordedCall {
            request: request.clone(),
            store_snapshot,
        });

        let Some(step) = self.script.borrow_mut().pop_front() else {
            bail!("scripted generator exhausted");
        };
        for _ in 0..step.events {
            on_event("{\"type\":\"progress\"}");
        }
        if step.write_artifact {
            if let Some(parent) = request.output_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&request.output_path, "<html></html>\n")?;
        }
        match step.error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Pacer that records pauses instead of sleeping.
#[derive(Default)]
pub struct RecordingPacer {
    pauses: RefCell<Vec<Duration>>,
}

impl RecordingPacer {
    pub fn pauses(&self) -> Vec<Duration> {
        self.pauses.borrow().clone()
    }
}

impl Pacer for RecordingPacer {
    fn pause(&self, duration: Duration) {
        self.pauses.borrow_mut().push(duration);
    }
}

/// Temporary batch root with a prompt list and default config.
pub struct TestBatch {
    temp: tempfile::TempDir,
    pub paths: BatchPaths,
}

impl TestBatch {
    pub fn new(items: &[WorkItem]) -> Result<Self> {
        let temp = tempfile::tempdir()?;
        let paths = BatchPaths::new(temp.path());
        PromptStore::new(&paths.prompts_path).save(items)?;
        write_config(&paths.config_path, &BatchConfig::default())?;
        Ok(Self { temp, paths })
    }

    pub fn root(&self) -> &Path {
        self.temp.path()
    }

    pub fn store(&self) -> PromptStore {
        PromptStore::new(&self.paths.prompts_path)
    }

    pub fn scripted_generator(&self, script: Vec<ScriptedGen>) -> ScriptedGenerator {
        ScriptedGenerator::new(&self.paths.prompts_path, script)
    }

    /// Pre-create an artifact so the item is treated as already complete.
    pub fn write_artifact(&self, id: &str) -> Result<()> {
        let path = self.paths.artifact_path(id);
        fs::create_dir_all(path.parent().expect("artifact parent"))?;
        fs::write(path, "<html></html>\n")?;
        Ok(())
    }
}
