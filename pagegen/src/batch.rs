//! Orchestration of a full sequential batch run.

use std::fs;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use crate::io::config::BatchConfig;
use crate::io::generator::{GenerateRequest, Generator, generate_and_verify};
use crate::io::pacer::Pacer;
use crate::io::paths::BatchPaths;
use crate::io::prompt::render_instruction;
use crate::io::store::PromptStore;
use crate::item::ItemStatus;

/// Terminal outcome of one item within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Artifact already existed; no generation call, no status mutation.
    Skipped,
    Completed,
    Failed,
}

/// Progress notifications emitted while the batch runs.
///
/// Presentation stays with the caller; the orchestrator only reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    /// An item is about to be dispatched to the generator.
    ItemStarted { id: String, prompt: String },
    /// The item's artifact already exists.
    ItemSkipped { id: String },
    /// One progress event arrived on the generation stream.
    GenerationProgress { id: String },
    /// The item reached a terminal outcome. `error` carries the formatted
    /// failure chain for failed items.
    ItemFinished {
        id: String,
        outcome: ItemOutcome,
        error: Option<String>,
    },
    /// The inter-item delay is starting.
    Pausing { delay: Duration },
}

/// Counters accumulated over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTally {
    pub completed: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Full input length, including skipped items.
    pub total: u32,
}

/// Run the whole batch sequentially, in load order.
///
/// Items whose artifact already exists are skipped without a status write;
/// the artifact is authoritative regardless of the recorded status. Every
/// other item is marked in progress, dispatched, then marked completed or
/// failed. Generation failures are contained to their item; only a store
/// that cannot be loaded, or a status that cannot be persisted, aborts the
/// run.
pub fn run_batch<G: Generator, P: Pacer>(
    paths: &BatchPaths,
    store: &PromptStore,
    generator: &G,
    pacer: &P,
    cfg: &BatchConfig,
    mut on_event: impl FnMut(BatchEvent),
) -> Result<BatchTally> {
    let items = store.load().context("load prompt list")?;
    fs::create_dir_all(&paths.pages_dir)
        .with_context(|| format!("create output root {}", paths.pages_dir.display()))?;

    info!(items = items.len(), root = %paths.root.display(), "starting batch");
    let delay = Duration::from_millis(cfg.inter_item_delay_ms);
    let timeout = cfg.generation_timeout_secs.map(Duration::from_secs);
    let mut tally = BatchTally {
        total: items.len() as u32,
        ..BatchTally::default()
    };

    for (index, item) in items.iter().enumerate() {
        let output_path = paths.artifact_path(&item.id);
        if output_path.exists() {
            info!(id = %item.id, "artifact exists, skipping");
            tally.skipped += 1;
            on_event(BatchEvent::ItemSkipped {
                id: item.id.clone(),
            });
            continue;
        }

        store
            .set_status(&item.id, ItemStatus::InProgress)
            .context("persist in_progress status")?;
        on_event(BatchEvent::ItemStarted {
            id: item.id.clone(),
            prompt: item.prompt.clone(),
        });

        let request = GenerateRequest {
            workdir: paths.root.clone(),
            instruction: render_instruction(&item.prompt, &output_path)?,
            output_path,
            log_path: paths.log_path(&item.id),
            timeout,
            output_limit_bytes: cfg.generator_output_limit_bytes,
        };
        let result = generate_and_verify(generator, &request, &mut |_event| {
            on_event(BatchEvent::GenerationProgress {
                id: item.id.clone(),
            });
        });

        let (outcome, error) = match result {
            Ok(()) => {
                tally.completed += 1;
                (ItemOutcome::Completed, None)
            }
            Err(err) => {
                error!(id = %item.id, err = format!("{err:#}"), "generation failed");
                tally.failed += 1;
                (ItemOutcome::Failed, Some(format!("{err:#}")))
            }
        };
        let status = match outcome {
            ItemOutcome::Completed => ItemStatus::Completed,
            _ => ItemStatus::Failed,
        };
        store
            .set_status(&item.id, status)
            .with_context(|| format!("persist terminal status for '{}'", item.id))?;
        on_event(BatchEvent::ItemFinished {
            id: item.id.clone(),
            outcome,
            error,
        });

        // Rate limiting against the remote endpoint. Skipped items never
        // pause.
        if index + 1 < items.len() {
            on_event(BatchEvent::Pausing { delay });
            pacer.pause(delay);
        }
    }

    info!(
        completed = tally.completed,
        failed = tally.failed,
        skipped = tally.skipped,
        "batch finished"
    );
    Ok(tally)
}
