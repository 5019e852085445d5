//! Sequential static page generation CLI.
//!
//! Reads an ordered prompt list (`prompts.json`), drives the generative
//! agent once per item to produce `pages/<id>/index.html`, and records
//! per-item status back into the list. Items whose artifact already exists
//! are skipped, so a rerun only does the remaining work.

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pagegen::batch::{BatchEvent, ItemOutcome, run_batch};
use pagegen::exit_codes;
use pagegen::io::config::{ClientConfig, load_config};
use pagegen::io::generator::ClaudeGenerator;
use pagegen::io::pacer::ThreadPacer;
use pagegen::io::paths::BatchPaths;
use pagegen::io::store::PromptStore;
use pagegen::logging;

#[derive(Parser)]
#[command(
    name = "pagegen",
    version,
    about = "Sequential static page generation runner"
)]
struct Cli {
    /// Project root containing prompts.json.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate a page for every item whose artifact does not exist yet.
    Run,
    /// Print per-item recorded status and artifact presence.
    Status,
    /// Check the prompt list against its schema and invariants.
    Validate,
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::INVALID);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = BatchPaths::new(&cli.root);
    match cli.command {
        Command::Run => cmd_run(&paths),
        Command::Status => cmd_status(&paths),
        Command::Validate => cmd_validate(&paths),
    }
}

fn cmd_run(paths: &BatchPaths) -> Result<()> {
    let cfg = load_config(&paths.config_path)?;
    let store = PromptStore::new(&paths.prompts_path);
    let generator = ClaudeGenerator::new(ClientConfig::from_env(), cfg.agent.command.clone());

    let tally = run_batch(paths, &store, &generator, &ThreadPacer, &cfg, |event| {
        print_event(paths, event);
    })?;

    println!();
    println!("completed: {}", tally.completed);
    println!("failed:    {}", tally.failed);
    println!("skipped:   {}", tally.skipped);
    println!("total:     {}", tally.total);
    println!("output root: {}", paths.pages_dir.display());
    Ok(())
}

fn print_event(paths: &BatchPaths, event: BatchEvent) {
    match event {
        BatchEvent::ItemStarted { id, prompt } => {
            println!("\n[{id}] generating");
            println!("[{id}] prompt: {prompt}");
        }
        BatchEvent::ItemSkipped { id } => {
            println!("\n[{id}] artifact exists, skipping");
        }
        BatchEvent::GenerationProgress { .. } => {
            print!(".");
            let _ = std::io::stdout().flush();
        }
        BatchEvent::ItemFinished { id, outcome, error } => match outcome {
            ItemOutcome::Completed => {
                println!("\n[{id}] done: {}", paths.artifact_path(&id).display());
            }
            ItemOutcome::Failed => {
                println!();
                eprintln!("[{id}] failed: {}", error.unwrap_or_default());
            }
            ItemOutcome::Skipped => {}
        },
        BatchEvent::Pausing { delay } => {
            println!("waiting {}ms before the next item", delay.as_millis());
        }
    }
}

fn cmd_status(paths: &BatchPaths) -> Result<()> {
    let store = PromptStore::new(&paths.prompts_path);
    let items = store.load()?;
    for item in &items {
        let artifact = if paths.artifact_path(&item.id).exists() {
            "artifact"
        } else {
            "-"
        };
        println!(
            "{:<24} {:<12} {artifact}",
            item.id,
            item.effective_status().as_str()
        );
    }
    Ok(())
}

fn cmd_validate(paths: &BatchPaths) -> Result<()> {
    let store = PromptStore::new(&paths.prompts_path);
    let items = store.load()?;
    println!("ok: {} items", items.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run() {
        let cli = Cli::parse_from(["pagegen", "run"]);
        assert!(matches!(cli.command, Command::Run));
        assert_eq!(cli.root, PathBuf::from("."));
    }

    #[test]
    fn parse_status_with_root() {
        let cli = Cli::parse_from(["pagegen", "--root", "/work", "status"]);
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.root, PathBuf::from("/work"));
    }

    #[test]
    fn parse_validate() {
        let cli = Cli::parse_from(["pagegen", "validate"]);
        assert!(matches!(cli.command, Command::Validate));
    }
}
