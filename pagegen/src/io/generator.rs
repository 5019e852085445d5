//! Generation client for agent invocation.
//!
//! The [`Generator`] trait decouples batch orchestration from the actual
//! agent backend (currently the `claude` CLI in permission-bypass mode).
//! Tests use scripted generators that produce artifacts without spawning
//! processes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::io::config::ClientConfig;
use crate::io::process::{CommandOutput, run_command_streaming};

/// Parameters for a single generation invocation.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    /// Working directory for the agent process.
    pub workdir: PathBuf,
    /// Rendered instruction fed to the agent.
    pub instruction: String,
    /// Path where the agent must write the artifact.
    pub output_path: PathBuf,
    /// Path to write the agent stdout/stderr transcript.
    pub log_path: PathBuf,
    /// Per-item deadline. `None` waits without bound.
    pub timeout: Option<Duration>,
    /// Truncate the transcript beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Why a single generation attempt failed. Never process-fatal: the
/// orchestrator logs it, marks the item failed, and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationErrorKind {
    /// The agent could not be driven to completion (spawn, stream, or exit
    /// failure).
    Capability,
    /// The agent reported completion but no artifact appeared.
    MissingArtifact,
    /// The configured per-item deadline elapsed.
    TimedOut,
}

#[derive(Debug)]
pub struct GenerationError {
    kind: GenerationErrorKind,
    message: String,
}

impl GenerationError {
    pub fn capability(message: impl Into<String>) -> Self {
        Self {
            kind: GenerationErrorKind::Capability,
            message: message.into(),
        }
    }

    pub fn missing_artifact(path: &Path) -> Self {
        Self {
            kind: GenerationErrorKind::MissingArtifact,
            message: format!("no artifact at {}", path.display()),
        }
    }

    pub fn timed_out(timeout: Option<Duration>) -> Self {
        let message = match timeout {
            Some(t) => format!("generation timed out after {t:?}"),
            None => "generation timed out".to_string(),
        };
        Self {
            kind: GenerationErrorKind::TimedOut,
            message,
        }
    }

    pub fn kind(&self) -> GenerationErrorKind {
        self.kind
    }
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GenerationError {}

/// Abstraction over generation backends.
pub trait Generator {
    /// Drive the agent for one item, invoking `on_event` once per progress
    /// event from its output stream. Must write the artifact to
    /// `request.output_path` on success.
    fn generate(&self, request: &GenerateRequest, on_event: &mut dyn FnMut(&str)) -> Result<()>;
}

/// Generator that spawns the `claude` CLI.
///
/// The instruction goes in on stdin; every stdout line is one stream event.
/// Connection parameters travel through the child environment, so the same
/// binary works against any Anthropic-compatible endpoint.
pub struct ClaudeGenerator {
    command: Vec<String>,
    client: ClientConfig,
}

impl ClaudeGenerator {
    pub fn new(client: ClientConfig, command: Vec<String>) -> Self {
        Self { command, client }
    }
}

impl Generator for ClaudeGenerator {
    #[instrument(skip_all, fields(output_path = %request.output_path.display()))]
    fn generate(&self, request: &GenerateRequest, on_event: &mut dyn FnMut(&str)) -> Result<()> {
        info!(workdir = %request.workdir.display(), "starting agent generation");

        let program = self
            .command
            .first()
            .ok_or_else(|| anyhow!("agent command is empty"))?;
        if let Some(parent) = request.output_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create output dir {}", parent.display()))?;
        }

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..])
            .arg("--print")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--verbose")
            .arg("--permission-mode")
            .arg("bypassPermissions")
            // Unattended run: the agent writes the artifact itself.
            .arg("--dangerously-skip-permissions")
            .current_dir(&request.workdir)
            .env("ANTHROPIC_API_KEY", &self.client.auth_token)
            .env("ANTHROPIC_AUTH_TOKEN", &self.client.auth_token)
            .env("ANTHROPIC_BASE_URL", &self.client.base_url)
            .env("ANTHROPIC_MODEL", &self.client.model);

        let output = run_command_streaming(
            cmd,
            Some(request.instruction.as_bytes()),
            request.timeout,
            request.output_limit_bytes,
            on_event,
        )
        .context("run agent command")?;

        write_generator_log(&request.log_path, &output)?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.map(|t| t.as_secs()), "agent timed out");
            return Err(GenerationError::timed_out(request.timeout).into());
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "agent command failed");
            return Err(GenerationError::capability(format!(
                "agent exited with status {:?}",
                output.status.code()
            ))
            .into());
        }

        debug!("agent generation completed");
        Ok(())
    }
}

/// Drive a generator and verify the artifact was produced.
///
/// Artifact existence is the sole success criterion; content is not
/// inspected.
pub fn generate_and_verify<G: Generator>(
    generator: &G,
    request: &GenerateRequest,
    on_event: &mut dyn FnMut(&str),
) -> Result<()> {
    generator.generate(request, on_event)?;
    if !request.output_path.exists() {
        return Err(GenerationError::missing_artifact(&request.output_path).into());
    }
    Ok(())
}

fn write_generator_log(path: &Path, output: &CommandOutput) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create generator log dir {}", parent.display()))?;
    }
    let mut buf = String::new();
    buf.push_str("=== stdout ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stdout));
    buf.push_str("\n=== stderr ===\n");
    buf.push_str(&String::from_utf8_lossy(&output.stderr));
    buf.push_str(&output.truncated_notice("agent"));
    if output.timed_out {
        buf.push_str("\n[agent timed out]\n");
    }
    fs::write(path, buf).with_context(|| format!("write generator log {}", path.display()))
}
