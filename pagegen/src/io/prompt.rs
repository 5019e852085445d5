//! Instruction rendering for the generation agent.

use std::path::Path;

use anyhow::{Context, Result};
use minijinja::{Environment, context};

/// Instruction sent to the agent for each item. The agent writes the file
/// itself; the runner only checks it exists afterwards.
const INSTRUCTION_TEMPLATE: &str = "Use the ui-ux-pro-max skill. {{ prompt }}\n\nWhen the page is finished, save it to \"{{ output_path }}\".";

/// Render the per-item instruction from the item prompt and the absolute
/// artifact path.
pub fn render_instruction(prompt: &str, output_path: &Path) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("instruction", INSTRUCTION_TEMPLATE)
        .context("parse instruction template")?;
    let template = env.get_template("instruction")?;
    let rendered = template.render(context! {
        prompt => prompt,
        output_path => output_path.display().to_string(),
    })?;
    Ok(rendered)
}
