//! Interactive OCR engine selection on the terminal.

use console::{Term, style};
use tracing::warn;

use doctext_core::{AutoSelector, EngineChoice, EngineKind, EngineSelector, Error, Result};

/// Asks the user which engine to use, and for a template when llm-caller is chosen.
///
/// Without a terminal it falls back to automatic selection.
pub struct PromptSelector {
    has_template: bool,
}

impl PromptSelector {
    pub fn new(has_template: bool) -> Self {
        Self { has_template }
    }

    fn prompt_engine(&self, term: &Term, available: &[EngineKind]) -> Result<EngineKind> {
        term.write_line("")?;
        term.write_line(&format!("{}", style("OCR engine selection").bold()))?;
        for (i, kind) in available.iter().enumerate() {
            term.write_line(&format!("  {}. {}", i + 1, kind.description()))?;
        }

        loop {
            term.write_str(&format!("Select OCR engine (1-{}): ", available.len()))?;
            let input = term.read_line()?;
            match input.trim().parse::<usize>() {
                Ok(choice) if (1..=available.len()).contains(&choice) => {
                    let kind = available[choice - 1];
                    term.write_line(&format!(
                        "{} Selected: {}",
                        style("✓").green(),
                        kind.description()
                    ))?;
                    return Ok(kind);
                }
                _ => term.write_line(&format!(
                    "Invalid choice. Please enter a number between 1 and {}.",
                    available.len()
                ))?,
            }
        }
    }

    fn prompt_template(&self, term: &Term) -> Result<String> {
        term.write_line("llm-caller needs a template naming the model and prompt to use.")?;
        loop {
            term.write_str("Enter LLM template name: ")?;
            let input = term.read_line()?;
            let template = input.trim();
            if !template.is_empty() {
                return Ok(template.to_string());
            }
            term.write_line("Template name cannot be empty.")?;
        }
    }
}

impl EngineSelector for PromptSelector {
    fn select(&self, available: &[EngineKind]) -> Result<EngineChoice> {
        let term = Term::stderr();
        if !term.is_term() {
            warn!("No terminal available for engine selection, choosing automatically");
            let choice = AutoSelector.select(available)?;
            if choice.kind == EngineKind::LlmCaller && !self.has_template {
                return Err(Error::config(
                    "llm-caller is the only available engine but no template is configured",
                ));
            }
            return Ok(choice);
        }

        let kind = self.prompt_engine(&term, available)?;
        let llm_template = if kind == EngineKind::LlmCaller && !self.has_template {
            Some(self.prompt_template(&term)?)
        } else {
            None
        };
        term.write_line("")?;
        Ok(EngineChoice { kind, llm_template })
    }
}
