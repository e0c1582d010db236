//! Prompt Renderer - Render templates with context variables using Handlebars
//!
//! Used for agent system prompts, agent node task prompts, condition prompts
//! and output node messages. Missing variables render as empty strings.

use std::collections::BTreeMap;

use handlebars::Handlebars;
use serde::Serialize;
use serde_json::Value;

use crate::error::{AgentflowError, Result};

/// Renders prompt templates using Handlebars templating
pub struct PromptRenderer {
    handlebars: Handlebars<'static>,
}

impl Default for PromptRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptRenderer {
    /// Create a new PromptRenderer with default settings
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        // Prompts are plain text, never HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }

    /// Render a template string with a JSON context
    pub fn render_json(&self, template: &str, context: &Value) -> Result<String> {
        self.render_with(template, context)
    }

    /// Render a template string with any serializable context
    pub fn render_with<T: Serialize>(&self, template: &str, context: &T) -> Result<String> {
        self.handlebars
            .render_template(template, context)
            .map_err(|e| AgentflowError::Template(format!("failed to render template: {}", e)))
    }

    /// Render an agent system prompt and append its persisted memory
    pub fn render_system_prompt(
        &self,
        template: &str,
        context: &Value,
        memory: &BTreeMap<String, String>,
    ) -> Result<String> {
        let rendered = self.render_json(template, context)?;
        if memory.is_empty() {
            return Ok(rendered);
        }

        let mut out = rendered;
        out.push_str("\n\n## Memory\n");
        for (key, value) in memory {
            out.push_str(&format!("- {}: {}\n", key, value));
        }
        Ok(out)
    }
}
