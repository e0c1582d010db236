//! Prompt System - template rendering
//!
//! Renders agent, condition and output templates with Handlebars.

mod render;

pub use render::PromptRenderer;
