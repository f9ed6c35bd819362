//! Default prompt templates sent to the downstream completion model.

use serde::Deserialize;

/// Prompt used to summarize a merge request from its change index.
pub const DEFAULT_SUMMARY_PROMPT: &str = "\
You are a helpful assistant. Always answer as helpfully as possible.
What are the major code changes?
In your output, first list the code changes in order.
Second, add a concise paragraph which summarizes the overall changes.
";

/// Prompt asking the model to rewrite the documentation affected by the
/// changes in `change_log` (the persisted change-log text).
pub fn updated_documentation_prompt(change_log: &str) -> String {
    format!(
        "\
You are a helpful assistant. Always answer as helpfully as possible.
As a technical writer specializing in developer documentation, your task is
to update the outdated parts of the documentation.

Use the following step-by-step instructions to respond to user inputs.
Step 1 - The user provides a code-change report from a git merge request,
delimited by ###. Analyse the changes and identify the major code changes
that can be part of the current technical documentation.
Step 2 - Based on Step 1, find the parts of the current technical
documentation that are closely related to the given code changes.
Step 3 - Update all the identified parts of the documentation according to
the new code change. When replacing an old code example, also update the
description of that example.

###
{change_log}
###

Your response must contain the full content of the updated documentation
section, at least 50 lines. Include at least 10 lines of the existing
documentation before and after the updated content. Match the style used in
the rest of the documentation: titles, subtitles, code examples and tables.
"
    )
}

/// Which built-in template a prompt request falls back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Rewrite the documentation affected by the change log.
    #[default]
    Documentation,
    /// Summarize the merge request.
    Summary,
}

impl PromptKind {
    /// Render this template for a merge request whose change log is `change_log`.
    pub fn render(self, change_log: &str) -> String {
        match self {
            PromptKind::Documentation => updated_documentation_prompt(change_log),
            PromptKind::Summary => DEFAULT_SUMMARY_PROMPT.to_string(),
        }
    }
}

/// Use `custom` when it is non-blank, otherwise the rendered default.
pub fn choose_prompt(custom: Option<&str>, default: impl FnOnce() -> String) -> String {
    match custom {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => default(),
    }
}
