//! Error rendering for vidgate.
//!
//! Styled terminal output with fix suggestions, plain text for pipes, and a
//! JSON object for robot formats.

use colored::Colorize;

use crate::cli::args::OutputFormat;
use crate::error::{FixSuggestion, GateError};

// =============================================================================
// Public API
// =============================================================================

/// Render an error for stderr.
///
/// Styled output is used only for the human format when color is allowed
/// and stderr is a terminal. JSON and Markdown formats get a JSON object.
#[must_use]
pub fn render_error(error: &GateError, format: OutputFormat, no_color: bool, pretty: bool) -> String {
    match format {
        OutputFormat::Json => return render_error_json(error, pretty),
        OutputFormat::Md => return render_error_json(error, true),
        OutputFormat::Human => {}
    }

    if !no_color && crate::util::env::stderr_is_tty() {
        render_styled(error)
    } else {
        render_simple(error)
    }
}

/// Render error as structured JSON.
#[must_use]
pub fn render_error_json(error: &GateError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error))
}

// =============================================================================
// Styled Rendering
// =============================================================================

fn render_styled(error: &GateError) -> String {
    let suggestions = error.fix_suggestions();
    let mut lines = vec![
        format!("{} {}", error.category().to_string().red().bold(), format!("[{}]", error.error_code()).dimmed()),
        format!("  {}", error.to_string().red()),
    ];

    if !suggestions.is_empty() {
        lines.push(String::new());
        lines.push(suggestions_section(&suggestions));
    }

    if let Some(first) = suggestions.first() {
        if !first.context.is_empty() {
            lines.push(String::new());
            lines.push("Why this happened:".yellow().bold().to_string());
            lines.extend(wrap_text(&first.context, 64).into_iter().map(|l| format!("  {l}")));
        }
        if let Some(prevention) = &first.prevention {
            lines.push(String::new());
            lines.push("Prevention:".green().bold().to_string());
            lines.extend(wrap_text(prevention, 64).into_iter().map(|l| format!("  {l}")));
        }
        if let Some(url) = &first.doc_url {
            lines.push(String::new());
            lines.push(format!("{} {}", "Docs:".dimmed(), url.underline()));
        }
    }

    lines.join("\n")
}

fn suggestions_section(suggestions: &[FixSuggestion]) -> String {
    let mut lines = vec!["How to fix:".cyan().bold().to_string()];
    for (i, suggestion) in suggestions.iter().enumerate() {
        for (j, cmd) in suggestion.commands.iter().enumerate() {
            let prefix = if j == 0 {
                format!("  {}. ", i + 1)
            } else {
                "     Or: ".to_string()
            };
            lines.push(format!("{prefix}{}", cmd.cyan()));
        }
    }
    lines.join("\n")
}

// =============================================================================
// Simple Text Rendering
// =============================================================================

/// Plain text: one header line and the first runnable fix.
fn render_simple(error: &GateError) -> String {
    let mut lines = vec![format!("Error [{}]: {}", error.error_code(), error)];

    let fix = error
        .fix_suggestions()
        .into_iter()
        .flat_map(|s| s.commands)
        .find(|cmd| !cmd.starts_with('#'));
    if let Some(cmd) = fix {
        lines.push(format!("Fix: {cmd}"));
    }

    lines.join("\n")
}

// =============================================================================
// JSON Rendering
// =============================================================================

#[derive(serde::Serialize)]
struct ErrorJson {
    error_code: &'static str,
    category: String,
    message: String,
    exit_code: i32,
    is_transient: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
    suggestions: Vec<SuggestionJson>,
}

#[derive(serde::Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prevention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    doc_url: Option<String>,
}

impl ErrorJson {
    fn from_error(error: &GateError) -> Self {
        Self {
            error_code: error.error_code(),
            category: error.category().to_string(),
            message: error.to_string(),
            exit_code: error.exit_code().into(),
            is_transient: error.is_transient(),
            provider: error.provider().map(String::from),
            retry_after_seconds: error.retry_after().map(|d| d.as_secs()),
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(|s| SuggestionJson {
                    commands: s.commands,
                    context: s.context,
                    prevention: s.prevention,
                    doc_url: s.doc_url,
                })
                .collect(),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
