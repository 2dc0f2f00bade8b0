//! Output formatting: table or JSON.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use vaillant_api::ConnectionState;

use crate::cli::{ColorMode, OutputFormat};

pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Connection state label, colored when `color` is set.
pub fn state_label(state: ConnectionState, color: bool) -> String {
    let label = state.to_string();
    if !color {
        return label;
    }
    match state {
        ConnectionState::Subscribed => label.green().to_string(),
        ConnectionState::Connected | ConnectionState::Connecting => label.cyan().to_string(),
        ConnectionState::Disconnected => label.yellow().to_string(),
        ConnectionState::Stopped => label.red().to_string(),
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(format: OutputFormat, data: &[T], to_row: impl Fn(&T) -> R) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
    }
}

/// Render a single item; table mode uses the pre-formatted `detail_fn` view.
pub fn render_single<T>(format: OutputFormat, data: &T, detail_fn: impl Fn(&T) -> String) -> String
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

pub fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\":\"serialization failed: {e}\"}}"))
}
