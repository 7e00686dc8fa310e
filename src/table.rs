//! Plain-text table rendering for terminal output.

use std::borrow::Cow;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Align {
    #[default]
    Left,
    Right,
}

/// Renders `rows` under `headers` with two-space gutters. Columns listed as
/// [`Align::Right`] in `align` are right-justified; missing entries default
/// to left.
pub fn render_table(headers: &[String], rows: &[Vec<String>], align: &[Align]) -> String {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(cell));
        }
    }
    for width in &mut widths {
        *width = (*width).max(1);
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &[]));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths, &[]));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, align));
    }
    output
}

/// Two-column key/value listing used for stat cards and summaries.
pub fn render_pairs(pairs: &[(String, String)]) -> String {
    let width = pairs
        .iter()
        .map(|(key, _)| display_width(key))
        .max()
        .unwrap_or(0);
    let mut output = String::new();
    for (key, value) in pairs {
        let padding = width.saturating_sub(display_width(key));
        let _ = writeln!(output, "{key}:{}  {value}", " ".repeat(padding));
    }
    output
}

fn format_row(values: &[String], widths: &[usize], align: &[Align]) -> String {
    let mut cells = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate().take(widths.len()) {
        let sanitized = sanitize_cell(value);
        let padding = " ".repeat(widths[idx].saturating_sub(display_width(&sanitized)));
        let cell = match align.get(idx).copied().unwrap_or_default() {
            Align::Left => format!("{sanitized}{padding}"),
            Align::Right => format!("{padding}{sanitized}"),
        };
        cells.push(cell);
    }
    cells.join("  ").trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(
            value
                .chars()
                .map(|ch| if matches!(ch, '\n' | '\r' | '\t') { ' ' } else { ch })
                .collect(),
        )
    } else {
        Cow::Borrowed(value)
    }
}
