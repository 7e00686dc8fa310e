//! Inventory export as CSV or as an HTML table that spreadsheet tools open
//! as an `.xls` workbook.

use std::fmt::Write as _;

use anyhow::{Context, Result};
use clap::ValueEnum;
use csv::{QuoteStyle, Terminator};

use crate::model::DatabaseRecord;

pub const EXPORT_HEADERS: [&str; 18] = [
    "Provider",
    "Service",
    "Engine",
    "Version",
    "Region",
    "Endpoint",
    "Storage (GB)",
    "Status",
    "Subscription",
    "Tags",
    "Azure Tenant",
    "Availability Zone",
    "Auto Scaling",
    "IOPS",
    "High Availability",
    "Replica",
    "Backup Retention (Days)",
    "Geo-Redundant Backup",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv;charset=utf-8;",
            ExportFormat::Excel => "application/vnd.ms-excel",
        }
    }

    pub fn default_filename(self) -> &'static str {
        match self {
            ExportFormat::Csv => "inventory-export.csv",
            ExportFormat::Excel => "inventory-export.xls",
        }
    }

    pub fn encode(self, records: &[&DatabaseRecord]) -> Result<String> {
        match self {
            ExportFormat::Csv => to_csv(records),
            ExportFormat::Excel => Ok(to_excel_html(records)),
        }
    }
}

fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Cell values in [`EXPORT_HEADERS`] order. Missing values are empty.
pub fn export_row(record: &DatabaseRecord) -> Vec<String> {
    vec![
        record.provider.to_string(),
        record.service.clone(),
        record.engine.clone(),
        opt(&record.version),
        record.region.clone(),
        record.endpoint.clone(),
        record.storage_gb.to_string(),
        record.status.to_string(),
        record.subscription.clone(),
        record.joined_tags(),
        opt(&record.azure_tenant),
        opt(&record.availability_zone),
        opt(&record.auto_scaling),
        opt(&record.iops),
        opt(&record.high_availability_state),
        opt(&record.replica),
        opt(&record.backup_retention_days),
        opt(&record.geo_redundant_backup),
    ]
}

/// Comma-separated export with `\n` line breaks and no trailing newline.
/// Fields containing a comma, quote or line break are quoted with inner
/// quotes doubled. An empty record set encodes to an empty string.
pub fn to_csv(records: &[&DatabaseRecord]) -> Result<String> {
    if records.is_empty() {
        return Ok(String::new());
    }
    let mut writer = csv::WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(EXPORT_HEADERS)
        .context("Writing export headers")?;
    for record in records {
        writer
            .write_record(export_row(record))
            .with_context(|| format!("Writing export row for {}", record.id))?;
    }
    let bytes = writer.into_inner().context("Finishing CSV export")?;
    let mut text = String::from_utf8(bytes).context("CSV export is not valid UTF-8")?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

const EXCEL_PREAMBLE: &str = r#"<html xmlns:o="urn:schemas-microsoft-com:office:office" xmlns:x="urn:schemas-microsoft-com:office:excel">
<head>
<meta charset="utf-8">
<style>
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ddd; padding: 8px; text-align: left; }
th { background-color: #4CAF50; color: white; font-weight: bold; }
</style>
</head>
<body>
"#;

/// HTML table in the layout Excel imports from `.xls` files.
pub fn to_excel_html(records: &[&DatabaseRecord]) -> String {
    let mut html = String::from(EXCEL_PREAMBLE);
    html.push_str("<table>\n<thead>\n<tr>");
    for header in EXPORT_HEADERS {
        let _ = write!(html, "<th>{}</th>", escape_html(header));
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    for record in records {
        html.push_str("<tr>");
        for cell in export_row(record) {
            let _ = write!(html, "<td>{}</td>", escape_html(&cell));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    html
}
