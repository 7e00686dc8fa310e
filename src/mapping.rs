//! Header-to-field mapping for CSV imports.
//!
//! Cloud console exports name the same attribute in many ways ("Service",
//! "service_name", "DB Service", "DBInstanceIdentifier"). Each canonical
//! field lists its accepted spellings in priority order; headers are
//! normalised to snake_case before comparison so case, punctuation and
//! camelCase differences do not matter.

use std::collections::BTreeMap;

use heck::ToSnakeCase;
use log::debug;

const BOM: char = '\u{feff}';

/// A canonical attribute and the header spellings that feed it.
#[derive(Debug, Clone, Copy)]
pub struct CanonicalField {
    pub name: &'static str,
    pub synonyms: &'static [&'static str],
    pub required: bool,
}

impl CanonicalField {
    pub const fn required(name: &'static str, synonyms: &'static [&'static str]) -> Self {
        Self {
            name,
            synonyms,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, synonyms: &'static [&'static str]) -> Self {
        Self {
            name,
            synonyms,
            required: false,
        }
    }
}

/// Normalises a raw header: strips a byte-order mark and whitespace, then
/// converts to snake_case ("computerName" -> "computer_name",
/// "Storage (GB)" -> "storage_gb").
pub fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches(BOM).trim().to_snake_case()
}

fn squash(value: &str) -> String {
    value.chars().filter(|ch| *ch != '_').collect()
}

fn header_matches(normalized: &str, synonym: &str) -> bool {
    if normalized.is_empty() {
        return false;
    }
    normalized == synonym || squash(normalized) == squash(synonym)
}

/// Resolved mapping from canonical field name to source columns.
///
/// Every matching column is kept, ordered by synonym priority and then by
/// position; the first one is the field's primary column and the rest are
/// per-row fallbacks for blank cells.
#[derive(Debug, Clone, Default)]
pub struct FieldMap {
    columns: BTreeMap<&'static str, Vec<usize>>,
    unmapped: Vec<&'static str>,
    missing_required: Vec<&'static str>,
}

impl FieldMap {
    pub fn resolve(headers: &[String], fields: &[CanonicalField]) -> Self {
        let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
        let mut map = FieldMap::default();
        for field in fields {
            let mut candidates: Vec<usize> = Vec::new();
            for synonym in field.synonyms {
                for (idx, header) in normalized.iter().enumerate() {
                    if header_matches(header, synonym) && !candidates.contains(&idx) {
                        candidates.push(idx);
                    }
                }
            }
            if candidates.is_empty() {
                map.unmapped.push(field.name);
                if field.required {
                    map.missing_required.push(field.name);
                }
            } else {
                debug!(
                    "Mapped '{}' to column(s) {:?}",
                    field.name,
                    candidates
                        .iter()
                        .map(|idx| headers[*idx].as_str())
                        .collect::<Vec<_>>()
                );
                map.columns.insert(field.name, candidates);
            }
        }
        map
    }

    /// Primary source column for `field`.
    pub fn index(&self, field: &str) -> Option<usize> {
        self.columns.get(field).and_then(|cols| cols.first().copied())
    }

    /// Canonical fields no header matched.
    pub fn unmapped(&self) -> &[&'static str] {
        &self.unmapped
    }

    pub fn missing_required(&self) -> &[&'static str] {
        &self.missing_required
    }

    /// First non-blank value for `field` in `row`, trimmed.
    pub fn value<'a>(&self, field: &str, row: &'a [String]) -> Option<&'a str> {
        self.columns.get(field)?.iter().find_map(|idx| {
            row.get(*idx)
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
        })
    }
}

/// True when every cell is empty after trimming.
pub fn row_is_blank(row: &[String]) -> bool {
    row.iter().all(|cell| cell.trim().is_empty())
}
