//! Version bucketing and engine-family classification.
//!
//! [`extract_major_version`] is the single bucketing rule used by filters,
//! option lists, metrics and upgrade grouping, so the same raw version always
//! lands in the same bucket.

use std::{fmt, str::FromStr, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

pub const MIN_POSTGRES_MAJOR: u64 = 13;
pub const MIN_MYSQL_MAJOR: u64 = 8;
/// Oldest SQL Server release year still considered supported.
pub const MIN_MSSQL_YEAR: u64 = 2017;
/// Engine major version of SQL Server 2017.
pub const MIN_MSSQL_ENGINE_MAJOR: u64 = 14;

/// Reduces a free-form version to its grouping bucket: `"8.0.35"` becomes
/// `"8.0"`, `"15.4"` becomes `"15"`, SQL Server product names stay whole.
pub fn extract_major_version(version: &str) -> String {
    if version.is_empty() || version.to_lowercase().contains("sql server") {
        return version.to_string();
    }
    let parts: Vec<&str> = version.split('.').collect();
    if parts.len() >= 2
        && let Some(major) = leading_integer(parts[0])
        && major < 10
    {
        return format!("{}.{}", parts[0], parts[1]);
    }
    parts[0].to_string()
}

/// Bucket for an optional version; `None` when the record has no version.
pub fn major_version_of(version: Option<&str>) -> Option<String> {
    version
        .filter(|value| !value.is_empty())
        .map(extract_major_version)
}

/// Parses the run of ASCII digits at the start of `value` (after leading
/// whitespace). Returns `None` when no digit is present.
pub fn leading_integer(value: &str) -> Option<u64> {
    let digits: String = value
        .trim_start()
        .chars()
        .take_while(|ch| ch.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        None
    } else {
        digits.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineFamily {
    Postgres,
    Mysql,
    Mssql,
}

impl EngineFamily {
    pub const ALL: [EngineFamily; 3] = [EngineFamily::Postgres, EngineFamily::Mysql, EngineFamily::Mssql];

    /// Substring classification of an engine name; `None` for engines outside
    /// the three tracked families.
    pub fn classify(engine: &str) -> Option<Self> {
        let lowered = engine.to_lowercase();
        if lowered.contains("postgre") {
            Some(EngineFamily::Postgres)
        } else if lowered.contains("mysql") {
            Some(EngineFamily::Mysql)
        } else if ["mssql", "sql server", "sqlserver"]
            .iter()
            .any(|needle| lowered.contains(needle))
        {
            Some(EngineFamily::Mssql)
        } else {
            None
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EngineFamily::Postgres => "postgres",
            EngineFamily::Mysql => "mysql",
            EngineFamily::Mssql => "mssql",
        }
    }

    /// Whether a database of this family running `version` is below the
    /// supported floor. A missing or unparseable version needs an upgrade.
    pub fn needs_upgrade(self, version: Option<&str>) -> bool {
        let Some(version) = version.map(str::trim).filter(|v| !v.is_empty()) else {
            return true;
        };
        match self {
            EngineFamily::Postgres => {
                let first = version.split(['.', ' ']).next().unwrap_or_default();
                match first.parse::<u64>() {
                    Ok(major) => major < MIN_POSTGRES_MAJOR,
                    Err(_) => true,
                }
            }
            EngineFamily::Mysql => match leading_integer(version.split('.').next().unwrap_or_default()) {
                Some(major) => major < MIN_MYSQL_MAJOR,
                None => true,
            },
            EngineFamily::Mssql => !mssql_is_supported(version),
        }
    }
}

impl fmt::Display for EngineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineFamily {
    type Err = InventoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(EngineFamily::Postgres),
            "mysql" => Ok(EngineFamily::Mysql),
            "mssql" | "sqlserver" | "sql server" => Ok(EngineFamily::Mssql),
            _ => Err(InventoryError::UnknownEngineFamily(value.to_string())),
        }
    }
}

fn release_year_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("valid release year pattern"))
}

// SQL Server reports either a product name ("SQL Server 2019") or a dotted
// engine version ("15.00.4236.7.v1"; 14 = 2017).
fn mssql_is_supported(version: &str) -> bool {
    if let Some(year) = release_year_pattern()
        .find_iter(version)
        .filter_map(|m| m.as_str().parse::<u64>().ok())
        .max()
    {
        return year >= MIN_MSSQL_YEAR;
    }
    if version.contains('.') {
        return leading_integer(version).is_some_and(|major| major >= MIN_MSSQL_ENGINE_MAJOR);
    }
    false
}

/// Canonical engine name for the verbose engine types found in Azure
/// exports ("Azure Database for MySQL flexible server" -> "mysql").
pub fn canonical_azure_engine(raw: &str) -> String {
    let lowered = raw.to_lowercase();
    if lowered.contains("mysql") {
        "mysql".to_string()
    } else if lowered.contains("postgre") {
        "postgres".to_string()
    } else if lowered.contains("mariadb") {
        "mariadb".to_string()
    } else {
        raw.to_string()
    }
}
