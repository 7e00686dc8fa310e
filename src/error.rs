//! Typed failures that callers may want to match on.
//!
//! Most code paths return `anyhow::Result`; the variants here cover the
//! validation, confirmation and lookup failures that are reported to the
//! operator verbatim before the inventory store is touched.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InventoryError {
    /// The selected upload is not a CSV file.
    #[error("Please select a CSV file (got {0:?})")]
    NotCsv(PathBuf),

    #[error("Provider must be AWS or Azure (got '{0}')")]
    UnknownProvider(String),

    #[error("Unknown status '{0}' (expected available, ready, stopped, maintenance or warning)")]
    UnknownStatus(String),

    #[error("Unknown engine family '{0}' (expected postgres, mysql or mssql)")]
    UnknownEngineFamily(String),

    #[error("Invalid file encoding. Please use UTF-8 ({0} decoding failed)")]
    Encoding(&'static str),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid value for {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// A destructive operation was requested without explicit confirmation.
    #[error("Refusing to {action} without confirmation; re-run with --yes")]
    Unconfirmed { action: String },

    #[error("No valid records found in CSV. {detail}")]
    NoValidRows { detail: String },

    #[error("Region '{region}' is not available for the selected provider")]
    RegionUnavailable { region: String },
}
