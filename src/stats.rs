//! Aggregates over a (usually filtered) set of database records: dashboard
//! stat cards, engine metrics and upgrade counts.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::{
    model::{DatabaseRecord, Provider, Status},
    version::{EngineFamily, major_version_of},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventoryStats {
    pub total: usize,
    pub storage_gb_total: u64,
    pub by_provider: BTreeMap<Provider, usize>,
    pub by_status: BTreeMap<Status, usize>,
}

impl InventoryStats {
    pub fn count_status(&self, status: Status) -> usize {
        self.by_status.get(&status).copied().unwrap_or(0)
    }

    pub fn running(&self) -> usize {
        self.count_status(Status::Available) + self.count_status(Status::Ready)
    }
}

pub fn compute_stats<'a, I>(records: I) -> InventoryStats
where
    I: IntoIterator<Item = &'a DatabaseRecord>,
{
    let mut stats = InventoryStats::default();
    for record in records {
        stats.total += 1;
        stats.storage_gb_total = stats.storage_gb_total.saturating_add(record.storage_gb);
        *stats.by_provider.entry(record.provider).or_default() += 1;
        *stats.by_status.entry(record.status).or_default() += 1;
    }
    stats
}

/// Share of running databases. With `exclude_stopped` the denominator drops
/// stopped records; a zero denominator yields 0.
pub fn health_percentage(stats: &InventoryStats, exclude_stopped: bool) -> u64 {
    let denominator = if exclude_stopped {
        stats.total.saturating_sub(stats.count_status(Status::Stopped))
    } else {
        stats.total
    };
    if denominator == 0 {
        return 0;
    }
    (100.0 * stats.running() as f64 / denominator as f64).round() as u64
}

pub fn average_storage_gb(stats: &InventoryStats) -> u64 {
    if stats.total == 0 {
        return 0;
    }
    (stats.storage_gb_total as f64 / stats.total as f64).round() as u64
}

/// Records in a tracked engine family whose version is below the supported
/// floor, in input order.
pub fn upgrade_candidates<'a, I>(records: I) -> Vec<&'a DatabaseRecord>
where
    I: IntoIterator<Item = &'a DatabaseRecord>,
{
    records
        .into_iter()
        .filter(|record| {
            EngineFamily::classify(&record.engine)
                .is_some_and(|family| family.needs_upgrade(record.version.as_deref()))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpgradeCounts {
    pub total: usize,
    pub by_engine: BTreeMap<EngineFamily, usize>,
}

fn family_counter() -> BTreeMap<EngineFamily, usize> {
    EngineFamily::ALL.iter().map(|family| (*family, 0)).collect()
}

pub fn compute_upgrade_counts<'a, I>(candidates: I) -> UpgradeCounts
where
    I: IntoIterator<Item = &'a DatabaseRecord>,
{
    let mut counts = UpgradeCounts {
        total: 0,
        by_engine: family_counter(),
    };
    for record in candidates {
        if let Some(family) = EngineFamily::classify(&record.engine) {
            counts.total += 1;
            *counts.by_engine.entry(family).or_default() += 1;
        }
    }
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineMetrics {
    pub rdbms_counts: BTreeMap<EngineFamily, usize>,
    pub rdbms_percentages: BTreeMap<EngineFamily, f64>,
    /// Per family, record counts keyed by major version ("unknown" when the
    /// record has none).
    pub version_counts: BTreeMap<EngineFamily, BTreeMap<String, usize>>,
}

pub fn compute_metrics<'a, I>(records: I) -> EngineMetrics
where
    I: IntoIterator<Item = &'a DatabaseRecord>,
{
    let mut rdbms_counts = family_counter();
    let mut version_counts: BTreeMap<EngineFamily, BTreeMap<String, usize>> = EngineFamily::ALL
        .iter()
        .map(|family| (*family, BTreeMap::new()))
        .collect();
    for record in records {
        let Some(family) = EngineFamily::classify(&record.engine) else {
            continue;
        };
        *rdbms_counts.entry(family).or_default() += 1;
        let bucket = major_version_of(record.version.as_deref()).unwrap_or_else(|| "unknown".to_string());
        *version_counts
            .entry(family)
            .or_default()
            .entry(bucket)
            .or_default() += 1;
    }
    let tracked: usize = rdbms_counts.values().sum();
    let rdbms_percentages = rdbms_counts
        .iter()
        .map(|(family, count)| {
            let share = if tracked == 0 {
                0.0
            } else {
                *count as f64 * 100.0 / tracked as f64
            };
            (*family, share)
        })
        .collect();
    EngineMetrics {
        rdbms_counts,
        rdbms_percentages,
        version_counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Database, Record};

    fn record(engine: &str, version: Option<&str>, status: Status, storage: u64) -> DatabaseRecord {
        let mut db = Database::new(Provider::Aws, format!("{engine}-{storage}"), engine, "us-east-1");
        db.version = version.map(str::to_string);
        db.status = status;
        db.storage_gb = storage;
        Record::new(format!("{engine}-{storage}"), db)
    }

    #[test]
    fn empty_input_has_zero_stats_and_health() {
        let stats = compute_stats(&Vec::<DatabaseRecord>::new());
        assert_eq!(stats, InventoryStats::default());
        assert_eq!(health_percentage(&stats, true), 0);
        assert_eq!(health_percentage(&stats, false), 0);
        assert_eq!(average_storage_gb(&stats), 0);
    }

    #[test]
    fn health_percentage_modes() {
        let records = vec![
            record("postgres", Some("15"), Status::Available, 100),
            record("mysql", Some("8.0"), Status::Ready, 50),
            record("mysql", Some("5.7"), Status::Stopped, 25),
            record("postgres", Some("12"), Status::Warning, 10),
        ];
        let stats = compute_stats(&records);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.storage_gb_total, 185);
        assert_eq!(health_percentage(&stats, false), 50);
        assert_eq!(health_percentage(&stats, true), 67);
        assert_eq!(average_storage_gb(&stats), 46);
    }

    #[test]
    fn storage_total_saturates_instead_of_overflowing() {
        let records = vec![
            record("postgres", None, Status::Available, u64::MAX),
            record("mysql", None, Status::Available, 10),
        ];
        let stats = compute_stats(&records);
        assert_eq!(stats.storage_gb_total, u64::MAX);
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn all_stopped_with_exclusion_is_zero() {
        let records = vec![record("postgres", None, Status::Stopped, 1)];
        assert_eq!(health_percentage(&compute_stats(&records), true), 0);
    }

    #[test]
    fn upgrade_counts_by_family() {
        let records = vec![
            record("postgres", Some("11.2"), Status::Available, 1),
            record("aurora-postgresql", Some("14.6"), Status::Available, 2),
            record("mysql", Some("5.7.44"), Status::Available, 3),
            record("sqlserver-se", None, Status::Available, 4),
            record("oracle-ee", Some("19"), Status::Available, 5),
        ];
        let candidates = upgrade_candidates(&records);
        assert_eq!(candidates.len(), 3);
        let counts = compute_upgrade_counts(candidates);
        assert_eq!(counts.total, 3);
        assert_eq!(counts.by_engine[&EngineFamily::Postgres], 1);
        assert_eq!(counts.by_engine[&EngineFamily::Mysql], 1);
        assert_eq!(counts.by_engine[&EngineFamily::Mssql], 1);
    }

    #[test]
    fn metrics_bucket_versions() {
        let records = vec![
            record("mysql", Some("8.0.35"), Status::Available, 1),
            record("mysql", Some("8.0.21"), Status::Available, 2),
            record("postgres", None, Status::Available, 3),
            record("oracle-ee", Some("19"), Status::Available, 4),
        ];
        let metrics = compute_metrics(&records);
        assert_eq!(metrics.rdbms_counts[&EngineFamily::Mysql], 2);
        assert_eq!(metrics.rdbms_counts[&EngineFamily::Mssql], 0);
        assert_eq!(metrics.version_counts[&EngineFamily::Mysql]["8.0"], 2);
        assert_eq!(metrics.version_counts[&EngineFamily::Postgres]["unknown"], 1);
        let share = metrics.rdbms_percentages[&EngineFamily::Mysql];
        assert!((share - 200.0 / 3.0).abs() < 1e-9);
    }
}
