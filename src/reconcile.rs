//! Create/update/delete partitioning of an imported batch against the
//! records already in the store.
//!
//! Reconciliation is pure: it only produces a [`ReconcilePlan`]. The store
//! applies the plan as one unit of work.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::{
    error::InventoryError,
    ingest::{ParsedBatch, SkippedRow},
    model::{InventoryItem, Record},
};

/// What happens to existing records that no imported row matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Additive import: unmatched records stay.
    Additive,
    /// The file is the full truth: unmatched records are deleted.
    Mirror,
}

impl SyncMode {
    pub fn from_flag(sync: bool) -> Self {
        if sync { SyncMode::Mirror } else { SyncMode::Additive }
    }
}

#[derive(Debug, Clone)]
pub struct ReconcilePlan<T> {
    pub to_create: Vec<Record<T>>,
    /// Existing records with the imported values merged in, ids retained.
    pub to_update: Vec<Record<T>>,
    pub to_delete: Vec<Record<T>>,
    /// Natural-key descriptions of rows that matched an existing record.
    pub duplicates: Vec<String>,
    pub skipped: Vec<SkippedRow>,
}

impl<T> ReconcilePlan<T> {
    pub fn valid_rows(&self) -> usize {
        self.to_create.len() + self.to_update.len()
    }
}

/// Partitions `batch` against `existing`. `next_id` supplies ids for new
/// records that do not carry their own.
///
/// A row repeating a key already seen earlier in the file is skipped; the
/// first occurrence wins.
pub fn reconcile<T, F>(
    existing: &[Record<T>],
    batch: ParsedBatch<T>,
    mode: SyncMode,
    mut next_id: F,
) -> ReconcilePlan<T>
where
    T: InventoryItem,
    F: FnMut() -> String,
{
    let mut by_key: HashMap<T::Key, &Record<T>> = HashMap::with_capacity(existing.len());
    for record in existing {
        by_key.entry(record.fields.natural_key()).or_insert(record);
    }

    let mut plan = ReconcilePlan {
        to_create: Vec::new(),
        to_update: Vec::new(),
        to_delete: Vec::new(),
        duplicates: Vec::new(),
        skipped: batch.skipped,
    };
    let mut seen: HashMap<T::Key, usize> = HashMap::new();
    let mut matched: HashSet<T::Key> = HashSet::new();

    for parsed in batch.rows {
        let key = parsed.item.natural_key();
        if let Some(first_row) = seen.get(&key) {
            plan.skipped.push(SkippedRow::new(
                parsed.row,
                format!(
                    "Duplicate of row {first_row} ({})",
                    parsed.item.describe_key()
                ),
            ));
            continue;
        }
        seen.insert(key.clone(), parsed.row);

        match by_key.get(&key) {
            Some(current) => {
                let mut merged = (*current).clone();
                plan.duplicates.push(parsed.item.describe_key());
                merged.fields.refresh(parsed.item, &parsed.absent);
                plan.to_update.push(merged);
                matched.insert(key);
            }
            None => {
                let id = parsed.item.preferred_id().unwrap_or_else(&mut next_id);
                plan.to_create.push(Record::new(id, parsed.item));
            }
        }
    }

    if mode == SyncMode::Mirror {
        plan.to_delete = existing
            .iter()
            .filter(|record| !matched.contains(&record.fields.natural_key()))
            .cloned()
            .collect();
    }
    plan.skipped.sort_by_key(|skipped| skipped.row);
    plan
}

/// Fails the import when the file had data rows but none of them were
/// usable. A headers-only file passes.
pub fn require_valid_rows<T>(plan: &ReconcilePlan<T>) -> Result<(), InventoryError> {
    if plan.valid_rows() > 0 || plan.skipped.is_empty() {
        return Ok(());
    }
    let mut missing: BTreeMap<&str, usize> = BTreeMap::new();
    let mut other = 0usize;
    for skipped in &plan.skipped {
        if skipped.missing.is_empty() {
            other += 1;
        }
        for field in &skipped.missing {
            *missing.entry(*field).or_default() += 1;
        }
    }
    let mut parts: Vec<String> = missing
        .into_iter()
        .map(|(field, count)| format!("{field} missing in {count} row(s)"))
        .collect();
    if other > 0 {
        parts.push(format!("{other} row(s) rejected for other reasons"));
    }
    Err(InventoryError::NoValidRows {
        detail: format!(
            "{} row(s) skipped: {}",
            plan.skipped.len(),
            parts.join("; ")
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ingest::parse_databases,
        model::{AwsAccount, Database, Provider},
    };

    fn ids() -> impl FnMut() -> String {
        let mut next = 0;
        move || {
            next += 1;
            format!("id-{next}")
        }
    }

    fn stored(id: &str, service: &str, region: &str) -> Record<Database> {
        Record::new(id, Database::new(Provider::Aws, service, "postgres", region))
    }

    #[test]
    fn new_rows_are_created_and_matches_updated() {
        let existing = vec![stored("a", "orders-db", "us-east-1")];
        let batch = parse_databases(
            "service,engine,region,version\norders-db,postgres,us-east-1,15.4\nbilling,mysql,eu-west-1,8.0\n",
            Provider::Aws,
        )
        .unwrap();
        let plan = reconcile(&existing, batch, SyncMode::Additive, ids());

        assert_eq!(plan.to_update.len(), 1);
        assert_eq!(plan.to_update[0].id, "a");
        assert_eq!(plan.to_update[0].version.as_deref(), Some("15.4"));
        assert_eq!(plan.to_create.len(), 1);
        assert_eq!(plan.to_create[0].id, "id-1");
        assert_eq!(plan.duplicates, vec!["AWS orders-db (us-east-1)".to_string()]);
        assert!(plan.to_delete.is_empty());
    }

    #[test]
    fn mirror_mode_deletes_unmatched_records() {
        let existing = vec![
            stored("a", "orders-db", "us-east-1"),
            stored("b", "legacy-db", "us-east-1"),
        ];
        let batch = parse_databases(
            "service,engine,region\norders-db,postgres,us-east-1\n",
            Provider::Aws,
        )
        .unwrap();
        let plan = reconcile(&existing, batch, SyncMode::Mirror, ids());
        assert_eq!(plan.to_delete.len(), 1);
        assert_eq!(plan.to_delete[0].id, "b");
    }

    #[test]
    fn headers_only_file_in_mirror_mode_deletes_everything() {
        let existing = vec![
            stored("a", "orders-db", "us-east-1"),
            stored("b", "legacy-db", "us-east-1"),
        ];
        let batch = parse_databases("service,engine,region\n", Provider::Aws).unwrap();
        let plan = reconcile(&existing, batch, SyncMode::Mirror, ids());
        assert_eq!(plan.to_delete.len(), 2);
        assert!(require_valid_rows(&plan).is_ok());
    }

    #[test]
    fn repeated_key_in_file_keeps_first_occurrence() {
        let batch = parse_databases(
            "service,engine,region,storage\norders-db,postgres,us-east-1,100\norders-db,postgres,us-east-1,200\n",
            Provider::Aws,
        )
        .unwrap();
        let plan = reconcile(&[], batch, SyncMode::Additive, ids());
        assert_eq!(plan.to_create.len(), 1);
        assert_eq!(plan.to_create[0].storage_gb, 100);
        assert_eq!(plan.skipped[0].row, 3);
        assert!(plan.skipped[0].reason.starts_with("Duplicate of row 2"));
    }

    #[test]
    fn absent_columns_keep_existing_values() {
        let mut current = stored("a", "orders-db", "us-east-1");
        current.fields.storage_gb = 750;
        current.fields.tags = vec!["prod".to_string()];
        let batch = parse_databases(
            "service,engine,region\norders-db,aurora-postgresql,us-east-1\n",
            Provider::Aws,
        )
        .unwrap();
        let plan = reconcile(&[current], batch, SyncMode::Additive, ids());
        let updated = &plan.to_update[0];
        assert_eq!(updated.engine, "aurora-postgresql");
        assert_eq!(updated.storage_gb, 750);
        assert_eq!(updated.tags, vec!["prod".to_string()]);
    }

    #[test]
    fn all_rows_invalid_is_rejected_with_counts() {
        let batch = parse_databases(
            "service,engine,region\norders-db,,us-east-1\nbilling,,\n",
            Provider::Aws,
        )
        .unwrap();
        let plan = reconcile(&[], batch, SyncMode::Additive, ids());
        let err = require_valid_rows(&plan).unwrap_err().to_string();
        assert!(err.contains("engine missing in 2 row(s)"), "{err}");
        assert!(err.contains("region missing in 1 row(s)"), "{err}");
    }

    #[test]
    fn accounts_use_their_account_id() {
        let batch = crate::ingest::parse_accounts(
            "AccountID,Account Alias\n123456789012,payments\n",
        )
        .unwrap();
        let plan = reconcile::<AwsAccount, _>(&[], batch, SyncMode::Additive, ids());
        assert_eq!(plan.to_create[0].id, "123456789012");
    }
}
