//! JSON snapshot persistence for the inventory.
//!
//! Every command loads the snapshot, mutates it in memory and, for writes,
//! replaces the file atomically (temp file + rename). An import either lands
//! completely or leaves the file untouched.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::InventoryError,
    ingest::{ParsedBatch, SkippedRow},
    model::{
        AwsAccount, AzureVm, Database, DatabaseRecord, InventoryItem, Provider, Record, Status,
        VirtualMachine,
    },
    reconcile::{ReconcilePlan, SyncMode, reconcile, require_valid_rows},
};

pub type AccountRecord = Record<AwsAccount>;

fn default_tenants() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "7df9d676-4a3e-4ff3-a54f-f30c0543fe4c".to_string(),
            "TDH-Commercial".to_string(),
        ),
        (
            "c162a585-4fef-44bd-9271-d96409d0a349".to_string(),
            "Corporate Tenant".to_string(),
        ),
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub databases: Vec<DatabaseRecord>,
    #[serde(default)]
    pub vms: Vec<AzureVm>,
    #[serde(default)]
    pub accounts: Vec<AccountRecord>,
    /// Azure tenant id -> friendly name.
    #[serde(default = "default_tenants")]
    pub tenants: BTreeMap<String, String>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            databases: Vec::new(),
            vms: Vec::new(),
            accounts: Vec::new(),
            tenants: default_tenants(),
        }
    }
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedDetail {
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseImport {
    pub message: String,
    pub created: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub deleted: usize,
    /// Whitespace-only rows that were ignored.
    pub blank_rows: usize,
    pub skipped_details: Vec<SkippedDetail>,
    pub duplicates_details: Vec<String>,
    pub deleted_details: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmSkippedDetail {
    pub row: usize,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmImport {
    pub message: String,
    pub imported: usize,
    pub skipped: usize,
    pub purged: usize,
    pub skipped_details: Vec<VmSkippedDetail>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountImport {
    pub message: String,
    pub imported: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub provider: Provider,
    pub service: String,
    pub region: String,
    pub count: usize,
    pub records: Vec<DatabaseRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateReport {
    pub groups: Vec<DuplicateGroup>,
    pub groups_count: usize,
    pub records_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedGroup {
    pub key: String,
    pub kept_id: String,
    pub kept_version: Option<String>,
    pub deleted_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolveReport {
    pub keys_processed: usize,
    pub kept_count: usize,
    pub deleted_count: usize,
    pub details: Vec<ResolvedGroup>,
}

/// Replaces, removes and appends records per `plan`.
fn apply_plan<T>(collection: &mut Vec<Record<T>>, plan: &ReconcilePlan<T>)
where
    T: InventoryItem,
{
    collection.retain(|record| !plan.to_delete.iter().any(|gone| gone.id == record.id));
    for updated in &plan.to_update {
        if let Some(slot) = collection.iter_mut().find(|record| record.id == updated.id) {
            *slot = updated.clone();
        }
    }
    collection.extend(plan.to_create.iter().cloned());
}

fn skipped_details(skipped: &[SkippedRow]) -> Vec<SkippedDetail> {
    skipped
        .iter()
        .map(|s| SkippedDetail {
            row: s.row,
            reason: s.reason.clone(),
        })
        .collect()
}

/// Numeric components of a version string; non-numeric parts keep their
/// digits or count as 0.
pub fn version_tuple(version: Option<&str>) -> Vec<u64> {
    let Some(version) = version.filter(|v| !v.is_empty()) else {
        return Vec::new();
    };
    version
        .split('.')
        .map(|part| {
            part.chars()
                .filter(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(0)
        })
        .collect()
}

#[derive(Debug)]
pub struct InventoryStore {
    path: PathBuf,
    snapshot: Snapshot,
}

impl InventoryStore {
    /// Loads the snapshot at `path`; a missing file is an empty inventory.
    pub fn open(path: &Path) -> Result<Self> {
        let snapshot = if path.exists() {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Reading inventory store {path:?}"))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Parsing inventory store {path:?}"))?
        } else {
            debug!("Inventory store {path:?} not found; starting empty");
            Snapshot::default()
        };
        Ok(Self {
            path: path.to_path_buf(),
            snapshot,
        })
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating store directory {parent:?}"))?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let json = serde_json::to_string_pretty(&self.snapshot)
            .context("Serializing inventory snapshot")?;
        fs::write(&tmp, json).with_context(|| format!("Writing {tmp:?}"))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Replacing inventory store {:?}", self.path))?;
        debug!("Saved inventory store {:?}", self.path);
        Ok(())
    }

    pub fn databases(&self) -> &[DatabaseRecord] {
        &self.snapshot.databases
    }

    pub fn vms(&self) -> &[AzureVm] {
        &self.snapshot.vms
    }

    /// Manual entry. The natural key must be unused.
    pub fn create(&mut self, mut database: Database) -> Result<&DatabaseRecord, InventoryError> {
        database.tags = crate::model::normalize_tags(&database.tags);
        database.validate()?;
        let key = database.natural_key();
        if self
            .snapshot
            .databases
            .iter()
            .any(|record| record.natural_key() == key)
        {
            return Err(InventoryError::Conflict(format!(
                "Database {} already exists",
                database.describe_key()
            )));
        }
        let record = Record::new(new_id(), database);
        info!("Created database {} ({})", record.describe_key(), record.id);
        self.snapshot.databases.push(record);
        Ok(&self.snapshot.databases[self.snapshot.databases.len() - 1])
    }

    pub fn delete(&mut self, id: &str) -> Result<DatabaseRecord, InventoryError> {
        let position = self
            .snapshot
            .databases
            .iter()
            .position(|record| record.id == id)
            .ok_or_else(|| InventoryError::NotFound(format!("Database {id}")))?;
        let removed = self.snapshot.databases.remove(position);
        info!("Deleted database {} ({id})", removed.describe_key());
        Ok(removed)
    }

    /// Removes every database record; returns how many were removed.
    pub fn purge(&mut self) -> usize {
        let count = self.snapshot.databases.len();
        self.snapshot.databases.clear();
        warn!("Purged {count} database record(s)");
        count
    }

    pub fn set_status(&mut self, id: &str, status: Status) -> Result<&DatabaseRecord, InventoryError> {
        let record = self
            .snapshot
            .databases
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| InventoryError::NotFound(format!("Database {id}")))?;
        record.fields.status = status;
        info!("Set status of {} to {status}", record.describe_key());
        Ok(record)
    }

    pub fn delete_vm(&mut self, id: &str) -> Result<AzureVm, InventoryError> {
        let position = self
            .snapshot
            .vms
            .iter()
            .position(|vm| vm.id == id)
            .ok_or_else(|| InventoryError::NotFound(format!("Azure VM {id}")))?;
        let removed = self.snapshot.vms.remove(position);
        info!("Deleted Azure VM {} ({id})", removed.describe_key());
        Ok(removed)
    }

    /// Reconciles a parsed database batch against the provider's records.
    /// Nothing changes when the batch has rows but none are valid.
    pub fn import_databases(
        &mut self,
        batch: ParsedBatch<Database>,
        provider: Provider,
        mode: SyncMode,
    ) -> Result<DatabaseImport, InventoryError> {
        let scoped: Vec<DatabaseRecord> = self
            .snapshot
            .databases
            .iter()
            .filter(|record| record.provider == provider)
            .cloned()
            .collect();
        let blank_rows = batch.blank_rows;
        let plan = reconcile(&scoped, batch, mode, new_id);
        require_valid_rows(&plan)?;
        apply_plan(&mut self.snapshot.databases, &plan);

        let deleted_details: Vec<String> =
            plan.to_delete.iter().map(|record| record.describe_key()).collect();
        if !deleted_details.is_empty() {
            warn!(
                "Sync import removed {} {provider} record(s) absent from the file",
                deleted_details.len()
            );
        }
        info!(
            "Imported {provider} databases: {} created, {} updated, {} skipped",
            plan.to_create.len(),
            plan.to_update.len(),
            plan.skipped.len()
        );
        Ok(DatabaseImport {
            message: format!(
                "Successfully imported {} database records",
                plan.to_create.len()
            ),
            created: plan.to_create.len(),
            duplicates: plan.duplicates.len(),
            skipped: plan.skipped.len(),
            deleted: deleted_details.len(),
            blank_rows,
            skipped_details: skipped_details(&plan.skipped),
            duplicates_details: plan.duplicates.clone(),
            deleted_details,
        })
    }

    /// VM imports mirror the file: machines absent from it are purged.
    pub fn import_vms(
        &mut self,
        batch: ParsedBatch<VirtualMachine>,
    ) -> Result<VmImport, InventoryError> {
        let plan = reconcile(&self.snapshot.vms, batch, SyncMode::Mirror, new_id);
        require_valid_rows(&plan)?;
        apply_plan(&mut self.snapshot.vms, &plan);
        let imported = plan.valid_rows();
        if !plan.to_delete.is_empty() {
            warn!("Purged {} Azure VM(s) absent from the file", plan.to_delete.len());
        }
        info!("Imported {imported} Azure VM(s), {} skipped", plan.skipped.len());
        Ok(VmImport {
            message: format!("Successfully imported {imported} Azure VMs"),
            imported,
            skipped: plan.skipped.len(),
            purged: plan.to_delete.len(),
            skipped_details: plan
                .skipped
                .iter()
                .map(|s| VmSkippedDetail {
                    row: s.row,
                    error: s.reason.clone(),
                })
                .collect(),
        })
    }

    /// Account imports are upserts keyed by account id.
    pub fn import_accounts(
        &mut self,
        batch: ParsedBatch<AwsAccount>,
    ) -> Result<AccountImport, InventoryError> {
        let plan = reconcile(&self.snapshot.accounts, batch, SyncMode::Additive, new_id);
        require_valid_rows(&plan)?;
        apply_plan(&mut self.snapshot.accounts, &plan);
        let imported = plan.valid_rows();
        info!("Imported {imported} AWS account(s)");
        Ok(AccountImport {
            message: format!("Successfully imported {imported} AWS accounts"),
            imported,
        })
    }

    fn duplicate_keys(&self) -> BTreeMap<(Provider, String, String), Vec<usize>> {
        let mut groups: BTreeMap<(Provider, String, String), Vec<usize>> = BTreeMap::new();
        for (idx, record) in self.snapshot.databases.iter().enumerate() {
            groups.entry(record.natural_key()).or_default().push(idx);
        }
        groups.retain(|_, members| members.len() > 1);
        groups
    }

    /// Groups of databases sharing provider, service and region.
    pub fn find_duplicates(&self) -> DuplicateReport {
        let groups: Vec<DuplicateGroup> = self
            .duplicate_keys()
            .into_iter()
            .map(|((provider, service, region), members)| DuplicateGroup {
                provider,
                service,
                region,
                count: members.len(),
                records: members
                    .iter()
                    .map(|idx| self.snapshot.databases[*idx].clone())
                    .collect(),
            })
            .collect();
        DuplicateReport {
            groups_count: groups.len(),
            records_count: groups.iter().map(|group| group.count).sum(),
            groups,
        }
    }

    /// Keeps the highest version of each duplicate group (later records win
    /// ties) and deletes the rest.
    pub fn resolve_duplicates_keep_latest(&mut self) -> ResolveReport {
        let mut details = Vec::new();
        let mut doomed: Vec<String> = Vec::new();
        for (_, members) in self.duplicate_keys() {
            let records: Vec<&DatabaseRecord> =
                members.iter().map(|idx| &self.snapshot.databases[*idx]).collect();
            let Some(keep) = records
                .iter()
                .enumerate()
                .max_by_key(|(position, record)| (version_tuple(record.version.as_deref()), *position))
                .map(|(_, record)| *record)
            else {
                continue;
            };
            let deleted_ids: Vec<String> = records
                .iter()
                .filter(|record| record.id != keep.id)
                .map(|record| record.id.clone())
                .collect();
            doomed.extend(deleted_ids.iter().cloned());
            details.push(ResolvedGroup {
                key: keep.describe_key(),
                kept_id: keep.id.clone(),
                kept_version: keep.version.clone(),
                deleted_ids,
            });
        }
        self.snapshot
            .databases
            .retain(|record| !doomed.contains(&record.id));
        if !doomed.is_empty() {
            info!(
                "Resolved {} duplicate group(s), deleted {} record(s)",
                details.len(),
                doomed.len()
            );
        }
        ResolveReport {
            keys_processed: details.len(),
            kept_count: details.len(),
            deleted_count: doomed.len(),
            details,
        }
    }

    /// Friendly tenant name, the raw id when unmapped, `-` when absent.
    pub fn tenant_name(&self, tenant_id: Option<&str>) -> String {
        match tenant_id.filter(|id| !id.is_empty()) {
            None => "-".to_string(),
            Some(id) => self
                .snapshot
                .tenants
                .get(id)
                .cloned()
                .unwrap_or_else(|| id.to_string()),
        }
    }

    pub fn tenants(&self) -> &BTreeMap<String, String> {
        &self.snapshot.tenants
    }

    /// AWS account id -> alias, for labelling subscriptions.
    pub fn account_names(&self) -> BTreeMap<&str, &str> {
        self.snapshot
            .accounts
            .iter()
            .map(|account| (account.account_id.as_str(), account.account_name.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{parse_accounts, parse_databases, parse_vms};

    fn store() -> (tempfile::TempDir, InventoryStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = InventoryStore::open(&dir.path().join("inventory.json")).unwrap();
        (dir, store)
    }

    const AWS_CSV: &str = "service,engine,region,version\norders-db,postgres,us-east-1,15.4\nbilling,mysql,eu-west-1,5.7\n";

    #[test]
    fn second_identical_import_only_finds_duplicates() {
        let (_dir, mut store) = store();
        let first = store
            .import_databases(parse_databases(AWS_CSV, Provider::Aws).unwrap(), Provider::Aws, SyncMode::Additive)
            .unwrap();
        assert_eq!(first.created, 2);
        let second = store
            .import_databases(parse_databases(AWS_CSV, Provider::Aws).unwrap(), Provider::Aws, SyncMode::Additive)
            .unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.duplicates, 2);
        assert_eq!(store.databases().len(), 2);
    }

    #[test]
    fn sync_import_only_touches_the_same_provider() {
        let (_dir, mut store) = store();
        store
            .import_databases(parse_databases(AWS_CSV, Provider::Aws).unwrap(), Provider::Aws, SyncMode::Additive)
            .unwrap();
        store
            .create(Database::new(Provider::Azure, "sales", "mysql", "westeurope"))
            .unwrap();
        let result = store
            .import_databases(
                parse_databases("service,engine,region\n", Provider::Aws).unwrap(),
                Provider::Aws,
                SyncMode::Mirror,
            )
            .unwrap();
        assert_eq!(result.deleted, 2);
        assert_eq!(store.databases().len(), 1);
        assert_eq!(store.databases()[0].provider, Provider::Azure);
    }

    #[test]
    fn failed_import_leaves_store_unchanged() {
        let (_dir, mut store) = store();
        store
            .import_databases(parse_databases(AWS_CSV, Provider::Aws).unwrap(), Provider::Aws, SyncMode::Additive)
            .unwrap();
        let before = store.snapshot.clone();
        let err = store
            .import_databases(
                parse_databases("service,engine,region\nx,,\n", Provider::Aws).unwrap(),
                Provider::Aws,
                SyncMode::Mirror,
            )
            .unwrap_err();
        assert!(matches!(err, InventoryError::NoValidRows { .. }));
        assert_eq!(store.snapshot, before);
    }

    #[test]
    fn save_and_reopen_round_trips() {
        let (dir, mut store) = store();
        store
            .create(Database::new(Provider::Aws, "orders-db", "postgres", "us-east-1"))
            .unwrap();
        store.save().unwrap();
        let reopened = InventoryStore::open(&dir.path().join("inventory.json")).unwrap();
        assert_eq!(reopened.snapshot, store.snapshot);
        assert!(!dir.path().join("inventory.json.tmp").exists());
    }

    #[test]
    fn create_rejects_existing_key_and_blank_fields() {
        let (_dir, mut store) = store();
        store
            .create(Database::new(Provider::Aws, "orders-db", "postgres", "us-east-1"))
            .unwrap();
        assert!(matches!(
            store.create(Database::new(Provider::Aws, "orders-db", "mysql", "us-east-1")),
            Err(InventoryError::Conflict(_))
        ));
        assert!(matches!(
            store.create(Database::new(Provider::Aws, " ", "mysql", "us-east-1")),
            Err(InventoryError::Validation { field: "service", .. })
        ));
    }

    #[test]
    fn status_update_and_delete_by_id() {
        let (_dir, mut store) = store();
        let id = store
            .create(Database::new(Provider::Aws, "orders-db", "postgres", "us-east-1"))
            .unwrap()
            .id
            .clone();
        assert_eq!(store.set_status(&id, Status::Maintenance).unwrap().status, Status::Maintenance);
        assert!(store.delete(&id).is_ok());
        assert!(matches!(store.delete(&id), Err(InventoryError::NotFound(_))));
    }

    #[test]
    fn duplicates_resolve_to_latest_version() {
        let (_dir, mut store) = store();
        for (id, version) in [("a", "8.0.21"), ("b", "8.0.35"), ("c", "5.7")] {
            let mut db = Database::new(Provider::Aws, "billing", "mysql", "eu-west-1");
            db.version = Some(version.to_string());
            store.snapshot.databases.push(Record::new(id, db));
        }
        let report = store.find_duplicates();
        assert_eq!(report.groups_count, 1);
        assert_eq!(report.records_count, 3);

        let resolved = store.resolve_duplicates_keep_latest();
        assert_eq!(resolved.deleted_count, 2);
        assert_eq!(resolved.details[0].kept_id, "b");
        assert_eq!(store.databases().len(), 1);
    }

    #[test]
    fn vm_import_purges_missing_machines() {
        let (_dir, mut store) = store();
        let first = "computerName,resourceGroup\nweb-01,rg-web\nweb-02,rg-web\n";
        store.import_vms(parse_vms(first).unwrap()).unwrap();
        let second = "computerName,resourceGroup\nWEB-01,RG-WEB\n,rg-x\n";
        let result = store.import_vms(parse_vms(second).unwrap()).unwrap();
        assert_eq!(result.imported, 1);
        assert_eq!(result.purged, 1);
        assert_eq!(result.skipped_details[0].row, 3);
        assert_eq!(store.vms().len(), 1);
    }

    #[test]
    fn account_import_upserts_and_names_resolve() {
        let (_dir, mut store) = store();
        store
            .import_accounts(parse_accounts("AccountID,Account Alias\n111122223333,payments\n").unwrap())
            .unwrap();
        store
            .import_accounts(parse_accounts("AccountID,Account Alias\n111122223333,payments-prod\n").unwrap())
            .unwrap();
        assert_eq!(store.account_names().len(), 1);
        assert_eq!(store.account_names()["111122223333"], "payments-prod");
        assert_eq!(store.tenant_name(Some("c162a585-4fef-44bd-9271-d96409d0a349")), "Corporate Tenant");
        assert_eq!(store.tenant_name(Some("other")), "other");
        assert_eq!(store.tenant_name(None), "-");
    }
}
