//! Turns decoded CSV text into typed drafts for each importable entity.
//!
//! Rows are mapped through [`FieldMap`], checked for required fields and
//! normalised (status words, storage numbers, tag lists, Azure engine names,
//! timestamps). Rows that cannot be imported are collected with a reason
//! instead of failing the batch; blank rows are ignored.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;

use crate::{
    io_utils,
    mapping::{CanonicalField, FieldMap, row_is_blank},
    model::{AwsAccount, Database, Provider, Status, VirtualMachine, normalize_tags},
    version::canonical_azure_engine,
};

pub const DATABASE_FIELDS: &[CanonicalField] = &[
    CanonicalField::required(
        "service",
        &[
            "service",
            "service_name",
            "db_service",
            "name",
            "db_instance_identifier",
            "db_instance_id",
            "db_identifier",
            "database",
            "db_name",
            "resource_subscription",
        ],
    ),
    CanonicalField::required(
        "engine",
        &["engine", "engine_type", "db_engine", "database_engine", "db_type", "type"],
    ),
    CanonicalField::required("region", &["region", "location", "availability_zone"]),
    CanonicalField::optional("provider", &["provider", "cloud_provider", "cloud"]),
    CanonicalField::optional(
        "endpoint",
        &[
            "endpoint",
            "endpoint_address",
            "address",
            "hostname",
            "host",
            "server_name",
            "server",
            "fqdn",
        ],
    ),
    CanonicalField::optional(
        "storage_gb",
        &["storage_gb", "storage", "allocated_storage", "size_gb"],
    ),
    CanonicalField::optional(
        "status",
        &["status", "state", "db_instance_status", "availability"],
    ),
    CanonicalField::optional(
        "subscription",
        &[
            "subscription",
            "owner",
            "owner_team",
            "team",
            "department",
            "resource_subscription",
        ],
    ),
    CanonicalField::optional("tags", &["tags", "tag", "labels"]),
    CanonicalField::optional(
        "version",
        &["version", "db_version", "engine_version", "server_version"],
    ),
    CanonicalField::optional("azure_tenant", &["azure_tenant", "tenant_id", "tenant"]),
    CanonicalField::optional("availability_zone", &["availability_zone"]),
    CanonicalField::optional("auto_scaling", &["auto_scaling", "storage_auto_scaling"]),
    CanonicalField::optional("iops", &["iops", "provisioned_iops"]),
    CanonicalField::optional(
        "high_availability_state",
        &["high_availability_state", "high_availability", "ha_state", "multi_az"],
    ),
    CanonicalField::optional("replica", &["replica", "replicas", "read_replica"]),
    CanonicalField::optional(
        "backup_retention_days",
        &["backup_retention_days", "backup_retention", "backup_retention_period"],
    ),
    CanonicalField::optional("geo_redundant_backup", &["geo_redundant_backup"]),
];

pub const VM_FIELDS: &[CanonicalField] = &[
    CanonicalField::required("computer_name", &["computer_name", "vm_name", "name"]),
    CanonicalField::required("resource_group", &["resource_group"]),
    CanonicalField::optional("private_ip_address", &["private_ip_address", "private_ip"]),
    CanonicalField::optional("subscription", &["subscription", "subscription_name"]),
    CanonicalField::optional("location", &["location", "region"]),
    CanonicalField::optional("vm_size", &["vm_size", "size"]),
    CanonicalField::optional("os_type", &["os_type"]),
    CanonicalField::optional("os_name", &["os_name"]),
    CanonicalField::optional("os_version", &["os_version"]),
    CanonicalField::optional("os_disk_size", &["os_disk_size", "os_disk_size_gb"]),
    CanonicalField::optional("data_disk_count", &["data_disk_count"]),
    CanonicalField::optional("total_disk_size_gb", &["total_disk_size_gb"]),
    CanonicalField::optional("display_status", &["display_status", "power_state", "status"]),
    CanonicalField::optional("time_created", &["time_created", "created"]),
    CanonicalField::optional("tenant_id", &["tenant_id", "tenant"]),
];

pub const ACCOUNT_FIELDS: &[CanonicalField] = &[
    CanonicalField::required("account_id", &["account_id", "account_number", "account"]),
    CanonicalField::required(
        "account_name",
        &[
            "account_alias_friendly_name",
            "account_alias",
            "alias",
            "friendly_name",
            "account_name",
        ],
    ),
    CanonicalField::optional("business_unit", &["business_unit"]),
    CanonicalField::optional("owner", &["owner"]),
    CanonicalField::optional(
        "account_type_data",
        &["account_type_data_type", "account_type_data", "data_type"],
    ),
    CanonicalField::optional(
        "account_type_function",
        &["account_type_function", "function"],
    ),
    CanonicalField::optional("comments", &["comments", "comment", "notes"]),
];

/// A row that produced a draft.
#[derive(Debug, Clone)]
pub struct ParsedRow<T> {
    /// Spreadsheet line number (the header is line 1).
    pub row: usize,
    pub item: T,
    /// Canonical fields whose column is absent from the file.
    pub absent: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRow {
    pub row: usize,
    pub reason: String,
    /// Required fields that were blank or unmapped, if that was the cause.
    pub missing: Vec<&'static str>,
}

impl SkippedRow {
    pub fn new(row: usize, reason: impl Into<String>) -> Self {
        Self {
            row,
            reason: reason.into(),
            missing: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedBatch<T> {
    pub rows: Vec<ParsedRow<T>>,
    pub skipped: Vec<SkippedRow>,
    pub blank_rows: usize,
}

/// Maps and validates every row of `text`. `build` converts a row whose
/// required fields are present; returning `Err(reason)` skips the row.
pub fn parse_rows<T, F>(text: &str, fields: &[CanonicalField], mut build: F) -> Result<ParsedBatch<T>>
where
    F: FnMut(&FieldMap, &[String]) -> std::result::Result<T, String>,
{
    let mut reader = io_utils::open_csv_reader(text.as_bytes(), b',', true);
    let headers: Vec<String> = reader
        .headers()
        .context("Reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();
    let map = FieldMap::resolve(&headers, fields);
    let absent: Vec<&'static str> = map.unmapped().to_vec();
    debug!("Unmapped fields: {:?}", absent);

    let mut batch = ParsedBatch {
        rows: Vec::new(),
        skipped: Vec::new(),
        blank_rows: 0,
    };
    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        let record = record.with_context(|| format!("Reading row {line}"))?;
        let row: Vec<String> = record.iter().map(|cell| cell.to_string()).collect();
        if row_is_blank(&row) {
            batch.blank_rows += 1;
            continue;
        }
        let missing: Vec<&'static str> = fields
            .iter()
            .filter(|field| field.required && map.value(field.name, &row).is_none())
            .map(|field| field.name)
            .collect();
        if !missing.is_empty() {
            batch.skipped.push(SkippedRow {
                row: line,
                reason: format!("Missing required fields: {}", missing.join(", ")),
                missing,
            });
            continue;
        }
        match build(&map, &row) {
            Ok(item) => batch.rows.push(ParsedRow {
                row: line,
                item,
                absent: absent.clone(),
            }),
            Err(reason) => batch.skipped.push(SkippedRow::new(line, reason)),
        }
    }
    Ok(batch)
}

pub fn parse_databases(text: &str, provider: Provider) -> Result<ParsedBatch<Database>> {
    parse_rows(text, DATABASE_FIELDS, |map, row| build_database(map, row, provider))
}

pub fn parse_vms(text: &str) -> Result<ParsedBatch<VirtualMachine>> {
    parse_rows(text, VM_FIELDS, build_vm)
}

pub fn parse_accounts(text: &str) -> Result<ParsedBatch<AwsAccount>> {
    parse_rows(text, ACCOUNT_FIELDS, build_account)
}

fn owned(map: &FieldMap, field: &str, row: &[String]) -> Option<String> {
    map.value(field, row).map(str::to_string)
}

fn build_database(
    map: &FieldMap,
    row: &[String],
    provider: Provider,
) -> std::result::Result<Database, String> {
    if let Some(raw) = map.value("provider", row)
        && let Ok(row_provider) = raw.parse::<Provider>()
        && row_provider != provider
    {
        return Err(format!(
            "Row belongs to provider {row_provider}, not {provider}"
        ));
    }
    let service = map.value("service", row).unwrap_or_default();
    let raw_engine = map.value("engine", row).unwrap_or_default();
    let region = map.value("region", row).unwrap_or_default();
    let engine = match provider {
        Provider::Azure => canonical_azure_engine(raw_engine),
        Provider::Aws => raw_engine.to_string(),
    };

    let mut database = Database::new(provider, service, engine, region);
    database.endpoint = match (map.value("endpoint", row), provider) {
        (Some(endpoint), _) => endpoint.to_string(),
        (None, Provider::Azure) => service.to_string(),
        (None, Provider::Aws) => String::new(),
    };
    database.storage_gb = match map.value("storage_gb", row) {
        Some(raw) if quantity_overflows(raw) => {
            return Err(format!("Storage value {raw} is out of range"));
        }
        Some(raw) => parse_quantity(raw).unwrap_or(0),
        None => 0,
    };
    database.status = map
        .value("status", row)
        .map(Status::from_export)
        .unwrap_or_default();
    if let Some(subscription) = map.value("subscription", row) {
        database.subscription = subscription.to_string();
    }
    database.tags = map.value("tags", row).map(split_tags).unwrap_or_default();
    database.version = owned(map, "version", row);
    if provider == Provider::Azure {
        database.azure_tenant = owned(map, "azure_tenant", row);
    }
    database.availability_zone = owned(map, "availability_zone", row);
    database.auto_scaling = owned(map, "auto_scaling", row);
    database.iops = owned(map, "iops", row);
    database.high_availability_state = owned(map, "high_availability_state", row);
    database.replica = owned(map, "replica", row);
    database.backup_retention_days = owned(map, "backup_retention_days", row);
    database.geo_redundant_backup = owned(map, "geo_redundant_backup", row);
    Ok(database)
}

fn build_vm(map: &FieldMap, row: &[String]) -> std::result::Result<VirtualMachine, String> {
    let mut vm = VirtualMachine::new(
        map.value("computer_name", row).unwrap_or_default(),
        map.value("resource_group", row).unwrap_or_default(),
    );
    vm.private_ip_address = owned(map, "private_ip_address", row);
    vm.subscription = owned(map, "subscription", row).unwrap_or_default();
    vm.location = owned(map, "location", row).unwrap_or_default();
    vm.vm_size = owned(map, "vm_size", row).unwrap_or_default();
    vm.os_type = owned(map, "os_type", row).unwrap_or_default();
    vm.os_name = owned(map, "os_name", row);
    vm.os_version = owned(map, "os_version", row);
    vm.os_disk_size = map.value("os_disk_size", row).and_then(parse_quantity);
    vm.data_disk_count = map
        .value("data_disk_count", row)
        .and_then(parse_quantity)
        .and_then(|count| u32::try_from(count).ok());
    vm.total_disk_size_gb = map.value("total_disk_size_gb", row).and_then(parse_quantity);
    vm.display_status = owned(map, "display_status", row);
    vm.time_created = map.value("time_created", row).and_then(parse_timestamp);
    vm.tenant_id = owned(map, "tenant_id", row);
    Ok(vm)
}

fn build_account(map: &FieldMap, row: &[String]) -> std::result::Result<AwsAccount, String> {
    Ok(AwsAccount {
        account_id: map.value("account_id", row).unwrap_or_default().to_string(),
        account_name: map.value("account_name", row).unwrap_or_default().to_string(),
        business_unit: owned(map, "business_unit", row),
        owner: owned(map, "owner", row),
        account_type_data: owned(map, "account_type_data", row),
        account_type_function: owned(map, "account_type_function", row),
        comments: owned(map, "comments", row),
    })
}

fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value.chars().filter(|ch| *ch != ',').collect();
    cleaned.trim().parse().ok()
}

/// Parses a non-negative quantity such as `"1,024"` or `"20.0"`, truncating
/// fractions. Negative, non-numeric or out-of-range input yields `None`.
pub fn parse_quantity(value: &str) -> Option<u64> {
    let parsed = parse_number(value)?;
    // u64::MAX rounds up to 2^64 as f64, so `<` excludes every unrepresentable value.
    if parsed.is_finite() && parsed >= 0.0 && parsed < u64::MAX as f64 {
        Some(parsed.trunc() as u64)
    } else {
        None
    }
}

/// A numeric cell too large for a `u64` quantity.
fn quantity_overflows(value: &str) -> bool {
    parse_number(value).is_some_and(|parsed| parsed >= u64::MAX as f64)
}

/// Splits an imported tag cell. Tags are `;`-separated so that a tag
/// containing a comma survives an export/import cycle.
pub fn split_tags(value: &str) -> Vec<String> {
    normalize_tags(value.split(';'))
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value.trim()) {
        return Some(parsed.with_timezone(&Utc));
    }
    const FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(value.trim(), fmt)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aws_export_headers_map_onto_databases() {
        let text = "DBInstanceIdentifier,Engine,EngineVersion,Region,Endpoint.Address,AllocatedStorage,DBInstanceStatus,Tags\n\
                    orders-db,postgres,15.4,us-east-1,orders.abc.rds.amazonaws.com,\"1,024\",available,prod; team=data\n";
        let batch = parse_databases(text, Provider::Aws).unwrap();
        assert!(batch.skipped.is_empty());
        let db = &batch.rows[0].item;
        assert_eq!(db.service, "orders-db");
        assert_eq!(db.version.as_deref(), Some("15.4"));
        assert_eq!(db.endpoint, "orders.abc.rds.amazonaws.com");
        assert_eq!(db.storage_gb, 1024);
        assert_eq!(db.subscription, "unknown");
        assert_eq!(db.tags, vec!["prod".to_string(), "team=data".to_string()]);
        assert_eq!(batch.rows[0].row, 2);
    }

    #[test]
    fn azure_rows_canonicalize_engine_and_fallback_endpoint() {
        let text = "Name,DB_Type,Location,State,TenantId\n\
                    sales,Azure Database for MySQL flexible server,westeurope,Ready,t-1\n";
        let batch = parse_databases(text, Provider::Azure).unwrap();
        let db = &batch.rows[0].item;
        assert_eq!(db.engine, "mysql");
        assert_eq!(db.endpoint, "sales");
        assert_eq!(db.status, Status::Ready);
        assert_eq!(db.azure_tenant.as_deref(), Some("t-1"));
    }

    #[test]
    fn rows_missing_required_fields_are_skipped_with_reason() {
        let text = "service,engine,region\norders-db,,us-east-1\n,,\nbilling,mysql,eu-west-1\n";
        let batch = parse_databases(text, Provider::Aws).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.blank_rows, 1);
        assert_eq!(
            batch.skipped,
            vec![SkippedRow {
                row: 2,
                reason: "Missing required fields: engine".to_string(),
                missing: vec!["engine"],
            }]
        );
    }

    #[test]
    fn unmapped_required_column_skips_every_row() {
        let text = "service,engine\norders-db,postgres\n";
        let batch = parse_databases(text, Provider::Aws).unwrap();
        assert!(batch.rows.is_empty());
        assert_eq!(batch.skipped[0].reason, "Missing required fields: region");
    }

    #[test]
    fn rows_for_another_provider_are_skipped() {
        let text = "Provider,Service,Engine,Region\nAzure,sales,mysql,westeurope\nAWS,orders,postgres,us-east-1\n";
        let batch = parse_databases(text, Provider::Aws).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert!(batch.skipped[0].reason.contains("provider Azure"));
    }

    #[test]
    fn vm_export_columns_are_parsed() {
        let text = "computerName,privateIPAddress,Subscription,Resource group,Location,vmSize,osType,osDiskSize,dataDiskCount,displayStatus,timeCreated\n\
                    web-01,10.0.0.4,Prod,rg-web,eastus,Standard_D2s_v3,Linux,30,2,VM running,2023-04-01T10:00:00Z\n";
        let batch = parse_vms(text).unwrap();
        let vm = &batch.rows[0].item;
        assert_eq!(vm.computer_name, "web-01");
        assert_eq!(vm.resource_group, "rg-web");
        assert_eq!(vm.private_ip_address.as_deref(), Some("10.0.0.4"));
        assert_eq!(vm.os_disk_size, Some(30));
        assert_eq!(vm.data_disk_count, Some(2));
        assert!(vm.time_created.is_some());
        assert!(batch.rows[0].absent.contains(&"tenant_id"));
    }

    #[test]
    fn account_inventory_headers_are_parsed() {
        let text = "#,AccountID,Account Alias(Friendly Name),BusinessUnit,Owner,Account Type(Data Type),Account Type(Function),Comments\n\
                    1,123456789012,payments-prod,Payments,alice,Confidential,Production,\n";
        let batch = parse_accounts(text).unwrap();
        let account = &batch.rows[0].item;
        assert_eq!(account.account_id, "123456789012");
        assert_eq!(account.account_name, "payments-prod");
        assert_eq!(account.account_type_data.as_deref(), Some("Confidential"));
        assert_eq!(account.comments, None);
    }

    #[test]
    fn parse_quantity_rejects_negative_and_text() {
        assert_eq!(parse_quantity("20.9"), Some(20));
        assert_eq!(parse_quantity("-5"), None);
        assert_eq!(parse_quantity("n/a"), None);
    }

    #[test]
    fn parse_quantity_rejects_values_beyond_u64() {
        assert_eq!(parse_quantity("99999999999999999999"), None);
        assert_eq!(parse_quantity("18446744073709551615"), None);
        assert_eq!(parse_quantity("1e400"), None);
        assert_eq!(parse_quantity("9,007,199,254,740,992"), Some(9_007_199_254_740_992));
    }

    #[test]
    fn oversized_storage_skips_the_row() {
        let text = "service,engine,region,storage_gb\n\
                    a,postgres,us-east-1,99999999999999999999\n\
                    b,postgres,us-east-1,99999999999999999999\n\
                    c,mysql,us-east-1,20\n";
        let batch = parse_databases(text, Provider::Aws).unwrap();
        assert_eq!(batch.rows.len(), 1);
        assert_eq!(batch.rows[0].item.service, "c");
        assert_eq!(batch.skipped.len(), 2);
        assert_eq!(batch.skipped[0].row, 2);
        assert_eq!(
            batch.skipped[0].reason,
            "Storage value 99999999999999999999 is out of range"
        );

        let records: Vec<crate::model::DatabaseRecord> = batch
            .rows
            .into_iter()
            .map(|parsed| crate::model::Record::new("id", parsed.item))
            .collect();
        assert_eq!(crate::stats::compute_stats(&records).storage_gb_total, 20);
    }
}
