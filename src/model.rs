//! Inventory entities: managed databases, Azure virtual machines and AWS
//! accounts, plus the provider/status enums shared by every view.

use std::{fmt, hash::Hash, ops::Deref, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::InventoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "AWS")]
    Aws,
    #[serde(rename = "Azure")]
    Azure,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::Aws => "AWS",
            Provider::Azure => "Azure",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = InventoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Provider::Aws),
            "azure" => Ok(Provider::Azure),
            _ => Err(InventoryError::UnknownProvider(value.to_string())),
        }
    }
}

/// Lifecycle state of a managed database. `Available` and `Ready` both mean
/// the instance is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Available,
    Ready,
    Stopped,
    Maintenance,
    Warning,
}

impl Default for Status {
    fn default() -> Self {
        Status::Available
    }
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Available => "available",
            Status::Ready => "ready",
            Status::Stopped => "stopped",
            Status::Maintenance => "maintenance",
            Status::Warning => "warning",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Status::Available | Status::Ready)
    }

    /// Maps the free-form status words found in cloud console exports onto a
    /// status. Unrecognised text counts as available.
    pub fn from_export(value: &str) -> Self {
        let lowered = value.trim().to_ascii_lowercase();
        if let Ok(exact) = lowered.parse::<Status>() {
            return exact;
        }
        if ["maintenance", "upgrading"]
            .iter()
            .any(|word| lowered.contains(word))
        {
            Status::Maintenance
        } else if ["warning", "error", "failed"]
            .iter()
            .any(|word| lowered.contains(word))
        {
            Status::Warning
        } else if ["stopped", "deallocated", "paused"]
            .iter()
            .any(|word| lowered.contains(word))
        {
            Status::Stopped
        } else {
            Status::Available
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = InventoryError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "available" => Ok(Status::Available),
            "ready" => Ok(Status::Ready),
            "stopped" => Ok(Status::Stopped),
            "maintenance" => Ok(Status::Maintenance),
            "warning" => Ok(Status::Warning),
            _ => Err(InventoryError::UnknownStatus(value.to_string())),
        }
    }
}

/// A stored entity: the store-assigned id plus the entity's attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub id: String,
    #[serde(flatten)]
    pub fields: T,
}

impl<T> Record<T> {
    pub fn new(id: impl Into<String>, fields: T) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

impl<T> Deref for Record<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.fields
    }
}

/// Behaviour the reconciler needs from an importable entity.
pub trait InventoryItem: Clone {
    type Key: Eq + Hash + Clone + fmt::Debug;

    fn natural_key(&self) -> Self::Key;

    fn describe_key(&self) -> String;

    /// Id to use on creation instead of a generated one.
    fn preferred_id(&self) -> Option<String> {
        None
    }

    /// Overwrites `self` with `incoming`, except for the canonical fields in
    /// `keep` whose columns were absent from the imported file.
    fn refresh(&mut self, incoming: Self, keep: &[&'static str]);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Database {
    pub provider: Provider,
    pub service: String,
    pub engine: String,
    pub region: String,
    pub endpoint: String,
    pub storage_gb: u64,
    #[serde(default)]
    pub status: Status,
    pub subscription: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub azure_tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_scaling: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iops: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high_availability_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_retention_days: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_redundant_backup: Option<String>,
}

pub type DatabaseRecord = Record<Database>;

impl Database {
    /// A database with the required attributes set and everything else at
    /// its import default.
    pub fn new(
        provider: Provider,
        service: impl Into<String>,
        engine: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            service: service.into(),
            engine: engine.into(),
            region: region.into(),
            endpoint: String::new(),
            storage_gb: 0,
            status: Status::Available,
            subscription: "unknown".to_string(),
            tags: Vec::new(),
            version: None,
            azure_tenant: None,
            availability_zone: None,
            auto_scaling: None,
            iops: None,
            high_availability_state: None,
            replica: None,
            backup_retention_days: None,
            geo_redundant_backup: None,
        }
    }

    pub fn joined_tags(&self) -> String {
        self.tags.join("; ")
    }

    pub fn validate(&self) -> Result<(), InventoryError> {
        for (field, value) in [
            ("service", &self.service),
            ("engine", &self.engine),
            ("region", &self.region),
        ] {
            if value.trim().is_empty() {
                return Err(InventoryError::Validation {
                    field,
                    message: "must not be empty".to_string(),
                });
            }
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(InventoryError::Validation {
                field: "tags",
                message: "tags must not be blank".to_string(),
            });
        }
        Ok(())
    }
}

impl InventoryItem for Database {
    type Key = (Provider, String, String);

    fn natural_key(&self) -> Self::Key {
        (self.provider, self.service.clone(), self.region.clone())
    }

    fn describe_key(&self) -> String {
        format!("{} {} ({})", self.provider, self.service, self.region)
    }

    fn refresh(&mut self, incoming: Self, keep: &[&'static str]) {
        let previous = std::mem::replace(self, incoming);
        for field in keep {
            match *field {
                "endpoint" => self.endpoint = previous.endpoint.clone(),
                "storage_gb" => self.storage_gb = previous.storage_gb,
                "status" => self.status = previous.status,
                "subscription" => self.subscription = previous.subscription.clone(),
                "tags" => self.tags = previous.tags.clone(),
                "version" => self.version = previous.version.clone(),
                "azure_tenant" => self.azure_tenant = previous.azure_tenant.clone(),
                "availability_zone" => {
                    self.availability_zone = previous.availability_zone.clone()
                }
                "auto_scaling" => self.auto_scaling = previous.auto_scaling.clone(),
                "iops" => self.iops = previous.iops.clone(),
                "high_availability_state" => {
                    self.high_availability_state = previous.high_availability_state.clone()
                }
                "replica" => self.replica = previous.replica.clone(),
                "backup_retention_days" => {
                    self.backup_retention_days = previous.backup_retention_days.clone()
                }
                "geo_redundant_backup" => {
                    self.geo_redundant_backup = previous.geo_redundant_backup.clone()
                }
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub computer_name: String,
    #[serde(default)]
    pub private_ip_address: Option<String>,
    pub subscription: String,
    pub resource_group: String,
    pub location: String,
    pub vm_size: String,
    pub os_type: String,
    #[serde(default)]
    pub os_name: Option<String>,
    #[serde(default)]
    pub os_version: Option<String>,
    #[serde(default)]
    pub os_disk_size: Option<u64>,
    #[serde(default)]
    pub data_disk_count: Option<u32>,
    #[serde(default)]
    pub total_disk_size_gb: Option<u64>,
    #[serde(default)]
    pub display_status: Option<String>,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tenant_id: Option<String>,
}

pub type AzureVm = Record<VirtualMachine>;

impl VirtualMachine {
    pub fn new(computer_name: impl Into<String>, resource_group: impl Into<String>) -> Self {
        Self {
            computer_name: computer_name.into(),
            private_ip_address: None,
            subscription: String::new(),
            resource_group: resource_group.into(),
            location: String::new(),
            vm_size: String::new(),
            os_type: String::new(),
            os_name: None,
            os_version: None,
            os_disk_size: None,
            data_disk_count: None,
            total_disk_size_gb: None,
            display_status: None,
            time_created: None,
            tenant_id: None,
        }
    }

    /// Stopped or deallocated machines, as reported by the Azure power state.
    pub fn is_stopped(&self) -> bool {
        self.display_status.as_deref().is_some_and(|status| {
            let lowered = status.to_ascii_lowercase();
            lowered.contains("stopped") || lowered.contains("deallocated")
        })
    }
}

impl InventoryItem for VirtualMachine {
    type Key = (String, String);

    fn natural_key(&self) -> Self::Key {
        (
            self.computer_name.to_lowercase(),
            self.resource_group.to_lowercase(),
        )
    }

    fn describe_key(&self) -> String {
        format!("{} ({})", self.computer_name, self.resource_group)
    }

    fn refresh(&mut self, incoming: Self, keep: &[&'static str]) {
        let previous = std::mem::replace(self, incoming);
        for field in keep {
            match *field {
                "private_ip_address" => {
                    self.private_ip_address = previous.private_ip_address.clone()
                }
                "subscription" => self.subscription = previous.subscription.clone(),
                "location" => self.location = previous.location.clone(),
                "vm_size" => self.vm_size = previous.vm_size.clone(),
                "os_type" => self.os_type = previous.os_type.clone(),
                "os_name" => self.os_name = previous.os_name.clone(),
                "os_version" => self.os_version = previous.os_version.clone(),
                "os_disk_size" => self.os_disk_size = previous.os_disk_size,
                "data_disk_count" => self.data_disk_count = previous.data_disk_count,
                "total_disk_size_gb" => self.total_disk_size_gb = previous.total_disk_size_gb,
                "display_status" => self.display_status = previous.display_status.clone(),
                "time_created" => self.time_created = previous.time_created,
                "tenant_id" => self.tenant_id = previous.tenant_id.clone(),
                _ => {}
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwsAccount {
    pub account_id: String,
    pub account_name: String,
    #[serde(default)]
    pub business_unit: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub account_type_data: Option<String>,
    #[serde(default)]
    pub account_type_function: Option<String>,
    #[serde(default)]
    pub comments: Option<String>,
}

impl InventoryItem for AwsAccount {
    type Key = String;

    fn natural_key(&self) -> Self::Key {
        self.account_id.clone()
    }

    fn describe_key(&self) -> String {
        format!("{} ({})", self.account_name, self.account_id)
    }

    fn preferred_id(&self) -> Option<String> {
        Some(self.account_id.clone())
    }

    // Account imports are upserts: every column present in the file wins.
    fn refresh(&mut self, incoming: Self, keep: &[&'static str]) {
        let previous = std::mem::replace(self, incoming);
        for field in keep {
            match *field {
                "business_unit" => self.business_unit = previous.business_unit.clone(),
                "owner" => self.owner = previous.owner.clone(),
                "account_type_data" => self.account_type_data = previous.account_type_data.clone(),
                "account_type_function" => {
                    self.account_type_function = previous.account_type_function.clone()
                }
                "comments" => self.comments = previous.comments.clone(),
                _ => {}
            }
        }
    }
}

/// Trims tags, drops blanks and repeats while keeping first-seen order.
pub fn normalize_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let trimmed = tag.as_ref().trim();
        if trimmed.is_empty() || normalized.iter().any(|existing| existing == trimmed) {
            continue;
        }
        normalized.push(trimmed.to_string());
    }
    normalized
}
