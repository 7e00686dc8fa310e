//! Record filters shared by the inventory list, dashboard stats, metrics,
//! pricing, export and upgrade views.
//!
//! A filter set is lowered into a list of [`FilterCondition`]s that are
//! evaluated in order and AND together; an empty list keeps everything.

use serde::{Deserialize, Serialize};

use crate::{
    model::{AzureVm, DatabaseRecord, Provider, Status},
    version::{EngineFamily, extract_major_version, major_version_of},
};

/// How the engine filter compares against a record's engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMatch {
    /// Engine names must be equal (inventory view).
    #[default]
    Exact,
    /// Engines must classify into the same family (upgrades view).
    Family,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryFilters {
    pub provider: Option<Provider>,
    pub status: Option<Status>,
    pub region: Option<String>,
    pub engine: Option<String>,
    #[serde(default)]
    pub engine_match: EngineMatch,
    pub version: Option<String>,
    pub subscription: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub exclude_stopped: bool,
}

/// Treats blank values and the `all` sentinel used by option lists as "no
/// filter".
pub fn choice(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterCondition {
    Provider(Provider),
    Status(Status),
    NotStopped,
    Region(String),
    Engine(String),
    EngineFamily(Option<EngineFamily>),
    MajorVersion(String),
    Subscription(String),
    Search(String),
}

impl InventoryFilters {
    pub fn is_empty(&self) -> bool {
        self.conditions().is_empty()
    }

    pub fn conditions(&self) -> Vec<FilterCondition> {
        let mut conditions = Vec::new();
        if self.exclude_stopped && self.status.is_none() {
            conditions.push(FilterCondition::NotStopped);
        }
        if let Some(provider) = self.provider {
            conditions.push(FilterCondition::Provider(provider));
        }
        if let Some(status) = self.status {
            conditions.push(FilterCondition::Status(status));
        }
        if let Some(region) = choice(self.region.clone()) {
            conditions.push(FilterCondition::Region(region));
        }
        if let Some(engine) = choice(self.engine.clone()) {
            conditions.push(match self.engine_match {
                EngineMatch::Exact => FilterCondition::Engine(engine),
                EngineMatch::Family => {
                    FilterCondition::EngineFamily(EngineFamily::classify(&engine))
                }
            });
        }
        if let Some(version) = choice(self.version.clone()) {
            conditions.push(FilterCondition::MajorVersion(extract_major_version(&version)));
        }
        if let Some(subscription) = choice(self.subscription.clone()) {
            conditions.push(FilterCondition::Subscription(subscription));
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            conditions.push(FilterCondition::Search(search.to_lowercase()));
        }
        conditions
    }
}

pub fn evaluate_conditions(conditions: &[FilterCondition], record: &DatabaseRecord) -> bool {
    conditions
        .iter()
        .all(|condition| evaluate_condition(condition, record))
}

fn evaluate_condition(condition: &FilterCondition, record: &DatabaseRecord) -> bool {
    match condition {
        FilterCondition::Provider(provider) => record.provider == *provider,
        FilterCondition::Status(status) => record.status == *status,
        FilterCondition::NotStopped => record.status != Status::Stopped,
        FilterCondition::Region(region) => record.region == *region,
        FilterCondition::Engine(engine) => record.engine == *engine,
        FilterCondition::EngineFamily(family) => {
            family.is_some() && EngineFamily::classify(&record.engine) == *family
        }
        FilterCondition::MajorVersion(bucket) => {
            major_version_of(record.version.as_deref()).as_deref() == Some(bucket.as_str())
        }
        FilterCondition::Subscription(subscription) => record.subscription == *subscription,
        FilterCondition::Search(needle) => [
            record.engine.as_str(),
            record.service.as_str(),
            record.endpoint.as_str(),
            record.joined_tags().as_str(),
        ]
        .iter()
        .any(|haystack| haystack.to_lowercase().contains(needle)),
    }
}

/// Records matching every filter, in their original order.
pub fn apply_filters<'a>(
    records: &'a [DatabaseRecord],
    filters: &InventoryFilters,
) -> Vec<&'a DatabaseRecord> {
    let conditions = filters.conditions();
    records
        .iter()
        .filter(|record| evaluate_conditions(&conditions, record))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmFilters {
    pub region: Option<String>,
    pub subscription: Option<String>,
    pub tenant_id: Option<String>,
    pub status: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub exclude_stopped: bool,
}

impl VmFilters {
    pub fn matches(&self, vm: &AzureVm) -> bool {
        let status = choice(self.status.clone());
        if self.exclude_stopped && status.is_none() && vm.is_stopped() {
            return false;
        }
        if let Some(region) = choice(self.region.clone())
            && !vm.location.eq_ignore_ascii_case(&region)
        {
            return false;
        }
        if let Some(subscription) = choice(self.subscription.clone())
            && !vm
                .subscription
                .to_lowercase()
                .contains(&subscription.to_lowercase())
        {
            return false;
        }
        if let Some(tenant) = choice(self.tenant_id.clone())
            && vm.tenant_id.as_deref() != Some(tenant.as_str())
        {
            return false;
        }
        if let Some(status) = status
            && !vm
                .display_status
                .as_deref()
                .is_some_and(|current| current.eq_ignore_ascii_case(&status))
        {
            return false;
        }
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let needle = search.to_lowercase();
            return vm.computer_name.to_lowercase().contains(&needle)
                || vm.resource_group.to_lowercase().contains(&needle);
        }
        true
    }
}

pub fn apply_vm_filters<'a>(vms: &'a [AzureVm], filters: &VmFilters) -> Vec<&'a AzureVm> {
    vms.iter().filter(|vm| filters.matches(vm)).collect()
}
