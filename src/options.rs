//! Dropdown option lists derived from the current record set.
//!
//! Region options narrow to the chosen provider; version options are
//! already reduced to major buckets so a selected option matches the way the
//! version filter compares.

use itertools::Itertools;
use serde::Serialize;

use crate::{
    error::InventoryError,
    filter::choice,
    model::{AzureVm, DatabaseRecord, Provider, Status},
    version::major_version_of,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub providers: Vec<Provider>,
    pub regions: Vec<String>,
    pub engines: Vec<String>,
    pub versions: Vec<String>,
    pub subscriptions: Vec<String>,
    pub statuses: Vec<Status>,
}

fn distinct<I>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    values
        .into_iter()
        .filter(|value| !value.trim().is_empty())
        .sorted()
        .dedup()
        .collect()
}

pub fn filter_options(records: &[DatabaseRecord], provider: Option<Provider>) -> FilterOptions {
    FilterOptions {
        providers: records.iter().map(|r| r.provider).sorted().dedup().collect(),
        regions: distinct(
            records
                .iter()
                .filter(|r| provider.is_none_or(|p| r.provider == p))
                .map(|r| r.region.clone()),
        ),
        engines: distinct(records.iter().map(|r| r.engine.clone())),
        versions: distinct(
            records
                .iter()
                .filter_map(|r| major_version_of(r.version.as_deref())),
        ),
        subscriptions: distinct(records.iter().map(|r| r.subscription.clone())),
        statuses: records.iter().map(|r| r.status).sorted().dedup().collect(),
    }
}

/// Rejects a region that is not offered for the selected provider. Without
/// a provider every region is accepted, as are `None` and the `all` sentinel.
pub fn validate_region(
    records: &[DatabaseRecord],
    provider: Option<Provider>,
    region: Option<&str>,
) -> Result<(), InventoryError> {
    let Some(region) = choice(region.map(str::to_string)) else {
        return Ok(());
    };
    if provider.is_none() {
        return Ok(());
    }
    let offered = filter_options(records, provider).regions;
    if offered.iter().any(|candidate| *candidate == region) {
        Ok(())
    } else {
        Err(InventoryError::RegionUnavailable { region })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VmFilterOptions {
    pub regions: Vec<String>,
    pub subscriptions: Vec<String>,
    pub tenants: Vec<String>,
    pub statuses: Vec<String>,
}

pub fn vm_filter_options(vms: &[AzureVm]) -> VmFilterOptions {
    VmFilterOptions {
        regions: distinct(vms.iter().map(|vm| vm.location.clone())),
        subscriptions: distinct(vms.iter().map(|vm| vm.subscription.clone())),
        tenants: distinct(vms.iter().filter_map(|vm| vm.tenant_id.clone())),
        statuses: distinct(vms.iter().filter_map(|vm| vm.display_status.clone())),
    }
}
