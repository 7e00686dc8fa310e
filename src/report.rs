//! Text rendering of command results.

use std::{collections::BTreeMap, fmt::Write as _};

use itertools::Itertools;

use crate::{
    model::{AzureVm, DatabaseRecord},
    options::{FilterOptions, VmFilterOptions},
    pricing::PricingSummary,
    stats::{EngineMetrics, InventoryStats, UpgradeCounts, average_storage_gb, health_percentage},
    store::{AccountImport, DatabaseImport, DuplicateReport, ResolveReport, VmImport},
    table::{Align, render_pairs, render_table},
    version::EngineFamily,
};

/// Skipped-row details shown before the overflow count.
pub const SKIPPED_PREVIEW: usize = 5;

fn preview<I>(lines: I, total: usize, output: &mut String)
where
    I: IntoIterator<Item = String>,
{
    for line in lines.into_iter().take(SKIPPED_PREVIEW) {
        let _ = writeln!(output, "  {line}");
    }
    if total > SKIPPED_PREVIEW {
        let _ = writeln!(output, "  ... and {} more", total - SKIPPED_PREVIEW);
    }
}

pub fn database_import_summary(result: &DatabaseImport) -> String {
    let mut output = format!("{}\n", result.message);
    output.push_str(&render_pairs(&[
        ("Created".to_string(), result.created.to_string()),
        ("Duplicates".to_string(), result.duplicates.to_string()),
        ("Skipped".to_string(), result.skipped.to_string()),
        ("Deleted".to_string(), result.deleted.to_string()),
    ]));
    if result.deleted > 0 {
        let _ = writeln!(
            output,
            "Warning: {} record(s) not present in the file were deleted",
            result.deleted
        );
        preview(result.deleted_details.iter().cloned(), result.deleted, &mut output);
    }
    if result.blank_rows > 0 {
        let _ = writeln!(output, "Ignored {} blank row(s)", result.blank_rows);
    }
    if !result.skipped_details.is_empty() {
        output.push_str("Skipped rows:\n");
        preview(
            result
                .skipped_details
                .iter()
                .map(|detail| format!("Row {}: {}", detail.row, detail.reason)),
            result.skipped_details.len(),
            &mut output,
        );
    }
    output
}

pub fn vm_import_summary(result: &VmImport) -> String {
    let mut output = format!("{}\n", result.message);
    output.push_str(&render_pairs(&[
        ("Imported".to_string(), result.imported.to_string()),
        ("Skipped".to_string(), result.skipped.to_string()),
        ("Purged".to_string(), result.purged.to_string()),
    ]));
    if !result.skipped_details.is_empty() {
        output.push_str("Skipped rows:\n");
        preview(
            result
                .skipped_details
                .iter()
                .map(|detail| format!("Row {}: {}", detail.row, detail.error)),
            result.skipped_details.len(),
            &mut output,
        );
    }
    output
}

pub fn account_import_summary(result: &AccountImport) -> String {
    format!("{}\n", result.message)
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

/// Inventory listing. AWS subscriptions that are known account ids are
/// labelled with the account alias; `detailed` adds the optional detail
/// columns.
pub fn database_table(
    records: &[&DatabaseRecord],
    account_names: &BTreeMap<&str, &str>,
    detailed: bool,
) -> String {
    let mut names = vec![
        "ID", "Provider", "Service", "Engine", "Version", "Region", "Storage (GB)", "Status",
        "Subscription", "Tags",
    ];
    if detailed {
        names.extend([
            "Endpoint",
            "Azure Tenant",
            "Availability Zone",
            "IOPS",
            "High Availability",
            "Backup Retention (Days)",
        ]);
    }
    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            let subscription = match account_names.get(record.subscription.as_str()) {
                Some(alias) => format!("{alias} ({})", record.subscription),
                None => record.subscription.clone(),
            };
            let mut row = vec![
                record.id.clone(),
                record.provider.to_string(),
                record.service.clone(),
                record.engine.clone(),
                record.version.clone().unwrap_or_else(|| "-".to_string()),
                record.region.clone(),
                record.storage_gb.to_string(),
                record.status.to_string(),
                subscription,
                record.joined_tags(),
            ];
            if detailed {
                row.extend([
                    record.endpoint.clone(),
                    record.azure_tenant.clone().unwrap_or_default(),
                    record.availability_zone.clone().unwrap_or_default(),
                    record.iops.clone().unwrap_or_default(),
                    record.high_availability_state.clone().unwrap_or_default(),
                    record.backup_retention_days.clone().unwrap_or_default(),
                ]);
            }
            row
        })
        .collect();
    let mut align = vec![Align::Left; names.len()];
    align[6] = Align::Right;
    render_table(&headers(&names), &rows, &align)
}

pub fn stat_cards(stats: &InventoryStats, health_excludes_stopped: bool) -> String {
    let mut pairs = vec![
        ("Total databases".to_string(), stats.total.to_string()),
        ("Total storage (GB)".to_string(), stats.storage_gb_total.to_string()),
        (
            "Average storage (GB)".to_string(),
            average_storage_gb(stats).to_string(),
        ),
        (
            "Health".to_string(),
            format!("{}%", health_percentage(stats, health_excludes_stopped)),
        ),
    ];
    for (provider, count) in &stats.by_provider {
        pairs.push((format!("Provider {provider}"), count.to_string()));
    }
    for (status, count) in &stats.by_status {
        pairs.push((format!("Status {status}"), count.to_string()));
    }
    render_pairs(&pairs)
}

pub fn metrics_report(metrics: &EngineMetrics) -> String {
    let mut rows = Vec::new();
    for family in EngineFamily::ALL {
        let count = metrics.rdbms_counts.get(&family).copied().unwrap_or(0);
        let share = metrics.rdbms_percentages.get(&family).copied().unwrap_or(0.0);
        let versions = metrics
            .version_counts
            .get(&family)
            .map(|counts| {
                counts
                    .iter()
                    .map(|(version, count)| format!("{version}={count}"))
                    .join(", ")
            })
            .unwrap_or_default();
        rows.push(vec![
            family.to_string(),
            count.to_string(),
            format!("{share:.1}%"),
            versions,
        ]);
    }
    render_table(
        &headers(&["Engine", "Count", "Share", "Versions"]),
        &rows,
        &[Align::Left, Align::Right, Align::Right, Align::Left],
    )
}

pub fn upgrade_report(counts: &UpgradeCounts, records: &[&DatabaseRecord]) -> String {
    let mut output = render_pairs(
        &std::iter::once(("Needs upgrade".to_string(), counts.total.to_string()))
            .chain(
                counts
                    .by_engine
                    .iter()
                    .map(|(family, count)| (family.to_string(), count.to_string())),
            )
            .collect::<Vec<_>>(),
    );
    if !records.is_empty() {
        output.push('\n');
        output.push_str(&database_table(records, &BTreeMap::new(), false));
    }
    output
}

pub fn pricing_report(summary: &PricingSummary<'_>) -> String {
    let rows: Vec<Vec<String>> = summary
        .databases
        .iter()
        .map(|priced| {
            vec![
                priced.record.provider.to_string(),
                priced.record.service.clone(),
                priced.record.engine.clone(),
                priced.record.region.clone(),
                priced.record.storage_gb.to_string(),
                format!("{:.4}", priced.hourly_cost),
                format!("{:.2}", priced.monthly_cost),
            ]
        })
        .collect();
    let mut output = render_table(
        &headers(&[
            "Provider",
            "Service",
            "Engine",
            "Region",
            "Storage (GB)",
            "Hourly",
            "Monthly",
        ]),
        &rows,
        &[
            Align::Left,
            Align::Left,
            Align::Left,
            Align::Left,
            Align::Right,
            Align::Right,
            Align::Right,
        ],
    );
    output.push('\n');
    output.push_str(&render_pairs(&[
        ("Databases".to_string(), summary.count.to_string()),
        ("Total hourly".to_string(), format!("{:.4}", summary.total_hourly)),
        ("Total monthly".to_string(), format!("{:.2}", summary.total_monthly)),
        ("Annual estimate".to_string(), format!("{:.2}", summary.annual_estimate())),
    ]));
    output
}

fn option_line(output: &mut String, label: &str, values: &[String]) {
    let joined = if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    };
    let _ = writeln!(output, "{label}: {joined}");
}

pub fn options_report(options: &FilterOptions) -> String {
    let mut output = String::new();
    option_line(
        &mut output,
        "Providers",
        &options.providers.iter().map(|p| p.to_string()).collect::<Vec<_>>(),
    );
    option_line(&mut output, "Regions", &options.regions);
    option_line(&mut output, "Engines", &options.engines);
    option_line(&mut output, "Versions", &options.versions);
    option_line(&mut output, "Subscriptions", &options.subscriptions);
    option_line(
        &mut output,
        "Statuses",
        &options.statuses.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
    );
    output
}

pub fn vm_options_report(options: &VmFilterOptions) -> String {
    let mut output = String::new();
    option_line(&mut output, "Regions", &options.regions);
    option_line(&mut output, "Subscriptions", &options.subscriptions);
    option_line(&mut output, "Tenants", &options.tenants);
    option_line(&mut output, "Statuses", &options.statuses);
    output
}

/// VM listing; `tenant_name` resolves tenant ids to display names.
pub fn vm_table<F>(vms: &[&AzureVm], tenant_name: F) -> String
where
    F: Fn(Option<&str>) -> String,
{
    let rows: Vec<Vec<String>> = vms
        .iter()
        .map(|vm| {
            vec![
                vm.id.clone(),
                vm.computer_name.clone(),
                vm.private_ip_address.clone().unwrap_or_default(),
                vm.subscription.clone(),
                vm.resource_group.clone(),
                vm.location.clone(),
                vm.vm_size.clone(),
                vm.os_type.clone(),
                vm.display_status.clone().unwrap_or_default(),
                tenant_name(vm.tenant_id.as_deref()),
            ]
        })
        .collect();
    render_table(
        &headers(&[
            "ID",
            "Computer Name",
            "Private IP",
            "Subscription",
            "Resource Group",
            "Location",
            "Size",
            "OS",
            "Status",
            "Tenant",
        ]),
        &rows,
        &[],
    )
}

pub fn duplicates_report(report: &DuplicateReport) -> String {
    if report.groups.is_empty() {
        return "No duplicate databases found\n".to_string();
    }
    let mut output = format!(
        "{} duplicate group(s) covering {} record(s)\n",
        report.groups_count, report.records_count
    );
    for group in &report.groups {
        let _ = writeln!(
            output,
            "{} {} ({}): {} records [{}]",
            group.provider,
            group.service,
            group.region,
            group.count,
            group
                .records
                .iter()
                .map(|record| format!(
                    "{} v{}",
                    record.id,
                    record.version.as_deref().unwrap_or("?")
                ))
                .join(", ")
        );
    }
    output
}

pub fn resolve_report(report: &ResolveReport) -> String {
    let mut output = format!(
        "Resolved {} duplicate group(s); deleted {} record(s)\n",
        report.keys_processed, report.deleted_count
    );
    for detail in &report.details {
        let _ = writeln!(
            output,
            "{}: kept {} ({}), deleted {}",
            detail.key,
            detail.kept_id,
            detail.kept_version.as_deref().unwrap_or("no version"),
            detail.deleted_ids.join(", ")
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SkippedDetail;

    #[test]
    fn import_summary_previews_five_skipped_rows() {
        let result = DatabaseImport {
            message: "Successfully imported 1 database records".to_string(),
            created: 1,
            duplicates: 0,
            skipped: 7,
            deleted: 0,
            blank_rows: 3,
            skipped_details: (2..9)
                .map(|row| SkippedDetail {
                    row,
                    reason: "Missing required fields: engine".to_string(),
                })
                .collect(),
            duplicates_details: Vec::new(),
            deleted_details: Vec::new(),
        };
        let summary = database_import_summary(&result);
        assert!(summary.contains("Row 6: Missing required fields: engine"));
        assert!(!summary.contains("Row 7:"));
        assert!(summary.contains("... and 2 more"));
        assert!(!summary.contains("Warning"));
        assert!(summary.contains("Ignored 3 blank row(s)"));
    }

    #[test]
    fn sync_deletions_are_called_out() {
        let result = DatabaseImport {
            message: "Successfully imported 0 database records".to_string(),
            created: 0,
            duplicates: 0,
            skipped: 0,
            deleted: 2,
            blank_rows: 0,
            skipped_details: Vec::new(),
            duplicates_details: Vec::new(),
            deleted_details: vec!["AWS a (us-east-1)".to_string(), "AWS b (us-east-1)".to_string()],
        };
        let summary = database_import_summary(&result);
        assert!(summary.contains("Warning: 2 record(s) not present in the file were deleted"));
        assert!(summary.contains("AWS b (us-east-1)"));
        assert!(!summary.contains("blank row"));
    }
}
