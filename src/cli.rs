use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    config::Preference,
    export::ExportFormat,
    filter::{EngineMatch, InventoryFilters, VmFilters},
    model::{Provider, Status},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Track cloud database, VM and account inventory", long_about = None)]
pub struct Cli {
    /// Inventory store (JSON). Overrides $CLOUD_INVENTORY_STORE and the settings file
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// Settings file (YAML). Overrides $CLOUD_INVENTORY_CONFIG
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import a CSV export into the inventory
    #[command(subcommand)]
    Import(ImportCommand),
    /// List databases matching the filters
    List(ListArgs),
    /// Dashboard statistics for the filtered databases
    Stats(StatsArgs),
    /// Engine counts and version breakdown
    Metrics(FilterArgs),
    /// Databases running versions below the supported floor
    Upgrades(FilterArgs),
    /// Estimated hosting cost per database
    Pricing(PricingArgs),
    /// Values available for each filter
    Options(OptionsArgs),
    /// Azure virtual machines
    #[command(subcommand)]
    Vms(VmCommand),
    /// Known Azure tenant names
    Tenants,
    /// Add a single database record
    Add(AddArgs),
    /// Delete one database record
    Delete(DeleteArgs),
    /// Delete every database record
    Purge(ConfirmArgs),
    /// Change the status of a database record
    SetStatus(SetStatusArgs),
    /// Find (and optionally resolve) databases sharing provider, service and region
    Duplicates(DuplicatesArgs),
    /// Export the filtered databases as CSV or Excel
    Export(ExportArgs),
    /// Read or change display preferences
    #[command(subcommand)]
    Prefs(PrefsCommand),
}

#[derive(Debug, Subcommand)]
pub enum ImportCommand {
    /// Managed database export (AWS RDS or Azure)
    Databases(ImportDatabasesArgs),
    /// Azure VM export; machines absent from the file are purged
    Vms(ImportArgs),
    /// AWS account inventory
    Accounts(ImportArgs),
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    /// CSV file to import (`-` for stdin)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ImportDatabasesArgs {
    #[command(flatten)]
    pub file: ImportArgs,
    /// Provider the export came from
    #[arg(long, value_parser = parse_provider, default_value = "AWS")]
    pub provider: Provider,
    /// Delete this provider's records that are absent from the file
    #[arg(long)]
    pub sync: bool,
}

#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    #[arg(long, value_parser = parse_provider)]
    pub provider: Option<Provider>,
    #[arg(long, value_parser = parse_status)]
    pub status: Option<Status>,
    #[arg(long)]
    pub region: Option<String>,
    #[arg(long)]
    pub engine: Option<String>,
    /// Matches on major version (e.g. 8.0.35 and 8.0.21 both match 8.0)
    #[arg(long)]
    pub version: Option<String>,
    #[arg(long)]
    pub subscription: Option<String>,
    /// Case-insensitive text search over engine, service, endpoint and tags
    #[arg(long)]
    pub search: Option<String>,
    /// Hide stopped databases (defaults to the excludeStopped preference)
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub exclude_stopped: Option<bool>,
}

impl FilterArgs {
    pub fn to_filters(&self, exclude_stopped_default: bool, engine_match: EngineMatch) -> InventoryFilters {
        InventoryFilters {
            provider: self.provider,
            status: self.status,
            region: self.region.clone(),
            engine: self.engine.clone(),
            engine_match,
            version: self.version.clone(),
            subscription: self.subscription.clone(),
            search: self.search.clone(),
            exclude_stopped: self.exclude_stopped.unwrap_or(exclude_stopped_default),
        }
    }
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Include endpoint, tenant and availability columns
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub detailed: Option<bool>,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Leave stopped databases out of the health percentage denominator
    #[arg(long)]
    pub health_excludes_stopped: bool,
}

#[derive(Debug, Args)]
pub struct PricingArgs {
    #[command(flatten)]
    pub filters: FilterArgs,
    /// YAML rate table (defaults to the settings file's `rates`, then built-in rates)
    #[arg(long)]
    pub rates: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct OptionsArgs {
    /// Narrow region options to this provider
    #[arg(long, value_parser = parse_provider)]
    pub provider: Option<Provider>,
}

#[derive(Debug, Subcommand)]
pub enum VmCommand {
    /// List Azure VMs matching the filters
    List(VmFilterArgs),
    /// Values available for each VM filter
    Options,
    /// Delete one VM record
    Delete(DeleteArgs),
}

#[derive(Debug, Args)]
pub struct VmFilterArgs {
    #[arg(long)]
    pub region: Option<String>,
    #[arg(long)]
    pub subscription: Option<String>,
    #[arg(long = "tenant")]
    pub tenant_id: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub exclude_stopped: Option<bool>,
}

impl VmFilterArgs {
    pub fn to_filters(&self, exclude_stopped_default: bool) -> VmFilters {
        VmFilters {
            region: self.region.clone(),
            subscription: self.subscription.clone(),
            tenant_id: self.tenant_id.clone(),
            status: self.status.clone(),
            search: self.search.clone(),
            exclude_stopped: self.exclude_stopped.unwrap_or(exclude_stopped_default),
        }
    }
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(long, value_parser = parse_provider)]
    pub provider: Provider,
    #[arg(long)]
    pub service: String,
    #[arg(long)]
    pub engine: String,
    #[arg(long)]
    pub region: String,
    #[arg(long, default_value = "")]
    pub endpoint: String,
    #[arg(long = "storage-gb", default_value_t = 0)]
    pub storage_gb: u64,
    #[arg(long, value_parser = parse_status, default_value = "available")]
    pub status: Status,
    #[arg(long, default_value = "unknown")]
    pub subscription: String,
    /// Tag to attach (repeatable)
    #[arg(long = "tag", action = clap::ArgAction::Append)]
    pub tags: Vec<String>,
    #[arg(long)]
    pub version: Option<String>,
    #[arg(long = "azure-tenant")]
    pub azure_tenant: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfirmArgs {
    /// Confirm the deletion
    #[arg(long)]
    pub yes: bool,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    /// Record id
    pub id: String,
    #[command(flatten)]
    pub confirm: ConfirmArgs,
}

#[derive(Debug, Args)]
pub struct SetStatusArgs {
    pub id: String,
    #[arg(value_parser = parse_status)]
    pub status: Status,
}

#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    /// Keep the latest version of each group and delete the rest
    #[arg(long)]
    pub resolve: bool,
    #[command(flatten)]
    pub confirm: ConfirmArgs,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[command(flatten)]
    pub filters: FilterArgs,
    /// Output file (`-` for stdout); defaults to inventory-export.csv/.xls
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
    pub format: ExportFormat,
    /// Character encoding for the output file (defaults to utf-8)
    #[arg(long = "output-encoding")]
    pub output_encoding: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    /// Show one preference, or all of them
    Get {
        #[arg(value_enum)]
        preference: Option<Preference>,
    },
    /// Turn a preference on or off
    Set {
        #[arg(value_enum)]
        preference: Preference,
        #[arg(action = clap::ArgAction::Set, value_parser = clap::value_parser!(bool))]
        enabled: bool,
    },
}

pub fn parse_provider(value: &str) -> Result<Provider, String> {
    value.parse().map_err(|err: crate::error::InventoryError| err.to_string())
}

pub fn parse_status(value: &str) -> Result<Status, String> {
    value.parse().map_err(|err: crate::error::InventoryError| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_import_with_global_flags() {
        let cli = Cli::try_parse_from([
            "cloud-inventory",
            "--store",
            "inv.json",
            "import",
            "databases",
            "-i",
            "rds.csv",
            "--provider",
            "azure",
            "--sync",
        ])
        .unwrap();
        assert_eq!(cli.store, Some(PathBuf::from("inv.json")));
        match cli.command {
            Commands::Import(ImportCommand::Databases(args)) => {
                assert_eq!(args.provider, Provider::Azure);
                assert!(args.sync);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn exclude_stopped_flag_overrides_preference() {
        let cli = Cli::try_parse_from(["cloud-inventory", "list", "--exclude-stopped"]).unwrap();
        let Commands::List(args) = cli.command else {
            panic!("expected list");
        };
        assert!(args.filters.to_filters(false, EngineMatch::Exact).exclude_stopped);

        let cli =
            Cli::try_parse_from(["cloud-inventory", "list", "--exclude-stopped", "false"]).unwrap();
        let Commands::List(args) = cli.command else {
            panic!("expected list");
        };
        assert!(!args.filters.to_filters(true, EngineMatch::Exact).exclude_stopped);
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(Cli::try_parse_from(["cloud-inventory", "options", "--provider", "gcp"]).is_err());
    }
}
