pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod ingest;
pub mod io_utils;
pub mod mapping;
pub mod model;
pub mod options;
pub mod pricing;
pub mod reconcile;
pub mod report;
pub mod stats;
pub mod store;
pub mod table;
pub mod version;
pub mod view;

use std::{env, path::PathBuf, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use encoding_rs::WINDOWS_1252;
use log::{LevelFilter, debug, info};
use serde::Serialize;

use crate::{
    cli::{Cli, Commands, ConfirmArgs, FilterArgs, ImportCommand, PrefsCommand, VmCommand},
    config::{Preference, Settings},
    error::InventoryError,
    filter::{EngineMatch, InventoryFilters, apply_vm_filters},
    model::{Database, DatabaseRecord, normalize_tags},
    pricing::RateTable,
    reconcile::SyncMode,
    stats::InventoryStats,
    store::InventoryStore,
    view::{load_checked_view, load_view},
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("cloud_inventory", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

/// Resolved per-invocation context: settings plus where the store lives.
struct Session {
    settings: Settings,
    config_path: PathBuf,
    store_path: PathBuf,
    json: bool,
}

impl Session {
    fn from_cli(cli: &Cli) -> Result<Self> {
        let config_path = config::resolve_config_path(cli.config.as_deref());
        let settings = Settings::load(&config_path)?;
        let store_path = config::resolve_store_path(cli.store.as_deref(), &settings);
        debug!("Using store {store_path:?} and settings {config_path:?}");
        Ok(Self {
            settings,
            config_path,
            store_path,
            json: cli.json,
        })
    }

    fn open_store(&self) -> Result<InventoryStore> {
        InventoryStore::open(&self.store_path)
    }

    fn preference(&self, preference: Preference) -> bool {
        self.settings.preferences.get(preference)
    }

    fn filters(&self, args: &FilterArgs, engine_match: EngineMatch) -> InventoryFilters {
        args.to_filters(self.preference(Preference::ExcludeStopped), engine_match)
    }

    /// Prints `value` as JSON, or the text rendering otherwise.
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce() -> String) -> Result<()> {
        if self.json {
            let json = serde_json::to_string_pretty(value).context("Serializing JSON output")?;
            println!("{json}");
        } else {
            print!("{}", text());
        }
        Ok(())
    }
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let session = Session::from_cli(&cli)?;
    match cli.command {
        Commands::Import(command) => handle_import(&session, command),
        Commands::List(args) => handle_list(&session, &args),
        Commands::Stats(args) => handle_stats(&session, &args),
        Commands::Metrics(args) => handle_metrics(&session, &args),
        Commands::Upgrades(args) => handle_upgrades(&session, &args),
        Commands::Pricing(args) => handle_pricing(&session, &args),
        Commands::Options(args) => handle_options(&session, &args),
        Commands::Vms(command) => handle_vms(&session, command),
        Commands::Tenants => handle_tenants(&session),
        Commands::Add(args) => handle_add(&session, args),
        Commands::Delete(args) => handle_delete(&session, &args),
        Commands::Purge(args) => handle_purge(&session, &args),
        Commands::SetStatus(args) => handle_set_status(&session, &args),
        Commands::Duplicates(args) => handle_duplicates(&session, &args),
        Commands::Export(args) => handle_export(&session, &args),
        Commands::Prefs(command) => handle_prefs(&session, command),
    }
}

fn require_confirmation(confirm: &ConfirmArgs, action: &str) -> Result<(), InventoryError> {
    if confirm.yes {
        Ok(())
    } else {
        Err(InventoryError::Unconfirmed {
            action: action.to_string(),
        })
    }
}

fn read_import(args: &cli::ImportArgs, fallback: Option<&'static encoding_rs::Encoding>) -> Result<String> {
    io_utils::ensure_csv_path(&args.input)?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    info!("Importing {:?} ({})", args.input, encoding.name());
    io_utils::read_text(&args.input, encoding, fallback)
}

fn handle_import(session: &Session, command: ImportCommand) -> Result<()> {
    let mut store = session.open_store()?;
    match command {
        ImportCommand::Databases(args) => {
            let text = read_import(&args.file, None)?;
            let batch = ingest::parse_databases(&text, args.provider)
                .with_context(|| format!("Parsing {:?}", args.file.input))?;
            let result =
                store.import_databases(batch, args.provider, SyncMode::from_flag(args.sync))?;
            store.save()?;
            session.emit(&result, || report::database_import_summary(&result))
        }
        ImportCommand::Vms(args) => {
            let text = read_import(&args, None)?;
            let batch =
                ingest::parse_vms(&text).with_context(|| format!("Parsing {:?}", args.input))?;
            let result = store.import_vms(batch)?;
            store.save()?;
            session.emit(&result, || report::vm_import_summary(&result))
        }
        ImportCommand::Accounts(args) => {
            let text = read_import(&args, Some(WINDOWS_1252))?;
            let batch = ingest::parse_accounts(&text)
                .with_context(|| format!("Parsing {:?}", args.input))?;
            let result = store.import_accounts(batch)?;
            store.save()?;
            session.emit(&result, || report::account_import_summary(&result))
        }
    }
}

/// Store records narrowed by `filters` through the view model.
fn filtered_records(store: &InventoryStore, filters: InventoryFilters) -> Vec<DatabaseRecord> {
    let view = load_view(store.databases().to_vec(), filters);
    view.visible().into_iter().cloned().collect()
}

fn handle_list(session: &Session, args: &cli::ListArgs) -> Result<()> {
    let store = session.open_store()?;
    let records = filtered_records(&store, session.filters(&args.filters, EngineMatch::Exact));
    let refs: Vec<&DatabaseRecord> = records.iter().collect();
    let detailed = args
        .detailed
        .unwrap_or_else(|| session.preference(Preference::ShowDetailed));
    session.emit(&records, || {
        report::database_table(&refs, &store.account_names(), detailed)
    })
}

#[derive(Serialize)]
struct StatsOutput<'a> {
    #[serde(flatten)]
    stats: &'a InventoryStats,
    health_percentage: u64,
    average_storage_gb: u64,
}

fn handle_stats(session: &Session, args: &cli::StatsArgs) -> Result<()> {
    let store = session.open_store()?;
    let records = filtered_records(&store, session.filters(&args.filters, EngineMatch::Exact));
    let stats = stats::compute_stats(&records);
    let output = StatsOutput {
        stats: &stats,
        health_percentage: stats::health_percentage(&stats, args.health_excludes_stopped),
        average_storage_gb: stats::average_storage_gb(&stats),
    };
    session.emit(&output, || {
        report::stat_cards(&stats, args.health_excludes_stopped)
    })
}

fn handle_metrics(session: &Session, args: &FilterArgs) -> Result<()> {
    let store = session.open_store()?;
    let records = filtered_records(&store, session.filters(args, EngineMatch::Exact));
    let metrics = stats::compute_metrics(&records);
    session.emit(&metrics, || report::metrics_report(&metrics))
}

#[derive(Serialize)]
struct UpgradesOutput<'a> {
    total: usize,
    by_engine: &'a std::collections::BTreeMap<version::EngineFamily, usize>,
    databases: &'a [&'a DatabaseRecord],
}

fn handle_upgrades(session: &Session, args: &FilterArgs) -> Result<()> {
    let store = session.open_store()?;
    let view = load_checked_view(
        store.databases().to_vec(),
        session.filters(args, EngineMatch::Family),
    )?;
    let records: Vec<DatabaseRecord> = view.visible().into_iter().cloned().collect();
    let candidates = stats::upgrade_candidates(&records);
    let counts = stats::compute_upgrade_counts(candidates.iter().copied());
    let output = UpgradesOutput {
        total: counts.total,
        by_engine: &counts.by_engine,
        databases: &candidates,
    };
    session.emit(&output, || report::upgrade_report(&counts, &candidates))
}

fn handle_pricing(session: &Session, args: &cli::PricingArgs) -> Result<()> {
    let store = session.open_store()?;
    let records = filtered_records(&store, session.filters(&args.filters, EngineMatch::Exact));
    let rates = match args.rates.as_ref().or(session.settings.rates.as_ref()) {
        Some(path) => RateTable::load(path)?,
        None => RateTable::default(),
    };
    let summary = pricing::compute_pricing(&records, &rates);
    session.emit(&summary, || report::pricing_report(&summary))
}

fn handle_options(session: &Session, args: &cli::OptionsArgs) -> Result<()> {
    let store = session.open_store()?;
    let options = options::filter_options(store.databases(), args.provider);
    session.emit(&options, || report::options_report(&options))
}

fn handle_vms(session: &Session, command: VmCommand) -> Result<()> {
    let mut store = session.open_store()?;
    match command {
        VmCommand::List(args) => {
            let filters = args.to_filters(session.preference(Preference::ExcludeStopped));
            let vms = apply_vm_filters(store.vms(), &filters);
            session.emit(&vms, || {
                report::vm_table(&vms, |tenant| store.tenant_name(tenant))
            })
        }
        VmCommand::Options => {
            let options = options::vm_filter_options(store.vms());
            session.emit(&options, || report::vm_options_report(&options))
        }
        VmCommand::Delete(args) => {
            require_confirmation(&args.confirm, &format!("delete Azure VM {}", args.id))?;
            let removed = store.delete_vm(&args.id)?;
            store.save()?;
            session.emit(&removed, || format!("Deleted Azure VM {}\n", removed.computer_name))
        }
    }
}

fn handle_tenants(session: &Session) -> Result<()> {
    let store = session.open_store()?;
    let tenants = store.tenants();
    session.emit(tenants, || {
        let rows: Vec<Vec<String>> = tenants
            .iter()
            .map(|(id, name)| vec![id.clone(), name.clone()])
            .collect();
        table::render_table(
            &["Tenant ID".to_string(), "Name".to_string()],
            &rows,
            &[],
        )
    })
}

fn handle_add(session: &Session, args: cli::AddArgs) -> Result<()> {
    let mut store = session.open_store()?;
    let mut database = Database::new(args.provider, args.service, args.engine, args.region);
    database.endpoint = args.endpoint;
    database.storage_gb = args.storage_gb;
    database.status = args.status;
    database.subscription = args.subscription;
    database.tags = normalize_tags(&args.tags);
    database.version = args.version.filter(|v| !v.trim().is_empty());
    database.azure_tenant = args.azure_tenant.filter(|t| !t.trim().is_empty());
    let record = store.create(database)?.clone();
    store.save()?;
    session.emit(&record, || format!("Created database {}\n", record.id))
}

fn handle_delete(session: &Session, args: &cli::DeleteArgs) -> Result<()> {
    require_confirmation(&args.confirm, &format!("delete database {}", args.id))?;
    let mut store = session.open_store()?;
    let removed = store.delete(&args.id)?;
    store.save()?;
    session.emit(&removed, || format!("Deleted database {}\n", removed.id))
}

fn handle_purge(session: &Session, args: &ConfirmArgs) -> Result<()> {
    require_confirmation(args, "delete all database records")?;
    let mut store = session.open_store()?;
    let deleted = store.purge();
    store.save()?;
    session.emit(&serde_json::json!({ "deleted": deleted }), || {
        format!("Deleted {deleted} database record(s)\n")
    })
}

fn handle_set_status(session: &Session, args: &cli::SetStatusArgs) -> Result<()> {
    let mut store = session.open_store()?;
    let record = store.set_status(&args.id, args.status)?.clone();
    store.save()?;
    session.emit(&record, || {
        format!("Database {} is now {}\n", record.id, record.status)
    })
}

fn handle_duplicates(session: &Session, args: &cli::DuplicatesArgs) -> Result<()> {
    let mut store = session.open_store()?;
    if !args.resolve {
        let report = store.find_duplicates();
        return session.emit(&report, || report::duplicates_report(&report));
    }
    require_confirmation(&args.confirm, "resolve duplicate databases")?;
    let resolved = store.resolve_duplicates_keep_latest();
    store.save()?;
    session.emit(&resolved, || report::resolve_report(&resolved))
}

fn handle_export(session: &Session, args: &cli::ExportArgs) -> Result<()> {
    let store = session.open_store()?;
    let records = filtered_records(&store, session.filters(&args.filters, EngineMatch::Exact));
    let refs: Vec<&DatabaseRecord> = records.iter().collect();
    let encoded = args.format.encode(&refs)?;
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(args.format.default_filename()));
    let encoding = io_utils::resolve_encoding(args.output_encoding.as_deref())?;
    io_utils::write_text(Some(output.as_path()), &encoded, encoding)?;
    info!(
        "Exported {} record(s) to {} ({})",
        refs.len(),
        io_utils::describe_output(Some(output.as_path())),
        args.format.mime_type()
    );
    Ok(())
}

fn handle_prefs(session: &Session, command: PrefsCommand) -> Result<()> {
    match command {
        PrefsCommand::Get { preference } => {
            let entries: Vec<(Preference, bool)> = match preference {
                Some(preference) => vec![(preference, session.preference(preference))],
                None => session.settings.preferences.entries(),
            };
            let map: std::collections::BTreeMap<&str, bool> = entries
                .iter()
                .map(|(preference, enabled)| (preference.key(), *enabled))
                .collect();
            session.emit(&map, || {
                table::render_pairs(
                    &entries
                        .iter()
                        .map(|(preference, enabled)| (preference.to_string(), enabled.to_string()))
                        .collect::<Vec<_>>(),
                )
            })
        }
        PrefsCommand::Set {
            preference,
            enabled,
        } => {
            let mut settings = session.settings.clone();
            settings.preferences.set(preference, enabled);
            settings.save(&session.config_path)?;
            info!("Set {preference} to {enabled} in {:?}", session.config_path);
            Ok(())
        }
    }
}
