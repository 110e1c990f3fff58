//! Command implementations for the live data feed updater.
//!
//! Handles:
//! - update: pull packets and update every selected index
//! - status: print each index's recorded replication position
//! - dependencies: validate and print the dependency configuration

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use tokio_postgres::NoTls;
use tracing::{error, info};

use livefeed_dependencies::{DependencyConfig, DependencyRegistry};
use livefeed_packet::{LiveFeed, PacketCache, PacketRepository, ReplicationFeed, RepositoryConfig};
use livefeed_search::{read_position, SearchIndex, SearchIndexConfig};
use livefeed_types::{Settings, SqlIndexSettings};
use livefeed_updater::{IndexUpdater, SqlIndex, UpdateOutcome, UpdaterConfig};

use crate::cli::UpdateArgs;

/// Load settings and apply the global log level override.
fn load_settings(config_path: Option<&str>, log_level_override: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(log_level) = log_level_override {
        settings.log_level = log_level.to_string();
    }
    Ok(settings)
}

/// Initialize logging, preferring RUST_LOG over the configured level.
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn load_dependencies(settings: &Settings) -> Result<DependencyRegistry> {
    let path = settings.dependencies_path.as_deref().map(Path::new);
    let registry = DependencyConfig::load(path)
        .and_then(|config| config.build())
        .context("Failed to load dependency configuration")?;
    Ok(registry)
}

/// Configured indexes matching `requested`, or all of them when empty.
pub fn select_indexes(settings: &Settings, requested: &[String]) -> Result<Vec<SqlIndexSettings>> {
    let selected: Vec<SqlIndexSettings> = if requested.is_empty() {
        settings.indexes.clone()
    } else {
        requested
            .iter()
            .map(|name| {
                settings
                    .index(name)
                    .cloned()
                    .with_context(|| format!("Index {name} is not configured"))
            })
            .collect::<Result<_>>()?
    };

    if selected.is_empty() {
        bail!("No index selected; configure at least one [[indexes]] entry");
    }
    Ok(selected)
}

/// Update every selected index from the replication feed.
///
/// 1. Load configuration and dependency trees
/// 2. Connect to the database
/// 3. Run one updater per index, sharing the packet cache
/// 4. Fail if any index aborted
pub async fn run_update(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    args: UpdateArgs,
) -> Result<()> {
    let mut settings = load_settings(config_path, log_level_override)?;
    if let Some(repository) = args.replication_repository {
        settings.replication_repository = repository;
    }
    if let Some(database_url) = args.database_url {
        settings.database_url = database_url;
    }
    if args.no_database_tail {
        settings.use_database_tail = false;
    }
    if args.verbose {
        settings.log_level = "debug".to_string();
    }
    settings.validate().context("Invalid configuration")?;

    init_logging(&settings.log_level)?;

    let selected = select_indexes(&settings, &args.indexes)?;
    let registry = load_dependencies(&settings)?;

    info!("Live data feed update starting...");
    info!("  Replication repository: {}", settings.replication_repository);
    info!("  Indexes directory: {}", settings.indexes_dir);
    info!("  Database tail: {}", settings.use_database_tail);

    let (client, connection) = tokio_postgres::connect(&settings.database_url, NoTls)
        .await
        .context("Failed to connect to database")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "Database connection error");
        }
    });
    let client = Arc::new(client);

    let repository = PacketRepository::new(RepositoryConfig::from_settings(&settings))
        .context("Invalid replication repository")?;
    let mut feed = LiveFeed::new(Arc::new(repository), Arc::new(PacketCache::new()));
    if settings.use_database_tail {
        feed = feed.with_database(client.clone());
    }
    let feed: Arc<dyn ReplicationFeed> = Arc::new(feed);

    let mut updaters = Vec::with_capacity(selected.len());
    for index_settings in selected {
        let name = index_settings.name.clone();
        let dependencies = registry
            .index(&name)
            .with_context(|| format!("No dependency configuration for index {name}"))?;
        let search_index = SearchIndex::open(
            SearchIndexConfig::new(settings.index_path(&name))
                .with_memory_mb(settings.writer_memory_mb),
        )
        .with_context(|| format!("Failed to open index {name}"))?;

        updaters.push(IndexUpdater::new(
            Arc::new(SqlIndex::new(index_settings, client.clone())),
            search_index,
            dependencies,
            feed.clone(),
            client.clone(),
            UpdaterConfig::from_settings(&settings),
        ));
    }

    let results = join_all(updaters.iter().map(|updater| async move {
        (updater.name().to_string(), updater.run().await)
    }))
    .await;

    let mut aborted = 0;
    for (name, result) in results {
        match result {
            Ok(UpdateOutcome::NoPackets) => {
                info!(index = %name, "No new replication packets");
            }
            Ok(UpdateOutcome::Updated(summary)) => {
                info!(
                    index = %name,
                    packets = summary.packets_processed,
                    reindexed = summary.ids_reindexed,
                    deleted = summary.ids_deleted,
                    replication_sequence = summary.position.replication_sequence,
                    "Index update finished"
                );
            }
            Err(e) => {
                aborted += 1;
                error!(index = %name, error = %e, retryable = e.is_retryable(), "Index update aborted");
            }
        }
    }

    if aborted > 0 {
        bail!("{aborted} index update(s) aborted");
    }
    Ok(())
}

/// Print the replication position recorded in each index.
pub fn show_status(
    config_path: Option<&str>,
    log_level_override: Option<&str>,
    indexes: &[String],
) -> Result<()> {
    let settings = load_settings(config_path, log_level_override)?;
    let names: Vec<String> = if indexes.is_empty() {
        select_indexes(&settings, &[])?
            .into_iter()
            .map(|i| i.name)
            .collect()
    } else {
        indexes.to_vec()
    };

    for name in names {
        let path = settings.index_path(&name);
        let position = SearchIndex::open(SearchIndexConfig::new(&path))
            .and_then(|index| read_position(&index));
        match position {
            Ok(position) => println!(
                "{name}: schema {} replication {} change {} updated {}",
                position.schema_sequence,
                position.replication_sequence,
                position
                    .change_sequence
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                position.last_updated.to_rfc3339()
            ),
            Err(e) => println!("{name}: unavailable ({e})"),
        }
    }
    Ok(())
}

/// Render the dependency configuration, optionally for one index.
pub fn describe_dependencies(registry: &DependencyRegistry, index: Option<&str>) -> Result<String> {
    let described = match index {
        Some(name) => registry
            .index(name)
            .with_context(|| format!("Unknown index {name}"))?
            .describe(),
        None => registry
            .iter()
            .map(|dependencies| dependencies.describe())
            .collect::<Vec<_>>()
            .join("\n\n"),
    };
    Ok(described)
}

/// Validate and print the dependency configuration.
pub fn show_dependencies(config_path: Option<&str>, index: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, None)?;
    let registry = load_dependencies(&settings)?;
    println!("{}", describe_dependencies(&registry, index)?);
    Ok(())
}
