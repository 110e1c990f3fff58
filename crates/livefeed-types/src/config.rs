//! Configuration loading for the live data feed updater.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/livefeed/config.toml.

use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// A search index built from a single SQL query.
///
/// The query takes the inclusive id bounds as `$1` and `$2` and returns the
/// document id in its first column followed by one column per entry in
/// `text_fields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlIndexSettings {
    /// Index name, matching an index in the dependency configuration
    pub name: String,

    /// Index directory (default: `<indexes_dir>/<name>`)
    #[serde(default)]
    pub directory: Option<String>,

    /// Document query, parameterised by `$1` (min id) and `$2` (max id)
    pub query: String,

    /// Row count query, parameterised by `$1` (max id)
    #[serde(default)]
    pub count_query: Option<String>,

    /// Names of the text columns returned after the id
    #[serde(default)]
    pub text_fields: Vec<String>,

    /// Field documents are matched and deleted by
    #[serde(default = "default_identifier_field")]
    pub identifier_field: String,
}

fn default_identifier_field() -> String {
    "_id".to_string()
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// PostgreSQL connection string for the source database
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Base URL (or local directory) holding replication-<seq>.tar.bz2 packets
    #[serde(default = "default_replication_repository")]
    pub replication_repository: String,

    /// Access token appended to packet requests (loaded from env var, not stored in config file)
    #[serde(default)]
    pub access_token: Option<String>,

    /// Directory holding one subdirectory per index
    #[serde(default = "default_indexes_dir")]
    pub indexes_dir: String,

    /// Dependency configuration file (bundled default when unset)
    #[serde(default)]
    pub dependencies_path: Option<String>,

    /// Fold in unpublished changes from the live pending-change log
    #[serde(default = "default_use_database_tail")]
    pub use_database_tail: bool,

    /// Workers rebuilding documents in parallel
    #[serde(default = "default_indexing_workers")]
    pub indexing_workers: usize,

    /// Jobs queued ahead of the indexing workers
    #[serde(default = "default_indexing_queue_size")]
    pub indexing_queue_size: usize,

    /// Memory budget for each index writer in MB
    #[serde(default = "default_writer_memory_mb")]
    pub writer_memory_mb: usize,

    /// Timeout for a single packet download
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Attempts per packet download before giving up
    #[serde(default = "default_fetch_max_retries")]
    pub fetch_max_retries: u32,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Indexes maintained by this updater
    #[serde(default)]
    pub indexes: Vec<SqlIndexSettings>,
}

fn default_database_url() -> String {
    "postgresql://musicbrainz@localhost:5432/musicbrainz_db".to_string()
}

fn default_replication_repository() -> String {
    "http://ftp.musicbrainz.org/pub/musicbrainz/data/replication".to_string()
}

fn default_indexes_dir() -> String {
    ProjectDirs::from("", "", "livefeed")
        .map(|p| p.data_local_dir().join("indexes"))
        .unwrap_or_else(|| PathBuf::from("./indexes"))
        .to_string_lossy()
        .to_string()
}

fn default_use_database_tail() -> bool {
    true
}

fn default_indexing_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_indexing_queue_size() -> usize {
    10
}

fn default_writer_memory_mb() -> usize {
    50
}

fn default_fetch_timeout_secs() -> u64 {
    60
}

fn default_fetch_max_retries() -> u32 {
    3
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            replication_repository: default_replication_repository(),
            access_token: None,
            indexes_dir: default_indexes_dir(),
            dependencies_path: None,
            use_database_tail: default_use_database_tail(),
            indexing_workers: default_indexing_workers(),
            indexing_queue_size: default_indexing_queue_size(),
            writer_memory_mb: default_writer_memory_mb(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_max_retries: default_fetch_max_retries(),
            log_level: default_log_level(),
            indexes: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/livefeed/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (LIVEFEED_*, nested keys joined by `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, FeedError> {
        let config_dir = ProjectDirs::from("", "", "livefeed")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("database_url", default_database_url())
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("replication_repository", default_replication_repository())
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("indexes_dir", default_indexes_dir())
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("use_database_tail", default_use_database_tail())
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("indexing_workers", default_indexing_workers() as i64)
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("indexing_queue_size", default_indexing_queue_size() as i64)
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("writer_memory_mb", default_writer_memory_mb() as i64)
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("fetch_timeout_secs", default_fetch_timeout_secs() as i64)
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("fetch_max_retries", default_fetch_max_retries() as i64)
            .map_err(|e| FeedError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| FeedError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Format: LIVEFEED_DATABASE_URL, LIVEFEED_ACCESS_TOKEN, LIVEFEED_USE_DATABASE_TAIL, etc.
        builder = builder.add_source(
            Environment::with_prefix("LIVEFEED")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| FeedError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| FeedError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.replication_repository.trim().is_empty() {
            return Err(FeedError::Config(
                "replication_repository must not be empty".to_string(),
            ));
        }
        if self.indexing_workers == 0 {
            return Err(FeedError::Config("indexing_workers must be > 0".to_string()));
        }
        if self.indexing_queue_size == 0 {
            return Err(FeedError::Config(
                "indexing_queue_size must be > 0".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for index in &self.indexes {
            if !seen.insert(index.name.as_str()) {
                return Err(FeedError::Config(format!(
                    "index {} is configured more than once",
                    index.name
                )));
            }
        }
        Ok(())
    }

    /// Settings for a named index.
    pub fn index(&self, name: &str) -> Option<&SqlIndexSettings> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Directory of a named index.
    pub fn index_path(&self, name: &str) -> PathBuf {
        self.index(name)
            .and_then(|i| i.directory.as_ref())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(&self.indexes_dir).join(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert!(settings.use_database_tail);
        assert_eq!(settings.indexing_queue_size, 10);
        assert_eq!(settings.writer_memory_mb, 50);
        assert!(settings.replication_repository.starts_with("http://"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
database_url = "postgresql://mb@db/musicbrainz"
replication_repository = "/srv/replication"
use_database_tail = false
indexing_workers = 2

[[indexes]]
name = "artist"
query = "SELECT id, name FROM artist WHERE id BETWEEN $1 AND $2"
text_fields = ["name"]

[[indexes]]
name = "label"
directory = "/srv/indexes/label_index"
query = "SELECT id, name FROM label WHERE id BETWEEN $1 AND $2"
"#
        )
        .unwrap();

        let settings = Settings::load(Some(&file.path().to_string_lossy())).unwrap();
        assert_eq!(settings.database_url, "postgresql://mb@db/musicbrainz");
        assert_eq!(settings.replication_repository, "/srv/replication");
        assert!(!settings.use_database_tail);
        assert_eq!(settings.indexing_workers, 2);
        assert_eq!(settings.indexes.len(), 2);

        let artist = settings.index("artist").unwrap();
        assert_eq!(artist.identifier_field, "_id");
        assert_eq!(artist.text_fields, vec!["name"]);
        assert_eq!(
            settings.index_path("artist"),
            PathBuf::from(&settings.indexes_dir).join("artist")
        );
        assert_eq!(
            settings.index_path("label"),
            PathBuf::from("/srv/indexes/label_index")
        );
    }

    #[test]
    fn test_missing_cli_config_file_is_error() {
        let result = Settings::load(Some("/nonexistent/livefeed/settings.toml"));
        assert!(matches!(result, Err(FeedError::Config(_))));
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        settings.indexing_workers = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.replication_repository = " ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        let index = SqlIndexSettings {
            name: "artist".to_string(),
            directory: None,
            query: "SELECT 1".to_string(),
            count_query: None,
            text_fields: Vec::new(),
            identifier_field: default_identifier_field(),
        };
        settings.indexes = vec![index.clone(), index];
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_settings_serialize_to_toml() {
        let settings = Settings::default();
        let text = toml::to_string(&settings).unwrap();
        let decoded: Settings = toml::from_str(&text).unwrap();
        assert_eq!(decoded.indexing_queue_size, settings.indexing_queue_size);
    }
}
