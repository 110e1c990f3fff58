//! Dependency configuration loading.
//!
//! Each `[[index]]` lists one or more `[[index.path]]` entries. A path names
//! its tables leaf first and ends at the index's root table:
//!
//! ```toml
//! [[index]]
//! name = "work"
//!
//! [[index.path]]
//! tables = [
//!   { name = "artist", source_field = "id", target_field = "artist" },
//!   { name = "artist_credit_name", source_field = "artist_credit", target_field = "artist_credit" },
//!   { name = "work" },
//! ]
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DependencyError;
use crate::relation::{TableRelation, DEFAULT_PRIMARY_KEY};
use crate::tree::{DependencyRegistry, IndexDependencies};

const BUNDLED_DEPENDENCIES: &str = include_str!("../dependencies.toml");

/// One table in a configured path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub name: String,

    /// Join column on this table
    #[serde(default)]
    pub source_field: Option<String>,

    /// Join column on the next table in the path
    #[serde(default)]
    pub target_field: Option<String>,

    /// Columns the index reads from this table
    #[serde(default)]
    pub used_fields: Vec<String>,
}

/// A leaf-to-root path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathConfig {
    pub tables: Vec<TableConfig>,
}

/// Join paths for one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub name: String,

    /// Primary key column of the root table
    #[serde(default)]
    pub primary_key: Option<String>,

    #[serde(default, rename = "path")]
    pub paths: Vec<PathConfig>,
}

/// Dependency configuration for every index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyConfig {
    #[serde(default, rename = "index")]
    pub indexes: Vec<IndexConfig>,
}

impl DependencyConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, DependencyError> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DependencyError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        debug!(path = ?path.as_ref(), "Read dependency configuration");
        Self::from_toml_str(&text)
    }

    /// Configuration compiled into the crate.
    pub fn bundled() -> Result<Self, DependencyError> {
        Self::from_toml_str(BUNDLED_DEPENDENCIES)
    }

    /// Load from `path`, or the bundled configuration when None.
    pub fn load(path: Option<&Path>) -> Result<Self, DependencyError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Self::bundled(),
        }
    }

    /// Validate every path and build the dependency trees.
    pub fn build(&self) -> Result<DependencyRegistry, DependencyError> {
        let mut registry = DependencyRegistry::new();
        for index in &self.indexes {
            let tree = index.build()?;
            debug!(
                index = %tree.index_name(),
                root = %tree.root_table(),
                tables = tree.len(),
                "Built dependency tree"
            );
            registry.insert(tree)?;
        }
        Ok(registry)
    }
}

impl IndexConfig {
    /// Build the dependency tree for this index.
    pub fn build(&self) -> Result<IndexDependencies, DependencyError> {
        let name = self.name.as_str();
        let first = self
            .paths
            .first()
            .ok_or_else(|| DependencyError::invalid(name, "no paths declared"))?;
        let root_config = first
            .tables
            .last()
            .ok_or_else(|| DependencyError::invalid(name, "empty path"))?;

        let primary_key = self.primary_key.as_deref().unwrap_or(DEFAULT_PRIMARY_KEY);
        let root = Arc::new(TableRelation::head(&root_config.name).with_primary_key(primary_key));
        let mut tree = IndexDependencies::new(name, root.clone());

        for path in &self.paths {
            validate_path(name, path, root.table_name())?;

            // Walk from the root down so every relation is built on its
            // already-registered target.
            let mut target = root.clone();
            for table in path.tables.iter().rev().skip(1) {
                let (source, target_field) = match (&table.source_field, &table.target_field) {
                    (Some(s), Some(t)) => (s, t),
                    _ => {
                        return Err(DependencyError::invalid(
                            name,
                            format!("table {} needs source_field and target_field", table.name),
                        ))
                    }
                };
                let relation = Arc::new(
                    TableRelation::linked(&table.name, source, target_field, target)
                        .with_used_fields(table.used_fields.iter().cloned()),
                );
                tree.add_dependency(relation.clone())?;
                target = match tree.dependency(&table.name) {
                    Some(registered) => registered.clone(),
                    None => relation,
                };
            }
        }

        Ok(tree)
    }
}

fn validate_path(index: &str, path: &PathConfig, root: &str) -> Result<(), DependencyError> {
    let last = path
        .tables
        .last()
        .ok_or_else(|| DependencyError::invalid(index, "empty path"))?;

    if last.name != root {
        return Err(DependencyError::invalid(
            index,
            format!("path ends at {} instead of root table {}", last.name, root),
        ));
    }
    if last.source_field.is_some() || last.target_field.is_some() || !last.used_fields.is_empty() {
        return Err(DependencyError::invalid(
            index,
            format!("root table {root} must not declare joins or used fields"),
        ));
    }

    let mut seen = HashSet::new();
    for table in &path.tables {
        if table.name.trim().is_empty() {
            return Err(DependencyError::invalid(index, "table with empty name"));
        }
        if !seen.insert(table.name.as_str()) {
            return Err(DependencyError::invalid(
                index,
                format!("table {} appears twice in one path", table.name),
            ));
        }
    }

    Ok(())
}
