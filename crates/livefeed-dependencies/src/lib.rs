//! # livefeed-dependencies
//!
//! Declared join paths from every table that can influence a search index
//! up to the index's root entity table.
//!
//! A change on a table several joins away from the root (an alias row, a
//! tag row) still has to re-index the owning root entity. Each index
//! declares those join chains up front; [`TableRelation::generate_sql`]
//! turns a batch of leaf keys into the query that finds the affected root
//! ids.
//!
//! ## Usage
//!
//! ```rust
//! use livefeed_dependencies::DependencyConfig;
//!
//! let registry = DependencyConfig::bundled().unwrap().build().unwrap();
//! let work = registry.index("work").unwrap();
//! assert_eq!(work.root_table(), "work");
//! ```

pub mod config;
pub mod error;
pub mod relation;
pub mod tree;

pub use config::{DependencyConfig, IndexConfig, PathConfig, TableConfig};
pub use error::DependencyError;
pub use relation::TableRelation;
pub use tree::{DependencyRegistry, IndexDependencies};
