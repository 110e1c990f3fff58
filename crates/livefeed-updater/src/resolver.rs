//! Resolution of queued join keys to root entity ids.

use async_trait::async_trait;
use tokio_postgres::Client;
use tracing::{debug, info};

use livefeed_dependencies::IndexDependencies;

use crate::context::ChangeSet;
use crate::error::UpdateError;

/// Executes generated join queries.
#[async_trait]
pub trait IdResolver: Send + Sync {
    /// Run `sql` and return the root id in the first column of every row.
    async fn resolve(&self, sql: &str) -> Result<Vec<i64>, UpdateError>;
}

#[async_trait]
impl IdResolver for Client {
    async fn resolve(&self, sql: &str) -> Result<Vec<i64>, UpdateError> {
        let rows = self.query(sql, &[]).await?;
        rows.iter()
            .map(|row| match row.try_get::<_, i64>(0) {
                Ok(id) => Ok(id),
                Err(_) => Ok(i64::from(row.try_get::<_, i32>(0)?)),
            })
            .collect()
    }
}

/// Resolve every pending key set of `changes` into root ids.
///
/// Resolved ids are folded in as updates. Returns the number of distinct
/// ids the queries produced.
pub async fn resolve_pending(
    dependencies: &IndexDependencies,
    changes: &mut ChangeSet,
    resolver: &dyn IdResolver,
) -> Result<usize, UpdateError> {
    let mut resolved = 0;

    for (table, keys) in changes.take_pending() {
        let relation = dependencies.dependency(&table).ok_or_else(|| {
            UpdateError::InvalidChange(format!(
                "no dependency for table {table} in index {}",
                dependencies.index_name()
            ))
        })?;

        let Some(sql) = relation.generate_sql(&keys) else {
            continue;
        };
        debug!(index = dependencies.index_name(), table = %table, sql = %sql, "Resolving ids");

        let ids = resolver.resolve(&sql).await?;
        info!(
            index = dependencies.index_name(),
            table = %table,
            keys = keys.len(),
            ids = ids.len(),
            "Resolved dependent ids"
        );

        let before = changes.inserted_or_updated.len();
        changes.add_resolved(ids);
        resolved += changes.inserted_or_updated.len() - before;
    }

    Ok(resolved)
}
