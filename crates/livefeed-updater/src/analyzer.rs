//! Classification of change records against an index's dependency tree.

use std::sync::Arc;

use tracing::{debug, trace};

use livefeed_dependencies::{IndexDependencies, TableRelation};
use livefeed_types::{ChangeRecord, FieldMap, Operation, ReplicationPacket};

use crate::context::{ChangeSet, RunContext};
use crate::error::UpdateError;

/// What happened to a single change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Folded into the change set
    Applied,
    /// Already reflected in the index
    AlreadyApplied,
    /// Table not part of this index
    IrrelevantTable,
    /// Update touching no indexed column
    IrrelevantUpdate,
}

/// Folds change records into a [`ChangeSet`].
pub struct ChangesAnalyzer {
    dependencies: Arc<IndexDependencies>,
}

impl ChangesAnalyzer {
    pub fn new(dependencies: Arc<IndexDependencies>) -> Self {
        Self { dependencies }
    }

    pub fn dependencies(&self) -> &IndexDependencies {
        &self.dependencies
    }

    /// Classify every change of `packet` in change-id order.
    ///
    /// Changes with an id at or below the change sequence reached before
    /// this packet are skipped. The context is advanced past the packet.
    pub fn analyze_packet(
        &self,
        packet: &ReplicationPacket,
        context: &mut RunContext,
    ) -> Result<(), UpdateError> {
        let threshold = context.change_sequence();

        for change in &packet.changes {
            let classification = if threshold.is_some_and(|t| change.id <= t) {
                Classification::AlreadyApplied
            } else {
                self.classify(change, &mut context.changes)?
            };

            match classification {
                Classification::Applied => context.changes_analyzed += 1,
                skipped => {
                    trace!(
                        change = change.id,
                        table = %change.table_name,
                        reason = ?skipped,
                        "Skipped change"
                    );
                    context.changes_skipped += 1;
                }
            }
        }

        context.advance(packet);
        Ok(())
    }

    /// Classify one change record.
    pub fn classify(
        &self,
        change: &ChangeRecord,
        changes: &mut ChangeSet,
    ) -> Result<Classification, UpdateError> {
        let Some(relation) = self.dependencies.dependency(&change.table_name) else {
            return Ok(Classification::IrrelevantTable);
        };

        if relation.is_head() {
            return self.classify_root_change(relation, change, changes);
        }

        let table = relation.table_name();
        let column = relation.source_join_field().unwrap_or_default();

        match change.operation {
            Operation::Insert => {
                if let Some(key) = join_key(change, &change.new_values, column)? {
                    changes.add_pending(table, key);
                }
            }
            Operation::Delete => {
                if let Some(key) = join_key(change, &change.old_values, column)? {
                    changes.add_pending(table, key);
                }
            }
            Operation::Update => {
                if !relation.is_relevant_update(&change.changed_fields()) {
                    return Ok(Classification::IrrelevantUpdate);
                }
                let old = join_key(change, &change.old_values, column)?;
                let new = join_key(change, &change.new_values, column)?;
                for key in old.into_iter().chain(new) {
                    changes.add_pending(table, key);
                }
            }
        }

        debug!(
            change = change.id,
            table,
            operation = %change.operation,
            "Queued join keys"
        );
        Ok(Classification::Applied)
    }

    fn classify_root_change(
        &self,
        relation: &TableRelation,
        change: &ChangeRecord,
        changes: &mut ChangeSet,
    ) -> Result<Classification, UpdateError> {
        let column = relation.primary_key();
        let id = join_key(change, change.current_values(), column)?.ok_or_else(|| {
            UpdateError::InvalidChange(format!(
                "change {} on {} has a NULL {}",
                change.id, change.table_name, column
            ))
        })?;

        match change.operation {
            Operation::Insert | Operation::Update => changes.mark_upserted(id),
            Operation::Delete => changes.mark_deleted(id),
        }

        debug!(
            change = change.id,
            id,
            operation = %change.operation,
            "Classified root change"
        );
        Ok(Classification::Applied)
    }
}

/// Integer value of `column`, None when it is NULL.
fn join_key(
    change: &ChangeRecord,
    values: &FieldMap,
    column: &str,
) -> Result<Option<i64>, UpdateError> {
    let value = values.get(column).ok_or_else(|| {
        UpdateError::InvalidChange(format!(
            "change {} on {} has no {} column",
            change.id, change.table_name, column
        ))
    })?;

    value
        .as_deref()
        .map(|text| {
            text.trim().parse::<i64>().map_err(|_| {
                UpdateError::InvalidChange(format!(
                    "change {} on {}: {} is not an integer: {:?}",
                    change.id, change.table_name, column, text
                ))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    use livefeed_dependencies::DependencyConfig;
    use livefeed_types::{unpack, IndexPosition};

    fn analyzer() -> ChangesAnalyzer {
        let config = DependencyConfig::from_toml_str(
            r#"
            [[index]]
            name = "artist"

            [[index.path]]
            tables = [
              { name = "artist_alias", source_field = "artist", target_field = "id", used_fields = ["name", "sort_name"] },
              { name = "artist" },
            ]
            "#,
        )
        .unwrap();
        let registry = config.build().unwrap();
        ChangesAnalyzer::new(registry.index("artist").unwrap())
    }

    fn change(id: i64, table: &str, operation: Operation, old: &str, new: &str) -> ChangeRecord {
        ChangeRecord::new(id, table, operation)
            .with_old_values(unpack(old).unwrap())
            .with_new_values(unpack(new).unwrap())
    }

    #[test]
    fn test_root_changes() {
        let analyzer = analyzer();
        let mut changes = ChangeSet::new();

        analyzer
            .classify(&change(1, "artist", Operation::Insert, "", "\"id\"='10' "), &mut changes)
            .unwrap();
        analyzer
            .classify(&change(2, "artist", Operation::Delete, "\"id\"='11' ", ""), &mut changes)
            .unwrap();

        assert_eq!(changes.inserted_or_updated, BTreeSet::from([10]));
        assert_eq!(changes.deleted, BTreeSet::from([11]));
    }

    #[test]
    fn test_insert_then_delete_is_delete() {
        let analyzer = analyzer();
        let mut changes = ChangeSet::new();

        analyzer
            .classify(&change(1, "artist", Operation::Insert, "", "\"id\"='10' "), &mut changes)
            .unwrap();
        analyzer
            .classify(&change(2, "artist", Operation::Delete, "\"id\"='10' ", ""), &mut changes)
            .unwrap();

        assert!(changes.inserted_or_updated.is_empty());
        assert_eq!(changes.deleted, BTreeSet::from([10]));
    }

    #[test]
    fn test_irrelevant_table() {
        let analyzer = analyzer();
        let mut changes = ChangeSet::new();
        let result = analyzer
            .classify(&change(1, "recording", Operation::Insert, "", "\"id\"='1' "), &mut changes)
            .unwrap();
        assert_eq!(result, Classification::IrrelevantTable);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_leaf_update_moves_between_parents() {
        let analyzer = analyzer();
        let mut changes = ChangeSet::new();
        analyzer
            .classify(
                &change(
                    1,
                    "artist_alias",
                    Operation::Update,
                    "\"id\"='5' \"artist\"='10' \"name\"='A' ",
                    "\"id\"='5' \"artist\"='20' \"name\"='B' ",
                ),
                &mut changes,
            )
            .unwrap();
        assert_eq!(changes.pending["artist_alias"], BTreeSet::from([10, 20]));
    }

    #[test]
    fn test_leaf_update_without_indexed_change() {
        let analyzer = analyzer();
        let mut changes = ChangeSet::new();
        let result = analyzer
            .classify(
                &change(
                    1,
                    "artist_alias",
                    Operation::Update,
                    "\"id\"='5' \"artist\"='10' \"name\"='A' \"edits_pending\"='0' ",
                    "\"id\"='5' \"artist\"='10' \"name\"='A' \"edits_pending\"='1' ",
                ),
                &mut changes,
            )
            .unwrap();
        assert_eq!(result, Classification::IrrelevantUpdate);
        assert!(changes.pending.is_empty());
    }

    #[test]
    fn test_leaf_insert_and_delete() {
        let analyzer = analyzer();
        let mut changes = ChangeSet::new();
        analyzer
            .classify(
                &change(1, "artist_alias", Operation::Insert, "", "\"id\"='5' \"artist\"='10' "),
                &mut changes,
            )
            .unwrap();
        analyzer
            .classify(
                &change(2, "artist_alias", Operation::Delete, "\"id\"='6' \"artist\"='30' ", ""),
                &mut changes,
            )
            .unwrap();
        assert_eq!(changes.pending["artist_alias"], BTreeSet::from([10, 30]));
    }

    #[test]
    fn test_null_join_column_contributes_nothing() {
        let analyzer = analyzer();
        let mut changes = ChangeSet::new();
        let result = analyzer
            .classify(
                &change(1, "artist_alias", Operation::Insert, "", "\"id\"='5' \"artist\"= "),
                &mut changes,
            )
            .unwrap();
        assert_eq!(result, Classification::Applied);
        assert!(changes.pending.is_empty());
    }

    #[test]
    fn test_missing_join_column_is_invalid() {
        let analyzer = analyzer();
        let mut changes = ChangeSet::new();
        let result = analyzer.classify(
            &change(1, "artist_alias", Operation::Insert, "", "\"id\"='5' "),
            &mut changes,
        );
        assert!(matches!(result, Err(UpdateError::InvalidChange(_))));
    }

    #[test]
    fn test_non_integer_key_is_invalid() {
        let analyzer = analyzer();
        let mut changes = ChangeSet::new();
        let result = analyzer.classify(
            &change(1, "artist", Operation::Insert, "", "\"id\"='abc' "),
            &mut changes,
        );
        assert!(matches!(result, Err(UpdateError::InvalidChange(_))));
    }

    #[test]
    fn test_packet_skips_already_applied_changes() {
        let analyzer = analyzer();
        let mut context = RunContext::new(IndexPosition::new(12, 100, Some(2)));
        let packet = ReplicationPacket::new(12, 101).with_changes(vec![
            change(1, "artist", Operation::Insert, "", "\"id\"='1' "),
            change(2, "artist", Operation::Insert, "", "\"id\"='2' "),
            change(3, "artist", Operation::Insert, "", "\"id\"='3' "),
        ]);

        analyzer.analyze_packet(&packet, &mut context).unwrap();

        assert_eq!(context.changes.inserted_or_updated, BTreeSet::from([3]));
        assert_eq!(context.changes_analyzed, 1);
        assert_eq!(context.changes_skipped, 2);
        assert_eq!(context.change_sequence(), Some(3));
        assert_eq!(context.position.replication_sequence, 101);
    }
}
