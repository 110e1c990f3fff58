//! Per-index dependency trees.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::DependencyError;
use crate::relation::TableRelation;

/// Every table that can influence one search index, keyed by table name.
///
/// Each table maps to the chain that leads from it to the index's root
/// table; the root table maps to the head itself.
#[derive(Debug, Clone)]
pub struct IndexDependencies {
    index_name: String,
    root: Arc<TableRelation>,
    tables: BTreeMap<String, Arc<TableRelation>>,
}

impl IndexDependencies {
    /// Create a tree holding only the root table.
    pub fn new(index_name: impl Into<String>, root: Arc<TableRelation>) -> Self {
        let mut tables = BTreeMap::new();
        tables.insert(root.table_name().to_string(), root.clone());
        Self {
            index_name: index_name.into(),
            root,
            tables,
        }
    }

    /// Register the chain starting at `relation`.
    ///
    /// The chain must end at this index's root, and a table already
    /// registered must keep the same join and allow-list.
    pub fn add_dependency(&mut self, relation: Arc<TableRelation>) -> Result<(), DependencyError> {
        if relation.head().table_name() != self.root.table_name() {
            return Err(DependencyError::invalid(
                &self.index_name,
                format!(
                    "table {} leads to {} instead of {}",
                    relation.table_name(),
                    relation.head().table_name(),
                    self.root.table_name()
                ),
            ));
        }

        match self.tables.get(relation.table_name()) {
            Some(existing) if **existing == *relation => Ok(()),
            Some(_) => Err(DependencyError::invalid(
                &self.index_name,
                format!(
                    "table {} is declared with conflicting joins",
                    relation.table_name()
                ),
            )),
            None => {
                self.tables
                    .insert(relation.table_name().to_string(), relation);
                Ok(())
            }
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn root(&self) -> &Arc<TableRelation> {
        &self.root
    }

    pub fn root_table(&self) -> &str {
        self.root.table_name()
    }

    pub fn primary_key(&self) -> &str {
        self.root.primary_key()
    }

    /// Chain for a table, None when the table is irrelevant to this index.
    pub fn dependency(&self, table_name: &str) -> Option<&Arc<TableRelation>> {
        self.tables.get(table_name)
    }

    /// Names of every table this index depends on, root included.
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Human-readable listing of every chain, one per line.
    pub fn describe(&self) -> String {
        let mut lines = vec![format!(
            "{} (root: {}.{})",
            self.index_name,
            self.root_table(),
            self.primary_key()
        )];
        for relation in self.tables.values().filter(|r| !r.is_head()) {
            let mut line = format!("  {relation}");
            if !relation.fields_used_for_indexing().is_empty() {
                let fields: Vec<&str> = relation
                    .fields_used_for_indexing()
                    .iter()
                    .map(String::as_str)
                    .collect();
                line.push_str(&format!(" [{}]", fields.join(", ")));
            }
            lines.push(line);
        }
        lines.join("\n")
    }
}

/// Dependency trees for every configured index, keyed by index name.
#[derive(Debug, Clone, Default)]
pub struct DependencyRegistry {
    indexes: BTreeMap<String, Arc<IndexDependencies>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, dependencies: IndexDependencies) -> Result<(), DependencyError> {
        let name = dependencies.index_name().to_string();
        if self.indexes.contains_key(&name) {
            return Err(DependencyError::invalid(&name, "index declared more than once"));
        }
        self.indexes.insert(name, Arc::new(dependencies));
        Ok(())
    }

    pub fn index(&self, name: &str) -> Result<Arc<IndexDependencies>, DependencyError> {
        self.indexes
            .get(name)
            .cloned()
            .ok_or_else(|| DependencyError::UnknownIndex(name.to_string()))
    }

    pub fn index_names(&self) -> impl Iterator<Item = &str> {
        self.indexes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<IndexDependencies>> {
        self.indexes.values()
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn work_tree() -> IndexDependencies {
        let work = Arc::new(TableRelation::head("work"));
        let mut tree = IndexDependencies::new("work", work.clone());

        let alias = Arc::new(
            TableRelation::linked("work_alias", "work", "id", work.clone())
                .with_used_fields(["name", "work"]),
        );
        let acn = Arc::new(TableRelation::linked(
            "artist_credit_name",
            "artist_credit",
            "artist_credit",
            work,
        ));
        let artist = Arc::new(TableRelation::linked("artist", "id", "artist", acn.clone()));

        tree.add_dependency(alias).unwrap();
        tree.add_dependency(acn).unwrap();
        tree.add_dependency(artist).unwrap();
        tree
    }

    #[test]
    fn test_lookup() {
        let tree = work_tree();
        assert_eq!(tree.root_table(), "work");
        assert_eq!(tree.primary_key(), "id");
        assert!(tree.dependency("work").unwrap().is_head());
        assert_eq!(
            tree.dependency("artist").unwrap().head().table_name(),
            "work"
        );
        assert!(tree.dependency("recording").is_none());
        assert_eq!(
            tree.tables().collect::<Vec<_>>(),
            vec!["artist", "artist_credit_name", "work", "work_alias"]
        );
    }

    #[test]
    fn test_add_same_dependency_twice() {
        let mut tree = work_tree();
        let work = tree.root().clone();
        let alias = Arc::new(
            TableRelation::linked("work_alias", "work", "id", work).with_used_fields(["work", "name"]),
        );
        assert!(tree.add_dependency(alias).is_ok());
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn test_conflicting_dependency_rejected() {
        let mut tree = work_tree();
        let work = tree.root().clone();
        let alias = Arc::new(TableRelation::linked("work_alias", "parent", "id", work));
        assert!(matches!(
            tree.add_dependency(alias),
            Err(DependencyError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_foreign_root_rejected() {
        let mut tree = work_tree();
        let label = Arc::new(TableRelation::head("label"));
        let alias = Arc::new(TableRelation::linked("label_alias", "label", "id", label));
        assert!(tree.add_dependency(alias).is_err());
    }

    #[test]
    fn test_describe() {
        let description = work_tree().describe();
        assert!(description.starts_with("work (root: work.id)"));
        assert!(description.contains("  work_alias.work -> work.id [name, work]"));
        assert!(description.contains(
            "  artist.id -> artist_credit_name.artist, artist_credit_name.artist_credit -> work.artist_credit"
        ));
    }

    #[test]
    fn test_registry() {
        let mut registry = DependencyRegistry::new();
        registry.insert(work_tree()).unwrap();
        assert!(registry.insert(work_tree()).is_err());
        assert!(registry.index("work").is_ok());
        assert!(matches!(
            registry.index("artist"),
            Err(DependencyError::UnknownIndex(_))
        ));
        assert_eq!(registry.index_names().collect::<Vec<_>>(), vec!["work"]);
    }
}
