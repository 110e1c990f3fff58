//! One table in a join chain.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Default primary key column of a root entity table.
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Join from a table to the next table on the way to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    /// Column on this table
    source_join_field: String,
    /// Column on the next table
    target_join_field: String,
    target: Arc<TableRelation>,
}

/// A table in a leaf-to-root join chain.
///
/// A relation without a next hop is the head: the root entity table whose
/// primary key is the search document id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRelation {
    table_name: String,
    link: Option<Link>,
    fields_used_for_indexing: BTreeSet<String>,
    primary_key: String,
}

impl TableRelation {
    /// Create a head relation for a root entity table.
    pub fn head(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            link: None,
            fields_used_for_indexing: BTreeSet::new(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    /// Create a relation joined to `target`.
    ///
    /// `source_join_field` is the column on this table, `target_join_field`
    /// the column on the target table it equals.
    pub fn linked(
        table_name: impl Into<String>,
        source_join_field: impl Into<String>,
        target_join_field: impl Into<String>,
        target: Arc<TableRelation>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            link: Some(Link {
                source_join_field: source_join_field.into(),
                target_join_field: target_join_field.into(),
                target,
            }),
            fields_used_for_indexing: BTreeSet::new(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
        }
    }

    /// Restrict which columns matter to the index.
    ///
    /// UPDATEs on this table that touch none of these columns are ignored.
    pub fn with_used_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields_used_for_indexing = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the primary key column of a head relation.
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn source_join_field(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.source_join_field.as_str())
    }

    pub fn target_join_field(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.target_join_field.as_str())
    }

    pub fn target(&self) -> Option<&Arc<TableRelation>> {
        self.link.as_ref().map(|l| &l.target)
    }

    pub fn fields_used_for_indexing(&self) -> &BTreeSet<String> {
        &self.fields_used_for_indexing
    }

    /// Primary key column of the root entity this chain leads to.
    pub fn primary_key(&self) -> &str {
        &self.head().primary_key
    }

    pub fn is_head(&self) -> bool {
        self.link.is_none()
    }

    /// Follow the chain to its root.
    pub fn head(&self) -> &TableRelation {
        let mut relation = self;
        while let Some(link) = &relation.link {
            relation = &link.target;
        }
        relation
    }

    /// Number of joins between this table and the root.
    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut relation = self;
        while let Some(link) = &relation.link {
            depth += 1;
            relation = &link.target;
        }
        depth
    }

    /// Whether an UPDATE touching `changed` columns can affect the index.
    pub fn is_relevant_update(&self, changed: &BTreeSet<String>) -> bool {
        self.fields_used_for_indexing.is_empty()
            || self
                .fields_used_for_indexing
                .iter()
                .any(|field| changed.contains(field))
    }

    /// SQL selecting the root ids reachable from `keys`.
    ///
    /// `keys` are values of this table's source join column. Joins are
    /// emitted from the table just below the root down to this table's next
    /// hop, and the filter is on the next hop's join column. Returns None
    /// for the head, and for an empty key set.
    pub fn generate_sql(&self, keys: &BTreeSet<i64>) -> Option<String> {
        let link = self.link.as_ref()?;
        if keys.is_empty() {
            return None;
        }

        let head = self.head();
        let mut joins = Vec::new();
        let mut relation = link.target.as_ref();
        while let Some(next) = &relation.link {
            joins.push(format!(
                " JOIN {table} ON ({table}.{source} = {target}.{target_field})",
                table = relation.table_name,
                source = next.source_join_field,
                target = next.target.table_name,
                target_field = next.target_join_field,
            ));
            relation = &next.target;
        }

        let mut sql = format!(
            "SELECT {head}.{pk} FROM {head}",
            head = head.table_name,
            pk = head.primary_key
        );
        for join in joins.iter().rev() {
            sql.push_str(join);
        }

        let key_list = keys
            .iter()
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(",");
        sql.push_str(&format!(
            " WHERE {}.{} IN ({})",
            link.target.table_name, link.target_join_field, key_list
        ));

        Some(sql)
    }
}

impl fmt::Display for TableRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut relation = self;
        if relation.link.is_none() {
            return write!(f, "{}", relation.table_name);
        }
        let mut first = true;
        while let Some(link) = &relation.link {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(
                f,
                "{}.{} -> {}.{}",
                relation.table_name,
                link.source_join_field,
                link.target.table_name,
                link.target_join_field
            )?;
            relation = &link.target;
        }
        Ok(())
    }
}
