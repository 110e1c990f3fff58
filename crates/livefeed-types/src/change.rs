//! Row-level change records.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;
use crate::unpack::{changed_fields, FieldMap};

/// Kind of row mutation recorded in the pending-change log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Insert,
    Update,
    Delete,
}

impl Operation {
    /// One-letter code used by the replication triggers.
    pub fn code(&self) -> &'static str {
        match self {
            Operation::Insert => "i",
            Operation::Update => "u",
            Operation::Delete => "d",
        }
    }

    /// Parse a trigger code, returning None for unknown codes.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "i" => Some(Operation::Insert),
            "u" => Some(Operation::Update),
            "d" => Some(Operation::Delete),
            _ => None,
        }
    }
}

impl FromStr for Operation {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or_else(|| FeedError::parse(0, format!("unknown operation: {s}")))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => write!(f, "INSERT"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// One logical database mutation.
///
/// `old_values` is populated for UPDATE and DELETE, `new_values` for
/// INSERT and UPDATE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRecord {
    pub id: i64,
    pub table_name: String,
    pub operation: Operation,
    pub old_values: FieldMap,
    pub new_values: FieldMap,
}

impl ChangeRecord {
    pub fn new(id: i64, table_name: impl Into<String>, operation: Operation) -> Self {
        Self {
            id,
            table_name: table_name.into(),
            operation,
            old_values: FieldMap::new(),
            new_values: FieldMap::new(),
        }
    }

    pub fn with_old_values(mut self, values: FieldMap) -> Self {
        self.old_values = values;
        self
    }

    pub fn with_new_values(mut self, values: FieldMap) -> Self {
        self.new_values = values;
        self
    }

    /// Attach one packed row image to this change.
    ///
    /// `is_key` mirrors the pending-data flag: for an UPDATE the `false`
    /// image holds the old values and the `true` image the new ones.
    pub fn apply_row_image(&mut self, is_key: bool, values: FieldMap) {
        match self.operation {
            Operation::Insert => self.new_values = values,
            Operation::Delete => self.old_values = values,
            Operation::Update if is_key => self.new_values = values,
            Operation::Update => self.old_values = values,
        }
    }

    /// Columns whose value differs between the old and new row images.
    pub fn changed_fields(&self) -> BTreeSet<String> {
        changed_fields(&self.old_values, &self.new_values)
    }

    /// The row image that describes the row as it exists after this change,
    /// or as it existed before a delete.
    pub fn current_values(&self) -> &FieldMap {
        match self.operation {
            Operation::Delete => &self.old_values,
            Operation::Insert | Operation::Update => &self.new_values,
        }
    }
}
