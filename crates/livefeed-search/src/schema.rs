//! Tantivy schema helpers.
//!
//! Every index maintained from the live data feed carries five extra fields
//! holding its meta document:
//! - index_meta: always "1", used to find the meta document
//! - index_schseq / index_repseq: schema and replication sequence
//! - index_changeseq: last applied change id (empty when unknown)
//! - index_lastupdate: RFC 3339 timestamp of the last update

use tantivy::schema::{Field, Schema, SchemaBuilder, STORED, STRING, TEXT};

use crate::error::SearchError;

pub const META_FIELD: &str = "index_meta";
pub const META_SCHEMA_SEQUENCE_FIELD: &str = "index_schseq";
pub const META_REPLICATION_SEQUENCE_FIELD: &str = "index_repseq";
pub const META_CHANGE_SEQUENCE_FIELD: &str = "index_changeseq";
pub const META_LAST_UPDATED_FIELD: &str = "index_lastupdate";

/// Value of the index_meta field on the meta document.
pub const META_VALUE: &str = "1";

/// Add the meta document fields to a schema under construction.
pub fn add_meta_fields(builder: &mut SchemaBuilder) {
    builder.add_text_field(META_FIELD, STRING | STORED);
    builder.add_text_field(META_SCHEMA_SEQUENCE_FIELD, STRING | STORED);
    builder.add_text_field(META_REPLICATION_SEQUENCE_FIELD, STRING | STORED);
    builder.add_text_field(META_CHANGE_SEQUENCE_FIELD, STRING | STORED);
    builder.add_text_field(META_LAST_UPDATED_FIELD, STRING | STORED);
}

/// Build a schema with an identifier field, stored text fields and the
/// meta document fields.
pub fn build_schema(identifier_field: &str, text_fields: &[String]) -> Schema {
    let mut builder = Schema::builder();
    builder.add_text_field(identifier_field, STRING | STORED);
    for name in text_fields {
        builder.add_text_field(name, TEXT | STORED);
    }
    add_meta_fields(&mut builder);
    builder.build()
}

/// Field handles for the meta document.
#[derive(Debug, Clone, Copy)]
pub struct MetaFields {
    pub meta: Field,
    pub schema_sequence: Field,
    pub replication_sequence: Field,
    pub change_sequence: Field,
    pub last_updated: Field,
}

impl MetaFields {
    /// Resolve the meta fields of an existing schema.
    pub fn from_schema(schema: &Schema) -> Result<Self, SearchError> {
        Ok(Self {
            meta: get_field(schema, META_FIELD)?,
            schema_sequence: get_field(schema, META_SCHEMA_SEQUENCE_FIELD)?,
            replication_sequence: get_field(schema, META_REPLICATION_SEQUENCE_FIELD)?,
            change_sequence: get_field(schema, META_CHANGE_SEQUENCE_FIELD)?,
            last_updated: get_field(schema, META_LAST_UPDATED_FIELD)?,
        })
    }
}

pub(crate) fn get_field(schema: &Schema, name: &str) -> Result<Field, SearchError> {
    schema
        .get_field(name)
        .map_err(|_| SearchError::SchemaMismatch(format!("missing {name} field")))
}
