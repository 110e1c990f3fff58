//! Meta document reads.

use chrono::{DateTime, Utc};
use tantivy::collector::{Count, TopDocs};
use tantivy::query::TermQuery;
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{TantivyDocument, Term};
use tracing::debug;

use livefeed_types::IndexPosition;

use crate::error::SearchError;
use crate::index::SearchIndex;
use crate::schema::META_VALUE;

/// Read the replication position recorded in the index's meta document.
///
/// Exactly one meta document must exist; zero or several make the index
/// un-updatable until repaired.
pub fn read_position(index: &SearchIndex) -> Result<IndexPosition, SearchError> {
    let meta = index.meta_fields();
    let reader = index.reader()?;
    let searcher = reader.searcher();

    let query = TermQuery::new(
        Term::from_field_text(meta.meta, META_VALUE),
        IndexRecordOption::Basic,
    );
    let (count, top_docs) = searcher.search(&query, &(Count, TopDocs::with_limit(1)))?;

    let path = index.path().display().to_string();
    let doc_address = match (count, top_docs.first()) {
        (1, Some((_, address))) => *address,
        (0, _) | (_, None) => return Err(SearchError::MetaDocumentMissing(path)),
        (count, _) => return Err(SearchError::MetaDocumentAmbiguous { path, count }),
    };

    let doc: TantivyDocument = searcher.doc(doc_address)?;

    let schema_sequence = parse_sequence(&doc, meta.schema_sequence, "schema sequence")?
        .ok_or_else(|| SearchError::InvalidMeta("missing schema sequence".to_string()))?;
    let replication_sequence =
        parse_sequence(&doc, meta.replication_sequence, "replication sequence")?
            .ok_or_else(|| SearchError::InvalidMeta("missing replication sequence".to_string()))?;
    let change_sequence = parse_sequence(&doc, meta.change_sequence, "change sequence")?;

    let last_updated = text_value(&doc, meta.last_updated)
        .ok_or_else(|| SearchError::InvalidMeta("missing last updated".to_string()))
        .and_then(|text| {
            DateTime::parse_from_rfc3339(text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| SearchError::InvalidMeta(format!("last updated {text:?}: {e}")))
        })?;

    let position = IndexPosition {
        schema_sequence,
        replication_sequence,
        change_sequence,
        last_updated,
    };
    debug!(
        path = %path,
        schema_sequence,
        replication_sequence,
        change_sequence = ?change_sequence,
        "Read index position"
    );
    Ok(position)
}

fn text_value(doc: &TantivyDocument, field: Field) -> Option<&str> {
    doc.get_first(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

fn parse_sequence(
    doc: &TantivyDocument,
    field: Field,
    what: &str,
) -> Result<Option<i64>, SearchError> {
    text_value(doc, field)
        .map(|text| {
            text.parse::<i64>()
                .map_err(|_| SearchError::InvalidMeta(format!("{what} is not a number: {text:?}")))
        })
        .transpose()
}
