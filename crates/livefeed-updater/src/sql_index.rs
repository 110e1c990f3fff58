//! Index whose documents come from one configured SQL query.

use std::sync::Arc;

use async_trait::async_trait;
use tantivy::schema::Schema;
use tantivy::TantivyDocument;
use tokio_postgres::{Client, Row};
use tracing::debug;

use livefeed_search::{build_schema, DocumentWriter};
use livefeed_types::SqlIndexSettings;

use crate::error::UpdateError;
use crate::index::DatabaseIndex;

/// A [`DatabaseIndex`] driven by [`SqlIndexSettings`].
///
/// Every row of the document query becomes one document: the first column
/// is the identifier, the rest fill `text_fields` in order. Bounds are
/// bound as `bigint`, so the query should compare against `$1::bigint`.
pub struct SqlIndex {
    settings: SqlIndexSettings,
    schema: Schema,
    client: Arc<Client>,
}

impl SqlIndex {
    pub fn new(settings: SqlIndexSettings, client: Arc<Client>) -> Self {
        let schema = build_schema(&settings.identifier_field, &settings.text_fields);
        Self {
            settings,
            schema,
            client,
        }
    }

    pub fn settings(&self) -> &SqlIndexSettings {
        &self.settings
    }

    fn document(&self, writer: &DocumentWriter, row: &Row) -> Result<TantivyDocument, UpdateError> {
        let mut document = TantivyDocument::new();
        document.add_text(writer.identifier_field(), row_id(row)?.to_string());

        for (position, name) in self.settings.text_fields.iter().enumerate() {
            let field = writer.field(name)?;
            let value: Option<String> = row.try_get(position + 1)?;
            if let Some(value) = value {
                document.add_text(field, value);
            }
        }
        Ok(document)
    }
}

fn row_id(row: &Row) -> Result<i64, UpdateError> {
    match row.try_get::<_, i64>(0) {
        Ok(id) => Ok(id),
        Err(_) => Ok(i64::from(row.try_get::<_, i32>(0)?)),
    }
}

#[async_trait]
impl DatabaseIndex for SqlIndex {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn identifier_field(&self) -> &str {
        &self.settings.identifier_field
    }

    fn schema(&self) -> Schema {
        self.schema.clone()
    }

    async fn init(&self, _writer: &DocumentWriter, incremental: bool) -> Result<(), UpdateError> {
        debug!(index = %self.settings.name, incremental, "Initialised SQL index");
        Ok(())
    }

    async fn index_data(
        &self,
        writer: &DocumentWriter,
        min_id: i64,
        max_id: i64,
    ) -> Result<(), UpdateError> {
        let rows = self
            .client
            .query(self.settings.query.as_str(), &[&min_id, &max_id])
            .await?;

        for row in &rows {
            writer.add_document(self.document(writer, row)?)?;
        }

        debug!(
            index = %self.settings.name,
            min_id,
            max_id,
            documents = rows.len(),
            "Indexed rows"
        );
        Ok(())
    }

    async fn no_of_rows(&self, max_id: i64) -> Result<u64, UpdateError> {
        let row = match &self.settings.count_query {
            Some(query) => self.client.query_one(query.as_str(), &[&max_id]).await?,
            None => {
                let query = format!(
                    "SELECT count(*)::bigint FROM ({}) AS indexed",
                    self.settings.query
                );
                self.client.query_one(query.as_str(), &[&0_i64, &max_id]).await?
            }
        };
        let count: i64 = row.try_get(0)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}
