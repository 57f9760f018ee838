//! Grist backend: `DataSource` over the Grist REST API.
//!
//! Queries go through the document's SQL endpoint; write-back uses the
//! records endpoint of each table, one request per batch.

use async_trait::async_trait;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::traits::{DataSource, Record, Row, RowId};

/// Grist document client.
pub struct GristClient {
    root_url: Url,
    doc_id: String,
    api_key: SecretString,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SqlResponse {
    records: Vec<SqlRecord>,
}

#[derive(Debug, Deserialize)]
struct SqlRecord {
    fields: serde_json::Map<String, serde_json::Value>,
}

impl GristClient {
    pub fn new(root_url: &str, api_key: SecretString, doc_id: &str) -> Result<Self, DatabaseError> {
        let root_url = Url::parse(root_url)
            .map_err(|e| DatabaseError::Pool(format!("Invalid Grist root URL '{root_url}': {e}")))?;
        if root_url.cannot_be_a_base() {
            return Err(DatabaseError::Pool(format!(
                "Grist root URL '{root_url}' cannot be used as a base"
            )));
        }
        Ok(Self {
            root_url,
            doc_id: doc_id.to_string(),
            api_key,
            client: reqwest::Client::new(),
        })
    }

    /// `{root}/api/docs/{doc}/{rest...}` with each segment escaped.
    fn doc_url(&self, rest: &[&str]) -> Url {
        let mut url = self.root_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("api").push("docs").push(&self.doc_id);
            for segment in rest {
                segments.push(segment);
            }
        }
        url
    }

    fn records_url(&self, table: &str) -> Url {
        self.doc_url(&["tables", table, "records"])
    }

    async fn check(resp: reqwest::Response, what: &str) -> Result<reqwest::Response, DatabaseError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(DatabaseError::Query(format!("{what} failed ({status}): {body}")))
    }
}

fn insert_payload(records: &[Record]) -> serde_json::Value {
    let records: Vec<serde_json::Value> = records
        .iter()
        .map(|r| serde_json::json!({ "fields": r.to_json() }))
        .collect();
    serde_json::json!({ "records": records })
}

fn update_payload(updates: &[(RowId, Record)]) -> serde_json::Value {
    let records: Vec<serde_json::Value> = updates
        .iter()
        .map(|(id, r)| serde_json::json!({ "id": id, "fields": r.to_json() }))
        .collect();
    serde_json::json!({ "records": records })
}

#[async_trait]
impl DataSource for GristClient {
    async fn execute_query(&self, sql: &str) -> Result<Vec<Row>, DatabaseError> {
        let mut url = self.doc_url(&["sql"]);
        url.query_pairs_mut().append_pair("q", sql);
        debug!(url = %url.path(), "Running Grist SQL query");

        let resp = self
            .client
            .get(url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;
        let resp = Self::check(resp, "SQL query").await?;
        let parsed: SqlResponse = resp
            .json()
            .await
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        Ok(parsed
            .records
            .iter()
            .map(|r| Record::from_json(&r.fields))
            .collect())
    }

    async fn batch_insert(&self, table: &str, records: &[Record]) -> Result<(), DatabaseError> {
        let resp = self
            .client
            .post(self.records_url(table))
            .bearer_auth(self.api_key.expose_secret())
            .json(&insert_payload(records))
            .send()
            .await
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;
        Self::check(resp, &format!("Adding records to {table}")).await?;
        info!(table, count = records.len(), "Inserted records");
        Ok(())
    }

    async fn batch_update(
        &self,
        table: &str,
        updates: &[(RowId, Record)],
    ) -> Result<(), DatabaseError> {
        let resp = self
            .client
            .patch(self.records_url(table))
            .bearer_auth(self.api_key.expose_secret())
            .json(&update_payload(updates))
            .send()
            .await
            .map_err(|e| DatabaseError::Pool(e.to_string()))?;
        Self::check(resp, &format!("Updating records in {table}")).await?;
        info!(table, count = updates.len(), "Updated records");
        Ok(())
    }
}
