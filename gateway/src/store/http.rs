use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_json::json;
use tracing::debug;

use super::RecordStore;
use crate::error::GatewayError;
use crate::error::Result;
use crate::record::Envelope;
use crate::record::FetchParams;
use crate::record::RecordId;
use crate::record::RecordResult;
use crate::record::RemoteRecord;

pub const PROJECT_ID_HEADER: &str = "X-Project-Id";
pub const PUBLIC_KEY_HEADER: &str = "X-Public-Key";

/// Client for a remote record service speaking
/// `POST {base}/tables/{table}/records/{action}` with JSON envelopes.
///
/// The service cannot be asked to enforce unique columns atomically; the
/// columns are forwarded and callers should expect the gateway's pre-check
/// to be the only guard.
#[derive(Debug, Clone)]
pub struct HttpRecordStore {
    client: reqwest::Client,
    base_url: String,
    project_id: String,
    public_key: String,
}

impl HttpRecordStore {
    pub fn new(
        base_url: impl Into<String>,
        project_id: impl Into<String>,
        public_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::remote(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project_id: project_id.into(),
            public_key: public_key.into(),
        })
    }

    async fn call<B, T>(&self, table: &str, action: &str, body: &B) -> Result<Envelope<T>>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}/tables/{table}/records/{action}", self.base_url);
        debug!(%url, "record service call");
        let resp = self
            .client
            .post(&url)
            .header(PROJECT_ID_HEADER, &self.project_id)
            .header(PUBLIC_KEY_HEADER, &self.public_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::remote(format!("{action} {table}: {e}")))?;
        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| GatewayError::remote(format!("{action} {table}: {e}")))?;
        if !status.is_success() {
            // A refusal, not a transport error; keep the service's message if it sent one.
            let message = serde_json::from_str::<Envelope<Value>>(&text)
                .ok()
                .and_then(|env| env.message)
                .unwrap_or_else(|| format!("{action} {table}: HTTP {status}"));
            return Ok(Envelope::failed(message));
        }
        serde_json::from_str(&text)
            .map_err(|e| GatewayError::remote(format!("{action} {table}: undecodable response: {e}")))
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    async fn fetch_records(
        &self,
        table: &str,
        params: &FetchParams,
    ) -> Result<Envelope<Vec<RemoteRecord>>> {
        self.call(table, "query", params).await
    }

    async fn get_record_by_id(
        &self,
        table: &str,
        id: RecordId,
        fields: &[String],
    ) -> Result<Envelope<RemoteRecord>> {
        self.call(table, "get", &json!({ "Id": id, "fields": fields }))
            .await
    }

    async fn create_records(
        &self,
        table: &str,
        records: Vec<RemoteRecord>,
        unique: &[&str],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        self.call(table, "create", &json!({ "records": records, "unique": unique }))
            .await
    }

    async fn update_records(
        &self,
        table: &str,
        records: Vec<RemoteRecord>,
        unique: &[&str],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        self.call(table, "update", &json!({ "records": records, "unique": unique }))
            .await
    }

    async fn delete_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        self.call(table, "delete", &json!({ "RecordIds": ids })).await
    }
}
