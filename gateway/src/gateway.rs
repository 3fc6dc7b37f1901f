//! The generic entity gateway.
//!
//! Reads fail soft: a refused or unreachable store is logged and the caller
//! gets an empty result. Writes fail loud with a typed [`GatewayError`].

use std::collections::HashSet;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::entity::Entity;
use crate::error::GatewayError;
use crate::error::Result;
use crate::query::Query;
use crate::record::Condition;
use crate::record::Envelope;
use crate::record::FailureKind;
use crate::record::FetchParams;
use crate::record::ID_COLUMN;
use crate::record::Operator;
use crate::record::PagingInfo;
use crate::record::RecordId;
use crate::record::RecordResult;
use crate::record::RemoteRecord;
use crate::record::record_id;
use crate::store::RecordStore;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOptions {
    /// Upper bound on each store call.
    pub call_timeout: Duration,
    /// Artificial delay before each store call.
    pub latency: Duration,
    /// Records requested per page when reading a whole collection.
    pub page_size: usize,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            latency: Duration::ZERO,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Outcome for one id of a bulk delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    #[serde(rename = "Id")]
    pub id: RecordId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DeleteOutcome {
    fn ok(id: RecordId) -> Self {
        Self {
            id,
            success: true,
            message: None,
        }
    }

    fn failed(id: RecordId, message: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            message: Some(message.into()),
        }
    }
}

/// How a write batch of one record came back.
enum Rejection {
    /// The store refused the whole call.
    Call(String),
    /// The store refused the record.
    Record(Option<FailureKind>, String),
}

impl Rejection {
    fn into_message(self) -> String {
        match self {
            Rejection::Call(m) | Rejection::Record(_, m) => m,
        }
    }
}

fn first_result(env: Envelope<Vec<RecordResult>>, op: &str) -> std::result::Result<RecordResult, Rejection> {
    if !env.success {
        return Err(Rejection::Call(env.message_or(&format!("{op} failed"))));
    }
    match env.data.and_then(|rs| rs.into_iter().next()) {
        Some(r) if r.success => Ok(r),
        Some(r) => Err(Rejection::Record(
            r.failure,
            r.message.unwrap_or_else(|| format!("{op} failed")),
        )),
        None => Err(Rejection::Record(None, format!("{op} returned no result"))),
    }
}

pub(crate) fn to_map<T: Serialize>(value: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(GatewayError::Validation(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Log a failed read and fall back to the empty value.
pub(crate) fn soft<T: Default>(result: Result<T>, entity: &str, op: &str) -> T {
    result.unwrap_or_else(|e| {
        error!(entity, op, error = %e, "read failed; returning empty result");
        T::default()
    })
}

/// Typed CRUD for one entity over a shared record store.
pub struct EntityGateway<E> {
    store: Arc<dyn RecordStore>,
    options: GatewayOptions,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for EntityGateway<E> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            options: self.options.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> EntityGateway<E> {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_options(store, GatewayOptions::default())
    }

    pub fn with_options(store: Arc<dyn RecordStore>, options: GatewayOptions) -> Self {
        Self {
            store,
            options,
            _entity: PhantomData,
        }
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    async fn remote<T, F>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if !self.options.latency.is_zero() {
            tokio::time::sleep(self.options.latency).await;
        }
        debug!(entity = E::schema().entity, op, "store call");
        tokio::time::timeout(self.options.call_timeout, call)
            .await
            .unwrap_or(Err(GatewayError::Timeout(self.options.call_timeout)))
    }

    fn decode(record: &RemoteRecord) -> Result<E> {
        let map = E::schema().read(record)?;
        Ok(serde_json::from_value(Value::Object(map))?)
    }

    fn not_found(id: RecordId) -> GatewayError {
        GatewayError::NotFound {
            entity: E::schema().entity,
            id,
        }
    }

    /// Every record of the collection.
    pub async fn get_all(&self) -> Vec<E> {
        self.list(Query::new()).await
    }

    pub async fn list(&self, query: Query) -> Vec<E> {
        soft(self.try_list(query).await, E::schema().entity, "list")
    }

    /// `list` without the soft failure.
    pub async fn try_list(&self, query: Query) -> Result<Vec<E>> {
        let records = self.fetch(&query, E::schema().fetch_columns()).await?;
        Ok(records
            .iter()
            .filter_map(|r| match Self::decode(r) {
                Ok(e) => Some(e),
                Err(e) => {
                    warn!(entity = E::schema().entity, error = %e, "skipping undecodable record");
                    None
                }
            })
            .collect())
    }

    /// Number of records matching `query`.
    pub async fn count(&self, query: Query) -> Result<usize> {
        Ok(self.fetch(&query, vec![ID_COLUMN.to_string()]).await?.len())
    }

    /// Fetch every matching record. Without an explicit limit the collection
    /// is read page by page until a short page, so nothing is truncated.
    async fn fetch(&self, query: &Query, fields: Vec<String>) -> Result<Vec<RemoteRecord>> {
        let mut params = query.to_params(E::schema(), fields)?;
        if params.paging_info.is_some() {
            return self.fetch_page(&params).await;
        }
        let page_size = self.options.page_size.max(1);
        let mut offset = query.offset;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        loop {
            params.paging_info = Some(PagingInfo {
                limit: page_size,
                offset,
            });
            let page = self.fetch_page(&params).await?;
            let len = page.len();
            let mut fresh = 0;
            for record in page {
                // Pages can overlap when rows move between calls.
                match record_id(&record) {
                    Some(id) if seen.insert(id) => {
                        fresh += 1;
                        out.push(record);
                    }
                    Some(_) => {}
                    None => warn!(entity = E::schema().entity, "skipping record without Id"),
                }
            }
            if len < page_size || fresh == 0 {
                break;
            }
            offset += len;
        }
        Ok(out)
    }

    async fn fetch_page(&self, params: &FetchParams) -> Result<Vec<RemoteRecord>> {
        let table = E::schema().table;
        let env = self
            .remote("fetch", self.store.fetch_records(table, params))
            .await?;
        if !env.success {
            return Err(GatewayError::RemoteFailure(env.message_or("fetch failed")));
        }
        Ok(env.data.unwrap_or_default())
    }

    pub async fn get_by_id(&self, id: RecordId) -> Result<E> {
        let schema = E::schema();
        let fields = schema.fetch_columns();
        let env = self
            .remote("get", self.store.get_record_by_id(schema.table, id, &fields))
            .await?;
        match env.data {
            Some(record) if env.success => Self::decode(&record),
            _ => Err(Self::not_found(id)),
        }
    }

    pub async fn create(&self, input: &E::Input) -> Result<E> {
        let record = E::schema().write_create(&to_map(input)?, Utc::now())?;
        self.insert(record).await
    }

    /// Recreate an exported record under a fresh id, keeping the fields a
    /// plain create would reset: fixed-on-create flags, derived columns and
    /// timestamps. Application field names; `Id` is ignored.
    pub async fn restore(&self, record: &Map<String, Value>) -> Result<E> {
        let record = E::schema().write_restore(record, Utc::now())?;
        self.insert(record).await
    }

    async fn insert(&self, record: RemoteRecord) -> Result<E> {
        let schema = E::schema();
        self.ensure_unique(&record, None).await?;
        let unique = schema.unique_columns();
        let env = self
            .remote(
                "create",
                self.store.create_records(schema.table, vec![record], &unique),
            )
            .await?;
        match first_result(env, "create") {
            Ok(RecordResult {
                data: Some(data), ..
            }) => Self::decode(&data),
            Ok(RecordResult { id: Some(id), .. }) => self.get_by_id(id).await,
            Ok(_) => Err(GatewayError::remote("create returned no record")),
            Err(Rejection::Record(Some(FailureKind::Conflict), m)) => {
                Err(GatewayError::Validation(m))
            }
            Err(other) => Err(GatewayError::RemoteFailure(other.into_message())),
        }
    }

    /// Change only the fields present in `patch`.
    pub async fn update(&self, id: RecordId, patch: &E::Patch) -> Result<E> {
        let schema = E::schema();
        let patch = to_map(patch)?;
        let now = Utc::now();
        let mut record = schema.write_update(&patch, now)?;
        E::on_update(&patch, &mut record, now);
        self.ensure_unique(&record, Some(id)).await?;
        record.insert(ID_COLUMN.to_string(), Value::from(id));
        let unique = schema.unique_columns();
        let env = self
            .remote(
                "update",
                self.store.update_records(schema.table, vec![record], &unique),
            )
            .await?;
        match first_result(env, "update") {
            Ok(RecordResult {
                data: Some(data), ..
            }) => Self::decode(&data),
            Ok(_) => self.get_by_id(id).await,
            Err(Rejection::Record(Some(FailureKind::NotFound), _)) => Err(Self::not_found(id)),
            Err(Rejection::Record(Some(FailureKind::Conflict), m)) => {
                Err(GatewayError::Validation(m))
            }
            Err(other) => Err(self.classify(id, other.into_message()).await),
        }
    }

    /// Remove a record. Deleting an id that is already gone is `NotFound`.
    pub async fn delete(&self, id: RecordId) -> Result<()> {
        let table = E::schema().table;
        let env = self
            .remote("delete", self.store.delete_records(table, &[id]))
            .await?;
        match first_result(env, "delete") {
            Ok(_) => Ok(()),
            Err(Rejection::Record(Some(FailureKind::NotFound), _)) => Err(Self::not_found(id)),
            Err(other) => Err(self.classify(id, other.into_message()).await),
        }
    }

    /// Delete each id independently. Returns one outcome per input id, in
    /// input order; never fails as a whole.
    pub async fn bulk_delete(&self, ids: &[RecordId]) -> Vec<DeleteOutcome> {
        if ids.is_empty() {
            return Vec::new();
        }
        let table = E::schema().table;
        let env = match self
            .remote("bulk_delete", self.store.delete_records(table, ids))
            .await
        {
            Ok(env) if env.success => env,
            Ok(env) => {
                let message = env.message_or("delete failed");
                error!(entity = E::schema().entity, %message, "bulk delete refused");
                return ids.iter().map(|&id| DeleteOutcome::failed(id, &message)).collect();
            }
            Err(e) => {
                error!(entity = E::schema().entity, error = %e, "bulk delete failed");
                let message = e.to_string();
                return ids.iter().map(|&id| DeleteOutcome::failed(id, &message)).collect();
            }
        };
        let results = env.data.unwrap_or_default();
        ids.iter()
            .enumerate()
            .map(|(i, &id)| {
                let result = results
                    .get(i)
                    .filter(|r| r.id == Some(id))
                    .or_else(|| results.iter().find(|r| r.id == Some(id)));
                match result {
                    Some(r) if r.success => DeleteOutcome::ok(id),
                    Some(r) => DeleteOutcome::failed(
                        id,
                        r.message.clone().unwrap_or_else(|| "delete failed".to_string()),
                    ),
                    None => DeleteOutcome::failed(id, "no result reported"),
                }
            })
            .collect()
    }

    /// Name a write failure the store did not classify: if the record is gone
    /// it was `NotFound`, otherwise the store failed.
    async fn classify(&self, id: RecordId, message: String) -> GatewayError {
        let table = E::schema().table;
        let probe = self
            .remote(
                "probe",
                self.store
                    .get_record_by_id(table, id, &[ID_COLUMN.to_string()]),
            )
            .await;
        match probe {
            Ok(env) if !env.success || env.data.is_none() => Self::not_found(id),
            _ => GatewayError::RemoteFailure(message),
        }
    }

    /// Reject a write whose unique columns already belong to another record.
    ///
    /// This is a read-then-write check and can race with a concurrent write;
    /// stores that enforce `unique` themselves close that gap. If the check
    /// itself cannot run, the write goes ahead and the store decides.
    async fn ensure_unique(&self, record: &RemoteRecord, exclude: Option<RecordId>) -> Result<()> {
        let schema = E::schema();
        for field in schema.unique_fields() {
            let Some(value) = record.get(field.column).filter(|v| !v.is_null()) else {
                continue;
            };
            let mut conditions = vec![Condition {
                field_name: field.column.to_string(),
                operator: Operator::EqualTo,
                sub_operator: None,
                values: vec![value.clone()],
            }];
            if let Some(id) = exclude {
                conditions.push(Condition {
                    field_name: ID_COLUMN.to_string(),
                    operator: Operator::NotEqualTo,
                    sub_operator: None,
                    values: vec![Value::from(id)],
                });
            }
            let params = FetchParams {
                fields: vec![ID_COLUMN.to_string()],
                conditions,
                paging_info: Some(PagingInfo {
                    limit: 1,
                    offset: 0,
                }),
                ..FetchParams::default()
            };
            match self.fetch_page(&params).await {
                Ok(hits) if !hits.is_empty() => {
                    let shown = value.as_str().map_or_else(|| value.to_string(), str::to_string);
                    return Err(GatewayError::Validation(format!(
                        "a {} with {} {shown} already exists",
                        schema.entity, field.name
                    )));
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(entity = schema.entity, error = %e, "uniqueness pre-check failed");
                }
            }
        }
        Ok(())
    }
}
