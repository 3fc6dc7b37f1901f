use std::collections::BTreeMap;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use super::RecordStore;
use super::eval;
use crate::error::Result;
use crate::record::CREATED_ON_COLUMN;
use crate::record::Envelope;
use crate::record::FailureKind;
use crate::record::FetchParams;
use crate::record::ID_COLUMN;
use crate::record::MODIFIED_ON_COLUMN;
use crate::record::RecordId;
use crate::record::RecordResult;
use crate::record::RemoteRecord;
use crate::record::record_id;
use crate::schema::stamp;

#[derive(Debug, Default)]
struct Table {
    last_id: RecordId,
    rows: BTreeMap<RecordId, RemoteRecord>,
}

impl Table {
    fn insert(&mut self, mut record: RemoteRecord) -> (RecordId, RemoteRecord) {
        self.last_id += 1;
        let id = self.last_id;
        let now = Value::from(stamp(Utc::now()));
        record.insert(ID_COLUMN.to_string(), Value::from(id));
        record
            .entry(CREATED_ON_COLUMN.to_string())
            .or_insert_with(|| now.clone());
        record.entry(MODIFIED_ON_COLUMN.to_string()).or_insert(now);
        self.rows.insert(id, record.clone());
        (id, record)
    }
}

/// Process-local store. Each table is checked and written under one write
/// lock, so unique columns hold even for concurrent creates.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a record as-is, bypassing every check. For seeding.
    pub async fn insert_raw(&self, table: &str, record: RemoteRecord) -> RecordId {
        let mut tables = self.tables.write().await;
        tables.entry(table.to_string()).or_default().insert(record).0
    }

    pub async fn row_count(&self, table: &str) -> usize {
        self.tables
            .read()
            .await
            .get(table)
            .map_or(0, |t| t.rows.len())
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_records(
        &self,
        table: &str,
        params: &FetchParams,
    ) -> Result<Envelope<Vec<RemoteRecord>>> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .map(|t| t.rows.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        Ok(Envelope::ok(eval::apply(
            rows,
            params,
            Utc::now().date_naive(),
        )))
    }

    async fn get_record_by_id(
        &self,
        table: &str,
        id: RecordId,
        fields: &[String],
    ) -> Result<Envelope<RemoteRecord>> {
        let tables = self.tables.read().await;
        Ok(match tables.get(table).and_then(|t| t.rows.get(&id)) {
            Some(r) => Envelope::ok(eval::project(r.clone(), fields)),
            None => Envelope::failed(format!("record {id} not found in {table}")),
        })
    }

    async fn create_records(
        &self,
        table: &str,
        records: Vec<RemoteRecord>,
        unique: &[&str],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        let mut tables = self.tables.write().await;
        let t = tables.entry(table.to_string()).or_default();
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            if let Some(column) = eval::conflict(t.rows.values(), &record, unique, None) {
                results.push(RecordResult::rejected(
                    None,
                    FailureKind::Conflict,
                    format!("duplicate value for {column}"),
                ));
                continue;
            }
            let (id, stored) = t.insert(record);
            results.push(RecordResult::written(id, stored));
        }
        Ok(Envelope::ok(results))
    }

    async fn update_records(
        &self,
        table: &str,
        records: Vec<RemoteRecord>,
        unique: &[&str],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        let mut tables = self.tables.write().await;
        let t = tables.entry(table.to_string()).or_default();
        let mut results = Vec::with_capacity(records.len());
        for patch in records {
            let found = record_id(&patch).and_then(|id| t.rows.get(&id).map(|r| (id, r)));
            let Some((id, existing)) = found else {
                results.push(RecordResult::rejected(
                    record_id(&patch),
                    FailureKind::NotFound,
                    "record not found",
                ));
                continue;
            };
            let mut merged = existing.clone();
            merged.extend(patch);
            if let Some(column) = eval::conflict(t.rows.values(), &merged, unique, Some(id)) {
                results.push(RecordResult::rejected(
                    Some(id),
                    FailureKind::Conflict,
                    format!("duplicate value for {column}"),
                ));
                continue;
            }
            merged.insert(
                MODIFIED_ON_COLUMN.to_string(),
                Value::from(stamp(Utc::now())),
            );
            t.rows.insert(id, merged.clone());
            results.push(RecordResult::written(id, merged));
        }
        Ok(Envelope::ok(results))
    }

    async fn delete_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        let mut tables = self.tables.write().await;
        let t = tables.entry(table.to_string()).or_default();
        let results = ids
            .iter()
            .map(|&id| match t.rows.remove(&id) {
                Some(_) => RecordResult::deleted(id),
                None => {
                    RecordResult::rejected(Some(id), FailureKind::NotFound, "record not found")
                }
            })
            .collect();
        Ok(Envelope::ok(results))
    }
}
