use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Transaction;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde_json::Value;

use super::RecordStore;
use super::eval;
use crate::error::GatewayError;
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

fn init_db(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            tbl TEXT NOT NULL,
            data_json TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_records_tbl ON records(tbl);
        "#,
    )?;
    Ok(())
}

fn open_conn(path: &Path) -> anyhow::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    init_db(&conn)?;
    Ok(conn)
}

/// Stored JSON plus the row id as `Id`.
fn row_to_record(id: RecordId, data: &str) -> anyhow::Result<RemoteRecord> {
    let mut record: RemoteRecord = serde_json::from_str(data)?;
    record.insert(ID_COLUMN.to_string(), Value::from(id));
    Ok(record)
}

fn load_table(conn: &Connection, table: &str) -> anyhow::Result<Vec<RemoteRecord>> {
    let mut stmt = conn.prepare("SELECT id, data_json FROM records WHERE tbl=?1 ORDER BY id")?;
    let mut rows = stmt.query(params![table])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let data: String = row.get(1)?;
        out.push(row_to_record(id, &data)?);
    }
    Ok(out)
}

fn load_one(conn: &Connection, table: &str, id: RecordId) -> anyhow::Result<Option<RemoteRecord>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data_json FROM records WHERE tbl=?1 AND id=?2",
            params![table, id],
            |r| r.get(0),
        )
        .optional()?;
    data.map(|d| row_to_record(id, &d)).transpose()
}

fn without_id(record: &RemoteRecord) -> anyhow::Result<String> {
    let mut data = record.clone();
    data.remove(ID_COLUMN);
    Ok(serde_json::to_string(&data)?)
}

fn immediate(conn: &mut Connection) -> anyhow::Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Single-file store. Every table lives in one `records` table keyed by
/// table name; each write runs in an immediate transaction so the unique
/// check and the write see the same rows.
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    path: PathBuf,
}

impl SqliteRecordStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> anyhow::Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let mut conn = open_conn(&path)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| GatewayError::remote(format!("sqlite {op} task failed: {e}")))?;
        joined.map_err(|e| GatewayError::remote(format!("sqlite {op}: {e:#}")))
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn fetch_records(
        &self,
        table: &str,
        params: &FetchParams,
    ) -> Result<Envelope<Vec<RemoteRecord>>> {
        let table = table.to_string();
        let params = params.clone();
        self.blocking("fetch", move |conn| {
            let rows = load_table(conn, &table)?;
            Ok(Envelope::ok(eval::apply(
                rows,
                &params,
                Utc::now().date_naive(),
            )))
        })
        .await
    }

    async fn get_record_by_id(
        &self,
        table: &str,
        id: RecordId,
        fields: &[String],
    ) -> Result<Envelope<RemoteRecord>> {
        let table = table.to_string();
        let fields = fields.to_vec();
        self.blocking("get", move |conn| {
            Ok(match load_one(conn, &table, id)? {
                Some(r) => Envelope::ok(eval::project(r, &fields)),
                None => Envelope::failed(format!("record {id} not found in {table}")),
            })
        })
        .await
    }

    async fn create_records(
        &self,
        table: &str,
        records: Vec<RemoteRecord>,
        unique: &[&str],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        let table = table.to_string();
        let unique: Vec<String> = unique.iter().map(|c| c.to_string()).collect();
        self.blocking("create", move |conn| {
            let unique: Vec<&str> = unique.iter().map(String::as_str).collect();
            let tx = immediate(conn)?;
            let mut existing = load_table(&tx, &table)?;
            let mut results = Vec::with_capacity(records.len());
            for mut record in records {
                if let Some(column) = eval::conflict(&existing, &record, &unique, None) {
                    results.push(RecordResult::rejected(
                        None,
                        FailureKind::Conflict,
                        format!("duplicate value for {column}"),
                    ));
                    continue;
                }
                let now = Value::from(stamp(Utc::now()));
                record
                    .entry(CREATED_ON_COLUMN.to_string())
                    .or_insert_with(|| now.clone());
                record.insert(MODIFIED_ON_COLUMN.to_string(), now);
                tx.execute(
                    "INSERT INTO records (tbl, data_json) VALUES (?1, ?2)",
                    params![table, without_id(&record)?],
                )?;
                let id = tx.last_insert_rowid();
                record.insert(ID_COLUMN.to_string(), Value::from(id));
                existing.push(record.clone());
                results.push(RecordResult::written(id, record));
            }
            tx.commit()?;
            Ok(Envelope::ok(results))
        })
        .await
    }

    async fn update_records(
        &self,
        table: &str,
        records: Vec<RemoteRecord>,
        unique: &[&str],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        let table = table.to_string();
        let unique: Vec<String> = unique.iter().map(|c| c.to_string()).collect();
        self.blocking("update", move |conn| {
            let unique: Vec<&str> = unique.iter().map(String::as_str).collect();
            let tx = immediate(conn)?;
            let existing = if unique.is_empty() {
                Vec::new()
            } else {
                load_table(&tx, &table)?
            };
            let mut results = Vec::with_capacity(records.len());
            for patch in records {
                let id = record_id(&patch);
                let current = match id {
                    Some(id) => load_one(&tx, &table, id)?,
                    None => None,
                };
                let (Some(id), Some(mut merged)) = (id, current) else {
                    results.push(RecordResult::rejected(
                        id,
                        FailureKind::NotFound,
                        "record not found",
                    ));
                    continue;
                };
                merged.extend(patch);
                if let Some(column) = eval::conflict(&existing, &merged, &unique, Some(id)) {
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
                tx.execute(
                    "UPDATE records SET data_json=?3 WHERE tbl=?1 AND id=?2",
                    params![table, id, without_id(&merged)?],
                )?;
                results.push(RecordResult::written(id, merged));
            }
            tx.commit()?;
            Ok(Envelope::ok(results))
        })
        .await
    }

    async fn delete_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        let table = table.to_string();
        let ids = ids.to_vec();
        self.blocking("delete", move |conn| {
            let tx = immediate(conn)?;
            let mut results = Vec::with_capacity(ids.len());
            for id in ids {
                let n = tx.execute(
                    "DELETE FROM records WHERE tbl=?1 AND id=?2",
                    params![table, id],
                )?;
                results.push(if n == 0 {
                    RecordResult::rejected(Some(id), FailureKind::NotFound, "record not found")
                } else {
                    RecordResult::deleted(id)
                });
            }
            tx.commit()?;
            Ok(Envelope::ok(results))
        })
        .await
    }
}
