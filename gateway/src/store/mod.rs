use async_trait::async_trait;

use crate::error::Result;
use crate::record::Envelope;
use crate::record::FetchParams;
use crate::record::RecordId;
use crate::record::RecordResult;
use crate::record::RemoteRecord;

pub mod eval;
pub mod http;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

/// Generic remote record store, addressed by table name.
///
/// `Err` is reserved for transport failures (unreachable, timed out,
/// undecodable). A store that answers but refuses reports it in the envelope.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_records(
        &self,
        table: &str,
        params: &FetchParams,
    ) -> Result<Envelope<Vec<RemoteRecord>>>;

    async fn get_record_by_id(
        &self,
        table: &str,
        id: RecordId,
        fields: &[String],
    ) -> Result<Envelope<RemoteRecord>>;

    /// Insert records. Columns in `unique` must stay distinct across the
    /// table; stores that can check this atomically reject the record with
    /// `FailureKind::Conflict`.
    async fn create_records(
        &self,
        table: &str,
        records: Vec<RemoteRecord>,
        unique: &[&str],
    ) -> Result<Envelope<Vec<RecordResult>>>;

    /// Merge each record into the stored record with the same `Id`.
    async fn update_records(
        &self,
        table: &str,
        records: Vec<RemoteRecord>,
        unique: &[&str],
    ) -> Result<Envelope<Vec<RecordResult>>>;

    async fn delete_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> Result<Envelope<Vec<RecordResult>>>;
}
