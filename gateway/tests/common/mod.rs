#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use crm_gateway::GatewayError;
use crm_gateway::GatewayOptions;
use crm_gateway::Result;
use crm_gateway::record::Envelope;
use crm_gateway::record::FetchParams;
use crm_gateway::record::RecordId;
use crm_gateway::record::RecordResult;
use crm_gateway::record::RemoteRecord;
use crm_gateway::store::RecordStore;
use crm_gateway::store::memory::MemoryRecordStore;

/// What a faulty store does with a matching fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Answer with `success: false`.
    Refuse,
    /// Answer successfully with no rows.
    Hide,
    /// Never answer.
    Hang,
}

type FetchRule = Box<dyn Fn(&str, &FetchParams) -> Option<Fault> + Send + Sync>;

/// Memory store with injectable faults.
pub struct FlakyStore {
    pub inner: Arc<MemoryRecordStore>,
    fetch_rule: FetchRule,
    down: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryRecordStore>) -> Self {
        Self {
            inner,
            fetch_rule: Box::new(|_, _| None),
            down: AtomicBool::new(false),
        }
    }

    pub fn on_fetch(
        mut self,
        rule: impl Fn(&str, &FetchParams) -> Option<Fault> + Send + Sync + 'static,
    ) -> Self {
        self.fetch_rule = Box::new(rule);
        self
    }

    /// Fail every call with a transport error.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(GatewayError::remote("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn fetch_records(
        &self,
        table: &str,
        params: &FetchParams,
    ) -> Result<Envelope<Vec<RemoteRecord>>> {
        self.check()?;
        match (self.fetch_rule)(table, params) {
            Some(Fault::Refuse) => Ok(Envelope::failed("query refused")),
            Some(Fault::Hide) => Ok(Envelope::ok(Vec::new())),
            Some(Fault::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Envelope::ok(Vec::new()))
            }
            None => self.inner.fetch_records(table, params).await,
        }
    }

    async fn get_record_by_id(
        &self,
        table: &str,
        id: RecordId,
        fields: &[String],
    ) -> Result<Envelope<RemoteRecord>> {
        self.check()?;
        self.inner.get_record_by_id(table, id, fields).await
    }

    async fn create_records(
        &self,
        table: &str,
        records: Vec<RemoteRecord>,
        unique: &[&str],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        self.check()?;
        self.inner.create_records(table, records, unique).await
    }

    async fn update_records(
        &self,
        table: &str,
        records: Vec<RemoteRecord>,
        unique: &[&str],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        self.check()?;
        self.inner.update_records(table, records, unique).await
    }

    async fn delete_records(
        &self,
        table: &str,
        ids: &[RecordId],
    ) -> Result<Envelope<Vec<RecordResult>>> {
        self.check()?;
        self.inner.delete_records(table, ids).await
    }
}

/// Whether a fetch filters `column` by equality with `value`.
pub fn filters_on(params: &FetchParams, column: &str, value: i64) -> bool {
    params
        .conditions
        .iter()
        .any(|c| c.field_name == column && c.values.iter().any(|v| v.as_i64() == Some(value)))
}

pub fn small_pages(page_size: usize) -> GatewayOptions {
    GatewayOptions {
        page_size,
        ..GatewayOptions::default()
    }
}

/// Every backend compiled into this build, each freshly empty.
pub fn stores() -> Vec<(&'static str, Arc<dyn RecordStore>, Option<tempfile::TempDir>)> {
    #[allow(unused_mut)]
    let mut out: Vec<(&'static str, Arc<dyn RecordStore>, Option<tempfile::TempDir>)> =
        vec![("memory", Arc::new(MemoryRecordStore::new()), None)];
    #[cfg(feature = "sqlite")]
    {
        if let Ok(dir) = tempfile::tempdir() {
            let store = crm_gateway::store::sqlite::SqliteRecordStore::new(dir.path().join("crm.db"));
            out.push(("sqlite", Arc::new(store), Some(dir)));
        }
    }
    out
}
