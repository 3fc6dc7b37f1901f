use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

use crate::analytics::Analytics;
use crate::config::GatewayConfig;
use crate::entity::Category;
use crate::entity::Contact;
use crate::entity::Deal;
use crate::entity::Lead;
use crate::entity::SalesRep;
use crate::entity::Task;
use crate::entity::TeamMember;
use crate::gateway::EntityGateway;
use crate::gateway::GatewayOptions;
use crate::store::RecordStore;
use crate::store::http::HttpRecordStore;
use crate::store::memory::MemoryRecordStore;

/// Record store selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Process-local; nothing survives a restart.
    Memory,
    Sqlite,
    Http,
}

impl Default for Backend {
    /// The persistent file store when it is compiled in.
    fn default() -> Self {
        if cfg!(feature = "sqlite") {
            Backend::Sqlite
        } else {
            Backend::Memory
        }
    }
}

impl FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Backend::Memory),
            "sqlite" => Ok(Backend::Sqlite),
            "http" => Ok(Backend::Http),
            other => anyhow::bail!("unknown backend: {other} (expected memory, sqlite or http)"),
        }
    }
}

/// Default database file, relative to the working directory.
pub fn default_sqlite_path() -> PathBuf {
    PathBuf::from(".crm").join("crm.db")
}

/// Build the record store `config` asks for.
pub fn open_store(config: &GatewayConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    Ok(match config.backend {
        Backend::Memory => {
            warn!("memory backend selected; records are dropped when the process exits");
            Arc::new(MemoryRecordStore::new())
        }
        Backend::Sqlite => open_sqlite(config)?,
        Backend::Http => {
            let (Some(url), Some(project), Some(key)) = (
                config.api_url.as_deref(),
                config.project_id.as_deref(),
                config.public_key.as_deref(),
            ) else {
                anyhow::bail!("http backend needs api_url, project_id and public_key");
            };
            Arc::new(HttpRecordStore::new(url, project, key, config.call_timeout())?)
        }
    })
}

#[cfg(feature = "sqlite")]
fn open_sqlite(config: &GatewayConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    let path = config
        .sqlite_path
        .clone()
        .unwrap_or_else(default_sqlite_path);
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    Ok(Arc::new(crate::store::sqlite::SqliteRecordStore::new(path)))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(_config: &GatewayConfig) -> anyhow::Result<Arc<dyn RecordStore>> {
    anyhow::bail!("sqlite backend not compiled; enable with `--features crm-gateway/sqlite`");
}

/// Every entity gateway and the analytics over one shared store.
#[derive(Clone)]
pub struct Crm {
    pub tasks: EntityGateway<Task>,
    pub categories: EntityGateway<Category>,
    pub contacts: EntityGateway<Contact>,
    pub deals: EntityGateway<Deal>,
    pub leads: EntityGateway<Lead>,
    pub sales_reps: EntityGateway<SalesRep>,
    pub team: EntityGateway<TeamMember>,
    pub analytics: Analytics,
}

impl Crm {
    pub fn new(store: Arc<dyn RecordStore>, options: GatewayOptions) -> Self {
        let leads = EntityGateway::with_options(Arc::clone(&store), options.clone());
        let deals = EntityGateway::with_options(Arc::clone(&store), options.clone());
        let sales_reps = EntityGateway::with_options(Arc::clone(&store), options.clone());
        Self {
            tasks: EntityGateway::with_options(Arc::clone(&store), options.clone()),
            categories: EntityGateway::with_options(Arc::clone(&store), options.clone()),
            contacts: EntityGateway::with_options(Arc::clone(&store), options.clone()),
            team: EntityGateway::with_options(store, options),
            analytics: Analytics::new(leads.clone(), deals.clone(), sales_reps.clone()),
            deals,
            leads,
            sales_reps,
        }
    }

    /// Open the configured store and wire every gateway to it.
    pub fn open(config: &GatewayConfig) -> anyhow::Result<Self> {
        let store = open_store(config)?;
        let mut crm = Self::new(store, config.gateway_options());
        crm.analytics = crm
            .analytics
            .with_sample_fallback(config.degrade_to_sample_data);
        Ok(crm)
    }
}
