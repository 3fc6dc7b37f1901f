use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use serde::Serialize;

use crate::factory::Backend;
use crate::gateway::DEFAULT_CALL_TIMEOUT;
use crate::gateway::DEFAULT_PAGE_SIZE;
use crate::gateway::GatewayOptions;

pub const BACKEND_ENV: &str = "CRM_GATEWAY_BACKEND";
pub const SQLITE_PATH_ENV: &str = "CRM_SQLITE_PATH";
pub const API_URL_ENV: &str = "CRM_API_URL";
pub const PROJECT_ID_ENV: &str = "CRM_PROJECT_ID";
pub const PUBLIC_KEY_ENV: &str = "CRM_PUBLIC_KEY";

/// Gateway settings, read from an optional TOML file and then overridden by
/// `CRM_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub backend: Backend,
    pub sqlite_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub project_id: Option<String>,
    pub public_key: Option<String>,
    pub call_timeout_ms: u64,
    pub latency_ms: u64,
    pub page_size: usize,
    /// Serve static sample charts when analytics has no real data.
    pub degrade_to_sample_data: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            sqlite_path: None,
            api_url: None,
            project_id: None,
            public_key: None,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT.as_millis() as u64,
            latency_ms: 0,
            page_size: DEFAULT_PAGE_SIZE,
            degrade_to_sample_data: false,
        }
    }
}

impl GatewayConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Load `path` if given (it must exist), then apply the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::from_toml_str(&text).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `CRM_*` overrides looked up through `lookup`. Empty values are
    /// ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = get(BACKEND_ENV) {
            self.backend = v.parse()?;
        }
        if let Some(v) = get(SQLITE_PATH_ENV) {
            self.sqlite_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get(API_URL_ENV) {
            self.api_url = Some(v);
        }
        if let Some(v) = get(PROJECT_ID_ENV) {
            self.project_id = Some(v);
        }
        if let Some(v) = get(PUBLIC_KEY_ENV) {
            self.public_key = Some(v);
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn gateway_options(&self) -> GatewayOptions {
        GatewayOptions {
            call_timeout: self.call_timeout(),
            latency: Duration::from_millis(self.latency_ms),
            page_size: self.page_size.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn toml_fields_default_individually() {
        let config = GatewayConfig::from_toml_str(
            r#"
            backend = "http"
            api_url = "https://records.example"
            latency_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, Backend::Http);
        assert_eq!(config.api_url.as_deref(), Some("https://records.example"));
        assert_eq!(config.gateway_options().latency, Duration::from_millis(250));
        assert_eq!(config.call_timeout(), DEFAULT_CALL_TIMEOUT);
        assert!(!config.degrade_to_sample_data);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = GatewayConfig::from_toml_str("backend = \"memory\"").unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (BACKEND_ENV, "sqlite"),
            (SQLITE_PATH_ENV, "/tmp/crm.db"),
            (PROJECT_ID_ENV, ""),
        ]);
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(config.sqlite_path, Some(PathBuf::from("/tmp/crm.db")));
        assert_eq!(config.project_id, None);
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn unconfigured_backend_is_the_sqlite_file() {
        let config = GatewayConfig::from_toml_str("").unwrap();
        assert_eq!(config.backend, Backend::Sqlite);
        assert_eq!(GatewayConfig::default().backend, Backend::Sqlite);
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let mut config = GatewayConfig::default();
        let err = config
            .apply_overrides(|k| (k == BACKEND_ENV).then(|| "postgres".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }
}
