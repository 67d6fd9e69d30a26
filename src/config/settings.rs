use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Server-wide configuration loaded from config.toml and environment variables
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub store: StoreConfig,
    pub features: FeatureConfig,
    pub summary: SummaryConfig,
    pub workflows: WorkflowConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// "stdio" or "socket"
    pub transport: String,
    pub socket_path: Option<String>,
    pub log_level: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Every request runs as the default tenant
    NoAuth,
    /// Requests must name their tenant
    Tenant,
}

impl FromStr for AuthMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "no_auth" | "noauth" => Ok(AuthMode::NoAuth),
            "tenant" => Ok(AuthMode::Tenant),
            other => anyhow::bail!("Unknown auth type: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,
    pub default_tenant: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON snapshot file; in-memory only when unset
    pub data_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub workflows_enabled: bool,
    pub summaries_enabled: bool,
    pub notifications_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Summaries are scheduled once an incident has more unique fingerprints than this
    pub min_alerts_for_summary: u64,
    pub queue_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub queue_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".to_string(),
            socket_path: Some("/tmp/incidentd.sock".to_string()),
            log_level: "info".to_string(),
            max_connections: 10,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::NoAuth,
            default_tenant: "keep".to_string(),
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            workflows_enabled: true,
            summaries_enabled: true,
            notifications_enabled: true,
        }
    }
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            min_alerts_for_summary: 5,
            queue_size: 100,
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self { queue_size: 1000 }
    }
}

impl Settings {
    /// Load settings: defaults, then the config file (if present), then environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path(),
        };

        let mut settings = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        settings.apply_env_overrides()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply `INCIDENTD_*` overrides from an arbitrary variable source
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("INCIDENTD_LOG_LEVEL") {
            self.server.log_level = val;
        }

        if let Some(val) = lookup("INCIDENTD_TRANSPORT") {
            self.server.transport = val;
        }

        if let Some(val) = lookup("INCIDENTD_SOCKET_PATH") {
            self.server.socket_path = Some(val);
        }

        if let Some(val) = lookup("INCIDENTD_MAX_CONNECTIONS") {
            self.server.max_connections = val
                .parse()
                .with_context(|| format!("Invalid INCIDENTD_MAX_CONNECTIONS: {}", val))?;
        }

        if let Some(val) = lookup("INCIDENTD_AUTH_TYPE") {
            self.auth.mode = val.parse()?;
        }

        if let Some(val) = lookup("INCIDENTD_DEFAULT_TENANT") {
            self.auth.default_tenant = val;
        }

        if let Some(val) = lookup("INCIDENTD_DATA_FILE") {
            self.store.data_file = Some(PathBuf::from(val));
        }

        if let Some(val) = lookup("INCIDENTD_MIN_ALERTS_FOR_SUMMARY") {
            self.summary.min_alerts_for_summary = val
                .parse()
                .with_context(|| format!("Invalid INCIDENTD_MIN_ALERTS_FOR_SUMMARY: {}", val))?;
        }

        if is_truthy(lookup("INCIDENTD_DISABLE_WORKFLOWS")) {
            self.features.workflows_enabled = false;
        }

        if is_truthy(lookup("INCIDENTD_DISABLE_SUMMARIES")) {
            self.features.summaries_enabled = false;
        }

        if is_truthy(lookup("INCIDENTD_DISABLE_NOTIFICATIONS")) {
            self.features.notifications_enabled = false;
        }

        Ok(())
    }

    pub fn config_path() -> PathBuf {
        if let Ok(custom_path) = std::env::var("INCIDENTD_CONFIG_PATH") {
            PathBuf::from(custom_path)
        } else {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("incidentd")
                .join("config.toml")
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self.server.transport.as_str() {
            "stdio" => {}
            "socket" => match &self.server.socket_path {
                Some(path) if !path.is_empty() => {}
                _ => anyhow::bail!("Socket path is required when using socket transport"),
            },
            other => anyhow::bail!("Unsupported transport type: {}", other),
        }

        if self.server.max_connections == 0 {
            anyhow::bail!("Max connections must be greater than 0");
        }

        if self.auth.mode == AuthMode::NoAuth && self.auth.default_tenant.trim().is_empty() {
            anyhow::bail!("A default tenant is required when auth mode is no_auth");
        }

        if self.summary.queue_size == 0 || self.workflows.queue_size == 0 {
            anyhow::bail!("Queue sizes must be greater than 0");
        }

        Ok(())
    }
}

fn is_truthy(value: Option<String>) -> bool {
    matches!(
        value.as_deref().map(str::to_ascii_lowercase).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}
