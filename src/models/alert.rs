use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

/// Alert and incident severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Info,
    Warning,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Warning,
        Severity::Info,
        Severity::Low,
    ];
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::High => write!(f, "high"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
            Severity::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Firing,
    Resolved,
    Acknowledged,
    Suppressed,
    Pending,
}

/// A single alert as received from a monitoring source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct AlertDto {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[validate(length(min = 1, message = "Alert name cannot be empty"))]
    pub name: String,
    #[serde(default)]
    pub status: AlertStatus,
    #[serde(default)]
    pub severity: Severity,
    #[serde(rename = "lastReceived")]
    pub last_received: DateTime<Utc>,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub service: Option<String>,
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[validate(length(min = 1, message = "Alert fingerprint cannot be empty"))]
    pub fingerprint: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_environment() -> String {
    "undefined".to_string()
}

impl AlertDto {
    pub fn new(name: impl Into<String>, fingerprint: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            status: AlertStatus::Firing,
            severity,
            last_received: Utc::now(),
            environment: default_environment(),
            service: None,
            source: Vec::new(),
            message: None,
            description: None,
            fingerprint: fingerprint.into(),
            url: None,
            labels: BTreeMap::new(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source.push(source.into());
        self
    }

    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.last_received = at;
        self
    }
}
