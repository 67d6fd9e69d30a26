//! incidentd
//!
//! Incident management service: groups alerts into incidents, keeps their
//! aggregates current and serves them over LSP-style JSON-RPC.

use uuid::Uuid;

pub mod cli;
pub mod client;
pub mod config;
pub mod events;
pub mod handlers;
pub mod jsonrpc;
pub mod models;
pub mod server;
pub mod service;
pub mod store;

/// Application-wide error types with context preservation
#[derive(Debug, thiserror::Error)]
pub enum IncidentError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Incident not found: {incident_id}")]
    IncidentNotFound { incident_id: Uuid },

    #[error("Alerts not found: {alert_ids:?}")]
    AlertsNotFound { alert_ids: Vec<Uuid> },

    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Storage error: {message}")]
    Storage { message: String, path: Option<String> },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },
}

impl IncidentError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn not_found(incident_id: Uuid) -> Self {
        Self::IncidentNotFound { incident_id }
    }

    /// Create a validation error with optional field name
    pub fn validation(message: impl Into<String>, field: Option<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field,
        }
    }

    /// Create a storage error with optional snapshot path
    pub fn storage(message: impl Into<String>, path: Option<String>) -> Self {
        Self::Storage {
            message: message.into(),
            path,
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Get error code for JSON-RPC responses
    pub fn error_code(&self) -> i32 {
        match self {
            IncidentError::Configuration { .. } => -32014,
            IncidentError::IncidentNotFound { .. } => -32004,
            IncidentError::AlertsNotFound { .. } => -32005,
            IncidentError::Validation { .. } => -32602,
            IncidentError::Unauthorized(_) => -32007,
            IncidentError::Storage { .. } => -32010,
            IncidentError::Transport { .. } => -32001,
            IncidentError::ResourceExhausted(_) => -32015,
            IncidentError::Internal(_) => -32603,
            IncidentError::Io { .. } => -32603,
            IncidentError::Serialization { .. } => -32700,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            IncidentError::Configuration { message } => {
                format!("Configuration issue: {}", message)
            }
            IncidentError::IncidentNotFound { .. } => "Incident not found".to_string(),
            IncidentError::AlertsNotFound { alert_ids } => {
                format!("{} alert(s) not found", alert_ids.len())
            }
            IncidentError::Validation { message, field } => {
                if let Some(f) = field {
                    format!("Invalid field '{}': {}", f, message)
                } else {
                    format!("Invalid request: {}", message)
                }
            }
            IncidentError::Unauthorized(message) => {
                format!("Unauthorized: {}", message)
            }
            IncidentError::Storage { message, path } => {
                if let Some(p) = path {
                    format!("Storage error ({}): {}", p, message)
                } else {
                    format!("Storage error: {}", message)
                }
            }
            IncidentError::Transport { message } => {
                format!("Communication error: {}", message)
            }
            IncidentError::ResourceExhausted(message) => {
                format!("Resource limit exceeded: {}", message)
            }
            IncidentError::Internal(message) => {
                format!("Internal error: {}", message)
            }
            IncidentError::Io { source } => {
                format!("File system error: {}", source)
            }
            IncidentError::Serialization { source } => {
                format!("Data format error: {}", source)
            }
        }
    }

    /// Structured details attached to the JSON-RPC error object
    pub fn error_data(&self) -> serde_json::Value {
        match self {
            IncidentError::IncidentNotFound { incident_id } => serde_json::json!({
                "incident_id": incident_id,
            }),
            IncidentError::AlertsNotFound { alert_ids } => serde_json::json!({
                "alert_ids": alert_ids,
            }),
            IncidentError::Validation {
                field: Some(field), ..
            } => serde_json::json!({ "field": field }),
            _ => serde_json::Value::Null,
        }
    }
}

impl From<validator::ValidationErrors> for IncidentError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = Vec::new();
        let messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                fields.push(field.to_string());
                errs.iter().map(move |error| {
                    format!(
                        "Field '{}': {}",
                        field,
                        error
                            .message
                            .as_ref()
                            .map(|m| m.as_ref())
                            .unwrap_or("validation error")
                    )
                })
            })
            .collect();

        let field = if fields.len() == 1 { fields.pop() } else { None };
        let message = if messages.is_empty() {
            errors.to_string()
        } else {
            messages.join(", ")
        };
        IncidentError::Validation { message, field }
    }
}

/// Convenience type alias for Results
pub type IncidentResult<T> = Result<T, IncidentError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    fn with_storage_context(self, path: &str) -> IncidentResult<T>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn with_storage_context(self, path: &str) -> IncidentResult<T> {
        self.map_err(|e| {
            IncidentError::storage(
                format!("Operation failed: {}", e.into()),
                Some(path.to_string()),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = IncidentError::configuration("Invalid config");
        assert_eq!(err.error_code(), -32014);
        assert!(err.user_message().contains("Configuration issue"));
    }

    #[test]
    fn test_not_found_carries_incident_id() {
        let id = Uuid::new_v4();
        let err = IncidentError::not_found(id);
        assert_eq!(err.error_code(), -32004);
        assert_eq!(err.error_data()["incident_id"], id.to_string());
    }

    #[test]
    fn test_result_extension() {
        let result: Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));

        match result.with_storage_context("/tmp/snapshot.json") {
            Err(IncidentError::Storage { path, .. }) => {
                assert_eq!(path, Some("/tmp/snapshot.json".to_string()));
            }
            other => panic!("Expected Storage error, got {:?}", other),
        }
    }
}
