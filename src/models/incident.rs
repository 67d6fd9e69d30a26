use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    #[default]
    Firing,
    Resolved,
    Acknowledged,
}

impl IncidentStatus {
    pub const ALL: [IncidentStatus; 3] = [
        IncidentStatus::Firing,
        IncidentStatus::Resolved,
        IncidentStatus::Acknowledged,
    ];
}

impl std::fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentStatus::Firing => write!(f, "firing"),
            IncidentStatus::Resolved => write!(f, "resolved"),
            IncidentStatus::Acknowledged => write!(f, "acknowledged"),
        }
    }
}

/// An incident as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentDto {
    pub id: Uuid,
    pub user_generated_name: Option<String>,
    pub ai_generated_name: Option<String>,
    pub user_summary: Option<String>,
    pub generated_summary: Option<String>,
    pub assignee: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub status: IncidentStatus,
    pub alerts_count: u64,
    pub alert_sources: Vec<String>,
    pub services: Vec<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub last_seen_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub creation_time: DateTime<Utc>,
    pub is_confirmed: bool,
    pub is_predicted: bool,
    #[serde(default)]
    pub rule_fingerprint: String,
    pub same_incident_in_the_past_id: Option<Uuid>,
    #[serde(default)]
    pub fingerprint: Option<String>,
}

impl IncidentDto {
    /// Empty incident created now, with no alerts linked yet
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            user_generated_name: None,
            ai_generated_name: None,
            user_summary: None,
            generated_summary: None,
            assignee: None,
            severity: Severity::default(),
            status: IncidentStatus::Firing,
            alerts_count: 0,
            alert_sources: Vec::new(),
            services: Vec::new(),
            start_time: None,
            last_seen_time: None,
            end_time: None,
            creation_time: Utc::now(),
            is_confirmed: false,
            is_predicted: false,
            rule_fingerprint: String::new(),
            same_incident_in_the_past_id: None,
            fingerprint: None,
        }
    }

    /// Display name: the user's name wins over the generated one
    pub fn name(&self) -> &str {
        self.user_generated_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .or(self.ai_generated_name.as_deref())
            .unwrap_or("")
    }

    pub fn has_user_summary(&self) -> bool {
        self.user_summary.as_deref().map_or(false, |s| !s.trim().is_empty())
    }
}

impl Default for IncidentDto {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IncidentDto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {} ({} alerts)", self.severity, self.name(), self.alerts_count)
    }
}

/// Create/update payload for an incident
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct IncidentDtoIn {
    #[serde(default)]
    #[validate(length(max = 255, message = "Incident name must be at most 255 characters"))]
    pub user_generated_name: Option<String>,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub user_summary: Option<String>,
    #[serde(default)]
    pub same_incident_in_the_past_id: Option<Uuid>,
}

impl IncidentDtoIn {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            user_generated_name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.user_summary = Some(summary.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assignee = Some(assignee.into());
        self
    }

    pub fn has_name(&self) -> bool {
        self.user_generated_name
            .as_deref()
            .map_or(false, |n| !n.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_prefers_user_generated() {
        let mut incident = IncidentDto::new();
        incident.ai_generated_name = Some("Database saturation".to_string());
        assert_eq!(incident.name(), "Database saturation");

        incident.user_generated_name = Some("DB outage".to_string());
        assert_eq!(incident.name(), "DB outage");

        incident.user_generated_name = Some(String::new());
        assert_eq!(incident.name(), "Database saturation");
    }

    #[test]
    fn test_wire_field_names() {
        let incident = IncidentDto::new();
        let value = serde_json::to_value(&incident).unwrap();
        let object = value.as_object().unwrap();

        for field in [
            "id",
            "user_generated_name",
            "ai_generated_name",
            "user_summary",
            "generated_summary",
            "assignee",
            "severity",
            "status",
            "alerts_count",
            "alert_sources",
            "services",
            "start_time",
            "last_seen_time",
            "end_time",
            "creation_time",
            "is_confirmed",
            "is_predicted",
            "rule_fingerprint",
            "same_incident_in_the_past_id",
            "fingerprint",
        ] {
            assert!(object.contains_key(field), "missing field {}", field);
        }
        assert!(object["start_time"].is_null());
    }

    #[test]
    fn test_dto_in_name_length() {
        let dto = IncidentDtoIn::named("x".repeat(256));
        assert!(dto.validate().is_err());
        assert!(IncidentDtoIn::named("ok").validate().is_ok());
    }

    #[test]
    fn test_incident_display() {
        let mut incident = IncidentDto::new();
        incident.user_generated_name = Some("API latency".to_string());
        incident.severity = Severity::High;
        incident.alerts_count = 3;
        assert_eq!(incident.to_string(), "[high] API latency (3 alerts)");
    }
}
