use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::{AlertDto, Severity};

/// An incident proposed by correlation, awaiting commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct IncidentCandidateDto {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    #[validate(length(min = 1, max = 255, message = "Candidate name must be 1-255 characters"))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[validate(range(min = 0.0, max = 1.0, message = "Confidence score must be between 0 and 1"))]
    pub confidence_score: f64,
    #[serde(default)]
    pub confidence_explanation: String,
    #[validate(length(min = 1, message = "Candidate must contain at least one alert"), nested)]
    pub alerts: Vec<AlertDto>,
    #[serde(default)]
    pub alert_sources: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(score: f64, alerts: Vec<AlertDto>) -> IncidentCandidateDto {
        IncidentCandidateDto {
            id: Uuid::new_v4(),
            name: "Checkout degradation".to_string(),
            description: "Payment and cart alerts fired together".to_string(),
            severity: Severity::High,
            confidence_score: score,
            confidence_explanation: "Shared service and time window".to_string(),
            alerts,
            alert_sources: vec!["datadog".to_string()],
            services: vec!["checkout".to_string()],
        }
    }

    #[test]
    fn test_candidate_validation() {
        let alert = AlertDto::new("Payment errors", "fp-pay", Severity::High);
        assert!(candidate(0.8, vec![alert.clone()]).validate().is_ok());
        assert!(candidate(1.2, vec![alert.clone()]).validate().is_err());
        assert!(candidate(0.5, vec![]).validate().is_err());
    }

    #[test]
    fn test_nested_alert_validation() {
        let bad_alert = AlertDto::new("", "fp", Severity::Low);
        assert!(candidate(0.5, vec![bad_alert]).validate().is_err());
    }
}
