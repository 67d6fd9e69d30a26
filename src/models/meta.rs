use serde::{Deserialize, Serialize};

use super::{IncidentStatus, Severity};

/// Filter values available for a tenant's incidents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentsMetaDto {
    pub statuses: Vec<IncidentStatus>,
    pub severities: Vec<Severity>,
    pub assignees: Vec<String>,
    pub sources: Vec<String>,
    pub services: Vec<String>,
}

impl Default for IncidentsMetaDto {
    fn default() -> Self {
        Self {
            statuses: IncidentStatus::ALL.to_vec(),
            severities: Severity::ALL.to_vec(),
            assignees: Vec::new(),
            sources: Vec::new(),
            services: Vec::new(),
        }
    }
}
