//! Side effects of incident changes: client notifications, workflow hand-off
//! and summary generation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::IncidentDto;
use crate::IncidentResult;

pub mod notifier;
pub mod summary;
pub mod workflows;

pub use notifier::BroadcastNotifier;
pub use summary::{SummaryJob, SummaryQueue, SummaryWorker};
pub use workflows::{WorkflowDispatcher, WorkflowEvent, WorkflowQueue};

/// What happened to an incident, as seen by workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentAction {
    Created,
    Updated,
    Deleted,
}

impl std::fmt::Display for IncidentAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncidentAction::Created => write!(f, "created"),
            IncidentAction::Updated => write!(f, "updated"),
            IncidentAction::Deleted => write!(f, "deleted"),
        }
    }
}

/// Tells connected clients that a tenant's incidents changed
#[cfg_attr(test, mockall::automock)]
pub trait ChangeNotifier: Send + Sync {
    fn incident_changed(&self, tenant_id: &str, incident_id: Option<Uuid>) -> IncidentResult<()>;
}

/// Receives incidents for workflow execution
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WorkflowSink: Send + Sync {
    async fn insert_incident(
        &self,
        tenant_id: &str,
        incident: &IncidentDto,
        action: IncidentAction,
    ) -> IncidentResult<()>;
}

/// Queues summary generation; returns the job id
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SummaryScheduler: Send + Sync {
    async fn schedule(&self, tenant_id: &str, incident_id: Uuid) -> IncidentResult<String>;
}
