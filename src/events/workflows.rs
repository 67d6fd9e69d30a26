use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{IncidentAction, WorkflowSink};
use crate::jsonrpc::{methods::INCIDENT_WORKFLOW_NOTIFICATION, JsonRpcNotification, NotificationSender};
use crate::models::IncidentDto;
use crate::{IncidentError, IncidentResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub tenant_id: String,
    pub action: IncidentAction,
    pub incident: IncidentDto,
    pub queued_at: DateTime<Utc>,
}

/// Bounded hand-off of incident events to the workflow dispatcher
pub struct WorkflowQueue {
    sender: mpsc::Sender<WorkflowEvent>,
}

impl WorkflowQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WorkflowEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl WorkflowSink for WorkflowQueue {
    async fn insert_incident(
        &self,
        tenant_id: &str,
        incident: &IncidentDto,
        action: IncidentAction,
    ) -> IncidentResult<()> {
        let event = WorkflowEvent {
            tenant_id: tenant_id.to_string(),
            action,
            incident: incident.clone(),
            queued_at: Utc::now(),
        };

        self.sender.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                IncidentError::ResourceExhausted("workflow queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                IncidentError::Internal("workflow dispatcher is not running".to_string())
            }
        })
    }
}

/// Drains the workflow queue and publishes each event to the tenant's subscribed clients
pub struct WorkflowDispatcher {
    receiver: mpsc::Receiver<WorkflowEvent>,
    notifications: NotificationSender,
}

impl WorkflowDispatcher {
    pub fn new(receiver: mpsc::Receiver<WorkflowEvent>, notifications: NotificationSender) -> Self {
        Self {
            receiver,
            notifications,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        while let Some(event) = self.receiver.recv().await {
            info!(
                tenant_id = %event.tenant_id,
                incident_id = %event.incident.id,
                action = %event.action,
                "Dispatching incident to workflows"
            );

            let params = match serde_json::to_value(&event) {
                Ok(params) => params,
                Err(e) => {
                    tracing::error!("Failed to serialize workflow event: {}", e);
                    continue;
                }
            };
            let delivered = self.notifications.send(
                &event.tenant_id,
                JsonRpcNotification::new(INCIDENT_WORKFLOW_NOTIFICATION, Some(params)),
            );
            debug!(delivered, "Workflow event published");
        }
        debug!("Workflow queue closed, dispatcher stopping");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_full_is_resource_exhausted() {
        let (queue, _receiver) = WorkflowQueue::new(1);
        let incident = IncidentDto::new();

        queue
            .insert_incident("t", &incident, IncidentAction::Created)
            .await
            .unwrap();
        let err = queue
            .insert_incident("t", &incident, IncidentAction::Updated)
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::ResourceExhausted(_)));
    }

    #[tokio::test]
    async fn test_closed_queue_is_internal_error() {
        let (queue, receiver) = WorkflowQueue::new(4);
        drop(receiver);
        let err = queue
            .insert_incident("t", &IncidentDto::new(), IncidentAction::Deleted)
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::Internal(_)));
    }

    #[tokio::test]
    async fn test_dispatcher_publishes_events() {
        let notifications = NotificationSender::new();
        let mut subscriber = notifications.subscribe();
        let (queue, receiver) = WorkflowQueue::new(4);
        let handle = WorkflowDispatcher::new(receiver, notifications).spawn();

        let incident = IncidentDto::new();
        queue
            .insert_incident("acme", &incident, IncidentAction::Created)
            .await
            .unwrap();

        let scoped = subscriber.recv().await.unwrap();
        assert_eq!(scoped.tenant_id, "acme");
        let notification = scoped.notification;
        assert_eq!(notification.method, INCIDENT_WORKFLOW_NOTIFICATION);
        let params = notification.params.unwrap();
        assert_eq!(params["action"], "created");
        assert_eq!(params["tenant_id"], "acme");
        assert_eq!(params["incident"]["id"], incident.id.to_string());

        drop(queue);
        handle.await.unwrap();
    }
}
