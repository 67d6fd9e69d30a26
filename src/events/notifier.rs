use tracing::debug;
use uuid::Uuid;

use super::ChangeNotifier;
use crate::jsonrpc::{methods::INCIDENT_CHANGE_NOTIFICATION, JsonRpcNotification, NotificationSender};
use crate::IncidentResult;

pub const INCIDENT_CHANGE_EVENT: &str = "incident-change";

/// Publishes incident changes to connections subscribed to the tenant
pub struct BroadcastNotifier {
    sender: NotificationSender,
}

impl BroadcastNotifier {
    pub fn new(sender: NotificationSender) -> Self {
        Self { sender }
    }

    /// Per-tenant channel clients filter on
    pub fn channel_for(tenant_id: &str) -> String {
        format!("private-{}", tenant_id)
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn incident_changed(&self, tenant_id: &str, incident_id: Option<Uuid>) -> IncidentResult<()> {
        let notification = JsonRpcNotification::new(
            INCIDENT_CHANGE_NOTIFICATION,
            Some(serde_json::json!({
                "channel": Self::channel_for(tenant_id),
                "event": INCIDENT_CHANGE_EVENT,
                "incident_id": incident_id,
            })),
        );

        let delivered = self.sender.send(tenant_id, notification);
        debug!(tenant_id, ?incident_id, delivered, "Incident change published");
        Ok(())
    }
}
