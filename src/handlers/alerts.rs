use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::models::AlertDto;
use crate::service::AppContext;
use crate::IncidentResult;

/// Request type for alerts/ingest
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IngestAlertsRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[validate(length(min = 1, message = "At least one alert is required"), nested)]
    pub alerts: Vec<AlertDto>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestAlertsResponse {
    pub alert_ids: Vec<Uuid>,
}

/// Handler for alerts/ingest
pub struct AlertHandler {
    ctx: Arc<AppContext>,
}

impl AlertHandler {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub async fn handle_ingest(&self, request: IngestAlertsRequest) -> IncidentResult<IngestAlertsResponse> {
        request.validate()?;
        let tenant_id = self.ctx.resolve_tenant(request.tenant_id.as_deref())?;
        let alert_ids = self.ctx.incidents(tenant_id).ingest_alerts(request.alerts).await?;
        Ok(IngestAlertsResponse { alert_ids })
    }
}
