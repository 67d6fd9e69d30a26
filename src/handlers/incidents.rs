use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

use crate::events::BroadcastNotifier;
use crate::models::{
    IncidentCandidateDto, IncidentDto, IncidentDtoIn, IncidentQuery, IncidentStatus,
    IncidentsMetaDto, PageParams, PaginatedIncidentAlertsDto, PaginatedIncidentsDto,
};
use crate::service::{AppContext, IncidentService};
use crate::IncidentResult;

/// Request type for incidents/create
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateIncidentRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[validate(nested)]
    pub incident: IncidentDtoIn,
    #[serde(default)]
    pub generated_from_ai: bool,
}

/// Request type for incidents/get, incidents/delete and incidents/confirm
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentIdRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub incident_id: Uuid,
}

/// Request type for incidents/list
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ListIncidentsRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(flatten)]
    #[validate(nested)]
    pub query: IncidentQuery,
}

/// Request type for incidents/update
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateIncidentRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub incident_id: Uuid,
    #[validate(nested)]
    pub incident: IncidentDtoIn,
    #[serde(default)]
    pub generated_by_ai: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteIncidentResponse {
    pub incident_id: Uuid,
    pub deleted: bool,
}

/// Request type for incidents/change_status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeStatusRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub incident_id: Uuid,
    pub status: IncidentStatus,
}

/// Request type for incidents/alerts
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IncidentAlertsRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub incident_id: Uuid,
    #[serde(flatten)]
    #[validate(nested)]
    pub page: PageParams,
}

/// Request type for incidents/add_alerts and incidents/remove_alerts
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct IncidentAlertsChangeRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub incident_id: Uuid,
    #[validate(length(min = 1, message = "At least one alert id is required"))]
    pub alert_ids: Vec<Uuid>,
    #[serde(default)]
    pub is_created_by_ai: bool,
}

/// Request type for incidents/meta
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
}

/// Request type for incidents/commit_candidates
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CommitCandidatesRequest {
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[validate(length(min = 1, message = "At least one candidate is required"), nested)]
    pub candidates: Vec<IncidentCandidateDto>,
}

/// Response for incidents/subscribe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeResponse {
    pub tenant_id: String,
    pub channel: String,
}

/// Handler for the incidents/* methods
pub struct IncidentHandler {
    ctx: Arc<AppContext>,
}

impl IncidentHandler {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    fn service(&self, tenant_id: Option<&str>) -> IncidentResult<IncidentService> {
        let tenant_id = self.ctx.resolve_tenant(tenant_id)?;
        Ok(self.ctx.incidents(tenant_id))
    }

    pub async fn handle_create(&self, request: CreateIncidentRequest) -> IncidentResult<IncidentDto> {
        request.validate()?;
        self.service(request.tenant_id.as_deref())?
            .create_incident(request.incident, request.generated_from_ai)
            .await
    }

    pub async fn handle_get(&self, request: IncidentIdRequest) -> IncidentResult<IncidentDto> {
        self.service(request.tenant_id.as_deref())?
            .get_incident(request.incident_id)
            .await
    }

    pub async fn handle_list(&self, request: ListIncidentsRequest) -> IncidentResult<PaginatedIncidentsDto> {
        request.validate()?;
        debug!(sorting = ?request.query.sorting, "Listing incidents");
        self.service(request.tenant_id.as_deref())?
            .list_incidents(&request.query)
            .await
    }

    pub async fn handle_update(&self, request: UpdateIncidentRequest) -> IncidentResult<IncidentDto> {
        request.validate()?;
        self.service(request.tenant_id.as_deref())?
            .update_incident(request.incident_id, request.incident, request.generated_by_ai)
            .await
    }

    pub async fn handle_delete(&self, request: IncidentIdRequest) -> IncidentResult<DeleteIncidentResponse> {
        self.service(request.tenant_id.as_deref())?
            .delete_incident(request.incident_id)
            .await?;
        Ok(DeleteIncidentResponse {
            incident_id: request.incident_id,
            deleted: true,
        })
    }

    pub async fn handle_confirm(&self, request: IncidentIdRequest) -> IncidentResult<IncidentDto> {
        self.service(request.tenant_id.as_deref())?
            .confirm_incident(request.incident_id)
            .await
    }

    pub async fn handle_change_status(&self, request: ChangeStatusRequest) -> IncidentResult<IncidentDto> {
        self.service(request.tenant_id.as_deref())?
            .change_status(request.incident_id, request.status)
            .await
    }

    pub async fn handle_alerts(
        &self,
        request: IncidentAlertsRequest,
    ) -> IncidentResult<PaginatedIncidentAlertsDto> {
        request.validate()?;
        self.service(request.tenant_id.as_deref())?
            .incident_alerts(request.incident_id, &request.page)
            .await
    }

    pub async fn handle_add_alerts(&self, request: IncidentAlertsChangeRequest) -> IncidentResult<IncidentDto> {
        request.validate()?;
        self.service(request.tenant_id.as_deref())?
            .add_alerts_to_incident(request.incident_id, &request.alert_ids, request.is_created_by_ai)
            .await
    }

    pub async fn handle_remove_alerts(
        &self,
        request: IncidentAlertsChangeRequest,
    ) -> IncidentResult<IncidentDto> {
        request.validate()?;
        self.service(request.tenant_id.as_deref())?
            .delete_alerts_from_incident(request.incident_id, &request.alert_ids)
            .await
    }

    pub async fn handle_meta(&self, request: TenantRequest) -> IncidentResult<IncidentsMetaDto> {
        self.service(request.tenant_id.as_deref())?.meta().await
    }

    /// Subscribing happens at the connection once the call succeeds; this only confirms the tenant
    pub async fn handle_subscribe(&self, request: TenantRequest) -> IncidentResult<SubscribeResponse> {
        let tenant_id = self.ctx.resolve_tenant(request.tenant_id.as_deref())?;
        debug!(%tenant_id, "Client subscribing to incident notifications");
        Ok(SubscribeResponse {
            channel: BroadcastNotifier::channel_for(&tenant_id),
            tenant_id,
        })
    }

    pub async fn handle_commit_candidates(
        &self,
        request: CommitCandidatesRequest,
    ) -> IncidentResult<Vec<IncidentDto>> {
        request.validate()?;
        self.service(request.tenant_id.as_deref())?
            .commit_candidates(request.candidates)
            .await
    }
}
