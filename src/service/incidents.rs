use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::events::{ChangeNotifier, IncidentAction, SummaryScheduler, WorkflowSink};
use crate::models::{
    AlertDto, IncidentCandidateDto, IncidentDto, IncidentDtoIn, IncidentQuery, IncidentStatus,
    IncidentsMetaDto, PageParams, Paginated, PaginatedIncidentAlertsDto, PaginatedIncidentsDto,
};
use crate::store::{IncidentChange, IncidentRepository, ModifiedIncident};
use crate::{IncidentError, IncidentResult};

/// Incident operations for a single tenant
pub struct IncidentService {
    tenant_id: String,
    store: Arc<dyn IncidentRepository>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
    workflows: Option<Arc<dyn WorkflowSink>>,
    summaries: Option<Arc<dyn SummaryScheduler>>,
    min_alerts_for_summary: u64,
}

impl IncidentService {
    pub fn new(
        tenant_id: String,
        store: Arc<dyn IncidentRepository>,
        notifier: Option<Arc<dyn ChangeNotifier>>,
        workflows: Option<Arc<dyn WorkflowSink>>,
        summaries: Option<Arc<dyn SummaryScheduler>>,
        min_alerts_for_summary: u64,
    ) -> Self {
        Self {
            tenant_id,
            store,
            notifier,
            workflows,
            summaries,
            min_alerts_for_summary,
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Create an incident. AI-generated incidents start as unconfirmed predictions.
    pub async fn create_incident(
        &self,
        incident_in: IncidentDtoIn,
        generated_from_ai: bool,
    ) -> IncidentResult<IncidentDto> {
        incident_in.validate()?;
        if !incident_in.has_name() {
            return Err(IncidentError::validation(
                "Incident name cannot be empty",
                Some("user_generated_name".to_string()),
            ));
        }

        info!(
            tenant_id = %self.tenant_id,
            generated_from_ai,
            "Creating incident"
        );

        let mut incident = IncidentDto::new();
        if generated_from_ai {
            incident.ai_generated_name = incident_in.user_generated_name;
            incident.generated_summary = incident_in.user_summary;
            incident.is_predicted = true;
            incident.is_confirmed = false;
        } else {
            incident.user_generated_name = incident_in.user_generated_name;
            incident.user_summary = incident_in.user_summary;
            incident.is_confirmed = true;
        }
        incident.assignee = incident_in.assignee;
        incident.same_incident_in_the_past_id = incident_in.same_incident_in_the_past_id;

        let incident = self.store.insert_incident(&self.tenant_id, incident).await?;
        info!(
            tenant_id = %self.tenant_id,
            incident_id = %incident.id,
            "Incident created"
        );

        self.notify_clients(None);
        self.run_workflows(&incident, IncidentAction::Created).await;
        Ok(incident)
    }

    pub async fn get_incident(&self, incident_id: Uuid) -> IncidentResult<IncidentDto> {
        self.store
            .get_incident(&self.tenant_id, incident_id)
            .await?
            .ok_or_else(|| IncidentError::not_found(incident_id))
    }

    pub async fn list_incidents(&self, query: &IncidentQuery) -> IncidentResult<PaginatedIncidentsDto> {
        query.validate()?;
        let (items, count) = self.store.list_incidents(&self.tenant_id, query).await?;
        Ok(Paginated::new(&query.page, count, items))
    }

    pub async fn incident_alerts(
        &self,
        incident_id: Uuid,
        page: &PageParams,
    ) -> IncidentResult<PaginatedIncidentAlertsDto> {
        page.validate()?;
        let (items, count) = self
            .store
            .incident_alerts(&self.tenant_id, incident_id, page)
            .await?
            .ok_or_else(|| IncidentError::not_found(incident_id))?;
        Ok(Paginated::new(page, count, items))
    }

    pub async fn meta(&self) -> IncidentResult<IncidentsMetaDto> {
        self.store.meta(&self.tenant_id).await
    }

    /// Store alerts so they can be linked to incidents
    pub async fn ingest_alerts(&self, alerts: Vec<AlertDto>) -> IncidentResult<Vec<Uuid>> {
        for alert in &alerts {
            alert.validate()?;
        }
        let ids = self.store.upsert_alerts(&self.tenant_id, alerts).await?;
        info!(tenant_id = %self.tenant_id, count = ids.len(), "Alerts ingested");

        if !ids.is_empty() {
            self.notify_clients(None);
        }
        Ok(ids)
    }

    pub async fn add_alerts_to_incident(
        &self,
        incident_id: Uuid,
        alert_ids: &[Uuid],
        is_created_by_ai: bool,
    ) -> IncidentResult<IncidentDto> {
        info!(
            tenant_id = %self.tenant_id,
            %incident_id,
            alerts = alert_ids.len(),
            "Adding alerts to incident"
        );

        let incident = self
            .store
            .link_alerts(&self.tenant_id, incident_id, alert_ids, is_created_by_ai)
            .await?
            .ok_or_else(|| IncidentError::not_found(incident_id))?;
        info!(%incident_id, alerts_count = incident.alerts_count, "Alerts added to incident");

        self.notify_clients(Some(incident_id));
        self.run_workflows(&incident, IncidentAction::Updated).await;
        self.maybe_schedule_summary(&incident).await;
        Ok(incident)
    }

    pub async fn delete_alerts_from_incident(
        &self,
        incident_id: Uuid,
        alert_ids: &[Uuid],
    ) -> IncidentResult<IncidentDto> {
        info!(
            tenant_id = %self.tenant_id,
            %incident_id,
            alerts = alert_ids.len(),
            "Removing alerts from incident"
        );

        self.store
            .unlink_alerts(&self.tenant_id, incident_id, alert_ids)
            .await?
            .ok_or_else(|| IncidentError::not_found(incident_id))
    }

    pub async fn delete_incident(&self, incident_id: Uuid) -> IncidentResult<()> {
        info!(tenant_id = %self.tenant_id, %incident_id, "Deleting incident");

        let incident = self.get_incident(incident_id).await?;
        if !self.store.delete_incident(&self.tenant_id, incident_id).await? {
            return Err(IncidentError::not_found(incident_id));
        }

        self.notify_clients(None);
        self.run_workflows(&incident, IncidentAction::Deleted).await;
        Ok(())
    }

    /// Overwrite the editable fields. The summary lands in `generated_summary` when AI wrote it.
    pub async fn update_incident(
        &self,
        incident_id: Uuid,
        incident_in: IncidentDtoIn,
        generated_by_ai: bool,
    ) -> IncidentResult<IncidentDto> {
        incident_in.validate()?;
        info!(tenant_id = %self.tenant_id, %incident_id, generated_by_ai, "Updating incident");

        let modified = self
            .modify(
                incident_id,
                Box::new(move |incident: &mut IncidentDto| {
                    if generated_by_ai {
                        incident.generated_summary = incident_in.user_summary;
                    } else {
                        incident.user_summary = incident_in.user_summary;
                    }
                    incident.user_generated_name = incident_in.user_generated_name;
                    incident.assignee = incident_in.assignee;
                    incident.same_incident_in_the_past_id = incident_in.same_incident_in_the_past_id;
                    true
                }),
            )
            .await?;

        self.run_workflows(&modified.incident, IncidentAction::Updated).await;
        Ok(modified.incident)
    }

    /// Accept a predicted incident
    pub async fn confirm_incident(&self, incident_id: Uuid) -> IncidentResult<IncidentDto> {
        let modified = self
            .modify(
                incident_id,
                Box::new(|incident: &mut IncidentDto| {
                    if incident.is_confirmed {
                        return false;
                    }
                    incident.is_confirmed = true;
                    true
                }),
            )
            .await?;
        if !modified.changed {
            return Ok(modified.incident);
        }

        info!(tenant_id = %self.tenant_id, %incident_id, "Incident confirmed");
        self.notify_clients(Some(incident_id));
        self.run_workflows(&modified.incident, IncidentAction::Updated).await;
        Ok(modified.incident)
    }

    pub async fn change_status(
        &self,
        incident_id: Uuid,
        status: IncidentStatus,
    ) -> IncidentResult<IncidentDto> {
        let modified = self
            .modify(
                incident_id,
                Box::new(move |incident: &mut IncidentDto| {
                    if incident.status == status {
                        return false;
                    }
                    incident.status = status;
                    incident.end_time = match status {
                        IncidentStatus::Resolved => Some(Utc::now()),
                        _ => None,
                    };
                    true
                }),
            )
            .await?;
        if !modified.changed {
            return Ok(modified.incident);
        }

        info!(tenant_id = %self.tenant_id, %incident_id, %status, "Incident status changed");
        self.notify_clients(Some(incident_id));
        self.run_workflows(&modified.incident, IncidentAction::Updated).await;
        Ok(modified.incident)
    }

    /// Turn correlation candidates into confirmed incidents with their alerts attached
    pub async fn commit_candidates(
        &self,
        candidates: Vec<IncidentCandidateDto>,
    ) -> IncidentResult<Vec<IncidentDto>> {
        for candidate in &candidates {
            candidate.validate()?;
        }

        let mut committed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            info!(
                tenant_id = %self.tenant_id,
                candidate_id = %candidate.id,
                confidence = candidate.confidence_score,
                "Committing incident candidate"
            );

            let alert_ids = self.store.upsert_alerts(&self.tenant_id, candidate.alerts).await?;

            let mut incident = IncidentDto::new();
            incident.ai_generated_name = Some(candidate.name);
            incident.generated_summary =
                Some(candidate.description).filter(|d| !d.trim().is_empty());
            incident.severity = candidate.severity;
            incident.is_predicted = true;
            incident.is_confirmed = true;
            let incident = self.store.insert_incident(&self.tenant_id, incident).await?;

            let incident = self
                .store
                .link_alerts(&self.tenant_id, incident.id, &alert_ids, true)
                .await?
                .ok_or_else(|| IncidentError::not_found(incident.id))?;

            self.run_workflows(&incident, IncidentAction::Created).await;
            committed.push(incident);
        }

        if !committed.is_empty() {
            self.notify_clients(None);
        }
        Ok(committed)
    }

    async fn modify(&self, incident_id: Uuid, change: IncidentChange<'_>) -> IncidentResult<ModifiedIncident> {
        self.store
            .modify_incident(&self.tenant_id, incident_id, change)
            .await?
            .ok_or_else(|| IncidentError::not_found(incident_id))
    }

    fn notify_clients(&self, incident_id: Option<Uuid>) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier.incident_changed(&self.tenant_id, incident_id) {
            warn!(
                tenant_id = %self.tenant_id,
                ?incident_id,
                "Failed to push incident change to clients: {}", e
            );
        }
    }

    async fn run_workflows(&self, incident: &IncidentDto, action: IncidentAction) {
        let Some(workflows) = &self.workflows else {
            return;
        };
        if let Err(e) = workflows.insert_incident(&self.tenant_id, incident, action).await {
            error!(
                tenant_id = %self.tenant_id,
                incident_id = %incident.id,
                %action,
                "Failed to run workflows based on incident: {}", e
            );
        }
    }

    async fn maybe_schedule_summary(&self, incident: &IncidentDto) {
        let Some(summaries) = &self.summaries else {
            return;
        };
        if incident.has_user_summary() {
            return;
        }

        let fingerprints = match self
            .store
            .unique_fingerprint_count(&self.tenant_id, incident.id)
            .await
        {
            Ok(count) => count,
            Err(e) => {
                error!(incident_id = %incident.id, "Failed to count incident fingerprints: {}", e);
                return;
            }
        };
        if fingerprints <= self.min_alerts_for_summary {
            return;
        }

        match summaries.schedule(&self.tenant_id, incident.id).await {
            Ok(job_id) => info!(
                tenant_id = %self.tenant_id,
                incident_id = %incident.id,
                %job_id,
                "Summary generation scheduled"
            ),
            Err(e) => error!(
                tenant_id = %self.tenant_id,
                incident_id = %incident.id,
                "Failed to schedule summary generation: {}", e
            ),
        }
    }
}
