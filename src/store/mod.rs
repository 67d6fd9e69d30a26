//! Tenant-scoped incident and alert persistence.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{AlertDto, IncidentDto, IncidentQuery, IncidentsMetaDto, PageParams};
use crate::IncidentResult;

pub mod memory;

pub use memory::MemoryIncidentStore;

/// In-place edit of a stored incident. Returns false to leave the incident untouched.
pub type IncidentChange<'a> = Box<dyn FnOnce(&mut IncidentDto) -> bool + Send + 'a>;

/// Result of [`IncidentRepository::modify_incident`]
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedIncident {
    pub incident: IncidentDto,
    pub changed: bool,
}

/// Storage operations used by the incident service. Every call is scoped to a tenant.
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    async fn insert_incident(&self, tenant_id: &str, incident: IncidentDto) -> IncidentResult<IncidentDto>;

    async fn get_incident(&self, tenant_id: &str, incident_id: Uuid) -> IncidentResult<Option<IncidentDto>>;

    /// Apply `change` to the current stored incident while holding the write lock,
    /// so concurrent edits of other fields are never lost. Aggregate fields are
    /// recomputed from links afterwards.
    async fn modify_incident(
        &self,
        tenant_id: &str,
        incident_id: Uuid,
        change: IncidentChange<'_>,
    ) -> IncidentResult<Option<ModifiedIncident>>;

    /// Returns false when the incident does not exist
    async fn delete_incident(&self, tenant_id: &str, incident_id: Uuid) -> IncidentResult<bool>;

    /// Matching incidents for one page, plus the total number of matches
    async fn list_incidents(
        &self,
        tenant_id: &str,
        query: &IncidentQuery,
    ) -> IncidentResult<(Vec<IncidentDto>, u64)>;

    async fn upsert_alerts(&self, tenant_id: &str, alerts: Vec<AlertDto>) -> IncidentResult<Vec<Uuid>>;

    /// Link alerts to an incident. Unknown alert ids fail the whole call.
    async fn link_alerts(
        &self,
        tenant_id: &str,
        incident_id: Uuid,
        alert_ids: &[Uuid],
        created_by_ai: bool,
    ) -> IncidentResult<Option<IncidentDto>>;

    async fn unlink_alerts(
        &self,
        tenant_id: &str,
        incident_id: Uuid,
        alert_ids: &[Uuid],
    ) -> IncidentResult<Option<IncidentDto>>;

    /// Linked alerts, most recently received first
    async fn incident_alerts(
        &self,
        tenant_id: &str,
        incident_id: Uuid,
        page: &PageParams,
    ) -> IncidentResult<Option<(Vec<AlertDto>, u64)>>;

    async fn unique_fingerprint_count(&self, tenant_id: &str, incident_id: Uuid) -> IncidentResult<u64>;

    async fn meta(&self, tenant_id: &str) -> IncidentResult<IncidentsMetaDto>;
}
