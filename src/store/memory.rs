//! In-memory incident store with an optional JSON snapshot file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{IncidentChange, IncidentRepository, ModifiedIncident};
use crate::models::{AlertDto, IncidentDto, IncidentQuery, IncidentsMetaDto, PageParams};
use crate::{IncidentError, IncidentResult, ResultExt};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AlertLink {
    alert_id: Uuid,
    created_by_ai: bool,
    linked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IncidentRow {
    incident: IncidentDto,
    links: Vec<AlertLink>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TenantData {
    incidents: HashMap<Uuid, IncidentRow>,
    alerts: HashMap<Uuid, AlertDto>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    tenants: HashMap<String, TenantData>,
}

/// Incident repository backed by process memory
pub struct MemoryIncidentStore {
    tenants: RwLock<HashMap<String, TenantData>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryIncidentStore {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            snapshot_path: None,
        }
    }

    /// Open a store persisted to `path`, loading the existing snapshot if there is one
    pub async fn with_snapshot(path: impl AsRef<Path>) -> IncidentResult<Self> {
        let path = path.as_ref().to_path_buf();
        let path_str = path.display().to_string();

        let tenants = if tokio::fs::try_exists(&path).await.with_storage_context(&path_str)? {
            let content = tokio::fs::read(&path).await.with_storage_context(&path_str)?;
            let snapshot: Snapshot = serde_json::from_slice(&content).with_storage_context(&path_str)?;
            if snapshot.version != SNAPSHOT_VERSION {
                return Err(IncidentError::storage(
                    format!("Unsupported snapshot version {}", snapshot.version),
                    Some(path_str),
                ));
            }
            info!(
                path = %path_str,
                tenants = snapshot.tenants.len(),
                "Loaded incident snapshot"
            );
            snapshot.tenants
        } else {
            debug!(path = %path_str, "No snapshot found, starting empty");
            HashMap::new()
        };

        Ok(Self {
            tenants: RwLock::new(tenants),
            snapshot_path: Some(path),
        })
    }

    async fn persist(&self, tenants: &HashMap<String, TenantData>) -> IncidentResult<()> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let path_str = path.display().to_string();

        #[derive(Serialize)]
        struct SnapshotRef<'a> {
            version: u32,
            tenants: &'a HashMap<String, TenantData>,
        }

        let content = serde_json::to_vec(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            tenants,
        })?;

        // readers only ever see a complete snapshot
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, content).await.with_storage_context(&path_str)?;
        tokio::fs::rename(&tmp_path, path).await.with_storage_context(&path_str)?;
        Ok(())
    }

    /// Run `change` against one tenant's data under the write lock.
    ///
    /// `change` returns its value and whether it modified anything. With a
    /// snapshot configured the change is applied to a copy, and the copy only
    /// replaces the live data once the snapshot holding it is on disk.
    async fn mutate<T, F>(&self, tenant_id: &str, change: F) -> IncidentResult<T>
    where
        F: FnOnce(&mut TenantData) -> IncidentResult<(T, bool)> + Send,
        T: Send,
    {
        let mut tenants = self.tenants.write().await;

        if self.snapshot_path.is_none() {
            let data = tenants.entry(tenant_id.to_string()).or_default();
            return change(data).map(|(value, _)| value);
        }

        let mut candidate = tenants.get(tenant_id).cloned().unwrap_or_default();
        let (value, dirty) = change(&mut candidate)?;
        if !dirty {
            return Ok(value);
        }

        let previous = tenants.insert(tenant_id.to_string(), candidate);
        if let Err(e) = self.persist(&tenants).await {
            match previous {
                Some(previous) => {
                    tenants.insert(tenant_id.to_string(), previous);
                }
                None => {
                    tenants.remove(tenant_id);
                }
            }
            warn!(tenant_id, "Snapshot write failed, change discarded: {}", e);
            return Err(e);
        }
        Ok(value)
    }
}

impl Default for MemoryIncidentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Recompute the alert-derived fields of an incident from its links
fn refresh_aggregates(row: &mut IncidentRow, alerts: &HashMap<Uuid, AlertDto>) {
    let linked: Vec<&AlertDto> = row
        .links
        .iter()
        .filter_map(|link| alerts.get(&link.alert_id))
        .collect();

    let incident = &mut row.incident;
    incident.alerts_count = linked.len() as u64;
    incident.alert_sources = linked
        .iter()
        .flat_map(|a| a.source.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    incident.services = linked
        .iter()
        .filter_map(|a| a.service.clone())
        .filter(|s| !s.is_empty() && s != "null")
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    incident.start_time = linked.iter().map(|a| a.last_received).min();
    incident.last_seen_time = linked.iter().map(|a| a.last_received).max();
    if let Some(severity) = linked.iter().map(|a| a.severity).max() {
        incident.severity = severity;
    }
}

#[async_trait]
impl IncidentRepository for MemoryIncidentStore {
    async fn insert_incident(&self, tenant_id: &str, incident: IncidentDto) -> IncidentResult<IncidentDto> {
        self.mutate(tenant_id, move |data| {
            data.incidents.insert(
                incident.id,
                IncidentRow {
                    incident: incident.clone(),
                    links: Vec::new(),
                },
            );
            Ok((incident, true))
        })
        .await
    }

    async fn get_incident(&self, tenant_id: &str, incident_id: Uuid) -> IncidentResult<Option<IncidentDto>> {
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant_id)
            .and_then(|data| data.incidents.get(&incident_id))
            .map(|row| row.incident.clone()))
    }

    async fn modify_incident(
        &self,
        tenant_id: &str,
        incident_id: Uuid,
        change: IncidentChange<'_>,
    ) -> IncidentResult<Option<ModifiedIncident>> {
        self.mutate(tenant_id, move |data| {
            let TenantData { incidents, alerts } = data;
            let Some(row) = incidents.get_mut(&incident_id) else {
                return Ok((None, false));
            };

            let changed = change(&mut row.incident);
            if changed {
                row.incident.id = incident_id;
                refresh_aggregates(row, alerts);
            }
            let modified = ModifiedIncident {
                incident: row.incident.clone(),
                changed,
            };
            Ok((Some(modified), changed))
        })
        .await
    }

    async fn delete_incident(&self, tenant_id: &str, incident_id: Uuid) -> IncidentResult<bool> {
        self.mutate(tenant_id, move |data| {
            let removed = data.incidents.remove(&incident_id).is_some();
            Ok((removed, removed))
        })
        .await
    }

    async fn list_incidents(
        &self,
        tenant_id: &str,
        query: &IncidentQuery,
    ) -> IncidentResult<(Vec<IncidentDto>, u64)> {
        let tenants = self.tenants.read().await;
        let Some(data) = tenants.get(tenant_id) else {
            return Ok((Vec::new(), 0));
        };

        let mut matching: Vec<IncidentDto> = data
            .incidents
            .values()
            .map(|row| &row.incident)
            .filter(|incident| query.matches(incident))
            .cloned()
            .collect();
        matching.sort_by(|a, b| query.sorting.compare(a, b));

        let count = matching.len() as u64;
        Ok((query.page.apply(matching), count))
    }

    async fn upsert_alerts(&self, tenant_id: &str, alerts: Vec<AlertDto>) -> IncidentResult<Vec<Uuid>> {
        self.mutate(tenant_id, move |data| {
            let ids: Vec<Uuid> = alerts.iter().map(|a| a.id).collect();
            for alert in alerts {
                data.alerts.insert(alert.id, alert);
            }

            // an updated alert changes the aggregates of every incident it belongs to
            let TenantData { incidents, alerts } = data;
            for row in incidents.values_mut() {
                if row.links.iter().any(|link| ids.contains(&link.alert_id)) {
                    refresh_aggregates(row, alerts);
                }
            }

            let dirty = !ids.is_empty();
            Ok((ids, dirty))
        })
        .await
    }

    async fn link_alerts(
        &self,
        tenant_id: &str,
        incident_id: Uuid,
        alert_ids: &[Uuid],
        created_by_ai: bool,
    ) -> IncidentResult<Option<IncidentDto>> {
        self.mutate(tenant_id, move |data| {
            let TenantData { incidents, alerts } = data;
            let Some(row) = incidents.get_mut(&incident_id) else {
                return Ok((None, false));
            };

            let missing: Vec<Uuid> = alert_ids
                .iter()
                .filter(|id| !alerts.contains_key(*id))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(IncidentError::AlertsNotFound { alert_ids: missing });
            }

            let now = Utc::now();
            for alert_id in alert_ids {
                if row.links.iter().any(|link| link.alert_id == *alert_id) {
                    continue;
                }
                row.links.push(AlertLink {
                    alert_id: *alert_id,
                    created_by_ai,
                    linked_at: now,
                });
            }
            refresh_aggregates(row, alerts);
            Ok((Some(row.incident.clone()), true))
        })
        .await
    }

    async fn unlink_alerts(
        &self,
        tenant_id: &str,
        incident_id: Uuid,
        alert_ids: &[Uuid],
    ) -> IncidentResult<Option<IncidentDto>> {
        self.mutate(tenant_id, move |data| {
            let TenantData { incidents, alerts } = data;
            let Some(row) = incidents.get_mut(&incident_id) else {
                return Ok((None, false));
            };

            row.links.retain(|link| !alert_ids.contains(&link.alert_id));
            refresh_aggregates(row, alerts);
            Ok((Some(row.incident.clone()), true))
        })
        .await
    }

    async fn incident_alerts(
        &self,
        tenant_id: &str,
        incident_id: Uuid,
        page: &PageParams,
    ) -> IncidentResult<Option<(Vec<AlertDto>, u64)>> {
        let tenants = self.tenants.read().await;
        let Some(data) = tenants.get(tenant_id) else {
            return Ok(None);
        };
        let Some(row) = data.incidents.get(&incident_id) else {
            return Ok(None);
        };

        let mut linked: Vec<AlertDto> = row
            .links
            .iter()
            .filter_map(|link| data.alerts.get(&link.alert_id))
            .cloned()
            .collect();
        linked.sort_by(|a, b| {
            b.last_received
                .cmp(&a.last_received)
                .then_with(|| a.id.cmp(&b.id))
        });

        let count = linked.len() as u64;
        Ok(Some((page.apply(linked), count)))
    }

    async fn unique_fingerprint_count(&self, tenant_id: &str, incident_id: Uuid) -> IncidentResult<u64> {
        let tenants = self.tenants.read().await;
        let count = tenants
            .get(tenant_id)
            .and_then(|data| {
                data.incidents.get(&incident_id).map(|row| {
                    row.links
                        .iter()
                        .filter_map(|link| data.alerts.get(&link.alert_id))
                        .map(|a| a.fingerprint.as_str())
                        .collect::<BTreeSet<_>>()
                        .len()
                })
            })
            .unwrap_or(0);
        Ok(count as u64)
    }

    async fn meta(&self, tenant_id: &str) -> IncidentResult<IncidentsMetaDto> {
        let tenants = self.tenants.read().await;
        let mut meta = IncidentsMetaDto::default();
        let Some(data) = tenants.get(tenant_id) else {
            return Ok(meta);
        };

        let mut assignees = BTreeSet::new();
        let mut sources = BTreeSet::new();
        let mut services = BTreeSet::new();
        for row in data.incidents.values() {
            if let Some(assignee) = row.incident.assignee.as_ref().filter(|a| !a.is_empty()) {
                assignees.insert(assignee.clone());
            }
            sources.extend(row.incident.alert_sources.iter().cloned());
            services.extend(row.incident.services.iter().cloned());
        }

        meta.assignees = assignees.into_iter().collect();
        meta.sources = sources.into_iter().collect();
        meta.services = services.into_iter().collect();
        Ok(meta)
    }
}
