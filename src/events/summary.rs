use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{ChangeNotifier, SummaryScheduler};
use crate::models::pagination::MAX_PAGE_LIMIT;
use crate::models::{AlertDto, IncidentDto, PageParams};
use crate::store::IncidentRepository;
use crate::{IncidentError, IncidentResult};

/// Most recent alert names quoted in a generated summary
const SUMMARY_ALERT_NAMES: usize = 3;

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryJob {
    pub job_id: String,
    pub tenant_id: String,
    pub incident_id: Uuid,
}

pub struct SummaryQueue {
    sender: mpsc::Sender<SummaryJob>,
}

impl SummaryQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SummaryJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl SummaryScheduler for SummaryQueue {
    async fn schedule(&self, tenant_id: &str, incident_id: Uuid) -> IncidentResult<String> {
        let job = SummaryJob {
            job_id: format!("summary-{}", Uuid::new_v4()),
            tenant_id: tenant_id.to_string(),
            incident_id,
        };
        let job_id = job.job_id.clone();

        self.sender.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                IncidentError::ResourceExhausted("summary queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                IncidentError::Internal("summary worker is not running".to_string())
            }
        })?;
        Ok(job_id)
    }
}

/// Builds summaries for queued incidents and stores them as `generated_summary`
pub struct SummaryWorker {
    receiver: mpsc::Receiver<SummaryJob>,
    store: Arc<dyn IncidentRepository>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
}

impl SummaryWorker {
    pub fn new(
        receiver: mpsc::Receiver<SummaryJob>,
        store: Arc<dyn IncidentRepository>,
        notifier: Option<Arc<dyn ChangeNotifier>>,
    ) -> Self {
        Self {
            receiver,
            store,
            notifier,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        while let Some(job) = self.receiver.recv().await {
            match self.process(&job).await {
                Ok(true) => info!(
                    job_id = %job.job_id,
                    tenant_id = %job.tenant_id,
                    incident_id = %job.incident_id,
                    "Summary generated"
                ),
                Ok(false) => debug!(job_id = %job.job_id, "Summary job skipped"),
                Err(e) => error!(
                    job_id = %job.job_id,
                    incident_id = %job.incident_id,
                    "Summary generation failed: {}", e
                ),
            }
        }
        debug!("Summary queue closed, worker stopping");
    }

    /// Returns false when there was nothing to do
    pub async fn process(&self, job: &SummaryJob) -> IncidentResult<bool> {
        let Some(incident) = self.store.get_incident(&job.tenant_id, job.incident_id).await? else {
            warn!(incident_id = %job.incident_id, "Incident disappeared before summary generation");
            return Ok(false);
        };

        // a user-written summary always wins
        if incident.has_user_summary() {
            return Ok(false);
        }

        let page = PageParams::new(MAX_PAGE_LIMIT, 0);
        let Some((alerts, _)) = self
            .store
            .incident_alerts(&job.tenant_id, job.incident_id, &page)
            .await?
        else {
            return Ok(false);
        };
        if alerts.is_empty() {
            return Ok(false);
        }

        let modified = self
            .store
            .modify_incident(
                &job.tenant_id,
                job.incident_id,
                Box::new(|current: &mut IncidentDto| {
                    if current.has_user_summary() {
                        return false;
                    }
                    current.generated_summary = Some(build_summary(current, &alerts));
                    true
                }),
            )
            .await?;
        if !modified.is_some_and(|m| m.changed) {
            debug!(incident_id = %job.incident_id, "Incident changed during summary generation");
            return Ok(false);
        }

        if let Some(notifier) = &self.notifier {
            if let Err(e) = notifier.incident_changed(&job.tenant_id, Some(job.incident_id)) {
                warn!("Failed to notify clients about summary: {}", e);
            }
        }
        Ok(true)
    }
}

/// Plain-text digest of an incident's alerts. `alerts` are most recent first.
pub fn build_summary(incident: &IncidentDto, alerts: &[AlertDto]) -> String {
    let fingerprints: BTreeSet<&str> = alerts.iter().map(|a| a.fingerprint.as_str()).collect();

    let mut summary = format!(
        "{} alert(s) with {} distinct fingerprint(s)",
        incident.alerts_count.max(alerts.len() as u64),
        fingerprints.len()
    );

    if !incident.alert_sources.is_empty() {
        summary.push_str(&format!(" from {}", incident.alert_sources.join(", ")));
    }
    if !incident.services.is_empty() {
        summary.push_str(&format!(", affecting {}", incident.services.join(", ")));
    }
    summary.push_str(&format!(". Highest severity: {}.", incident.severity));

    if let (Some(start), Some(last)) = (incident.start_time, incident.last_seen_time) {
        summary.push_str(&format!(
            " Active from {} to {}.",
            start.format("%Y-%m-%d %H:%M UTC"),
            last.format("%Y-%m-%d %H:%M UTC")
        ));
    }

    let mut names: Vec<&str> = Vec::new();
    for alert in alerts {
        if !names.contains(&alert.name.as_str()) {
            names.push(&alert.name);
        }
        if names.len() == SUMMARY_ALERT_NAMES {
            break;
        }
    }
    summary.push_str(&format!(" Most recent: {}.", names.join("; ")));
    summary
}
