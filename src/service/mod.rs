//! Incident business logic and the shared context it is built from.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::config::{AuthMode, Settings};
use crate::events::{ChangeNotifier, SummaryScheduler, WorkflowSink};
use crate::jsonrpc::TenantResolver;
use crate::store::IncidentRepository;
use crate::{IncidentError, IncidentResult};

pub mod incidents;

pub use incidents::IncidentService;

/// Long-lived dependencies shared by every request
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn IncidentRepository>,
    pub notifier: Option<Arc<dyn ChangeNotifier>>,
    pub workflows: Option<Arc<dyn WorkflowSink>>,
    pub summaries: Option<Arc<dyn SummaryScheduler>>,
    pub started_at: DateTime<Utc>,
}

impl AppContext {
    pub fn new(settings: Arc<Settings>, store: Arc<dyn IncidentRepository>) -> Self {
        Self {
            settings,
            store,
            notifier: None,
            workflows: None,
            summaries: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn with_workflows(mut self, workflows: Arc<dyn WorkflowSink>) -> Self {
        self.workflows = Some(workflows);
        self
    }

    pub fn with_summaries(mut self, summaries: Arc<dyn SummaryScheduler>) -> Self {
        self.summaries = Some(summaries);
        self
    }

    /// Decide which tenant a request runs as
    pub fn resolve_tenant(&self, requested: Option<&str>) -> IncidentResult<String> {
        match self.settings.auth.mode {
            AuthMode::NoAuth => Ok(self.settings.auth.default_tenant.clone()),
            AuthMode::Tenant => match requested.map(str::trim) {
                Some(tenant) if !tenant.is_empty() => Ok(tenant.to_string()),
                _ => Err(IncidentError::Unauthorized(
                    "tenant_id is required".to_string(),
                )),
            },
        }
    }

    /// Incident service bound to one tenant
    pub fn incidents(&self, tenant_id: impl Into<String>) -> IncidentService {
        IncidentService::new(
            tenant_id.into(),
            self.store.clone(),
            self.notifier.clone(),
            self.workflows.clone(),
            self.summaries.clone(),
            self.settings.summary.min_alerts_for_summary,
        )
    }
}

/// Connections follow the same tenant rules as the requests they send
impl TenantResolver for AppContext {
    fn tenant_for(&self, params: Option<&Value>) -> Option<String> {
        let requested = params
            .and_then(|params| params.get("tenant_id"))
            .and_then(Value::as_str);
        self.resolve_tenant(requested).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryIncidentStore;

    fn context(mode: AuthMode) -> AppContext {
        let mut settings = Settings::default();
        settings.auth.mode = mode;
        AppContext::new(Arc::new(settings), Arc::new(MemoryIncidentStore::new()))
    }

    #[test]
    fn test_no_auth_uses_default_tenant() {
        let ctx = context(AuthMode::NoAuth);
        assert_eq!(ctx.resolve_tenant(None).unwrap(), "keep");
        assert_eq!(ctx.resolve_tenant(Some("other")).unwrap(), "keep");
    }

    #[test]
    fn test_tenant_mode_requires_tenant() {
        let ctx = context(AuthMode::Tenant);
        assert_eq!(ctx.resolve_tenant(Some("acme")).unwrap(), "acme");
        assert!(matches!(
            ctx.resolve_tenant(Some("  ")),
            Err(IncidentError::Unauthorized(_))
        ));
        assert!(ctx.resolve_tenant(None).is_err());
    }

    #[test]
    fn test_connection_tenant_from_params() {
        let ctx = context(AuthMode::Tenant);
        let resolver: &dyn TenantResolver = &ctx;
        assert_eq!(
            resolver.tenant_for(Some(&serde_json::json!({ "tenant_id": "acme" }))),
            Some("acme".to_string())
        );
        assert_eq!(resolver.tenant_for(Some(&serde_json::json!({}))), None);
        assert_eq!(resolver.tenant_for(None), None);

        let ctx = context(AuthMode::NoAuth);
        let resolver: &dyn TenantResolver = &ctx;
        assert_eq!(resolver.tenant_for(None), Some("keep".to_string()));
    }
}
