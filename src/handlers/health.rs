use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::service::AppContext;
use crate::IncidentResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: i64,
}

/// Handler for incidentd/health
pub struct HealthHandler {
    ctx: Arc<AppContext>,
}

impl HealthHandler {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub async fn handle_health(&self) -> IncidentResult<HealthResponse> {
        Ok(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: (Utc::now() - self.ctx.started_at).num_seconds().max(0),
        })
    }
}
