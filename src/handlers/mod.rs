// Request types and handlers behind the JSON-RPC methods

pub mod alerts;
pub mod health;
pub mod incidents;

pub use alerts::{AlertHandler, IngestAlertsRequest, IngestAlertsResponse};
pub use health::{HealthHandler, HealthResponse};
pub use incidents::*;
