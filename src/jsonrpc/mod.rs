//! JSON-RPC 2.0 implementation for incidentd
//!
//! LSP-style `Content-Length` framing over stdio or a Unix socket, method
//! dispatch with typed request/response handlers, and server-pushed
//! notifications for incident changes.

pub mod protocol;
pub mod server;
pub mod transport;

pub mod methods;

pub use protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
pub use server::{
    JsonRpcServer, MethodHandler, NotificationReceiver, NotificationSender, TenantNotification,
    TenantResolver,
};
pub use transport::{Connection, Listener, MessageReader, MessageWriter, TransportConfig};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::handlers::{
    AlertHandler, ChangeStatusRequest, CommitCandidatesRequest, CreateIncidentRequest,
    HealthHandler, IncidentAlertsChangeRequest, IncidentAlertsRequest, IncidentHandler,
    IncidentIdRequest, IngestAlertsRequest, ListIncidentsRequest, TenantRequest,
    UpdateIncidentRequest,
};
use crate::service::AppContext;
use crate::IncidentResult;
use methods::*;

pub const JSONRPC_VERSION: &str = "2.0";
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Register all incidentd JSON-RPC methods with the server
///
/// Methods take their request type directly as params, e.g. `incidents/get`:
/// ```json
/// { "incident_id": "...", "tenant_id": "acme" }
/// ```
pub async fn register_incident_methods(server: &JsonRpcServer, ctx: Arc<AppContext>) {
    let incidents = Arc::new(IncidentHandler::new(ctx.clone()));
    let alerts = Arc::new(AlertHandler::new(ctx.clone()));
    let health = Arc::new(HealthHandler::new(ctx));

    macro_rules! incident_method {
        ($name:expr, $request:ty, $handle:ident) => {{
            let handler = incidents.clone();
            register_handler(server, $name, move |request: $request| {
                let handler = handler.clone();
                async move { handler.$handle(request).await }
            })
            .await;
        }};
    }

    incident_method!(CREATE_INCIDENT, CreateIncidentRequest, handle_create);
    incident_method!(GET_INCIDENT, IncidentIdRequest, handle_get);
    incident_method!(LIST_INCIDENTS, ListIncidentsRequest, handle_list);
    incident_method!(UPDATE_INCIDENT, UpdateIncidentRequest, handle_update);
    incident_method!(DELETE_INCIDENT, IncidentIdRequest, handle_delete);
    incident_method!(CONFIRM_INCIDENT, IncidentIdRequest, handle_confirm);
    incident_method!(CHANGE_STATUS, ChangeStatusRequest, handle_change_status);
    incident_method!(INCIDENT_ALERTS, IncidentAlertsRequest, handle_alerts);
    incident_method!(ADD_ALERTS, IncidentAlertsChangeRequest, handle_add_alerts);
    incident_method!(REMOVE_ALERTS, IncidentAlertsChangeRequest, handle_remove_alerts);
    incident_method!(INCIDENTS_META, TenantRequest, handle_meta);
    incident_method!(COMMIT_CANDIDATES, CommitCandidatesRequest, handle_commit_candidates);
    incident_method!(SUBSCRIBE, TenantRequest, handle_subscribe);

    register_handler(server, INGEST_ALERTS, move |request: IngestAlertsRequest| {
        let alerts = alerts.clone();
        async move { alerts.handle_ingest(request).await }
    })
    .await;

    register_handler(server, HEALTH, move |_: Value| {
        let health = health.clone();
        async move { health.handle_health().await }
    })
    .await;

    tracing::info!("Registered {} incidentd JSON-RPC methods", ALL_METHODS.len());
}

/// Wrap a typed handler: parse params into `Req`, map domain errors, serialize `Resp`
pub async fn register_handler<Req, Resp, F, Fut>(server: &JsonRpcServer, method: &str, handler: F)
where
    Req: DeserializeOwned + Send + 'static,
    Resp: Serialize + Send + 'static,
    F: Fn(Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = IncidentResult<Resp>> + Send + 'static,
{
    let handler = Arc::new(handler);
    server
        .register_method(method.to_string(), move |params| {
            let handler = handler.clone();
            async move {
                // absent params behave like an empty object
                let params_value = match params {
                    None | Some(Value::Null) => Value::Object(Default::default()),
                    Some(value) => value,
                };

                let request: Req = serde_json::from_value(params_value.clone())
                    .map_err(|e| create_parse_error::<Req>(&e, &params_value))?;

                let response = handler(request).await.map_err(JsonRpcError::from)?;

                serde_json::to_value(response).map_err(|e| {
                    JsonRpcError::custom(
                        protocol::error_codes::INTERNAL_ERROR,
                        format!("Failed to serialize response: {}", e),
                        None,
                    )
                })
            }
        })
        .await;
}

fn create_parse_error<T>(error: &serde_json::Error, params: &Value) -> JsonRpcError {
    let type_name = std::any::type_name::<T>()
        .rsplit("::")
        .next()
        .unwrap_or("Request");

    let received_fields: Vec<&str> = match params {
        Value::Object(map) => map.keys().map(|s| s.as_str()).collect(),
        _ => vec![],
    };

    let hint = if received_fields.is_empty() {
        "No parameters provided".to_string()
    } else {
        format!("Received fields: {}", received_fields.join(", "))
    };

    JsonRpcError::custom(
        protocol::error_codes::INVALID_PARAMS,
        format!("Invalid {}: {}. {}", type_name, error, hint),
        Some(serde_json::json!({
            "parse_error": error.to_string(),
            "received": params,
        })),
    )
}
