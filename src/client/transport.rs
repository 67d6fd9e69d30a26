//! JSON-RPC client transport for Unix socket communication

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixStream;
use tracing::debug;
use uuid::Uuid;

use crate::jsonrpc::methods::{DELETE_INCIDENT, GET_INCIDENT, HEALTH, INCIDENTS_META, LIST_INCIDENTS};
use crate::jsonrpc::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, MessageReader, MessageWriter};

/// Client information for debugging and tracing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    pub version: String,
    pub socket_path: String,
    pub request_id: String,
}

impl ClientInfo {
    pub fn new(socket_path: String) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            socket_path,
            request_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Client-side request builder for JSON-RPC calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientRequest {
    pub method: String,
    pub params: Value,
    pub tenant_id: Option<String>,
    pub client_info: Option<ClientInfo>,
}

impl ClientRequest {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
            tenant_id: None,
            client_info: None,
        }
    }

    /// Scope the call to a tenant (merged into object params)
    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    pub fn with_client_info(mut self, client_info: ClientInfo) -> Self {
        self.client_info = Some(client_info);
        self
    }

    fn to_jsonrpc_request(&self, id: String) -> JsonRpcRequest {
        let mut params = self.params.clone();
        if let (Some(tenant_id), Value::Object(map)) = (&self.tenant_id, &mut params) {
            map.entry("tenant_id")
                .or_insert_with(|| Value::String(tenant_id.clone()));
        }
        JsonRpcRequest::new(self.method.clone(), Some(params), Some(Value::String(id)))
    }
}

/// JSON-RPC client for Unix socket communication
pub struct JsonRpcClient {
    socket_path: String,
    tenant_id: Option<String>,
}

impl JsonRpcClient {
    pub fn new(socket_path: String) -> Self {
        Self {
            socket_path,
            tenant_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: Option<String>) -> Self {
        self.tenant_id = tenant_id;
        self
    }

    /// Validate that the socket exists and accepts connections
    pub async fn validate_connection(&self) -> Result<bool> {
        if !Path::new(&self.socket_path).exists() {
            return Ok(false);
        }
        Ok(UnixStream::connect(&self.socket_path).await.is_ok())
    }

    /// Execute a JSON-RPC call over a fresh socket connection
    ///
    /// Notifications that arrive before the response are passed to `on_notification`.
    pub async fn call<F>(&self, request: ClientRequest, on_notification: F) -> Result<Value>
    where
        F: FnMut(JsonRpcNotification),
    {
        let stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| anyhow!("Failed to connect to socket {}: {}", self.socket_path, e))?;
        let (read_half, write_half) = stream.into_split();

        let request = request
            .with_tenant(self.tenant_id.clone())
            .with_client_info(ClientInfo::new(self.socket_path.clone()));
        call_over(read_half, write_half, request, on_notification).await
    }

    pub async fn health(&self) -> Result<Value> {
        self.call(ClientRequest::new(HEALTH, json!({})), |_| {}).await
    }

    pub async fn list_incidents(&self, query: Value) -> Result<Value> {
        self.call(ClientRequest::new(LIST_INCIDENTS, query), |_| {}).await
    }

    pub async fn get_incident(&self, incident_id: Uuid) -> Result<Value> {
        self.call(
            ClientRequest::new(GET_INCIDENT, json!({ "incident_id": incident_id })),
            |_| {},
        )
        .await
    }

    pub async fn delete_incident(&self, incident_id: Uuid) -> Result<Value> {
        self.call(
            ClientRequest::new(DELETE_INCIDENT, json!({ "incident_id": incident_id })),
            |_| {},
        )
        .await
    }

    pub async fn meta(&self) -> Result<Value> {
        self.call(ClientRequest::new(INCIDENTS_META, json!({})), |_| {}).await
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }
}

/// Send one request over an established connection and wait for its response
pub async fn call_over<R, W, F>(
    reader: R,
    writer: W,
    request: ClientRequest,
    mut on_notification: F,
) -> Result<Value>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(JsonRpcNotification),
{
    let request_id = Uuid::new_v4().to_string();
    let jsonrpc_request = request.to_jsonrpc_request(request_id.clone());

    let mut writer = MessageWriter::new(writer);
    let mut reader = MessageReader::new(reader);

    debug!(method = %jsonrpc_request.method, "Sending request");
    writer.write_json(&jsonrpc_request).await?;

    loop {
        let message = reader
            .read_message()
            .await?
            .ok_or_else(|| anyhow!("Connection closed before a response arrived"))?;
        let msg: Value = serde_json::from_str(&message)
            .map_err(|e| anyhow!("Failed to parse message JSON: {}", e))?;

        let is_notification =
            msg.get("method").is_some() && msg.get("id").map_or(true, Value::is_null);
        if is_notification {
            let notification: JsonRpcNotification = serde_json::from_value(msg)
                .map_err(|e| anyhow!("Failed to parse notification: {}", e))?;
            on_notification(notification);
            continue;
        }

        let response: JsonRpcResponse = serde_json::from_value(msg)
            .map_err(|e| anyhow!("Failed to parse response: {}", e))?;
        let response_id = response.id.as_ref().and_then(Value::as_str).unwrap_or("");
        if response_id != request_id {
            return Err(anyhow!(
                "Response ID mismatch: expected {}, got {}",
                request_id,
                response_id
            ));
        }

        if let Some(error) = response.error {
            return Err(anyhow!("JSON-RPC error {}: {}", error.code, error.message));
        }
        return response
            .result
            .ok_or_else(|| anyhow!("Response missing both result and error"));
    }
}

/// Manages the connection state file (~/.incidentd/connection)
///
/// `connect` records the socket path so later commands reach the same
/// server until `disconnect`.
pub struct ConnectionState;

impl ConnectionState {
    pub fn state_file_path() -> Result<PathBuf> {
        let home_dir =
            dirs::home_dir().ok_or_else(|| anyhow!("Unable to determine home directory"))?;
        Ok(home_dir.join(".incidentd").join("connection"))
    }

    pub fn save(socket_path: &str) -> Result<()> {
        Self::save_to(&Self::state_file_path()?, socket_path)
    }

    pub fn load() -> Result<Option<String>> {
        Self::load_from(&Self::state_file_path()?)
    }

    pub fn clear() -> Result<()> {
        Self::clear_at(&Self::state_file_path()?)
    }

    pub fn save_to(state_file: &Path, socket_path: &str) -> Result<()> {
        if let Some(parent) = state_file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(state_file, socket_path)?;
        Ok(())
    }

    pub fn load_from(state_file: &Path) -> Result<Option<String>> {
        if !state_file.exists() {
            return Ok(None);
        }
        let socket_path = std::fs::read_to_string(state_file)?.trim().to_string();
        Ok(Some(socket_path).filter(|p| !p.is_empty()))
    }

    pub fn clear_at(state_file: &Path) -> Result<()> {
        if state_file.exists() {
            std::fs::remove_file(state_file)?;
        }
        Ok(())
    }

    pub fn is_connected() -> Result<bool> {
        Ok(Self::load()?.is_some())
    }

    pub fn get_client() -> Result<JsonRpcClient> {
        let socket_path = Self::load()?.ok_or_else(|| {
            anyhow!("Not connected to any server. Use 'incidentd connect <socket_path>' first.")
        })?;
        Ok(JsonRpcClient::new(socket_path))
    }
}
