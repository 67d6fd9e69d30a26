//! JSON-RPC server implementation with method dispatch
//!
//! Each connection runs a reader task feeding a dispatch loop that also
//! forwards broadcast notifications to the client. Notifications are scoped to
//! a tenant and a connection only receives those of tenants it has made a
//! successful request as.

use anyhow::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use super::protocol::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use super::transport::{Listener, MessageReader, MessageWriter};

/// Method handler function signature
/// Takes JSON parameters and returns a JSON result
pub type MethodHandler = Arc<
    dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value, JsonRpcError>> + Send + Sync,
>;

pub type NotificationReceiver = broadcast::Receiver<TenantNotification>;

const NOTIFICATION_CAPACITY: usize = 256;

/// A notification only connections subscribed to `tenant_id` may see
#[derive(Debug, Clone)]
pub struct TenantNotification {
    pub tenant_id: String,
    pub notification: JsonRpcNotification,
}

/// Fan-out of server-to-client notifications to open connections
#[derive(Clone)]
pub struct NotificationSender {
    inner: broadcast::Sender<TenantNotification>,
}

impl NotificationSender {
    pub fn new() -> Self {
        let (inner, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self { inner }
    }

    /// Returns the number of connections the notification was offered to
    pub fn send(&self, tenant_id: &str, notification: JsonRpcNotification) -> usize {
        self.inner
            .send(TenantNotification {
                tenant_id: tenant_id.to_string(),
                notification,
            })
            .unwrap_or(0)
    }

    pub fn subscribe(&self) -> NotificationReceiver {
        self.inner.subscribe()
    }
}

/// Works out which tenant a request acts as from its params
pub trait TenantResolver: Send + Sync {
    fn tenant_for(&self, params: Option<&Value>) -> Option<String>;
}

impl Default for NotificationSender {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON-RPC server
#[derive(Clone)]
pub struct JsonRpcServer {
    methods: Arc<RwLock<HashMap<String, MethodHandler>>>,
    notifications: NotificationSender,
    connection_limit: Arc<Semaphore>,
    tenants: Option<Arc<dyn TenantResolver>>,
}

impl JsonRpcServer {
    pub fn new(max_connections: usize, notifications: NotificationSender) -> Self {
        Self {
            methods: Arc::new(RwLock::new(HashMap::new())),
            notifications,
            connection_limit: Arc::new(Semaphore::new(max_connections.max(1))),
            tenants: None,
        }
    }

    /// Without a resolver no connection is ever subscribed to notifications
    pub fn with_tenant_resolver(mut self, tenants: Arc<dyn TenantResolver>) -> Self {
        self.tenants = Some(tenants);
        self
    }

    /// Register a method handler
    pub async fn register_method<F, Fut>(&self, method_name: String, handler: F)
    where
        F: Fn(Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, JsonRpcError>> + Send + 'static,
    {
        let wrapped_handler: MethodHandler = Arc::new(
            move |params| -> BoxFuture<'static, Result<Value, JsonRpcError>> {
                Box::pin(handler(params))
            },
        );

        let mut methods = self.methods.write().await;
        methods.insert(method_name.clone(), wrapped_handler);
        debug!("Registered method: {}", method_name);
    }

    pub async fn registered_methods(&self) -> Vec<String> {
        let methods = self.methods.read().await;
        let mut names: Vec<String> = methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn notifications(&self) -> &NotificationSender {
        &self.notifications
    }

    /// Accept connections until the listener is exhausted or `shutdown` resolves
    pub async fn serve<S>(&self, mut listener: Listener, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut connections = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                permit = self.connection_limit.clone().acquire_owned() => permit?,
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok(Some(connection)) => {
                    info!(peer = %connection.peer, "Client connected");
                    let server = self.clone();
                    connections.spawn(async move {
                        let _permit = permit;
                        if let Err(e) = server.serve_connection(connection.reader, connection.writer).await {
                            warn!("Connection ended with error: {}", e);
                        }
                        debug!(peer = %connection.peer, "Client disconnected");
                    });
                }
                Ok(None) => {
                    // stdio: wait for the single session to finish
                    while connections.join_next().await.is_some() {}
                    break;
                }
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                }
            }
        }

        connections.shutdown().await;
        listener.close()?;
        Ok(())
    }

    /// Serve one client until it disconnects
    pub async fn serve_connection<R, W>(&self, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send,
    {
        let mut writer = MessageWriter::new(writer);
        let mut notifications = self.notifications.subscribe();
        let mut subscriptions = HashSet::new();
        let (tx, mut rx) = mpsc::channel::<Result<String, String>>(32);

        let read_task = tokio::spawn(async move {
            let mut reader = MessageReader::new(reader);
            loop {
                match reader.read_message().await {
                    Ok(Some(message)) => {
                        if tx.send(Ok(message)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = tx.send(Err(e.to_string())).await;
                        break;
                    }
                }
            }
        });

        let result = loop {
            tokio::select! {
                incoming = rx.recv() => match incoming {
                    Some(Ok(raw)) => {
                        if let Some(response) = self.dispatch(&raw, &mut subscriptions).await {
                            if let Err(e) = writer.write_json(&response).await {
                                break Err(e);
                            }
                        }
                    }
                    Some(Err(framing_error)) => {
                        warn!("Malformed message: {}", framing_error);
                        let _ = writer.write_json(&JsonRpcResponse::parse_error(framing_error)).await;
                        break Ok(());
                    }
                    None => break Ok(()),
                },
                notification = notifications.recv() => match notification {
                    Ok(scoped) => {
                        if subscriptions.contains(&scoped.tenant_id) {
                            if let Err(e) = writer.write_json(&scoped.notification).await {
                                break Err(e);
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Client lagging, dropped {} notifications", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break Ok(()),
                },
            }
        };

        read_task.abort();
        result
    }

    /// Handle one raw message body (single request or batch) outside any connection
    pub async fn handle_message(&self, raw: &str) -> Option<Value> {
        self.dispatch(raw, &mut HashSet::new()).await
    }

    /// Handle one raw message body, recording the tenants of successful requests
    async fn dispatch(&self, raw: &str, subscriptions: &mut HashSet<String>) -> Option<Value> {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => return to_value(JsonRpcResponse::parse_error(e.to_string())),
        };

        match value {
            Value::Array(items) if items.is_empty() => to_value(JsonRpcResponse::error(
                JsonRpcError::invalid_request("Empty batch"),
                None,
            )),
            Value::Array(items) => {
                let mut responses = Vec::new();
                for item in items {
                    if let Some(response) = self.handle_value(item, subscriptions).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    None
                } else {
                    serde_json::to_value(responses).ok()
                }
            }
            single => self.handle_value(single, subscriptions).await.and_then(to_value),
        }
    }

    async fn handle_value(
        &self,
        value: Value,
        subscriptions: &mut HashSet<String>,
    ) -> Option<JsonRpcResponse> {
        let id = value.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(value) {
            Ok(request) => self.process_request(request, subscriptions).await,
            Err(e) => Some(JsonRpcResponse::error(
                JsonRpcError::invalid_request(&format!("Invalid Request: {}", e)),
                id,
            )),
        }
    }

    /// Process a JSON-RPC request and return a response (if needed)
    #[instrument(skip(self, request, subscriptions), fields(method = %request.method))]
    async fn process_request(
        &self,
        request: JsonRpcRequest,
        subscriptions: &mut HashSet<String>,
    ) -> Option<JsonRpcResponse> {
        let request_id = request.id.clone();
        let is_notification = request.is_notification();

        if let Err(error) = request.validate() {
            if is_notification {
                warn!("Invalid notification: {}", error.message);
                return None;
            }
            return Some(JsonRpcResponse::error(error, request_id));
        }

        let handler = {
            let methods = self.methods.read().await;
            methods.get(&request.method).cloned()
        };
        let Some(handler) = handler else {
            if is_notification {
                warn!("Method not found for notification: {}", request.method);
                return None;
            }
            return Some(JsonRpcResponse::method_not_found(&request.method, request_id));
        };

        let tenant = self
            .tenants
            .as_ref()
            .and_then(|tenants| tenants.tenant_for(request.params.as_ref()));

        let outcome = handler(request.params).await;
        if let (Ok(_), Some(tenant)) = (&outcome, tenant) {
            if !subscriptions.contains(&tenant) {
                debug!(tenant_id = %tenant, "Connection subscribed to tenant notifications");
                subscriptions.insert(tenant);
            }
        }

        match outcome {
            Ok(result) if !is_notification => Some(JsonRpcResponse::success(result, request_id)),
            Ok(_) => None,
            Err(error) => {
                debug!(code = error.code, "Method failed: {}", error.message);
                if is_notification {
                    error!("Error in notification handler for {}: {}", request.method, error.message);
                    None
                } else {
                    Some(JsonRpcResponse::error(error, request_id))
                }
            }
        }
    }
}

fn to_value(response: JsonRpcResponse) -> Option<Value> {
    serde_json::to_value(response).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::protocol::error_codes;
    use serde_json::json;

    async fn echo_server() -> JsonRpcServer {
        let server = JsonRpcServer::new(4, NotificationSender::new());
        server
            .register_method("test/echo".to_string(), |params| async move {
                Ok(params.unwrap_or(Value::Null))
            })
            .await;
        server
            .register_method("test/fail".to_string(), |_| async move {
                Err(JsonRpcError::custom(-32004, "Incident not found".to_string(), None))
            })
            .await;
        server
    }

    #[tokio::test]
    async fn test_dispatch_success_and_error() {
        let server = echo_server().await;

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"test/echo","params":{"a":1},"id":1}"#)
            .await
            .unwrap();
        assert_eq!(response["result"], json!({"a": 1}));
        assert_eq!(response["id"], 1);

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"test/fail","id":"x"}"#)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], -32004);
        assert_eq!(response["id"], "x");
    }

    #[tokio::test]
    async fn test_unknown_method_and_parse_error() {
        let server = echo_server().await;

        let response = server
            .handle_message(r#"{"jsonrpc":"2.0","method":"nope","id":2}"#)
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], error_codes::METHOD_NOT_FOUND);

        let response = server.handle_message("{not json").await.unwrap();
        assert_eq!(response["error"]["code"], error_codes::PARSE_ERROR);
        assert!(response["id"].is_null());
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let server = echo_server().await;
        assert!(server
            .handle_message(r#"{"jsonrpc":"2.0","method":"test/echo"}"#)
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_batch_request() {
        let server = echo_server().await;
        let response = server
            .handle_message(
                r#"[{"jsonrpc":"2.0","method":"test/echo","params":1,"id":1},
                    {"jsonrpc":"2.0","method":"test/echo","params":2},
                    {"jsonrpc":"2.0","method":"test/fail","id":3}]"#,
            )
            .await
            .unwrap();

        let responses = response.as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["result"], 1);
        assert_eq!(responses[1]["error"]["code"], -32004);
    }

    struct ParamTenant;

    impl TenantResolver for ParamTenant {
        fn tenant_for(&self, params: Option<&Value>) -> Option<String> {
            params?.get("tenant_id")?.as_str().map(str::to_string)
        }
    }

    async fn read_json<R: tokio::io::AsyncRead + Unpin>(reader: &mut MessageReader<R>) -> Value {
        let raw = reader.read_message().await.unwrap().unwrap();
        serde_json::from_str(&raw).unwrap()
    }

    #[tokio::test]
    async fn test_connection_only_receives_its_tenants_notifications() {
        let server = echo_server().await.with_tenant_resolver(Arc::new(ParamTenant));
        let (client_io, server_io) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_io);
        let rpc = server.clone();
        tokio::spawn(async move { rpc.serve_connection(server_read, server_write).await });

        let (client_read, client_write) = tokio::io::split(client_io);
        let mut reader = MessageReader::new(client_read);
        let mut writer = MessageWriter::new(client_write);

        writer
            .write_message(r#"{"jsonrpc":"2.0","method":"test/echo","params":{"tenant_id":"bravo"},"id":1}"#)
            .await
            .unwrap();
        assert_eq!(read_json(&mut reader).await["id"], 1);

        // failed requests do not subscribe
        writer
            .write_message(r#"{"jsonrpc":"2.0","method":"test/fail","params":{"tenant_id":"charlie"},"id":2}"#)
            .await
            .unwrap();
        assert_eq!(read_json(&mut reader).await["error"]["code"], -32004);

        let notifications = server.notifications();
        for tenant in ["alpha", "charlie", "bravo"] {
            notifications.send(
                tenant,
                JsonRpcNotification::new("test/changed", Some(json!({ "tenant": tenant }))),
            );
        }

        let first = read_json(&mut reader).await;
        assert_eq!(first["method"], "test/changed");
        assert_eq!(first["params"]["tenant"], "bravo");
    }

    #[tokio::test]
    async fn test_registered_methods_sorted() {
        let server = echo_server().await;
        assert_eq!(server.registered_methods().await, vec!["test/echo", "test/fail"]);
    }
}
