//! Shared harness: an in-process incidentd server reached over in-memory pipes.
#![allow(dead_code)]

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::time::{timeout, Duration};

use incidentd::config::{init_test_logging, Settings};
use incidentd::jsonrpc::{MessageReader, MessageWriter};
use incidentd::server::{create_incident_server, IncidentServer};

pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestServer {
    pub server: IncidentServer,
}

impl TestServer {
    pub async fn start(settings: Settings) -> Result<Self> {
        let _ = init_test_logging();
        let server = create_incident_server(Arc::new(settings)).await?;
        Ok(Self { server })
    }

    pub async fn start_default() -> Result<Self> {
        Self::start(Settings::default()).await
    }

    /// Open a new client connection served by its own task
    pub fn connect(&self) -> TestClient {
        let (client_io, server_io) = tokio::io::duplex(256 * 1024);
        let (server_read, server_write) = tokio::io::split(server_io);
        let rpc = self.server.rpc.clone();
        tokio::spawn(async move {
            let _ = rpc.serve_connection(server_read, server_write).await;
        });

        let (client_read, client_write) = tokio::io::split(client_io);
        TestClient {
            reader: MessageReader::new(client_read),
            writer: MessageWriter::new(client_write),
            next_id: 1,
            notifications: VecDeque::new(),
        }
    }
}

pub struct TestClient {
    reader: MessageReader<ReadHalf<DuplexStream>>,
    writer: MessageWriter<WriteHalf<DuplexStream>>,
    next_id: u64,
    notifications: VecDeque<Value>,
}

impl TestClient {
    /// Send a request and return the raw response envelope
    pub async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;
        self.writer
            .write_json(&json!({"jsonrpc": "2.0", "method": method, "params": params, "id": id}))
            .await?;

        loop {
            let message = self.read().await?;
            if message.get("method").is_some() && message.get("id").is_none() {
                self.notifications.push_back(message);
                continue;
            }
            if message["id"] != json!(id) {
                return Err(anyhow!("unexpected response id: {}", message["id"]));
            }
            return Ok(message);
        }
    }

    /// Call a method expecting success
    pub async fn call(&mut self, method: &str, params: Value) -> Result<Value> {
        let response = self.request(method, params).await?;
        if let Some(error) = response.get("error") {
            return Err(anyhow!("{} failed: {}", method, error));
        }
        Ok(response["result"].clone())
    }

    /// Call a method expecting an error, returning the error object
    pub async fn call_err(&mut self, method: &str, params: Value) -> Result<Value> {
        let response = self.request(method, params).await?;
        response
            .get("error")
            .cloned()
            .ok_or_else(|| anyhow!("{} unexpectedly succeeded: {}", method, response))
    }

    /// Next server notification with the given method, skipping others
    pub async fn notification(&mut self, method: &str) -> Result<Value> {
        if let Some(pos) = self.notifications.iter().position(|n| n["method"] == method) {
            if let Some(found) = self.notifications.remove(pos) {
                return Ok(found);
            }
        }
        loop {
            let message = self.read().await?;
            if message["method"] == method {
                return Ok(message);
            }
            self.notifications.push_back(message);
        }
    }

    async fn read(&mut self) -> Result<Value> {
        let raw = timeout(RESPONSE_TIMEOUT, self.reader.read_message())
            .await
            .map_err(|_| anyhow!("timed out waiting for server"))??
            .ok_or_else(|| anyhow!("server closed the connection"))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

pub fn alert(name: &str, fingerprint: &str, severity: &str, source: &str) -> Value {
    json!({
        "name": name,
        "fingerprint": fingerprint,
        "severity": severity,
        "lastReceived": chrono::Utc::now().to_rfc3339(),
        "source": [source],
    })
}

/// Ingest alerts and return their ids
pub async fn ingest(client: &mut TestClient, alerts: Vec<Value>) -> Result<Vec<Value>> {
    let result = client.call("alerts/ingest", json!({ "alerts": alerts })).await?;
    Ok(result["alert_ids"].as_array().cloned().unwrap_or_default())
}

pub async fn create_incident(client: &mut TestClient, name: &str) -> Result<Value> {
    client
        .call(
            "incidents/create",
            json!({ "incident": { "user_generated_name": name } }),
        )
        .await
}
