//! incidentd JSON-RPC server wiring: store, background workers and transport

use anyhow::{Context, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::events::{
    BroadcastNotifier, SummaryQueue, SummaryWorker, WorkflowDispatcher, WorkflowQueue,
};
use crate::jsonrpc::{
    register_incident_methods, JsonRpcServer, Listener, NotificationSender, TransportConfig,
};
use crate::service::AppContext;
use crate::store::{IncidentRepository, MemoryIncidentStore};

/// How long shutdown waits for queued workflow events and summary jobs
pub const WORKER_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// A background task draining one of the side-effect queues
pub struct Worker {
    pub name: &'static str,
    handle: JoinHandle<()>,
}

impl Worker {
    fn new(name: &'static str, handle: JoinHandle<()>) -> Self {
        Self { name, handle }
    }
}

/// A configured server together with the background workers feeding it
pub struct IncidentServer {
    pub rpc: JsonRpcServer,
    pub context: Arc<AppContext>,
    workers: Vec<Worker>,
}

impl IncidentServer {
    /// Serve connections from `listener` until it is exhausted or `shutdown` resolves,
    /// then let the workers finish what is already queued
    pub async fn serve<S>(self, listener: Listener, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let IncidentServer {
            rpc,
            context,
            workers,
        } = self;

        let result = rpc.serve(listener, shutdown).await;

        // the queues close once the last context handle is gone
        drop(rpc);
        drop(context);
        drain_workers(workers, WORKER_DRAIN_TIMEOUT).await;
        result
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

async fn drain_workers(workers: Vec<Worker>, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    for Worker { name, mut handle } in workers {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => debug!(worker = name, "Worker drained its queue"),
            Ok(Err(e)) => error!(worker = name, "Worker failed during shutdown: {}", e),
            Err(_) => {
                warn!(
                    worker = name,
                    timeout_secs = limit.as_secs(),
                    "Worker did not drain its queue in time, unprocessed items are dropped"
                );
                handle.abort();
            }
        }
    }
}

/// Open the incident store, loading the snapshot file when one is configured
pub async fn create_store(settings: &Settings) -> Result<Arc<dyn IncidentRepository>> {
    match &settings.store.data_file {
        Some(path) => {
            let store = MemoryIncidentStore::with_snapshot(path)
                .await
                .with_context(|| format!("Failed to open data file {}", path.display()))?;
            info!("Incident store loaded from {}", path.display());
            Ok(Arc::new(store))
        }
        None => {
            debug!("Using in-memory incident store without persistence");
            Ok(Arc::new(MemoryIncidentStore::new()))
        }
    }
}

/// Build the shared context, spawning a worker for every enabled side effect
pub fn build_context(
    settings: Arc<Settings>,
    store: Arc<dyn IncidentRepository>,
    notifications: &NotificationSender,
) -> (AppContext, Vec<Worker>) {
    let mut ctx = AppContext::new(settings.clone(), store.clone());
    let mut workers = Vec::new();

    let notifier: Option<Arc<BroadcastNotifier>> = settings
        .features
        .notifications_enabled
        .then(|| Arc::new(BroadcastNotifier::new(notifications.clone())));
    if let Some(notifier) = &notifier {
        ctx = ctx.with_notifier(notifier.clone());
    } else {
        info!("Client notifications disabled");
    }

    if settings.features.workflows_enabled {
        let (queue, receiver) = WorkflowQueue::new(settings.workflows.queue_size);
        let handle = WorkflowDispatcher::new(receiver, notifications.clone()).spawn();
        workers.push(Worker::new("workflow-dispatcher", handle));
        ctx = ctx.with_workflows(Arc::new(queue));
    } else {
        info!("Workflows disabled");
    }

    if settings.features.summaries_enabled {
        let (queue, receiver) = SummaryQueue::new(settings.summary.queue_size);
        let notifier = notifier.map(|n| n as Arc<dyn crate::events::ChangeNotifier>);
        let handle = SummaryWorker::new(receiver, store, notifier).spawn();
        workers.push(Worker::new("summary-worker", handle));
        ctx = ctx.with_summaries(Arc::new(queue));
    } else {
        info!("Summary generation disabled");
    }

    (ctx, workers)
}

/// Create the JSON-RPC server with every incidentd method registered
pub async fn create_incident_server(settings: Arc<Settings>) -> Result<IncidentServer> {
    validate_server_config(&settings)?;

    let store = create_store(&settings).await?;
    let notifications = NotificationSender::new();
    let (ctx, workers) = build_context(settings.clone(), store, &notifications);
    let context = Arc::new(ctx);

    let rpc = JsonRpcServer::new(settings.server.max_connections as usize, notifications)
        .with_tenant_resolver(context.clone());
    register_incident_methods(&rpc, context.clone()).await;

    Ok(IncidentServer {
        rpc,
        context,
        workers,
    })
}

/// Run the server until the transport closes or Ctrl+C is received
pub async fn start_server(settings: Arc<Settings>, transport: Option<TransportConfig>) -> Result<()> {
    let transport = match transport {
        Some(transport) => transport,
        None => TransportConfig::from_server_config(&settings.server)?,
    };

    let server = create_incident_server(settings).await?;
    let listener = Listener::bind(&transport).await?;
    info!("incidentd listening on {}", transport.description());

    server
        .serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    info!("incidentd stopped");
    Ok(())
}

/// Validate server configuration before starting
pub fn validate_server_config(settings: &Settings) -> Result<()> {
    settings.validate()?;
    match &settings.server.socket_path {
        Some(path) if settings.server.transport == "socket" => {
            debug!("Using Unix socket transport: {}", path);
        }
        _ => debug!("Using stdio transport"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jsonrpc::methods::INCIDENT_WORKFLOW_NOTIFICATION;
    use crate::models::IncidentDtoIn;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_feature_flags_control_workers() {
        let settings = Arc::new(Settings::default());
        let notifications = NotificationSender::new();
        let (ctx, workers) = build_context(
            settings,
            Arc::new(MemoryIncidentStore::new()),
            &notifications,
        );
        assert_eq!(workers.len(), 2);
        assert!(ctx.notifier.is_some() && ctx.workflows.is_some() && ctx.summaries.is_some());

        let mut settings = Settings::default();
        settings.features.workflows_enabled = false;
        settings.features.summaries_enabled = false;
        settings.features.notifications_enabled = false;
        let (ctx, workers) = build_context(
            Arc::new(settings),
            Arc::new(MemoryIncidentStore::new()),
            &notifications,
        );
        assert!(workers.is_empty());
        assert!(ctx.notifier.is_none() && ctx.workflows.is_none() && ctx.summaries.is_none());
    }

    #[tokio::test]
    async fn test_create_server_with_data_file() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.store.data_file = Some(dir.path().join("incidents.json"));

        let server = create_incident_server(Arc::new(settings)).await.unwrap();
        assert_eq!(server.worker_count(), 2);
        assert!(!server.rpc.registered_methods().await.is_empty());
    }

    #[test]
    fn test_validate_server_config() {
        let mut settings = Settings::default();
        assert!(validate_server_config(&settings).is_ok());

        settings.server.transport = "http".to_string();
        assert!(validate_server_config(&settings).is_err());

        settings.server.transport = "socket".to_string();
        settings.server.socket_path = None;
        assert!(validate_server_config(&settings).is_err());
    }

    #[tokio::test]
    async fn test_serve_unix_socket_until_shutdown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("incidentd.sock");
        let transport = TransportConfig::UnixSocket {
            path: path.display().to_string(),
        };

        let server = create_incident_server(Arc::new(Settings::default())).await.unwrap();
        let listener = Listener::bind(&transport).await.unwrap();
        assert!(path.exists());

        server.serve(listener, async {}).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_shutdown_delivers_queued_workflow_events() {
        let dir = TempDir::new().unwrap();
        let transport = TransportConfig::UnixSocket {
            path: dir.path().join("incidentd.sock").display().to_string(),
        };
        let server = create_incident_server(Arc::new(Settings::default())).await.unwrap();
        let mut notifications = server.rpc.notifications().subscribe();

        let incident = server
            .context
            .incidents("keep")
            .create_incident(IncidentDtoIn::named("Queued at shutdown"), false)
            .await
            .unwrap();

        let listener = Listener::bind(&transport).await.unwrap();
        server.serve(listener, async {}).await.unwrap();

        let mut workflow_events = Vec::new();
        while let Ok(scoped) = notifications.try_recv() {
            if scoped.notification.method == INCIDENT_WORKFLOW_NOTIFICATION {
                workflow_events.push(scoped);
            }
        }
        assert_eq!(workflow_events.len(), 1);
        assert_eq!(workflow_events[0].tenant_id, "keep");
        let params = workflow_events[0].notification.params.clone().unwrap();
        assert_eq!(params["incident"]["id"], incident.id.to_string());
    }

    #[tokio::test]
    async fn test_drain_gives_up_on_stuck_worker() {
        let handle = tokio::spawn(std::future::pending::<()>());
        let started = tokio::time::Instant::now();
        drain_workers(vec![Worker::new("stuck", handle)], Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
