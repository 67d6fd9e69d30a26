pub mod server;

pub use server::{
    build_context, create_incident_server, create_store, start_server, validate_server_config,
    IncidentServer, Worker, WORKER_DRAIN_TIMEOUT,
};
