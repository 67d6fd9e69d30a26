//! CLI command implementations.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::client::{ClientRequest, ConnectionState, JsonRpcClient};
use crate::config::Settings;
use crate::server::start_server;

use super::utils::{load_request_params, load_settings, print_notification, ServeOverrides};

/// Start the incidentd JSON-RPC server
pub async fn serve(
    config_path: Option<PathBuf>,
    config_json: Option<String>,
    overrides: ServeOverrides,
) -> Result<()> {
    info!("Loading configuration...");
    let settings = load_settings(config_path, config_json, &overrides)?;

    info!(
        transport = %settings.server.transport,
        auth = ?settings.auth.mode,
        "Starting incidentd server"
    );
    start_server(Arc::new(settings), None).await?;

    info!("incidentd server stopped");
    Ok(())
}

/// Connect to an incidentd server via Unix socket
pub async fn connect(socket_path: String) -> Result<()> {
    info!("Connecting to incidentd server at: {}", socket_path);

    if !std::path::Path::new(&socket_path).exists() {
        anyhow::bail!("Socket path does not exist: {}", socket_path);
    }

    let client = JsonRpcClient::new(socket_path.clone());
    if !client.validate_connection().await? {
        anyhow::bail!("Failed to connect to server at: {}", socket_path);
    }

    ConnectionState::save(&socket_path)?;

    println!("✓ Connected to incidentd server at: {}", socket_path);
    println!("  Use 'incidentd health' to check the server.");
    println!("  Use 'incidentd disconnect' to disconnect.");
    Ok(())
}

/// Disconnect from the current server
pub async fn disconnect() -> Result<()> {
    if !ConnectionState::is_connected()? {
        println!("Not currently connected to any server.");
        return Ok(());
    }

    let socket_path = ConnectionState::load()?.unwrap_or_default();
    ConnectionState::clear()?;

    println!("✓ Disconnected from: {}", socket_path);
    Ok(())
}

/// Probe the server's health method
pub async fn health(socket_path: Option<String>) -> Result<()> {
    let client = match socket_path {
        Some(path) => JsonRpcClient::new(path),
        None => ConnectionState::get_client()?,
    };

    let result = client.health().await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Call an arbitrary method
pub async fn call(
    method: String,
    params_file: Option<PathBuf>,
    params_json: Option<String>,
    follow: bool,
    tenant: Option<String>,
) -> Result<()> {
    let params = load_request_params(params_file, params_json, &method)?;
    let client = ConnectionState::get_client()?.with_tenant(tenant);

    info!("Sending {} request to: {}", method, client.socket_path());

    let result = client
        .call(ClientRequest::new(method, params), |notification| {
            if follow {
                print_notification(&notification);
            }
        })
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

pub async fn list(query: serde_json::Value, tenant: Option<String>) -> Result<()> {
    let client = ConnectionState::get_client()?.with_tenant(tenant);
    let page = client.list_incidents(query).await?;

    let count = page["count"].as_u64().unwrap_or(0);
    let items = page["items"].as_array().cloned().unwrap_or_default();
    println!("{} incident(s), showing {}", count, items.len());

    for incident in items {
        let name = incident["user_generated_name"]
            .as_str()
            .or_else(|| incident["ai_generated_name"].as_str())
            .unwrap_or("");
        println!(
            "{}  {:<8} {:<8} {:>4} alerts  {}",
            incident["id"].as_str().unwrap_or(""),
            incident["severity"].as_str().unwrap_or(""),
            incident["status"].as_str().unwrap_or(""),
            incident["alerts_count"].as_u64().unwrap_or(0),
            name
        );
    }
    Ok(())
}

pub async fn get(incident_id: Uuid, tenant: Option<String>) -> Result<()> {
    let client = ConnectionState::get_client()?.with_tenant(tenant);
    let incident = client.get_incident(incident_id).await?;
    println!("{}", serde_json::to_string_pretty(&incident)?);
    Ok(())
}

pub async fn delete(incident_id: Uuid, tenant: Option<String>) -> Result<()> {
    let client = ConnectionState::get_client()?.with_tenant(tenant);
    client.delete_incident(incident_id).await?;
    println!("✓ Deleted incident {}", incident_id);
    Ok(())
}

pub async fn meta(tenant: Option<String>) -> Result<()> {
    let client = ConnectionState::get_client()?.with_tenant(tenant);
    let meta = client.meta().await?;
    println!("{}", serde_json::to_string_pretty(&meta)?);
    Ok(())
}

/// Initialize default configuration
pub async fn init(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = config_path.unwrap_or_else(Settings::config_path);

    if config_path.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at {:?}. Use --force to overwrite.",
            config_path
        );
    }

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let toml_content = toml::to_string_pretty(&Settings::default())?;
    std::fs::write(&config_path, toml_content)?;

    println!("✓ Configuration initialized at {:?}", config_path);
    Ok(())
}

/// Manage configuration (show, validate, edit)
pub async fn config(config_path: Option<PathBuf>, show: bool, validate: bool, edit: bool) -> Result<()> {
    if show {
        let settings = Settings::load(config_path.as_deref())?;
        println!("{}", toml::to_string_pretty(&settings)?);
    }

    if validate {
        match Settings::load(config_path.as_deref()) {
            Ok(settings) => match settings.validate() {
                Ok(()) => println!("✓ Configuration is valid"),
                Err(e) => error!("Configuration validation failed: {}", e),
            },
            Err(e) => error!("Failed to load configuration: {}", e),
        }
    }

    if edit {
        let path = config_path.unwrap_or_else(Settings::config_path);
        let editor = std::env::var("EDITOR").unwrap_or_else(|_| "nano".to_string());
        std::process::Command::new(editor).arg(&path).status()?;
    }

    Ok(())
}

/// Show version information
pub async fn version() -> Result<()> {
    println!("incidentd {}", env!("CARGO_PKG_VERSION"));
    println!("Built with Rust {}", rustc_version::version()?);
    Ok(())
}
