//! CLI utility functions.

use anyhow::Result;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use crate::client::JsonRpcNotification;
use crate::config::Settings;
use crate::jsonrpc::methods::{INCIDENT_CHANGE_NOTIFICATION, INCIDENT_WORKFLOW_NOTIFICATION};

/// Flags on `serve` that take precedence over file and environment
#[derive(Debug, Clone, Default)]
pub struct ServeOverrides {
    pub transport: Option<String>,
    pub socket_path: Option<String>,
    pub log_level: Option<String>,
}

/// Filters given to `list`
#[derive(Debug, Clone, Default)]
pub struct ListArgs {
    pub statuses: Vec<String>,
    pub severities: Vec<String>,
    pub search: Option<String>,
    pub sort: Option<String>,
    pub limit: u32,
    pub offset: u64,
    pub predicted: bool,
}

/// Load request parameters from file or inline JSON
pub fn load_request_params(
    params_file: Option<PathBuf>,
    params_json: Option<String>,
    command_name: &str,
) -> Result<Value> {
    match (params_file, params_json) {
        (Some(path), None) => {
            if !path.exists() {
                anyhow::bail!("Parameters file not found: {}", path.display());
            }
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)
                .map_err(|e| anyhow::anyhow!("Failed to parse JSON from {}: {}", path.display(), e))
        }
        (None, Some(json_str)) => serde_json::from_str(&json_str)
            .map_err(|e| anyhow::anyhow!("Failed to parse inline JSON: {}", e)),
        (None, None) => {
            info!("No parameters provided for {}, sending an empty object", command_name);
            Ok(json!({}))
        }
        (Some(_), Some(_)) => {
            anyhow::bail!("Cannot use both --params-file and --params-json");
        }
    }
}

/// Resolve settings with precedence CLI > environment > file > defaults
pub fn load_settings(
    config_path: Option<PathBuf>,
    config_json: Option<String>,
    overrides: &ServeOverrides,
) -> Result<Settings> {
    let mut settings = match (config_json, config_path) {
        (Some(json_str), _) => {
            info!("Using inline JSON configuration");
            let mut settings: Settings = serde_json::from_str(&json_str)
                .map_err(|e| anyhow::anyhow!("Failed to parse config JSON: {}", e))?;
            settings.apply_env_overrides()?;
            settings
        }
        (None, Some(path)) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            info!("Using config file: {}", path.display());
            Settings::load(Some(&path))?
        }
        (None, None) => Settings::load(None)?,
    };

    apply_serve_overrides(&mut settings, overrides);
    settings.validate()?;
    Ok(settings)
}

pub fn apply_serve_overrides(settings: &mut Settings, overrides: &ServeOverrides) {
    if let Some(transport) = &overrides.transport {
        settings.server.transport = transport.clone();
    }
    if let Some(socket_path) = &overrides.socket_path {
        settings.server.socket_path = Some(socket_path.clone());
    }
    if let Some(level) = &overrides.log_level {
        settings.server.log_level = level.clone();
    }
}

/// Build `incidents/list` params from CLI filters
pub fn build_list_query(args: ListArgs) -> Value {
    let mut query = json!({
        "limit": args.limit,
        "offset": args.offset,
    });

    if !args.statuses.is_empty() {
        query["statuses"] = json!(args.statuses);
    }
    if !args.severities.is_empty() {
        query["severities"] = json!(args.severities);
    }
    if let Some(search) = args.search {
        query["search"] = json!(search);
    }
    if let Some(sort) = args.sort {
        query["sorting"] = json!(sort);
    }
    if args.predicted {
        query["confirmed"] = json!(false);
        query["predicted"] = json!(true);
    }
    query
}

/// Print a JSON-RPC notification to stdout
pub fn print_notification(notification: &JsonRpcNotification) {
    let params = notification.params.as_ref();
    match notification.method.as_str() {
        INCIDENT_CHANGE_NOTIFICATION => {
            let channel = params
                .and_then(|p| p.get("channel"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let incident = params
                .and_then(|p| p.get("incident_id"))
                .and_then(Value::as_str)
                .unwrap_or("*");
            println!("[incident-change] {} {}", channel, incident);
        }
        INCIDENT_WORKFLOW_NOTIFICATION => {
            let action = params
                .and_then(|p| p.get("action"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            let incident = params
                .and_then(|p| p.pointer("/incident/id"))
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            println!("[workflow] {} {}", action, incident);
        }
        _ => {
            println!("[{}]", notification.method);
            if let Some(params) = params {
                if let Ok(formatted) = serde_json::to_string_pretty(params) {
                    for line in formatted.lines() {
                        println!("  {}", line);
                    }
                }
            }
        }
    }
}
