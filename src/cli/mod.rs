//! CLI interface for incidentd.
//!
//! One binary serves incidents and acts as a client against a running server.

mod commands;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

pub use commands::*;
pub use utils::*;

#[derive(Parser)]
#[command(name = "incidentd")]
#[command(about = "Incident management service grouping alerts into incidents")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Configuration file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Tenant to act as (required when the server runs with tenant auth)
    #[arg(long, global = true, env = "INCIDENTD_TENANT")]
    pub tenant: Option<String>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the incidentd JSON-RPC server
    Serve {
        /// "stdio" or "socket"
        #[arg(long, short = 't')]
        transport: Option<String>,

        /// Unix socket path (used when transport = "socket")
        #[arg(long, short = 's')]
        socket_path: Option<String>,

        /// Inline JSON settings (replaces the config file)
        #[arg(long, short = 'j')]
        config_json: Option<String>,
    },

    /// Remember a server socket for subsequent commands
    Connect { socket_path: String },

    /// Forget the remembered server
    Disconnect,

    /// Check that a server answers (exits non-zero otherwise)
    Health {
        /// Socket to check instead of the remembered connection
        #[arg(long, short = 's')]
        socket_path: Option<String>,
    },

    /// Call any JSON-RPC method (requires active connection)
    Call {
        method: String,

        #[arg(long, short = 'p', conflicts_with = "params_json")]
        params_file: Option<PathBuf>,

        #[arg(long, short = 'j', conflicts_with = "params_file")]
        params_json: Option<String>,

        /// Print incident notifications received while waiting
        #[arg(long)]
        follow: bool,
    },

    /// List incidents (requires active connection)
    List {
        #[arg(long = "status")]
        statuses: Vec<String>,

        #[arg(long = "severity")]
        severities: Vec<String>,

        /// Wildcard on the incident name, e.g. "db*"
        #[arg(long)]
        search: Option<String>,

        /// Sort field, prefix with '-' for descending
        #[arg(long, allow_hyphen_values = true)]
        sort: Option<String>,

        #[arg(long, default_value_t = 25)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// Show predicted incidents awaiting confirmation
        #[arg(long)]
        predicted: bool,
    },

    /// Show one incident (requires active connection)
    Get { incident_id: Uuid },

    /// Delete an incident (requires active connection)
    Delete { incident_id: Uuid },

    /// Show available filter values (requires active connection)
    Meta,

    /// Initialize default configuration at default location
    Init {
        #[arg(long)]
        force: bool,
    },

    /// Manage configuration
    Config {
        #[arg(long)]
        show: bool,

        #[arg(long)]
        validate: bool,

        #[arg(long)]
        edit: bool,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Run the CLI command
    pub async fn run(self) -> Result<()> {
        let Cli {
            command,
            log_level,
            config: config_path,
            tenant,
        } = self;

        match command {
            Commands::Serve {
                transport,
                socket_path,
                config_json,
            } => {
                let overrides = ServeOverrides {
                    transport,
                    socket_path,
                    log_level,
                };
                serve(config_path, config_json, overrides).await
            }

            Commands::Connect { socket_path } => connect(socket_path).await,
            Commands::Disconnect => disconnect().await,
            Commands::Health { socket_path } => health(socket_path).await,

            Commands::Call {
                method,
                params_file,
                params_json,
                follow,
            } => call(method, params_file, params_json, follow, tenant).await,

            Commands::List {
                statuses,
                severities,
                search,
                sort,
                limit,
                offset,
                predicted,
            } => {
                let query = build_list_query(ListArgs {
                    statuses,
                    severities,
                    search,
                    sort,
                    limit,
                    offset,
                    predicted,
                });
                list(query, tenant).await
            }

            Commands::Get { incident_id } => get(incident_id, tenant).await,
            Commands::Delete { incident_id } => delete(incident_id, tenant).await,
            Commands::Meta => meta(tenant).await,

            Commands::Init { force } => init(config_path, force).await,
            Commands::Config {
                show,
                validate,
                edit,
            } => config(config_path, show, validate, edit).await,

            Commands::Version => version().await,
        }
    }
}
