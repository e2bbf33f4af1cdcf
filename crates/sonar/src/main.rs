//! Sonar
//!
//! Command-line front-end for search-behavior telemetry ingestion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sonar_ingest::backends::memory::{InMemoryDocumentStore, InMemorySessionRegistry};
use sonar_ingest::{
    BatchSubmission, DocumentStore, IngestError, IngestService, RegistryBackend, ServiceConfig,
    SessionRegistry, StoreBackend, init_logging,
};
use tracing::{info, warn};

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "sonar", version, about = "Search-behavior telemetry ingestion")]
struct Cli {
    #[command(flatten)]
    config: ServiceConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest batches from JSON files (`-` reads standard input).
    Ingest {
        /// Files holding one `{"queries": [...], "events": [...]}` batch each.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Manage sessions.
    #[command(subcommand)]
    Session(SessionCommand),

    /// Check that the registry and store answer.
    Health,
}

#[derive(Debug, Subcommand)]
enum SessionCommand {
    /// Start a session and print the client identifier to use.
    Start {
        /// Application name used in the client identifier.
        #[arg(long)]
        name: String,

        /// Application version used in the client identifier.
        #[arg(long = "app-version")]
        app_version: String,

        /// Wallet address to associate with the session.
        #[arg(long)]
        wallet: Option<String>,
    },

    /// Reset a session's time-to-live.
    Refresh {
        /// Session id.
        session_id: String,
    },

    /// End a session and drop its wallet association.
    End {
        /// Session id.
        session_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.config.log_level);

    if let Err(errors) = cli.config.validate() {
        for error in &errors {
            eprintln!("Configuration error: {}", error);
        }
        std::process::exit(1);
    }

    info!(
        registry = %cli.config.registry,
        store = %cli.config.store,
        "Starting Sonar"
    );

    let registry = build_registry(&cli.config).await?;
    let store = build_store(&cli.config).await?;
    let service = IngestService::start(Arc::new(cli.config.ingest_config()), registry, store);

    let ok = match cli.command {
        Command::Ingest { files } => ingest(&service, &files).await?,
        Command::Session(command) => {
            session(&service, command).await?;
            true
        }
        Command::Health => {
            let report = service.health().await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            report.is_healthy()
        }
    };

    let stats = service.shutdown().await;
    if stats.batches_queued > 0 {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

/// Submits every file's batch. Returns false if any batch was rejected.
async fn ingest(service: &IngestService, files: &[PathBuf]) -> anyhow::Result<bool> {
    let mut all_accepted = true;

    for path in files {
        let batch = read_batch(path)?;
        match service.ingest(batch).await {
            Ok(accepted) => {
                info!(
                    file = %path.display(),
                    queries = accepted.queries,
                    events = accepted.events,
                    "Batch accepted"
                );
            }
            Err(IngestError::Rejected(rejection)) => {
                warn!(file = %path.display(), reason = %rejection, "Batch rejected");
                eprintln!("{}: rejected: {}", path.display(), rejection);
                all_accepted = false;
            }
            Err(e) => return Err(e).with_context(|| format!("ingesting {}", path.display())),
        }
    }

    Ok(all_accepted)
}

fn read_batch(path: &Path) -> anyhow::Result<BatchSubmission> {
    let raw = if path.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin()).context("reading standard input")?
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn session(service: &IngestService, command: SessionCommand) -> anyhow::Result<()> {
    let sessions = service.sessions();
    match command {
        SessionCommand::Start {
            name,
            app_version,
            wallet,
        } => {
            let mut session = sessions.start().await?;
            if let Some(address) = wallet {
                sessions
                    .associate_wallet(&session.session_id, &address)
                    .await?;
                session = session.with_wallet(address);
            }
            let client_id = session.client_identifier(&name, &app_version)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "session": session,
                    "client_id": client_id.to_string(),
                }))?
            );
        }
        SessionCommand::Refresh { session_id } => {
            if sessions.refresh(&session_id).await? {
                println!("refreshed {}", session_id);
            } else {
                anyhow::bail!("session not found: {}", session_id);
            }
        }
        SessionCommand::End { session_id } => {
            sessions.end(&session_id).await?;
            println!("ended {}", session_id);
        }
    }
    Ok(())
}

async fn build_registry(config: &ServiceConfig) -> anyhow::Result<Arc<dyn SessionRegistry>> {
    match config.registry {
        RegistryBackend::Memory => Ok(Arc::new(InMemorySessionRegistry::new())),
        RegistryBackend::Redis => connect_redis(config).await,
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(config: &ServiceConfig) -> anyhow::Result<Arc<dyn SessionRegistry>> {
    use sonar_ingest::backends::redis::{RedisRegistryConfig, RedisSessionRegistry};

    let registry = RedisSessionRegistry::connect(RedisRegistryConfig {
        url: config.redis_url.clone(),
        command_timeout_ms: config.redis_timeout_ms,
    })
    .await?;
    Ok(Arc::new(registry))
}

/// Fallback when the redis feature is not enabled.
#[cfg(not(feature = "redis"))]
async fn connect_redis(_config: &ServiceConfig) -> anyhow::Result<Arc<dyn SessionRegistry>> {
    anyhow::bail!(
        "The redis registry requires the 'redis' feature. \
         Build with: cargo build -p sonar --features redis"
    )
}

async fn build_store(config: &ServiceConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match config.store {
        StoreBackend::Memory => Ok(Arc::new(InMemoryDocumentStore::new())),
        StoreBackend::Elasticsearch => connect_elasticsearch(config).await,
    }
}

#[cfg(feature = "elasticsearch")]
async fn connect_elasticsearch(config: &ServiceConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    use sonar_ingest::backends::elasticsearch::{
        ElasticsearchAuth, ElasticsearchConfig, ElasticsearchStore,
    };

    let auth = match (
        &config.elasticsearch_username,
        &config.elasticsearch_password,
    ) {
        (Some(username), Some(password)) => Some(ElasticsearchAuth::Basic {
            username: username.clone(),
            password: password.clone(),
        }),
        _ => None,
    };

    let nodes = config.elasticsearch_node_list();
    info!(
        nodes = ?nodes,
        index_prefix = %config.elasticsearch_index_prefix,
        "Initializing Elasticsearch store"
    );

    let store = ElasticsearchStore::new(ElasticsearchConfig {
        nodes,
        index_prefix: config.elasticsearch_index_prefix.clone(),
        request_timeout_ms: config.elasticsearch_timeout_ms,
        auth,
        ..Default::default()
    })?;
    store.initialize().await?;
    Ok(Arc::new(store))
}

/// Fallback when the elasticsearch feature is not enabled.
#[cfg(not(feature = "elasticsearch"))]
async fn connect_elasticsearch(_config: &ServiceConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    anyhow::bail!(
        "The elasticsearch store requires the 'elasticsearch' feature. \
         Build with: cargo build -p sonar --features elasticsearch"
    )
}
