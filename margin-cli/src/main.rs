//! Margin CLI - inspect and maintain sessions and annotations
//!
//! Annotations and the river live in the configured SQLite database. Sessions
//! use whichever backend the configuration names.

use clap::{Parser, Subcommand};
use margin_annotations::{
    AccessLevel, Annotation, Extender, ExtenderServices, Persistable, RiverEntry, RiverStore,
    SqliteExtenderRepository, SqliteRiverStore, ValueType,
};
use margin_core::{
    config_error, init_logging, log_operation_error, log_operation_start, log_operation_success,
    not_found_error, ErrorContext, Guid, MarginConfig, MarginError, MarginResult, MemoryDirectory,
    SessionBackendKind, User,
};
use margin_session::{FileBackend, SessionBackend, SessionManager, SessionServices, SqliteBackend};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "margin")]
#[command(about = "Session and annotation maintenance for Margin")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach an annotation to an entity
    Annotate {
        /// Entity the annotation belongs to
        entity: Guid,

        /// Annotation name, e.g. rating or generic_comment
        name: String,

        value: String,

        /// integer or text; detected from the value when omitted
        #[arg(long)]
        value_type: Option<ValueType>,

        /// Guid of the author
        #[arg(long)]
        owner: Guid,

        /// Access id (0 private, 1 logged in, 2 public, -2 friends)
        #[arg(long, default_value = "0", allow_negative_numbers = true)]
        access: i64,

        /// Also post a river item with this action type
        #[arg(long)]
        river: Option<String>,
    },

    /// Print an annotation, or every annotation on an entity
    Show {
        /// Annotation id
        id: Option<i64>,

        #[arg(long, conflicts_with = "id")]
        entity: Option<Guid>,
    },

    /// Delete an annotation and its river items
    Delete { id: i64 },

    /// Hide an annotation without deleting it
    Disable { id: i64 },

    /// Restore a disabled annotation
    Enable { id: i64 },

    /// Session maintenance
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Write a default configuration file
        #[arg(long)]
        init: bool,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// Start a fresh session and print its id, token and cookie
    New {
        /// Bind this user guid to the session
        #[arg(long)]
        user: Option<Guid>,
    },

    /// Print the attributes stored under a session id
    Show { id: String },

    /// Remove expired sessions
    Gc,
}

#[tokio::main]
async fn main() -> MarginResult<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;

    let mut logging_config = config.logging.clone();
    if cli.verbose {
        logging_config.level = "debug".to_string();
    }

    init_logging(&logging_config).map_err(|e| MarginError::Config {
        message: format!("Failed to initialize logging: {}", e),
        source: Some(e),
        context: ErrorContext::new("cli")
            .with_operation("init_logging")
            .with_suggestion("Check logging configuration"),
    })?;

    info!("Starting Margin CLI v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Annotate {
            entity,
            name,
            value,
            value_type,
            owner,
            access,
            river,
        } => {
            handle_annotate(
                entity, name, value, value_type, owner, access, river, &config,
            )
            .await?;
        }
        Commands::Show { id, entity } => {
            handle_show(id, entity, &config).await?;
        }
        Commands::Delete { id } => {
            handle_delete(id, &config).await?;
        }
        Commands::Disable { id } => {
            handle_set_enabled(id, false, &config).await?;
        }
        Commands::Enable { id } => {
            handle_set_enabled(id, true, &config).await?;
        }
        Commands::Session { command } => match command {
            SessionCommands::New { user } => handle_session_new(user, &config).await?,
            SessionCommands::Show { id } => handle_session_show(id, &config).await?,
            SessionCommands::Gc => handle_session_gc(&config).await?,
        },
        Commands::Config { show, init } => {
            handle_config(show, init, &config)?;
        }
    }

    Ok(())
}

fn load_config(config_path: Option<&PathBuf>) -> MarginResult<MarginConfig> {
    if let Some(path) = config_path {
        return MarginConfig::from_file(path);
    }

    let default_paths = [
        dirs::config_dir().map(|d| d.join("margin").join("config.toml")),
        dirs::home_dir().map(|d| d.join(".margin").join("config.toml")),
        Some(PathBuf::from("margin.toml")),
    ];

    for path in default_paths.iter().flatten() {
        if path.exists() {
            return MarginConfig::from_file(path);
        }
    }

    Ok(MarginConfig::default())
}

fn default_config_path() -> MarginResult<PathBuf> {
    dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|d| d.join(".config")))
        .map(|d| d.join("margin").join("config.toml"))
        .ok_or_else(|| config_error!("Could not determine a configuration directory", "cli"))
}

async fn connect(config: &MarginConfig) -> MarginResult<SqlitePool> {
    SqlitePool::connect(&config.database.url)
        .await
        .map_err(|e| MarginError::Storage {
            message: format!("Failed to connect to {}: {}", config.database.url, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("cli")
                .with_operation("connect")
                .with_suggestion("Check database.url in your configuration"),
        })
}

async fn annotation_services(config: &MarginConfig) -> MarginResult<ExtenderServices> {
    let pool = connect(config).await?;
    Ok(ExtenderServices::new(
        Arc::new(SqliteExtenderRepository::new(pool.clone()).await?),
        Arc::new(SqliteRiverStore::new(pool).await?),
        MemoryDirectory::new(),
    ))
}

async fn load_annotation(services: &ExtenderServices, id: i64) -> MarginResult<Annotation> {
    Annotation::object_from_id(services, id)
        .await?
        .ok_or_else(|| not_found_error!(format!("annotation {}", id), "cli"))
}

fn print_annotation(annotation: &Annotation) -> MarginResult<()> {
    println!("{}", serde_json::to_string_pretty(annotation.attributes())?);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_annotate(
    entity: Guid,
    name: String,
    value: String,
    value_type: Option<ValueType>,
    owner: Guid,
    access: i64,
    river: Option<String>,
    config: &MarginConfig,
) -> MarginResult<()> {
    log_operation_start!("annotate", entity, name = %name);
    let services = annotation_services(config).await?;

    let mut annotation = Annotation::new();
    {
        let attributes = annotation.attributes_mut();
        attributes.entity_guid = entity;
        attributes.owner_guid = owner;
        attributes.name = name;
        attributes.value_type = value_type.unwrap_or_else(|| ValueType::detect(&value));
        attributes.value = value;
        attributes.access = AccessLevel::from(access);
    }

    let id = annotation.save(&services).await.map_err(|e| {
        log_operation_error!("annotate", e, entity);
        e
    })?;

    if let Some(action_type) = river {
        services
            .river
            .add_entry(RiverEntry::new(action_type, owner, entity).with_annotation(id))
            .await?;
    }

    log_operation_success!("annotate", id);
    print_annotation(&annotation)
}

async fn handle_show(id: Option<i64>, entity: Option<Guid>, config: &MarginConfig) -> MarginResult<()> {
    let services = annotation_services(config).await?;

    match (id, entity) {
        (Some(id), _) => print_annotation(&load_annotation(&services, id).await?),
        (None, Some(entity)) => {
            for annotation in Annotation::for_entity(&services, entity).await? {
                print_annotation(&annotation)?;
            }
            Ok(())
        }
        (None, None) => Err(config_error!("Pass an annotation id or --entity", "cli")),
    }
}

async fn handle_delete(id: i64, config: &MarginConfig) -> MarginResult<()> {
    let services = annotation_services(config).await?;
    let mut annotation = load_annotation(&services, id).await?;

    if annotation.delete(&services).await {
        println!("Deleted annotation {}", id);
    } else {
        warn!(id, "Annotation could not be deleted");
        println!("Annotation {} was not deleted", id);
    }
    Ok(())
}

async fn handle_set_enabled(id: i64, enabled: bool, config: &MarginConfig) -> MarginResult<()> {
    let services = annotation_services(config).await?;
    let mut annotation = load_annotation(&services, id).await?;

    let changed = if enabled {
        annotation.enable(&services).await
    } else {
        annotation.disable(&services).await
    };

    let state = if enabled { "enabled" } else { "disabled" };
    if changed {
        println!("Annotation {} {}", id, state);
    } else {
        println!("Annotation {} could not be {}", id, state);
    }
    Ok(())
}

async fn handle_session_new(user: Option<Guid>, config: &MarginConfig) -> MarginResult<()> {
    if config.session.backend == SessionBackendKind::Memory {
        warn!("The memory session backend keeps nothing once this command exits");
    }

    let session = SessionManager::from_config(config, SessionServices::default()).await?;
    session.start().await?;

    if let Some(guid) = user {
        session
            .set_logged_in_user(User::new(guid, format!("user{}", guid)))
            .await;
    }
    session.save().await?;

    println!("id:     {}", session.id().await);
    println!("token:  {}", session.csrf_token().await.unwrap_or_default());
    println!("cookie: {}", session.cookie_header().await);
    Ok(())
}

async fn handle_session_show(id: String, config: &MarginConfig) -> MarginResult<()> {
    let session = SessionManager::from_config(config, SessionServices::default()).await?;
    session.set_id(id).await?;
    session.start().await?;

    println!("{}", serde_json::to_string_pretty(&session.all().await)?);
    Ok(())
}

async fn handle_session_gc(config: &MarginConfig) -> MarginResult<()> {
    config.validate()?;
    let lifetime = Duration::from_secs(config.session.lifetime_secs);

    let removed = match config.session.backend {
        SessionBackendKind::Memory => 0,
        SessionBackendKind::Database => {
            let pool = connect(config).await?;
            SqliteBackend::new(pool, lifetime).await?.gc().await?
        }
        SessionBackendKind::Files => {
            let save_path = config
                .session
                .save_path
                .as_ref()
                .ok_or_else(|| config_error!("session.save_path is not set", "cli"))?;
            FileBackend::new(save_path, lifetime)?.gc().await?
        }
    };

    println!("Removed {} expired sessions", removed);
    Ok(())
}

fn handle_config(show: bool, init: bool, config: &MarginConfig) -> MarginResult<()> {
    if init {
        let path = default_config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        MarginConfig::default().save_to_file(&path)?;
        println!("Configuration initialized at: {:?}", path);
    }

    if show {
        let rendered = toml::to_string_pretty(config).map_err(|e| {
            config_error!(format!("Failed to render configuration: {}", e), "cli")
        })?;
        println!("{}", rendered);
    }

    Ok(())
}
