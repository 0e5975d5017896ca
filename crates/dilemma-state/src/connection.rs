//! SurrealDB connection setup
//!
//! Supports in-memory, local (SurrealKV), URL and cloud (WebSocket) connections.

use crate::error::StateError;
use crate::migrations;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::info;

const DEFAULT_NAMESPACE: &str = "dilemma";
const DEFAULT_DATABASE: &str = "arena";
const LOCAL_DB_PATH: &str = ".dilemma/db";

/// Credentials for a hosted SurrealDB instance.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Sign in as root instead of as a database user
    pub is_root: bool,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl CloudConfig {
    /// Database-user credentials against the `dilemma/arena` defaults.
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    /// `SURREALDB_ENDPOINT`, `SURREALDB_USERNAME` and `SURREALDB_PASSWORD`
    /// are required; namespace, database and `SURREALDB_ROOT` fall back to
    /// the defaults.
    pub fn from_env() -> std::result::Result<Self, String> {
        let required = |key: &str| std::env::var(key).map_err(|_| format!("{key} not set"));
        let mut config = Self::new(
            required("SURREALDB_ENDPOINT")?,
            required("SURREALDB_USERNAME")?,
            required("SURREALDB_PASSWORD")?,
        );
        config.namespace = env_or("SURREALDB_NAMESPACE", DEFAULT_NAMESPACE);
        config.database = env_or("SURREALDB_DATABASE", DEFAULT_DATABASE);
        config.is_root = env_or("SURREALDB_ROOT", "false").eq_ignore_ascii_case("true");
        Ok(config)
    }
}

/// Open `url`, select the default namespace/database and run migrations.
pub(crate) async fn connect_url(url: &str) -> Result<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StateError::Connection(e.to_string()))?;

    migrations::init_schema(&db).await?;
    Ok(db)
}

/// Connect to SurrealDB Cloud and run migrations.
pub(crate) async fn connect_cloud(config: &CloudConfig) -> Result<Surreal<Any>> {
    info!("Connecting to SurrealDB Cloud (root={})", config.is_root);

    let db = surrealdb::engine::any::connect(&config.endpoint)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    if config.is_root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("Root auth failed: {e}")))?;
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
        .map_err(|e| StateError::Connection(format!("DB auth failed: {e}")))?;
    }

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| {
            StateError::Connection(format!("Failed to select namespace/database: {}", e))
        })?;

    migrations::init_schema(&db).await?;
    Ok(db)
}

/// Cloud credentials, then `SURREALDB_URL`, then a local SurrealKV store.
pub(crate) async fn connect_from_env() -> Result<Surreal<Any>> {
    if let Ok(config) = CloudConfig::from_env() {
        return connect_cloud(&config).await;
    }

    if let Ok(url) = std::env::var("SURREALDB_URL") {
        info!(url = %url, "connecting to SURREALDB_URL");
        return connect_url(&url).await;
    }

    std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
        StateError::Connection(format!(
            "Failed to create database directory {}: {}",
            LOCAL_DB_PATH, e
        ))
    })?;
    let url = format!("surrealkv://{}", LOCAL_DB_PATH);
    info!(url = %url, "using local arena database");
    connect_url(&url).await
}
