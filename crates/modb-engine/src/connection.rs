//! Connection pool lifecycle: one native driver pool per configured
//! cluster URL, shared across every operation against that URL.
//!
//! The engine never implements its own pooling — `mongodb::Client` already
//! pools connections internally. This module only adds a process-wide
//! registry so repeated calls against the same URL reuse one `Client`
//! instead of opening a new pool per call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use mongodb::options::{ClientOptions, ServerApi, ServerApiVersion};
use mongodb::{Client, Collection, Database};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use bson::Document as BsonDocument;
use modb_common::EngineError;

use crate::converter::PARALLEL_THRESHOLD;

/// Pool configuration, passed at pool creation (spec §6).
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
    pub connect_timeout_ms: Option<u64>,
    pub socket_timeout_ms: Option<u64>,
    /// Batch size above which encode/decode parallelises; overrides the
    /// crate-wide default for pools created with this config.
    pub parallel_threshold: Option<usize>,
    pub app_name: Option<String>,
}

/// A live connection to one MongoDB cluster/database, plus the
/// pool-specific settings that apply to operations routed through it.
pub struct Connection {
    client: Client,
    database: Database,
    parallel_threshold: usize,
}

impl Connection {
    #[tracing::instrument(skip(url, config), fields(max_pool_size = ?config.max_pool_size))]
    async fn connect(url: &str, config: &PoolConfig) -> Result<Self, EngineError> {
        let mut options = ClientOptions::parse(url).await.map_err(EngineError::driver)?;

        if let Some(max) = config.max_pool_size {
            options.max_pool_size = Some(max);
        }
        if let Some(min) = config.min_pool_size {
            options.min_pool_size = Some(min);
        }
        if let Some(ms) = config.connect_timeout_ms {
            options.connect_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = config.socket_timeout_ms {
            options.server_selection_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(name) = &config.app_name {
            options.app_name = Some(name.clone());
        }
        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        options.server_api = Some(server_api);

        let client = Client::with_options(options).map_err(EngineError::driver)?;
        let database = client
            .default_database()
            .ok_or_else(|| EngineError::driver("connection URL does not specify a default database"))?;

        tracing::info!(database = database.name(), "connected to MongoDB cluster");
        Ok(Self {
            client,
            database,
            parallel_threshold: config.parallel_threshold.unwrap_or(PARALLEL_THRESHOLD),
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }

    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }
}

fn normalise_url(url: &str) -> String {
    url.trim().to_string()
}

static POOLS: Lazy<RwLock<HashMap<String, Arc<Connection>>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the pool for `url`, constructing it on first use. Subsequent
/// calls with the same normalised URL reuse the existing `Client` and its
/// internal connection pool.
pub async fn get_or_connect(url: &str, config: PoolConfig) -> Result<Arc<Connection>, EngineError> {
    let key = normalise_url(url);

    if let Some(existing) = POOLS.read().get(&key) {
        return Ok(existing.clone());
    }

    let connection = Arc::new(Connection::connect(&key, &config).await?);
    // Another caller may have raced us to insert for this key; last writer
    // wins, matching the schema cache's overwrite-on-duplicate policy.
    POOLS.write().insert(key.clone(), connection.clone());
    Ok(POOLS.read().get(&key).cloned().unwrap_or(connection))
}

/// Drops a pool from the registry, closing its underlying client the next
/// time nothing else holds a reference to it.
pub fn disconnect(url: &str) {
    if POOLS.write().remove(&normalise_url(url)).is_some() {
        tracing::info!("disconnected from MongoDB cluster");
    }
}

/// Drops every registered pool. Used at process shutdown / test teardown.
pub fn disconnect_all() {
    let mut pools = POOLS.write();
    let count = pools.len();
    pools.clear();
    tracing::info!(count, "disconnected all MongoDB pools");
}

pub fn is_connected(url: &str) -> bool {
    POOLS.read().contains_key(&normalise_url(url))
}
