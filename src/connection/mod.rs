//! Connection management for MongoDB
//!
//! This module provides:
//! - Connection establishment with retries
//! - Health checks via `ping` on connect
//! - Database resolution from configuration or the URI
//! - Opening the export cursor as a [`CursorStreamingQuery`]

use mongodb::bson::doc;
use mongodb::{Client, Database, options::ClientOptions};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{ConnectionConfig, sanitize_uri};
use crate::error::{ExportError, Result, RetrievalError};
use crate::export::request::ExportRequest;
use crate::export::streaming::CursorStreamingQuery;

/// Delay before the first retry; doubled on every further attempt
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Connection state information
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,

    /// Connected and ready
    Connected,

    /// Connection failed
    Failed(String),
}

/// MongoDB connection manager
pub struct ConnectionManager {
    /// MongoDB client instance
    client: Option<Client>,

    /// Connection configuration
    config: ConnectionConfig,

    /// Current connection state
    state: ConnectionState,

    /// Database named in the URI, if any
    default_database: Option<String>,
}

impl ConnectionManager {
    /// Create a new connection manager
    ///
    /// # Arguments
    /// * `config` - Connection configuration
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            client: None,
            config,
            state: ConnectionState::Disconnected,
            default_database: None,
        }
    }

    /// Establish connection to MongoDB
    ///
    /// Retries up to `retry_attempts` times with exponential backoff.
    /// The connection is verified with a `ping`.
    pub async fn connect(&mut self) -> Result<()> {
        let options = self.client_options().await?;
        self.default_database = options.default_database.clone();

        let attempts = self.config.retry_attempts.max(1);
        let mut delay = RETRY_BASE_DELAY;
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!(
                "Connecting to {} (attempt {}/{})",
                sanitize_uri(&self.config.uri),
                attempt,
                attempts
            );

            match Self::try_connect(options.clone()).await {
                Ok(client) => {
                    info!("Connected to MongoDB at {}", sanitize_uri(&self.config.uri));
                    self.client = Some(client);
                    self.state = ConnectionState::Connected;
                    return Ok(());
                }
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no connection attempt made".to_string());
        self.state = ConnectionState::Failed(message.clone());
        Err(RetrievalError::ConnectionFailed(message).into())
    }

    async fn client_options(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(self.config.uri.as_str())
            .await
            .map_err(|e| RetrievalError::ConnectionFailed(ExportError::from(e).to_string()))?;

        let timeout = Duration::from_secs(self.config.timeout);
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options.max_pool_size = Some(self.config.max_pool_size);
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        Ok(options)
    }

    async fn try_connect(options: ClientOptions) -> Result<Client> {
        let client = Client::with_options(options)?;
        let start = Instant::now();
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        debug!("MongoDB ping round trip: {}ms", start.elapsed().as_millis());
        Ok(client)
    }

    /// Disconnect from MongoDB
    pub async fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            info!("Disconnected from MongoDB");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// Get the MongoDB client
    pub fn get_client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| RetrievalError::NotConnected.into())
    }

    /// Get current connection state
    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Name of the database to export from
    ///
    /// The configured database wins over the one named in the URI.
    pub fn database_name(&self) -> Result<String> {
        resolve_database(self.config.database.as_deref(), self.default_database.as_deref())
    }

    /// Get a database handle
    pub fn get_database(&self, name: &str) -> Result<Database> {
        Ok(self.get_client()?.database(name))
    }

    /// Open the export cursor for a request
    ///
    /// # Returns
    /// * `Result<CursorStreamingQuery>` - Batched query over the matching documents
    pub async fn open_query(&self, request: &ExportRequest) -> Result<CursorStreamingQuery> {
        let database = self.get_database(&self.database_name()?)?;
        let collection = database.collection::<mongodb::bson::Document>(request.collection());

        debug!(
            "Opening cursor on {}.{} with filter {}",
            database.name(),
            request.collection(),
            request.filter_text()
        );

        let cursor = collection
            .find(request.filter().clone())
            .batch_size(request.batch_size())
            .await
            .map_err(|e| RetrievalError::QueryFailed(ExportError::from(e).to_string()))?;

        Ok(CursorStreamingQuery::new(
            cursor,
            request.batch_size(),
            request.collection(),
        ))
    }
}

/// Pick the database to use from configuration and URI
fn resolve_database(configured: Option<&str>, from_uri: Option<&str>) -> Result<String> {
    configured
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .or(from_uri)
        .map(str::to_string)
        .ok_or_else(|| {
            crate::error::ConfigError::MissingField("connection.database".to_string()).into()
        })
}
