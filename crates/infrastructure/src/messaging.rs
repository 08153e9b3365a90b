//! Messaging module - Domain event publication
//!
//! Committed evaluation events are published through an [`EventBus`].
//! [`RedisEventBus`] fans them out over Redis pub/sub, one channel per event
//! type; [`InMemoryEventBus`] keeps them in process for tests and embedded use.

use assessment_domain::DomainEvent;
use async_trait::async_trait;
use futures::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, instrument, warn};

use crate::{Error, Result};

const DEFAULT_CHANNEL_PREFIX: &str = "assessment:events:";

/// Capacity of the in-process broadcast channel
const IN_MEMORY_CAPACITY: usize = 1024;

/// Publishes committed domain events
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> Result<()>;
}

/// Messaging configuration.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// Redis connection URL
    pub url: String,
    /// Channel prefix for all messages
    pub channel_prefix: String,
    /// Maximum message size in bytes
    pub max_message_size: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            channel_prefix: DEFAULT_CHANNEL_PREFIX.to_string(),
            max_message_size: 1024 * 1024, // 1MB
        }
    }
}

impl MessagingConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://localhost:6379".to_string());

        let channel_prefix = std::env::var("EVENT_CHANNEL_PREFIX")
            .unwrap_or_else(|_| DEFAULT_CHANNEL_PREFIX.to_string());

        Ok(Self {
            url,
            channel_prefix,
            ..Default::default()
        })
    }

    /// Build the full channel name for an event type.
    pub fn channel(&self, event_type: &str) -> String {
        format!("{}{}", self.channel_prefix, event_type)
    }
}

impl From<&assessment_common::RedisConfig> for MessagingConfig {
    fn from(config: &assessment_common::RedisConfig) -> Self {
        Self {
            url: config.url.clone(),
            channel_prefix: format!("{}:events:", config.channel_prefix),
            ..Default::default()
        }
    }
}

/// Redis pub/sub event bus.
pub struct RedisEventBus {
    client: Client,
    connection: ConnectionManager,
    config: MessagingConfig,
}

impl RedisEventBus {
    /// Connect to Redis.
    #[instrument(skip(config))]
    pub async fn new(config: MessagingConfig) -> Result<Self> {
        info!(url = %config.url, "Initializing Redis event bus");

        let client = Client::open(config.url.clone()).map_err(Error::Redis)?;

        let connection = ConnectionManager::new(client.clone())
            .await
            .map_err(Error::Redis)?;

        info!("Redis event bus initialized successfully");
        Ok(Self {
            client,
            connection,
            config,
        })
    }

    fn conn(&self) -> ConnectionManager {
        self.connection.clone()
    }

    /// Receive events of one type as they are published.
    ///
    /// The listener task stops when the returned receiver is dropped.
    #[instrument(skip(self))]
    pub async fn subscribe(&self, event_type: &str) -> Result<mpsc::Receiver<DomainEvent>> {
        let channel = self.config.channel(event_type);
        let (tx, rx) = mpsc::channel(100);
        let client = self.client.clone();
        let channel_owned = channel.clone();

        tokio::spawn(async move {
            let conn = match client.get_async_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "Failed to get pubsub connection");
                    return;
                }
            };

            let mut pubsub = conn.into_pubsub();
            if let Err(e) = pubsub.subscribe(&channel_owned).await {
                error!(error = %e, channel = %channel_owned, "Failed to subscribe");
                return;
            }

            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(error = %e, "Failed to get message payload");
                        continue;
                    }
                };

                match serde_json::from_str::<DomainEvent>(&payload) {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to deserialize event"),
                }
            }
        });

        debug!(channel = %channel, "Subscribed to channel");
        Ok(rx)
    }
}

#[async_trait]
impl EventBus for RedisEventBus {
    #[instrument(skip(self, event), fields(event_type = %event.event_type, aggregate_id = %event.aggregate_id))]
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let channel = self.config.channel(&event.event_type);
        let serialized = serde_json::to_string(event).map_err(Error::Serialization)?;

        if serialized.len() > self.config.max_message_size {
            return Err(Error::Messaging(format!(
                "Message size {} exceeds maximum {}",
                serialized.len(),
                self.config.max_message_size
            )));
        }

        let mut conn = self.conn();
        let subscribers: i32 = conn
            .publish(&channel, &serialized)
            .await
            .map_err(Error::Redis)?;

        debug!(
            channel = %channel,
            event_id = %event.id,
            subscribers = subscribers,
            "Event published"
        );
        Ok(())
    }
}

impl std::fmt::Debug for RedisEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisEventBus")
            .field("config", &self.config)
            .finish()
    }
}

/// In-process event bus backed by a broadcast channel.
///
/// Publishing succeeds whether or not anyone is subscribed.
#[derive(Debug, Clone)]
pub struct InMemoryEventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(IN_MEMORY_CAPACITY);
        Self { sender }
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        let receivers = self.sender.send(event.clone()).unwrap_or(0);
        debug!(event_type = %event.event_type, receivers, "Event published in process");
        Ok(())
    }
}
