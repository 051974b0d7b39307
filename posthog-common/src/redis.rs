use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::time::timeout;

/// Written by the worker every few seconds, in unix seconds.
pub const WORKER_HEARTBEAT_KEY: &str = "POSTHOG_HEARTBEAT";
/// Written by the plugin server, as an RFC 3339 timestamp.
pub const PLUGIN_SERVER_PING_KEY: &str = "@posthog-plugin-server/ping";

const REDIS_TIMEOUT_MILLISECS: u64 = 100;

#[derive(Error, Debug)]
pub enum RedisError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error("redis command timed out")]
    Timeout,
    #[error("mock redis is unavailable")]
    Unavailable,
}

/// The handful of redis commands the services rely on.
#[async_trait]
pub trait Client {
    async fn get(&self, key: String) -> Result<Option<String>, RedisError>;
    async fn set(&self, key: String, value: String) -> Result<(), RedisError>;
    async fn ping(&self) -> Result<(), RedisError>;
}

pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub fn new(addr: String) -> Result<RedisClient, RedisError> {
        let client = redis::Client::open(addr)?;

        Ok(RedisClient { client })
    }
}

#[async_trait]
impl Client for RedisClient {
    async fn get(&self, key: String) -> Result<Option<String>, RedisError> {
        let mut conn = self.client.get_async_connection().await?;

        let results = conn.get(key);
        timeout(Duration::from_millis(REDIS_TIMEOUT_MILLISECS), results)
            .await
            .map_err(|_| RedisError::Timeout)?
            .map_err(RedisError::from)
    }

    async fn set(&self, key: String, value: String) -> Result<(), RedisError> {
        let mut conn = self.client.get_async_connection().await?;

        let results = conn.set(key, value);
        timeout(Duration::from_millis(REDIS_TIMEOUT_MILLISECS), results)
            .await
            .map_err(|_| RedisError::Timeout)?
            .map_err(RedisError::from)
    }

    async fn ping(&self) -> Result<(), RedisError> {
        let mut conn = self.client.get_async_connection().await?;

        let mut cmd = redis::cmd("PING");
        let results = cmd.query_async::<_, String>(&mut conn);
        timeout(Duration::from_millis(REDIS_TIMEOUT_MILLISECS), results)
            .await
            .map_err(|_| RedisError::Timeout)??;
        Ok(())
    }
}

/// In-memory stand-in used by tests, clones share the same keyspace.
#[derive(Clone, Default)]
pub struct MockRedisClient {
    values: Arc<Mutex<HashMap<String, String>>>,
    unavailable: Arc<Mutex<bool>>,
}

impl MockRedisClient {
    pub fn new() -> MockRedisClient {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut flag) = self.unavailable.lock() {
            *flag = unavailable;
        }
    }

    fn check_available(&self) -> Result<(), RedisError> {
        match self.unavailable.lock() {
            Ok(flag) if !*flag => Ok(()),
            _ => Err(RedisError::Unavailable),
        }
    }
}

#[async_trait]
impl Client for MockRedisClient {
    async fn get(&self, key: String) -> Result<Option<String>, RedisError> {
        self.check_available()?;
        let values = self.values.lock().map_err(|_| RedisError::Unavailable)?;
        Ok(values.get(&key).cloned())
    }

    async fn set(&self, key: String, value: String) -> Result<(), RedisError> {
        self.check_available()?;
        let mut values = self.values.lock().map_err(|_| RedisError::Unavailable)?;
        values.insert(key, value);
        Ok(())
    }

    async fn ping(&self) -> Result<(), RedisError> {
        self.check_available()
    }
}
