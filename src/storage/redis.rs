// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis set store.
//!
//! One Redis SET per model, holding the canonical JSON of each cached row:
//!
//! ```text
//! SADD     myapp:user '{"id":1,"name":"alice"}'
//! SMEMBERS myapp:user
//! SREM     myapp:user '{"id":1,"name":"alice"}'
//! ```
//!
//! Reads and removals are retried with [`RetryConfig::command`]. Additions are
//! retried too; SADD is idempotent, so a retry after a lost reply is harmless.

use super::traits::{SetStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client};
use tracing::info;

pub struct RedisSetStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "myapp:" → "myapp:user")
    prefix: String,
}

impl RedisSetStore {
    /// Connect without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Connect with an optional key prefix.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use dbflow::storage::redis::RedisSetStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Sets will be named "myapp:user", "myapp:post", ...
    /// let store = RedisSetStore::with_prefix("redis://localhost", Some("myapp:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string).map_err(|e| StorageError::Backend(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::connect(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    /// Connect and log an info line once the connection is up.
    pub async fn connect_announced(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let store = Self::with_prefix(connection_string, prefix).await?;
        info!(prefix = %store.prefix, "Connected to Redis");
        Ok(store)
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl SetStore for RedisSetStore {
    async fn add_members(&self, set: &str, members: &[String]) -> Result<usize, StorageError> {
        if members.is_empty() {
            return Ok(0);
        }
        let key = self.prefixed_key(set);
        retry("redis_sadd", &RetryConfig::command(), || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            async move {
                cmd("SADD")
                    .arg(&key)
                    .arg(members)
                    .query_async::<usize>(&mut conn)
                    .await
            }
        })
        .await
        .map_err(|e| StorageError::Backend(format!("Failed to add set members: {}", e)))
    }

    async fn remove_members(&self, set: &str, members: &[String]) -> Result<usize, StorageError> {
        if members.is_empty() {
            return Ok(0);
        }
        let key = self.prefixed_key(set);
        retry("redis_srem", &RetryConfig::command(), || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            async move {
                cmd("SREM")
                    .arg(&key)
                    .arg(members)
                    .query_async::<usize>(&mut conn)
                    .await
            }
        })
        .await
        .map_err(|e| StorageError::Backend(format!("Failed to remove set members: {}", e)))
    }

    async fn list_members(&self, set: &str) -> Result<Vec<String>, StorageError> {
        let key = self.prefixed_key(set);
        retry("redis_smembers", &RetryConfig::command(), || {
            let mut conn = self.connection.clone();
            let key = key.clone();
            async move { cmd("SMEMBERS").arg(&key).query_async::<Vec<String>>(&mut conn).await }
        })
        .await
        .map_err(|e| StorageError::Backend(format!("Failed to get set members: {}", e)))
    }
}
