//! Redis pub/sub transport.
//!
//! Every send opens a connection, checks it with `PING` and publishes the
//! payload, all under one timeout. Publishing is fire-and-forget: the
//! number of subscribers that received the message is logged, not checked.

use std::fmt;
use std::time::Duration;

use redis::AsyncCommands;
use tracing::{debug, warn};

use super::{DispatchError, Result, check_size};
use crate::config::RedisBrokerConfig;

/// Sending half of the Redis transport.
#[derive(Clone)]
pub struct BrokerDispatcher {
    client: redis::Client,
    channel: String,
    timeout: Duration,
    max_payload_bytes: usize,
}

impl fmt::Debug for BrokerDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerDispatcher")
            .field("channel", &self.channel)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl BrokerDispatcher {
    /// Creates a broker client. Does not connect.
    pub fn from_config(config: &RedisBrokerConfig, max_payload_bytes: usize) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| DispatchError::Unavailable(format!("invalid redis url: {}", e)))?;

        Ok(BrokerDispatcher {
            client,
            channel: config.channel.clone(),
            timeout: config.timeout(),
            max_payload_bytes,
        })
    }

    /// Publishes a payload on the configured channel.
    pub async fn send(&self, payload: Vec<u8>) -> Result<()> {
        check_size(&payload, self.max_payload_bytes)?;

        let receivers = tokio::time::timeout(self.timeout, self.publish(payload))
            .await
            .map_err(|_| {
                warn!(timeout = ?self.timeout, "Broker did not answer in time");
                DispatchError::Unavailable("broker timed out".to_string())
            })?
            .map_err(|e| {
                warn!(error = %e, "Broker publish failed");
                DispatchError::Unavailable(e.to_string())
            })?;

        debug!(channel = %self.channel, receivers, "Published release message");
        Ok(())
    }

    async fn publish(&self, payload: Vec<u8>) -> redis::RedisResult<i64> {
        let mut con = self.client.get_multiplexed_async_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut con).await?;
        con.publish(&self.channel, payload).await
    }
}
