//! Hand-off of release messages from producers to the worker pool.
//!
//! Producers (webhook and API handlers) never build anything themselves; they
//! encode a [`ReleaseMessage`](crate::types::ReleaseMessage) and hand the bytes
//! to the [`Dispatcher`]. Which transport carries them is decided once at
//! startup:
//!
//! ```text
//!  handlers ──► Dispatcher::Channel ──► bounded mpsc ─────────┐
//!                                                            ├──► worker pool
//!  handlers ──► Dispatcher::Broker ──► Redis PUBLISH ──► SUBSCRIBE
//! ```
//!
//! Both variants refuse oversized payloads before touching the transport.

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::config::{BrokerConfig, BrokerDriver};

pub mod broker;
pub mod channel;

pub use broker::BrokerDispatcher;
pub use channel::{ChannelDispatcher, channel};

/// Errors that can occur when dispatching a message.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The transport cannot take the message right now.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The message itself is unacceptable.
    #[error("message rejected: {0}")]
    Rejected(String),
}

/// Result type for dispatch operations.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// The transport selected by configuration.
#[derive(Debug, Clone)]
pub enum Dispatcher {
    Channel(ChannelDispatcher),
    Broker(BrokerDispatcher),
}

impl Dispatcher {
    /// Builds the configured dispatcher.
    ///
    /// For the channel driver the receiving half is returned alongside, to be
    /// handed to the worker pool.
    pub fn from_config(
        config: &BrokerConfig,
        shutdown: CancellationToken,
    ) -> Result<(Self, Option<tokio::sync::mpsc::Receiver<Vec<u8>>>)> {
        match config.driver {
            BrokerDriver::Channel => {
                let (tx, rx) = channel(config.channel.capacity, config.max_payload_bytes, shutdown);
                Ok((Dispatcher::Channel(tx), Some(rx)))
            }
            BrokerDriver::Redis => Ok((
                Dispatcher::Broker(BrokerDispatcher::from_config(
                    &config.redis,
                    config.max_payload_bytes,
                )?),
                None,
            )),
        }
    }

    /// Hands a payload to the transport.
    #[instrument(skip_all, fields(bytes = payload.len()))]
    pub async fn send(&self, payload: Vec<u8>) -> Result<()> {
        match self {
            Dispatcher::Channel(d) => d.send(payload).await?,
            Dispatcher::Broker(d) => d.send(payload).await?,
        }
        debug!("Message dispatched");
        Ok(())
    }
}

/// Rejects payloads larger than `max` bytes.
pub(crate) fn check_size(payload: &[u8], max: usize) -> Result<()> {
    if payload.len() > max {
        Err(DispatchError::Rejected(format!(
            "payload of {} bytes exceeds limit of {} bytes",
            payload.len(),
            max
        )))
    } else {
        Ok(())
    }
}
