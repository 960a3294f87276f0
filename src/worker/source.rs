//! Receiving side of the release transport.

use std::fmt;
use std::pin::Pin;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::WorkerError;
use crate::config::RedisBrokerConfig;

/// Payloads of one live subscription.
pub type PayloadStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Opens a fresh subscription.
pub type Connect = Box<dyn FnMut() -> BoxFuture<'static, Result<PayloadStream, WorkerError>> + Send>;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Where the worker pool reads release messages from.
pub enum ReleaseSource {
    /// The in-process queue filled by the channel dispatcher.
    Channel(mpsc::Receiver<Vec<u8>>),
    /// A Redis pub/sub subscription.
    Redis(Subscription),
}

impl fmt::Debug for ReleaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReleaseSource::Channel(_) => f.write_str("ReleaseSource::Channel"),
            ReleaseSource::Redis(_) => f.write_str("ReleaseSource::Redis"),
        }
    }
}

impl ReleaseSource {
    /// Subscribes to the configured Redis channel.
    ///
    /// Fails if the first subscription cannot be made. Later disconnects are
    /// handled by re-subscribing.
    pub async fn subscribe(config: &RedisBrokerConfig) -> Result<Self, WorkerError> {
        let config = config.clone();
        let mut connect: Connect = Box::new(move || open_subscription(config.clone()).boxed());
        let stream = connect().await?;
        Ok(ReleaseSource::Redis(Subscription::new(stream, connect)))
    }

    /// Next payload, or `None` once the in-process channel is closed.
    ///
    /// A Redis source never ends on its own; it waits out disconnects.
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        match self {
            ReleaseSource::Channel(rx) => rx.recv().await,
            ReleaseSource::Redis(subscription) => Some(subscription.next().await),
        }
    }
}

/// A subscription that re-subscribes with exponential backoff whenever its
/// stream ends.
pub struct Subscription {
    stream: Option<PayloadStream>,
    connect: Connect,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl Subscription {
    pub fn new(stream: PayloadStream, connect: Connect) -> Self {
        Subscription {
            stream: Some(stream),
            connect,
            initial_backoff: INITIAL_BACKOFF,
            max_backoff: MAX_BACKOFF,
        }
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    async fn next(&mut self) -> Vec<u8> {
        let mut delay = self.initial_backoff;
        loop {
            if let Some(stream) = self.stream.as_mut() {
                if let Some(payload) = stream.next().await {
                    return payload;
                }
                warn!("Release subscription ended, resubscribing");
                self.stream = None;
            }

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(self.max_backoff);

            match (self.connect)().await {
                Ok(stream) => self.stream = Some(stream),
                Err(e) => warn!(error = %e, "Resubscribe failed"),
            }
        }
    }
}

async fn open_subscription(config: RedisBrokerConfig) -> Result<PayloadStream, WorkerError> {
    let subscribe = async {
        let client = redis::Client::open(config.url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&config.channel).await?;
        Ok::<_, redis::RedisError>(pubsub)
    };

    let pubsub = tokio::time::timeout(config.timeout(), subscribe)
        .await
        .map_err(|_| WorkerError::Subscribe("timed out".to_string()))?
        .map_err(|e| WorkerError::Subscribe(e.to_string()))?;

    info!(channel = %config.channel, "Subscribed to release channel");
    Ok(Box::pin(
        pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec()),
    ))
}
