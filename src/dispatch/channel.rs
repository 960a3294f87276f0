//! In-process transport.
//!
//! A bounded tokio channel. Senders wait for buffer space, so a slow worker
//! pool back-pressures the HTTP handlers instead of dropping work. Messages in
//! the buffer are lost if the process dies.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{DispatchError, Result, check_size};

/// Sending half of the in-process transport.
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: mpsc::Sender<Vec<u8>>,
    max_payload_bytes: usize,
    shutdown: CancellationToken,
}

/// Creates a channel transport with room for `capacity` queued messages.
pub fn channel(
    capacity: usize,
    max_payload_bytes: usize,
    shutdown: CancellationToken,
) -> (ChannelDispatcher, mpsc::Receiver<Vec<u8>>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        ChannelDispatcher {
            tx,
            max_payload_bytes,
            shutdown,
        },
        rx,
    )
}

impl ChannelDispatcher {
    /// Queues a payload, waiting while the buffer is full.
    ///
    /// Fails only if the payload is too large, the process is shutting down,
    /// or the receiving side is gone.
    pub async fn send(&self, payload: Vec<u8>) -> Result<()> {
        check_size(&payload, self.max_payload_bytes)?;

        if self.shutdown.is_cancelled() {
            return Err(DispatchError::Unavailable("shutting down".to_string()));
        }

        tokio::select! {
            result = self.tx.send(payload) => result
                .map_err(|_| DispatchError::Unavailable("worker pool has stopped".to_string())),
            () = self.shutdown.cancelled() => {
                Err(DispatchError::Unavailable("shutting down".to_string()))
            }
        }
    }
}
