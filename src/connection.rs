use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::reply::Reply;

/// How long `close` waits for in-flight writes before releasing the socket anyway.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const ACTIVE: u8 = 0;
const DRAINING: u8 = 1;
const CLOSED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Serving frames.
    Active,
    /// Close requested, waiting for in-flight writes.
    Draining,
    /// Socket released.
    Closed,
}

#[derive(Debug, ThisError)]
pub enum ConnectionError {
    #[error("connection is closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The write side of one client socket plus the state attached to that client.
///
/// Writers are serialized behind an async mutex so replies never interleave on the wire. Every
/// write holds a token of the `pending` tracker for its whole duration, which is what `close`
/// waits on.
pub struct Connection {
    pub id: Uuid,
    pub client_address: SocketAddr,
    writer: Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: TaskTracker,
    selected_db: AtomicUsize,
    state: AtomicU8,
    closed: CancellationToken,
    drain_timeout: Duration,
}

impl Connection {
    pub fn new<W>(writer: W, client_address: SocketAddr, drain_timeout: Duration) -> Connection
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Connection {
            id: Uuid::new_v4(),
            client_address,
            writer: Mutex::new(Box::new(writer)),
            pending: TaskTracker::new(),
            selected_db: AtomicUsize::new(0),
            state: AtomicU8::new(ACTIVE),
            closed: CancellationToken::new(),
            drain_timeout,
        }
    }

    /// Index of the logical database this client is using. New connections start at 0.
    pub fn db_index(&self) -> usize {
        self.selected_db.load(Ordering::Acquire)
    }

    /// The caller is responsible for validating `index` against the number of databases.
    pub fn select_db(&self, index: usize) {
        self.selected_db.store(index, Ordering::Release);
    }

    pub fn state(&self) -> State {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => State::Active,
            DRAINING => State::Draining,
            _ => State::Closed,
        }
    }

    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    /// Writes the encoded reply to the socket.
    ///
    /// Writes still go through while the connection drains. A write that has not finished when
    /// the drain ceiling elapses is abandoned and reports `Closed`.
    pub async fn write(&self, reply: &Reply) -> Result<(), ConnectionError> {
        if self.state() == State::Closed {
            return Err(ConnectionError::Closed);
        }

        let _token = self.pending.token();
        let bytes = reply.to_bytes();

        tokio::select! {
            res = async {
                let mut writer = self.writer.lock().await;
                writer.write_all(&bytes).await?;
                writer.flush().await
            } => res.map_err(ConnectionError::from),
            _ = self.closed.cancelled() => Err(ConnectionError::Closed),
        }
    }

    /// Drains in-flight writes for at most the drain timeout, then releases the socket.
    ///
    /// Calling it again, or concurrently, waits for the first call to finish.
    pub async fn close(&self) {
        if self
            .state
            .compare_exchange(ACTIVE, DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.closed.cancelled().await;
            return;
        }

        self.pending.close();
        if timeout(self.drain_timeout, self.pending.wait()).await.is_err() {
            warn!(
                pending = self.pending.len(),
                "Writes still pending after {:?}, closing anyway", self.drain_timeout
            );
        }

        self.state.store(CLOSED, Ordering::Release);
        self.closed.cancel();

        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.shutdown().await {
            debug!("Failed to shut down socket: {}", e);
        }
    }

    /// Resolves once the connection is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("client_address", &self.client_address)
            .field("selected_db", &self.db_index())
            .field("state", &self.state())
            .finish()
    }
}
