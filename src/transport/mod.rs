//! Client-side transport connections
//!
//! One [`ClientConnection`] owns one TCP connection to the mesh. Consumers do
//! no I/O themselves: they register a [`ConnectionEventListener`] for
//! lifecycle milestones and [`ReadFilter`]s for inbound bytes, then call
//! [`ClientConnection::connect`] and [`ClientConnection::write`].

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a client connection.
///
/// Transitions are driven exclusively by [`ConnectionEvent`]s; `Closed` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connect attempt has been made yet.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The transport is established and writable.
    Connected,
    /// Terminal. Reached on any close or failure.
    Closed,
}

impl ConnectionState {
    /// Apply one lifecycle event, returning the successor state, or `None`
    /// when the event does not change the state (already terminal, or a
    /// stale Connected event).
    pub fn apply(self, event: ConnectionEvent) -> Option<ConnectionState> {
        match (self, event) {
            (ConnectionState::Connecting, ConnectionEvent::Connected) => {
                Some(ConnectionState::Connected)
            }
            (ConnectionState::Closed, _) => None,
            (_, ConnectionEvent::Connected) => None,
            (_, _) => Some(ConnectionState::Closed),
        }
    }
}

/// Asynchronous lifecycle notification for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport finished establishing.
    Connected,
    /// The peer closed the connection or the read side failed.
    RemoteClose,
    /// The local side closed the connection.
    LocalClose,
    /// The connect attempt timed out.
    ConnectTimeout,
    /// The connect attempt was refused or otherwise failed.
    ConnectFailed,
}

impl ConnectionEvent {
    /// Whether this event ends the connection's lifecycle.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConnectionEvent::Connected)
    }
}

/// Verdict of a read filter for the current chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterStatus {
    /// Keep running the remaining filters and the read loop.
    Continue,
    /// Stop the filter chain for this chunk.
    Stop,
}

/// Observer of connection lifecycle events.
///
/// `on_event` is async so implementations can pace themselves (e.g. a settle
/// delay before sending). The watermark hooks are synchronous notification
/// points; the default implementations do nothing.
#[async_trait::async_trait]
pub trait ConnectionEventListener: Send + Sync {
    /// Called once per effective state transition.
    async fn on_event(&self, conn: &ClientConnection, event: ConnectionEvent);

    /// The queued write bytes crossed above the buffer limit.
    fn on_write_buffer_high(&self, _conn: &ClientConnection) {}

    /// The queued write bytes drained back below the buffer limit.
    fn on_write_buffer_low(&self, _conn: &ClientConnection) {}
}

/// Consumer of raw inbound byte chunks.
///
/// The filter owns the buffer for the duration of the call and is expected
/// to clear whatever it consumed; bytes left in place are presented again
/// together with the next chunk.
pub trait ReadFilter: Send + Sync {
    /// Handle one chunk as delivered by the transport's buffering layer.
    fn on_data(&self, data: &mut BytesMut) -> FilterStatus;
}

/// Errors surfaced by [`ClientConnection::write`].
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The connection has not reached the connected state.
    #[error("connection not established")]
    NotConnected,
    /// The connection was closed before the write could be queued.
    #[error("connection closed")]
    Closed,
}

/// One client-side transport connection.
pub struct ClientConnection {
    id: u64,
    remote: SocketAddr,
    connect_timeout: Duration,
    buffer_limit: usize,
    state: Mutex<ConnectionState>,
    listeners: Mutex<Vec<Arc<dyn ConnectionEventListener>>>,
    filters: Mutex<Vec<Arc<dyn ReadFilter>>>,
    write_tx: Mutex<Option<mpsc::UnboundedSender<Bytes>>>,
    queued_bytes: AtomicUsize,
    above_high_watermark: Mutex<bool>,
    shutdown: Notify,
}

impl ClientConnection {
    /// Create a connection aimed at `remote`. No I/O happens until
    /// [`connect`](Self::connect) is called.
    pub fn new(remote: SocketAddr, connect_timeout: Duration, buffer_limit: usize) -> Self {
        Self {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            remote,
            connect_timeout,
            buffer_limit,
            state: Mutex::new(ConnectionState::Disconnected),
            listeners: Mutex::new(Vec::new()),
            filters: Mutex::new(Vec::new()),
            write_tx: Mutex::new(None),
            queued_bytes: AtomicUsize::new(0),
            above_high_watermark: Mutex::new(false),
            shutdown: Notify::new(),
        }
    }

    /// Process-unique connection id, used in console output.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The remote address this connection targets.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Register a lifecycle listener. Must happen before `connect`.
    pub fn add_event_listener(&self, listener: Arc<dyn ConnectionEventListener>) {
        self.listeners.lock().push(listener);
    }

    /// Register a read filter. Must happen before `connect`.
    pub fn add_read_filter(&self, filter: Arc<dyn ReadFilter>) {
        self.filters.lock().push(filter);
    }

    /// Initiate connection establishment asynchronously; never blocks.
    /// Progress is reported through the registered listeners.
    pub fn connect(self: &Arc<Self>) {
        let conn = Arc::clone(self);
        tokio::spawn(async move { conn.run().await });
    }

    /// Queue `data` for transmission. Writes issued from one task are
    /// transmitted in call order.
    pub fn write(&self, data: Bytes) -> Result<(), ConnectionError> {
        let len = data.len();
        // Account before handing the bytes to the writer, so its decrement
        // can never observe a count the increment has not reached yet.
        let queued = self.queued_bytes.fetch_add(len, Ordering::Relaxed) + len;
        let queue_result = {
            let tx = self.write_tx.lock();
            match tx.as_ref() {
                Some(tx) => tx.send(data).map_err(|_| ConnectionError::Closed),
                None => Err(ConnectionError::NotConnected),
            }
        };
        if let Err(err) = queue_result {
            self.queued_bytes.fetch_sub(len, Ordering::Relaxed);
            return Err(err);
        }
        if queued > self.buffer_limit {
            let mut above = self.above_high_watermark.lock();
            if !*above {
                *above = true;
                for listener in self.listeners_snapshot() {
                    listener.on_write_buffer_high(self);
                }
            }
        }
        Ok(())
    }

    /// Close the connection locally. Dispatches `LocalClose` once; repeated
    /// calls are no-ops.
    pub async fn close(&self) {
        self.write_tx.lock().take();
        // notify_one stores a permit, so the read loop sees the shutdown even
        // if it has not reached its select yet.
        self.shutdown.notify_one();
        self.dispatch(ConnectionEvent::LocalClose).await;
    }

    fn listeners_snapshot(&self) -> Vec<Arc<dyn ConnectionEventListener>> {
        self.listeners.lock().clone()
    }

    /// Run the event to ground through the state table; listeners hear about
    /// it only when the state actually changed.
    async fn dispatch(&self, event: ConnectionEvent) {
        let changed = {
            let mut state = self.state.lock();
            let current = *state;
            match current.apply(event) {
                Some(next) => {
                    debug!(conn = self.id, ?event, from = ?current, to = ?next, "connection event");
                    *state = next;
                    true
                }
                None => false,
            }
        };
        if !changed {
            return;
        }
        for listener in self.listeners_snapshot() {
            listener.on_event(self, event).await;
        }
    }

    async fn run(self: Arc<Self>) {
        *self.state.lock() = ConnectionState::Connecting;

        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect(self.remote),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                warn!(conn = self.id, remote = %self.remote, %err, "connect failed");
                self.dispatch(ConnectionEvent::ConnectFailed).await;
                return;
            }
            Err(_) => {
                warn!(conn = self.id, remote = %self.remote, "connect timed out");
                self.dispatch(ConnectionEvent::ConnectTimeout).await;
                return;
            }
        };

        let (mut read_half, mut write_half) = stream.into_split();

        let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
        *self.write_tx.lock() = Some(tx);

        let writer = {
            let conn = Arc::clone(&self);
            tokio::spawn(async move {
                while let Some(data) = rx.recv().await {
                    let len = data.len();
                    if let Err(err) = write_half.write_all(&data).await {
                        debug!(conn = conn.id, %err, "write failed");
                        break;
                    }
                    let queued = conn.queued_bytes.fetch_sub(len, Ordering::Relaxed) - len;
                    if queued <= conn.buffer_limit {
                        let mut above = conn.above_high_watermark.lock();
                        if *above {
                            *above = false;
                            for listener in conn.listeners_snapshot() {
                                listener.on_write_buffer_low(&conn);
                            }
                        }
                    }
                }
            })
        };

        // Listeners may stall in on_event (settle delays, bursts); dispatch
        // Connected on its own task so the read loop starts immediately.
        {
            let conn = Arc::clone(&self);
            tokio::spawn(async move { conn.dispatch(ConnectionEvent::Connected).await });
        }

        let mut buf = BytesMut::with_capacity(self.buffer_limit);
        loop {
            tokio::select! {
                _ = self.shutdown.notified() => break,
                read = read_half.read_buf(&mut buf) => match read {
                    Ok(0) => {
                        self.dispatch(ConnectionEvent::RemoteClose).await;
                        break;
                    }
                    Ok(_) => {
                        for filter in self.filters.lock().clone() {
                            if filter.on_data(&mut buf) == FilterStatus::Stop {
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        debug!(conn = self.id, %err, "read failed");
                        self.dispatch(ConnectionEvent::RemoteClose).await;
                        break;
                    }
                },
            }
        }

        // Closing the queue lets the writer drain whatever was accepted
        // before it exits.
        self.write_tx.lock().take();
        let _ = writer.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_table_matches_lifecycle() {
        use ConnectionState::{Closed, Connected, Connecting, Disconnected};

        assert_eq!(Connecting.apply(ConnectionEvent::Connected), Some(Connected));
        assert_eq!(Connecting.apply(ConnectionEvent::ConnectFailed), Some(Closed));
        assert_eq!(Connecting.apply(ConnectionEvent::ConnectTimeout), Some(Closed));
        assert_eq!(Connected.apply(ConnectionEvent::RemoteClose), Some(Closed));
        assert_eq!(Connected.apply(ConnectionEvent::LocalClose), Some(Closed));

        // Terminal state absorbs everything.
        assert_eq!(Closed.apply(ConnectionEvent::Connected), None);
        assert_eq!(Closed.apply(ConnectionEvent::RemoteClose), None);
        assert_eq!(Closed.apply(ConnectionEvent::LocalClose), None);

        // A Connected event outside the connecting phase is stale.
        assert_eq!(Disconnected.apply(ConnectionEvent::Connected), None);
        assert_eq!(Connected.apply(ConnectionEvent::Connected), None);
    }

    #[test]
    fn terminal_classification() {
        assert!(!ConnectionEvent::Connected.is_terminal());
        for event in [
            ConnectionEvent::RemoteClose,
            ConnectionEvent::LocalClose,
            ConnectionEvent::ConnectTimeout,
            ConnectionEvent::ConnectFailed,
        ] {
            assert!(event.is_terminal());
        }
    }

    #[tokio::test]
    async fn write_before_connect_is_rejected() {
        let conn = ClientConnection::new(
            SocketAddr::from(([127, 0, 0, 1], 1)),
            Duration::from_millis(100),
            1024,
        );
        let err = conn.write(Bytes::from_static(b"x")).unwrap_err();
        assert!(matches!(err, ConnectionError::NotConnected));
    }
}
