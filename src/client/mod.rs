//! Simulated RPC clients
//!
//! A [`ConnectionDriver`] owns one connection to the mesh: it reacts to
//! lifecycle events, emits a burst of request frames once connected, and
//! reports completion to the wave barrier exactly once. A
//! [`ResponseObserver`] rides along on the same connection and renders
//! whatever bytes come back.

use bytes::BytesMut;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::config::HarnessConfig;
use crate::protocol::FrameTemplate;
use crate::transport::{
    ClientConnection, ConnectionEvent, ConnectionEventListener, FilterStatus, ReadFilter,
};

/// Renders inbound chunks to the console for manual inspection.
///
/// Each invocation is treated as independently displayable: the chunk is
/// printed, cleared, and forgotten. Multi-chunk responses are not
/// reassembled; this is an inspection surface, not a response parser.
pub struct ResponseObserver {
    connection_id: u64,
}

impl ResponseObserver {
    /// Observer for the connection identified by `connection_id`.
    pub fn new(connection_id: u64) -> Self {
        Self { connection_id }
    }
}

impl ReadFilter for ResponseObserver {
    fn on_data(&self, data: &mut BytesMut) -> FilterStatus {
        println!(
            "[client {}] received {} bytes:\n{}",
            self.connection_id,
            data.len(),
            String::from_utf8_lossy(data),
        );
        data.clear();
        FilterStatus::Continue
    }
}

/// One simulated RPC client driving one connection through its lifecycle.
pub struct ConnectionDriver {
    template: FrameTemplate,
    frames: u32,
    settle_delay: Duration,
    drain_delay: Duration,
    done: Mutex<Option<oneshot::Sender<()>>>,
}

impl ConnectionDriver {
    /// Spawn a driver against `target`: builds the connection, attaches the
    /// driver and a fresh [`ResponseObserver`], and initiates the connect.
    /// Completion is reported on `done` exactly once, whatever the outcome.
    pub fn start(
        config: &HarnessConfig,
        target: SocketAddr,
        done: oneshot::Sender<()>,
    ) -> Arc<ClientConnection> {
        let conn = Arc::new(ClientConnection::new(
            target,
            config.connect_timeout,
            config.conn_buffer_limit_bytes,
        ));
        let driver = Arc::new(ConnectionDriver::new(config, done));
        conn.add_event_listener(driver);
        conn.add_read_filter(Arc::new(ResponseObserver::new(conn.id())));
        conn.connect();
        conn
    }

    /// Build the driver without wiring it to a connection; callers attach
    /// it as an event listener themselves.
    pub fn new(config: &HarnessConfig, done: oneshot::Sender<()>) -> Self {
        Self {
            template: FrameTemplate::request(),
            frames: config.frames_per_connection,
            settle_delay: config.settle_delay,
            drain_delay: config.drain_delay,
            done: Mutex::new(Some(done)),
        }
    }

    fn complete(&self) {
        if let Some(done) = self.done.lock().take() {
            let _ = done.send(());
        }
    }

    async fn burst(&self, conn: &ClientConnection) {
        // Let the transport finish its own setup before flooding it.
        tokio::time::sleep(self.settle_delay).await;

        for sequence in 0..self.frames {
            info!(conn = conn.id(), sequence, "sending request");
            if let Err(err) = conn.write(self.template.encode(sequence)) {
                // Fire-and-forget sends; a failed write ends the burst but
                // the close below still runs.
                warn!(conn = conn.id(), sequence, %err, "send failed");
                break;
            }
        }

        // Leave the read side a window to surface responses, then close.
        // The LocalClose this triggers is the driver's terminal event.
        tokio::time::sleep(self.drain_delay).await;
        conn.close().await;
    }
}

#[async_trait::async_trait]
impl ConnectionEventListener for ConnectionDriver {
    async fn on_event(&self, conn: &ClientConnection, event: ConnectionEvent) {
        info!(conn = conn.id(), ?event, "connection event");
        match event {
            ConnectionEvent::Connected => self.burst(conn).await,
            event if event.is_terminal() => self.complete(),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_fires_once() {
        let config = HarnessConfig::default();
        let (tx, mut rx) = oneshot::channel();
        let driver = ConnectionDriver::new(&config, tx);

        driver.complete();
        driver.complete();

        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn connect_failure_completes_the_driver() {
        let config = HarnessConfig {
            connect_timeout: Duration::from_millis(500),
            ..HarnessConfig::default()
        };
        // A port nothing listens on; the connect is refused immediately.
        let target = SocketAddr::from(([127, 0, 0, 1], 1));

        let (tx, rx) = oneshot::channel();
        let _conn = ConnectionDriver::start(&config, target, tx);

        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .expect("driver never completed")
            .expect("completion sender dropped");
    }
}
