//! Upstream responder
//!
//! A stock request-echoing server: for every chunk of inbound bytes it
//! writes back a textual description of the requests it could decode. It
//! exists so the harness has something real behind the mesh; any substitute
//! that echoes request metadata as text satisfies the same contract.

use anyhow::{Context, Result};
use bytes::BytesMut;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::protocol::RequestHead;

const READ_BUFFER_SIZE: usize = 32 * 1024;

/// Handle to a running upstream responder.
pub struct UpstreamResponder {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl UpstreamResponder {
    /// Bind `addr` and start serving in the background. Returns once the
    /// listening socket is bound, so callers can register the actual
    /// address as a cluster host.
    pub async fn spawn(addr: SocketAddr) -> Result<UpstreamResponder> {
        let socket = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding upstream responder on {addr}"))?;
        let addr = socket.local_addr().context("resolving bound address")?;
        info!(%addr, "upstream responder listening");

        let task = tokio::spawn(accept_loop(socket));
        Ok(UpstreamResponder { addr, task })
    }

    /// The address the responder actually bound.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for UpstreamResponder {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn accept_loop(socket: TcpListener) {
    loop {
        match socket.accept().await {
            Ok((stream, peer)) => {
                debug!(%peer, "upstream accepted connection");
                tokio::spawn(serve_connection(stream, peer));
            }
            Err(err) => {
                // Transient accept errors must not kill the responder.
                warn!(%err, "upstream accept failed");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }
}

async fn serve_connection(mut stream: TcpStream, peer: SocketAddr) {
    let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
    loop {
        match stream.read_buf(&mut buf).await {
            Ok(0) => {
                debug!(%peer, "upstream connection closed by peer");
                return;
            }
            Ok(_) => {
                let reply = describe_chunk(peer, &mut buf);
                if let Err(err) = stream.write_all(reply.as_bytes()).await {
                    debug!(%peer, %err, "upstream reply failed");
                    return;
                }
            }
            Err(err) => {
                debug!(%peer, %err, "upstream read failed");
                return;
            }
        }
    }
}

/// Render every complete request at the front of `buf` as text, consuming
/// it. A trailing partial frame is left in place for the next read; bytes
/// that are not a request frame at all are described by count and dropped.
fn describe_chunk(peer: SocketAddr, buf: &mut BytesMut) -> String {
    let mut reply = String::new();
    while let Some(head) = RequestHead::parse(&buf[..]) {
        if buf.len() < head.frame_len() {
            break;
        }
        info!(%peer, request_id = head.request_id, "upstream received request");
        let _ = write!(
            reply,
            "RemoteAddr: {peer}\n\
             Protocol: bolt/{version}\n\
             CmdCode: {cmd}\n\
             RequestId: {id}\n\
             TimeoutMs: {timeout}\n\
             Sections: class={class} header={header} content={content}\n\n",
            version = head.version,
            cmd = head.cmd_code,
            id = head.request_id,
            timeout = head.timeout_ms,
            class = head.class_len,
            header = head.header_len,
            content = head.content_len,
        );
        let _ = buf.split_to(head.frame_len());
    }

    let partial = RequestHead::parse(&buf[..]).is_some() || buf.len() < crate::protocol::REQUEST_HEADER_LEN;
    if !buf.is_empty() && !partial {
        info!(%peer, bytes = buf.len(), "upstream received undecodable bytes");
        let _ = write!(reply, "RemoteAddr: {peer}\nUndecoded: {} bytes\n\n", buf.len());
        buf.clear();
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FrameTemplate;

    #[test]
    fn describes_each_complete_request() {
        let template = FrameTemplate::request();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&template.encode(7));
        buf.extend_from_slice(&template.encode(8));

        let peer = SocketAddr::from(([127, 0, 0, 1], 9));
        let reply = describe_chunk(peer, &mut buf);

        assert!(reply.contains("RequestId: 7"));
        assert!(reply.contains("RequestId: 8"));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let template = FrameTemplate::request();
        let frame = template.encode(3);
        let half = frame.len() / 2;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&frame[..half]);

        let peer = SocketAddr::from(([127, 0, 0, 1], 9));
        let reply = describe_chunk(peer, &mut buf);

        // Half a frame is not describable yet; the bytes stay buffered.
        assert!(reply.is_empty());
        assert_eq!(buf.len(), half);

        buf.extend_from_slice(&frame[half..]);
        let reply = describe_chunk(peer, &mut buf);
        assert!(reply.contains("RequestId: 3"));
        assert!(buf.is_empty());
    }

    #[test]
    fn foreign_bytes_are_counted_and_dropped() {
        let mut buf = BytesMut::from(&[0xFFu8; 64][..]);
        let peer = SocketAddr::from(([127, 0, 0, 1], 9));
        let reply = describe_chunk(peer, &mut buf);
        assert!(reply.contains("Undecoded: 64 bytes"));
        assert!(buf.is_empty());
    }
}
