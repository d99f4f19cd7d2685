// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Receive loops and reply handles for the proxy intake layer.
//!
//! Listeners turn socket reads into [`InboundPacket`]s. Each packet carries a
//! [`SocketHandle`] so an error response can be written back on the socket
//! (or connection) the request arrived on.

use anyhow::{anyhow, Result};
use bytes::{Bytes, BytesMut};
use sip_observe::span_with_transport;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Indicates which transport carried an inbound message.
///
/// The IPv6 variants exist because the Via a proxy writes, and the ports it
/// listens on, are tracked per address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Udp,
    Udp6,
    Tcp,
    Tcp6,
    Tls,
    Tls6,
}

impl TransportKind {
    /// Returns the lowercase transport string for metrics and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Udp => "udp",
            TransportKind::Udp6 => "udp6",
            TransportKind::Tcp => "tcp",
            TransportKind::Tcp6 => "tcp6",
            TransportKind::Tls => "tls",
            TransportKind::Tls6 => "tls6",
        }
    }

    /// Returns the Via header transport token per RFC 3261.
    ///
    /// # Examples
    ///
    /// ```
    /// use sip_transport::TransportKind;
    ///
    /// assert_eq!(TransportKind::Udp.via_transport(), "UDP");
    /// assert_eq!(TransportKind::Tcp6.via_transport(), "TCP");
    /// assert_eq!(TransportKind::Tls6.via_transport(), "TLS");
    /// ```
    pub fn via_transport(&self) -> &'static str {
        match self {
            TransportKind::Udp | TransportKind::Udp6 => "UDP",
            TransportKind::Tcp | TransportKind::Tcp6 => "TCP",
            TransportKind::Tls | TransportKind::Tls6 => "TLS",
        }
    }

    /// Default port for the transport when a URI or Via omits one.
    pub fn default_port(&self) -> u16 {
        if self.is_secure() {
            5061
        } else {
            5060
        }
    }

    /// Parses a transport string (case-insensitive) into a TransportKind.
    ///
    /// # Examples
    ///
    /// ```
    /// use sip_transport::TransportKind;
    ///
    /// assert_eq!(TransportKind::parse("UDP"), Some(TransportKind::Udp));
    /// assert_eq!(TransportKind::parse("tls6"), Some(TransportKind::Tls6));
    /// assert_eq!(TransportKind::parse("sctp"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "udp" => Some(TransportKind::Udp),
            "udp6" => Some(TransportKind::Udp6),
            "tcp" => Some(TransportKind::Tcp),
            "tcp6" => Some(TransportKind::Tcp6),
            "tls" => Some(TransportKind::Tls),
            "tls6" => Some(TransportKind::Tls6),
            _ => None,
        }
    }

    /// Maps a Via protocol token back to a kind of the requested address family.
    pub fn for_via(token: &str, ipv6: bool) -> Option<Self> {
        let base = match token.trim().to_ascii_uppercase().as_str() {
            "UDP" => TransportKind::Udp,
            "TCP" => TransportKind::Tcp,
            "TLS" => TransportKind::Tls,
            _ => return None,
        };
        Some(base.with_ipv6(ipv6))
    }

    /// Returns the same protocol in the requested address family.
    pub fn with_ipv6(self, ipv6: bool) -> Self {
        match (self, ipv6) {
            (TransportKind::Udp | TransportKind::Udp6, false) => TransportKind::Udp,
            (TransportKind::Udp | TransportKind::Udp6, true) => TransportKind::Udp6,
            (TransportKind::Tcp | TransportKind::Tcp6, false) => TransportKind::Tcp,
            (TransportKind::Tcp | TransportKind::Tcp6, true) => TransportKind::Tcp6,
            (TransportKind::Tls | TransportKind::Tls6, false) => TransportKind::Tls,
            (TransportKind::Tls | TransportKind::Tls6, true) => TransportKind::Tls6,
        }
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(
            self,
            TransportKind::Udp6 | TransportKind::Tcp6 | TransportKind::Tls6
        )
    }

    /// Returns true if this transport requires a persistent connection.
    pub fn is_stream_based(&self) -> bool {
        !matches!(self, TransportKind::Udp | TransportKind::Udp6)
    }

    /// Returns true if this transport uses TLS encryption.
    pub fn is_secure(&self) -> bool {
        matches!(self, TransportKind::Tls | TransportKind::Tls6)
    }
}

/// Opaque handle to the socket a packet arrived on, used to send replies.
#[derive(Debug, Clone)]
pub enum SocketHandle {
    /// Shared datagram socket plus the peer to reply to.
    Datagram {
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
    },
    /// Writer channel of the connection the packet was read from.
    Stream(mpsc::Sender<Bytes>),
    /// No reply path (tests, replayed captures).
    Detached,
}

impl SocketHandle {
    /// Writes one serialized message back toward the packet's sender.
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        match self {
            SocketHandle::Datagram { socket, peer } => {
                socket.send_to(&payload, peer).await?;
                Ok(())
            }
            SocketHandle::Stream(writer) => writer
                .send(payload)
                .await
                .map_err(|_| anyhow!("connection writer dropped")),
            SocketHandle::Detached => Err(anyhow!("packet has no reply socket")),
        }
    }
}

/// Bundle representing a packet received by a transport listener.
#[derive(Debug, Clone)]
pub struct InboundPacket {
    pub transport: TransportKind,
    pub peer: SocketAddr,
    pub payload: Bytes,
    pub socket: SocketHandle,
}

/// Runs a UDP receive loop and forwards packets to the provided channel.
pub async fn run_udp(socket: Arc<UdpSocket>, tx: mpsc::Sender<InboundPacket>) -> Result<()> {
    let bind = socket.local_addr()?;
    let transport = TransportKind::Udp.with_ipv6(bind.is_ipv6());
    info!(%bind, "listening (udp)");
    let mut buf = vec![0u8; 65_535];
    loop {
        match socket.recv_from(&mut buf).await {
            Ok((n, peer)) => {
                let span = span_with_transport("udp_packet", transport.as_str());
                let _entered = span.enter();
                if n == buf.len() {
                    error!(
                        %peer,
                        max = n,
                        "udp datagram likely truncated (buffer full); consider TCP"
                    );
                }
                let packet = InboundPacket {
                    transport,
                    peer,
                    payload: Bytes::copy_from_slice(&buf[..n]),
                    socket: SocketHandle::Datagram {
                        socket: socket.clone(),
                        peer,
                    },
                };
                if tx.send(packet).await.is_err() {
                    error!("receiver dropped; shutting down udp loop");
                    break;
                }
            }
            Err(e) => {
                error!(%e, "udp recv_from error");
            }
        }
    }
    Ok(())
}

/// Accepts TCP connections, streaming frames to the supplied channel.
pub async fn run_tcp(bind: &str, tx: mpsc::Sender<InboundPacket>) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    let transport = TransportKind::Tcp.with_ipv6(listener.local_addr()?.is_ipv6());
    info!(%bind, "listening (tcp)");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!(%e, "tcp accept error");
                continue;
            }
        };
        let tx = tx.clone();
        tokio::spawn(async move {
            let span = span_with_transport("tcp_session", transport.as_str());
            let _entered = span.enter();
            stream_session(peer, stream, transport, tx).await;
        });
    }
}

async fn stream_session<S>(
    peer: SocketAddr,
    stream: S,
    transport: TransportKind,
    tx: mpsc::Sender<InboundPacket>,
) where
    S: AsyncReadExt + AsyncWriteExt + Unpin + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (writer_tx, mut writer_rx) = mpsc::channel::<Bytes>(32);

    let writer_handle = tokio::spawn(async move {
        while let Some(buf) = writer_rx.recv().await {
            if let Err(e) = writer.write_all(&buf).await {
                error!(%e, "stream write error");
                break;
            }
        }
    });

    let mut buf = BytesMut::with_capacity(4096);
    'read: loop {
        match reader.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                for payload in drain_sip_frames(&mut buf) {
                    let packet = InboundPacket {
                        transport,
                        peer,
                        payload,
                        socket: SocketHandle::Stream(writer_tx.clone()),
                    };
                    if tx.send(packet).await.is_err() {
                        error!("receiver dropped; shutting down {:?} session", transport);
                        break 'read;
                    }
                }
            }
            Err(e) => {
                error!(%e, "stream read error");
                break;
            }
        }
    }

    debug!(%peer, "stream session closed");
    drop(writer_tx);
    let _ = writer_handle.await;
}

/// Splits buffered stream data into complete SIP messages using Content-Length.
fn drain_sip_frames(buf: &mut BytesMut) -> Vec<Bytes> {
    let mut frames = Vec::new();
    loop {
        // RFC 5626 CRLF keepalives between messages
        let leading = buf.iter().take_while(|b| **b == b'\r' || **b == b'\n').count();
        if leading > 0 {
            let _ = buf.split_to(leading);
        }
        if buf.is_empty() {
            break;
        }

        let head_end = match memchr::memmem::find(buf.as_ref(), b"\r\n\r\n") {
            Some(pos) => pos,
            None => break,
        };

        let content_length = parse_content_length(&buf[..head_end]);
        let needed = head_end + 4 + content_length.unwrap_or(0);
        if buf.len() < needed {
            break;
        }

        frames.push(buf.split_to(needed).freeze());
    }
    frames
}

fn parse_content_length(headers: &[u8]) -> Option<usize> {
    let text = std::str::from_utf8(headers).ok()?;
    for line in text.lines() {
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("l") {
                return value.trim().parse().ok();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_multiple_frames_and_bodies() {
        let msg1 = b"OPTIONS sip:a SIP/2.0\r\nContent-Length: 4\r\n\r\nbody";
        let msg2 = b"SIP/2.0 200 OK\r\nl: 0\r\n\r\n";
        let payload = [msg1.as_slice(), msg2.as_slice()].concat();
        let mut buf = BytesMut::from(&payload[..]);
        let frames = drain_sip_frames(&mut buf);
        assert_eq!(frames.len(), 2);
        assert!(buf.is_empty());
        assert_eq!(frames[0].as_ref(), msg1);
        assert_eq!(frames[1].as_ref(), msg2);
    }

    #[test]
    fn leaves_partial_body_in_buffer() {
        let payload = b"OPTIONS sip:a SIP/2.0\r\nContent-Length: 5\r\n\r\nhi";
        let mut buf = BytesMut::from(&payload[..]);
        let frames = drain_sip_frames(&mut buf);
        assert!(frames.is_empty(), "should not emit incomplete frame");
        assert_eq!(buf.len(), payload.len());
    }

    #[test]
    fn discards_crlf_keepalive() {
        let mut buf = BytesMut::from(&b"\r\n\r\n"[..]);
        let frames = drain_sip_frames(&mut buf);
        assert!(frames.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn transport_kind_via_and_defaults() {
        assert_eq!(TransportKind::Udp6.via_transport(), "UDP");
        assert_eq!(TransportKind::Tls.default_port(), 5061);
        assert_eq!(TransportKind::Tcp6.default_port(), 5060);
        assert!(TransportKind::Tls6.is_ipv6());
        assert!(!TransportKind::Udp.is_stream_based());
    }

    #[test]
    fn transport_kind_for_via() {
        assert_eq!(TransportKind::for_via("tls", false), Some(TransportKind::Tls));
        assert_eq!(TransportKind::for_via("UDP", true), Some(TransportKind::Udp6));
        assert_eq!(TransportKind::for_via("SCTP", false), None);
    }

    #[test]
    fn transport_kind_round_trip() {
        for transport in [
            TransportKind::Udp,
            TransportKind::Udp6,
            TransportKind::Tcp,
            TransportKind::Tcp6,
            TransportKind::Tls,
            TransportKind::Tls6,
        ] {
            assert_eq!(TransportKind::parse(transport.as_str()), Some(transport));
            assert_eq!(
                TransportKind::for_via(transport.via_transport(), transport.is_ipv6()),
                Some(transport)
            );
        }
    }

    #[tokio::test]
    async fn stream_handle_writes_to_channel() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = SocketHandle::Stream(tx);
        handle.send(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn detached_handle_fails() {
        assert!(SocketHandle::Detached.send(Bytes::new()).await.is_err());
    }

    #[tokio::test]
    async fn udp_loop_delivers_packet_with_reply_handle() {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let addr = server.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(run_udp(server, tx));

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"OPTIONS sip:a SIP/2.0\r\n\r\n", addr).await.unwrap();

        let packet = rx.recv().await.unwrap();
        assert_eq!(packet.transport, TransportKind::Udp);
        assert_eq!(packet.peer, client.local_addr().unwrap());

        packet.socket.send(Bytes::from_static(b"pong")).await.unwrap();
        let mut buf = [0u8; 16];
        let (n, _) = client.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }
}
