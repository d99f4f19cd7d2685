// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Minimal application: answers OPTIONS with 200 OK and everything else
/// except ACK with 501 Not Implemented.
use anyhow::Result;
use async_trait::async_trait;
use sip_core::{Headers, Method, Request, Response};
use sip_proxy::{ApplicationHandler, LogSummary, Origin};
use tracing::info;

use super::reply;

const ALLOW: &str = "OPTIONS, ACK";

#[derive(Debug, Default)]
pub struct OptionsHandler;

impl OptionsHandler {
    pub fn new() -> Self {
        Self
    }

    fn capabilities() -> Headers {
        let mut headers = Headers::new();
        headers.push("Allow", ALLOW);
        headers.push("Accept", "application/sdp");
        headers.push("User-Agent", crate::USER_AGENT);
        headers
    }
}

#[async_trait]
impl ApplicationHandler for OptionsHandler {
    async fn request(&self, request: Request, origin: Origin, summary: LogSummary) -> Result<()> {
        info!(%summary, "request");
        if request.method().is_ack() {
            return Ok(());
        }
        if request.method() == &Method::OPTIONS {
            return reply(&request, &origin, 200, "OK", &Self::capabilities()).await;
        }

        let mut extra = Headers::new();
        extra.push("Allow", ALLOW);
        reply(&request, &origin, 501, "Not Implemented", &extra).await
    }

    async fn response(&self, _response: Response, _origin: Origin, summary: LogSummary) -> Result<()> {
        // Nothing is ever sent downstream, so any response is a stray.
        info!(%summary, "ignoring response");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use sip_core::{RequestLine, SipMessage, Uri};
    use sip_parse::{parse_message, ParseOutcome};
    use sip_transport::{SocketHandle, TransportKind};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use tokio::net::UdpSocket;

    fn request(method: Method) -> Request {
        let mut headers = Headers::new();
        headers.push("Via", "SIP/2.0/UDP 127.0.0.1;branch=z9hG4bKo1");
        headers.push("From", "<sip:alice@example.com>;tag=f1");
        headers.push("To", "<sip:siphond@example.com>");
        headers.push("Call-ID", "opt-1");
        headers.push("CSeq", format!("1 {}", method));
        Request::new(
            RequestLine::new(method, Uri::parse("sip:siphond@example.com")),
            headers,
            Bytes::new(),
        )
        .unwrap()
    }

    async fn exchange(method: Method) -> Option<Response> {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer: SocketAddr = client.local_addr().unwrap();
        let origin = Origin::new(
            TransportKind::Udp,
            peer.ip(),
            peer.port(),
            SocketHandle::Datagram { socket: server, peer },
        );
        let req = request(method);
        let summary = LogSummary::for_request(&req, &origin);
        OptionsHandler::new().request(req, origin, summary).await.unwrap();

        let mut buf = vec![0u8; 2048];
        let received = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            client.recv_from(&mut buf),
        )
        .await;
        let (n, _) = received.ok()?.unwrap();
        match parse_message(&Bytes::copy_from_slice(&buf[..n])) {
            ParseOutcome::Message(SipMessage::Response(response)) => Some(response),
            other => panic!("unexpected reply {:?}", other),
        }
    }

    #[tokio::test]
    async fn options_gets_200_with_allow() {
        let response = exchange(Method::OPTIONS).await.unwrap();
        assert_eq!(response.code(), 200);
        assert_eq!(response.headers().get("Allow").unwrap(), ALLOW);
    }

    #[tokio::test]
    async fn other_methods_get_501() {
        let response = exchange(Method::INVITE).await.unwrap();
        assert_eq!(response.code(), 501);
    }

    #[tokio::test]
    async fn ack_is_silent() {
        assert!(exchange(Method::ACK).await.is_none());
    }
}
