// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error responses generated by the intake layer.
//!
//! Every response the intake layer produces goes through [`ErrorResponder::respond`],
//! which is where ACK suppression (RFC 3261 §17) lives.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use rand::{distributions::Alphanumeric, Rng};
use sip_core::{Headers, MessageError, Method, Request, Response, StatusLine};
use sip_observe::intake_metrics;
use sip_parse::{cseq_method, parse_to_header, serialize_response};
use sip_transport::SocketHandle;
use tracing::{debug, info, warn};

use crate::dispatch::TransactionLayer;

/// Direct, transaction-less send used when no transaction owns the response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_result(
        &self,
        headers: &Headers,
        socket: &SocketHandle,
        status: u16,
        reason: &str,
        extra_headers: &Headers,
    ) -> Result<()>;
}

/// [`Transport`] that writes the response straight back on the packet's socket.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketTransport;

#[async_trait]
impl Transport for SocketTransport {
    async fn send_result(
        &self,
        headers: &Headers,
        socket: &SocketHandle,
        status: u16,
        reason: &str,
        extra_headers: &Headers,
    ) -> Result<()> {
        let response = build_error_response(headers, status, reason, extra_headers)?;
        socket.send(serialize_response(&response)).await
    }
}

/// What an error response should be built from.
#[derive(Debug, Clone, Copy)]
pub enum ResponseTarget<'a> {
    /// A fully parsed request; may be answered through its transaction.
    Request(&'a Request),
    /// The request line and header were read but the request was rejected
    /// before it reached a transaction.
    Rejected(&'a Method, &'a Headers),
    /// Only the header is known.
    Headers(&'a Headers),
}

impl ResponseTarget<'_> {
    fn headers(&self) -> &Headers {
        match self {
            ResponseTarget::Request(request) => request.headers(),
            ResponseTarget::Rejected(_, headers) | ResponseTarget::Headers(headers) => headers,
        }
    }

    fn is_ack(&self) -> bool {
        match self {
            ResponseTarget::Request(request) => request.method().is_ack(),
            ResponseTarget::Rejected(method, _) => method.is_ack(),
            ResponseTarget::Headers(headers) => cseq_method(headers)
                .map(|method| method.is_ack())
                .unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    /// Sent through the request's server transaction.
    Sent,
    /// Written directly on the originating socket.
    SentDirect,
    /// Not sent because the target is an ACK.
    Suppressed,
    /// Not sent because there is no Via to address it to.
    Unroutable,
    Failed,
}

#[derive(Clone)]
pub struct ErrorResponder {
    transactions: Arc<dyn TransactionLayer>,
    transport: Arc<dyn Transport>,
}

impl ErrorResponder {
    pub fn new(transactions: Arc<dyn TransactionLayer>, transport: Arc<dyn Transport>) -> Self {
        Self {
            transactions,
            transport,
        }
    }

    /// Answers `target` with `status`, unless it is an ACK.
    ///
    /// A request target goes through the transaction layer first and falls
    /// back to a direct send on `socket`; any other target is always sent
    /// directly, since no transaction can exist for it yet.
    pub async fn respond(
        &self,
        target: ResponseTarget<'_>,
        socket: &SocketHandle,
        status: u16,
        reason: &str,
        extra_headers: &Headers,
    ) -> ResponseDisposition {
        if target.is_ack() {
            info!(status, reason, "not answering ACK");
            intake_metrics().on_suppressed(status);
            return ResponseDisposition::Suppressed;
        }

        if let ResponseTarget::Request(request) = target {
            match self
                .transactions
                .send_response_for_request(request, status, reason, extra_headers)
                .await
            {
                Ok(()) => {
                    intake_metrics().on_error_response(status);
                    return ResponseDisposition::Sent;
                }
                Err(err) => {
                    debug!(status, error = %err, "no transaction took the response; sending directly");
                }
            }
        }

        if !target.headers().contains("Via") {
            info!(status, reason, "no Via to answer; dropping");
            intake_metrics().on_dropped("no-via");
            return ResponseDisposition::Unroutable;
        }

        match self
            .transport
            .send_result(target.headers(), socket, status, reason, extra_headers)
            .await
        {
            Ok(()) => {
                intake_metrics().on_error_response(status);
                ResponseDisposition::SentDirect
            }
            Err(err) => {
                warn!(status, reason, error = %err, "failed to send error response");
                ResponseDisposition::Failed
            }
        }
    }
}

/// Builds a transaction-less error response for `headers` (RFC 3261 §8.2.6.2).
///
/// Via, From, To, Call-ID and CSeq are copied; To gets a tag if it has none.
/// `extra_headers` are appended after them.
pub fn build_error_response(
    headers: &Headers,
    status: u16,
    reason: &str,
    extra_headers: &Headers,
) -> Result<Response, MessageError> {
    let start = StatusLine::new(status, reason)?;

    let mut out = Headers::new();
    for via in headers.get_all("Via") {
        out.push("Via", via.clone());
    }
    if let Some(from) = headers.get("From") {
        out.push("From", from.clone());
    }
    if let Some(to) = headers.get("To") {
        let tagged = match parse_to_header(headers) {
            Some(parsed) if parsed.tag().is_none() => format!("{};tag={}", to, generate_tag()),
            _ => to.to_string(),
        };
        out.push("To", tagged);
    }
    if let Some(call_id) = headers.get("Call-ID") {
        out.push("Call-ID", call_id.clone());
    }
    if let Some(cseq) = headers.get("CSeq") {
        out.push("CSeq", cseq.clone());
    }

    Response::new(start, out.merged(extra_headers), Bytes::new())
}

fn generate_tag() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}
