// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::panic::{catch_unwind, AssertUnwindSafe};

use bytes::Bytes;
use sip_core::SipMessage;
use sip_observe::intake_metrics;
use sip_parse::{parse_message_with_limit, ParseOutcome, DEFAULT_MAX_MESSAGE_SIZE};
use tracing::{debug, error};

use crate::{
    error::{IntakeError, ParseFailure},
    normalize::Normalizer, summary::LogSummary, supervise::panic_message,
    Origin,
};

/// Byte-level SIP parser used by the intake pipeline.
pub trait MessageParser: Send + Sync {
    fn parse(&self, datagram: &Bytes) -> ParseOutcome;
}

/// [`MessageParser`] backed by [`sip_parse::parse_message_with_limit`].
#[derive(Debug, Clone, Copy)]
pub struct SipParser {
    pub max_message_size: usize,
}

impl Default for SipParser {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl MessageParser for SipParser {
    fn parse(&self, datagram: &Bytes) -> ParseOutcome {
        parse_message_with_limit(datagram, self.max_message_size)
    }
}

/// What one received packet turned into.
#[derive(Debug)]
pub enum IntakeOutcome {
    /// Normalized and ready for dispatch.
    Message(SipMessage, LogSummary),
    Keepalive,
    /// Silently discarded; the reason has been logged.
    Dropped,
    ParseFailure(ParseFailure),
}

/// Parses `datagram` and normalizes the result.
///
/// A panicking parser is contained here: the packet is logged and dropped,
/// and the caller never sees the fault.
pub fn adapt(
    parser: &dyn MessageParser,
    datagram: &Bytes,
    origin: &Origin,
    normalizer: &Normalizer,
) -> IntakeOutcome {
    let parsed = match catch_unwind(AssertUnwindSafe(|| parser.parse(datagram))) {
        Ok(parsed) => parsed,
        Err(panic) => {
            let err = IntakeError::MalformedPacket(panic_message(panic.as_ref()));
            error!(%origin, len = datagram.len(), error = %err, "parser fault; dropping packet");
            intake_metrics().on_dropped("parser");
            return IntakeOutcome::Dropped;
        }
    };

    match parsed {
        ParseOutcome::Message(message) => normalizer.normalize(message, origin),
        ParseOutcome::Keepalive => {
            debug!(%origin, "keepalive");
            intake_metrics().on_keepalive(origin.transport.as_str());
            IntakeOutcome::Keepalive
        }
        ParseOutcome::Error(err) => {
            debug!(%origin, status = err.status, reason = %err.reason, "structured parse error");
            let mut failure = if err.is_response {
                ParseFailure::response(err.headers, err.status, &err.reason)
            } else {
                ParseFailure::pre_header(err.headers, err.status, &err.reason)
            };
            if let Some(method) = err.method {
                failure = failure.with_method(method);
            }
            IntakeOutcome::ParseFailure(failure.with_extra_headers(err.extra_headers))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ProxyConfig, error::FailureScope, loop_detect::DigestLoopCookie};
    use sip_transport::TransportKind;
    use std::sync::Arc;

    struct PanickingParser;

    impl MessageParser for PanickingParser {
        fn parse(&self, _datagram: &Bytes) -> ParseOutcome {
            panic!("tokenizer blew up")
        }
    }

    fn normalizer() -> Normalizer {
        Normalizer::new(Arc::new(ProxyConfig::default()), Arc::new(DigestLoopCookie))
    }

    fn origin() -> Origin {
        Origin::detached(TransportKind::Udp, "192.0.2.1:5060".parse().unwrap())
    }

    #[test]
    fn parser_panic_is_dropped() {
        let outcome = adapt(&PanickingParser, &Bytes::from_static(b"x"), &origin(), &normalizer());
        assert!(matches!(outcome, IntakeOutcome::Dropped));
    }

    #[test]
    fn whitespace_is_keepalive() {
        let outcome = adapt(
            &SipParser::default(),
            &Bytes::from_static(b"\r\n\r\n"),
            &origin(),
            &normalizer(),
        );
        assert!(matches!(outcome, IntakeOutcome::Keepalive));
    }

    #[test]
    fn request_parse_error_is_pre_header() {
        let outcome = adapt(
            &SipParser::default(),
            &Bytes::from_static(b"GARBAGE\r\nCSeq: 1 INVITE\r\n\r\n"),
            &origin(),
            &normalizer(),
        );
        match outcome {
            IntakeOutcome::ParseFailure(failure) => {
                assert_eq!(failure.scope, FailureScope::RequestPreHeader);
                assert_eq!(failure.status, 400);
            }
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn pre_header_failure_keeps_start_line_method() {
        let outcome = adapt(
            &SipParser::default(),
            &Bytes::from_static(b"ACK sip:a@example.com SIP/2.0\r\nno colon here\r\n\r\n"),
            &origin(),
            &normalizer(),
        );
        match outcome {
            IntakeOutcome::ParseFailure(failure) => {
                assert_eq!(failure.scope, FailureScope::RequestPreHeader);
                assert_eq!(failure.method, Some(sip_core::Method::ACK));
                assert!(failure.headers.is_none());
            }
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn response_parse_error_is_response_scoped() {
        let outcome = adapt(
            &SipParser::default(),
            &Bytes::from_static(b"SIP/2.0 xyz\r\n\r\n"),
            &origin(),
            &normalizer(),
        );
        match outcome {
            IntakeOutcome::ParseFailure(failure) => assert_eq!(failure.scope, FailureScope::Response),
            other => panic!("expected parse failure, got {:?}", other),
        }
    }

    #[test]
    fn parsed_request_is_normalized() {
        let raw = Bytes::from_static(
            b"OPTIONS sip:bob@example.org SIP/2.0\r\n\
Via: SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bKn1;rport\r\n\
From: <sip:alice@example.com>;tag=1\r\n\
To: <sip:bob@example.org>\r\n\
Call-ID: a1\r\n\
CSeq: 2 OPTIONS\r\n\
Content-Length: 0\r\n\r\n",
        );
        match adapt(&SipParser::default(), &raw, &origin(), &normalizer()) {
            IntakeOutcome::Message(SipMessage::Request(req), _) => {
                assert_eq!(
                    req.headers().get("Via").unwrap(),
                    "SIP/2.0/UDP 10.0.0.5:5060;branch=z9hG4bKn1;received=192.0.2.1;rport=5060"
                );
            }
            other => panic!("expected request, got {:?}", other),
        }
    }
}
