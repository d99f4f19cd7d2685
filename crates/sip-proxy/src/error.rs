// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use sip_core::{Headers, Method};
use smol_str::SmolStr;

/// Which context a parse failure happened in, and so what may be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureScope {
    /// The request header is available; a full response can be built.
    Request,
    /// Failed before a usable header existed; only a best-effort direct reply.
    RequestPreHeader,
    /// The packet was a response; nothing may be sent.
    Response,
}

/// A SIP-level failure raised while turning a packet into a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub scope: FailureScope,
    pub headers: Option<Headers>,
    pub status: u16,
    pub reason: SmolStr,
    pub extra_headers: Headers,
    /// Method from the request line, when the request line was readable.
    pub method: Option<Method>,
}

impl ParseFailure {
    /// Failure of a request whose header could be read.
    pub fn request(headers: Headers, status: u16, reason: &str) -> Self {
        Self {
            scope: FailureScope::Request,
            headers: Some(headers),
            status,
            reason: SmolStr::new(reason),
            extra_headers: Headers::new(),
            method: None,
        }
    }

    pub fn pre_header(headers: Option<Headers>, status: u16, reason: &str) -> Self {
        Self {
            scope: FailureScope::RequestPreHeader,
            headers,
            status,
            reason: SmolStr::new(reason),
            extra_headers: Headers::new(),
            method: None,
        }
    }

    pub fn response(headers: Option<Headers>, status: u16, reason: &str) -> Self {
        Self {
            scope: FailureScope::Response,
            headers,
            status,
            reason: SmolStr::new(reason),
            extra_headers: Headers::new(),
            method: None,
        }
    }

    pub fn with_extra_headers(mut self, extra: Headers) -> Self {
        self.extra_headers = extra;
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }
}

impl fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({:?})", self.status, self.reason, self.scope)
    }
}

impl std::error::Error for ParseFailure {}

/// Everything that can go wrong between packet receipt and dispatch.
///
/// None of these escape [`IntakePipeline::process`](crate::IntakePipeline::process);
/// each is turned into a logged drop or a best-effort response there.
#[derive(Debug)]
pub enum IntakeError {
    /// Parser fault or bytes that cannot be read at all. Dropped, never answered.
    MalformedPacket(String),
    /// Parser-reported status before a header existed.
    StructuredParseError(ParseFailure),
    /// 400/416/482 raised by the normalizer, carrying the header.
    NormalizationFailure(ParseFailure),
    /// Transaction layer or application handler failed or panicked.
    DispatchFault(anyhow::Error),
    /// Transaction layer returned something the router cannot act on.
    RoutingProtocolError(anyhow::Error),
}

impl IntakeError {
    /// The SIP-level failure behind a parse or normalization error.
    pub fn failure(&self) -> Option<&ParseFailure> {
        match self {
            IntakeError::StructuredParseError(failure)
            | IntakeError::NormalizationFailure(failure) => Some(failure),
            _ => None,
        }
    }

    /// Status the caller should answer with, if any response is allowed.
    pub fn status(&self) -> Option<(u16, &str)> {
        match self {
            IntakeError::MalformedPacket(_) => None,
            IntakeError::StructuredParseError(failure)
            | IntakeError::NormalizationFailure(failure) => match failure.scope {
                FailureScope::Response => None,
                _ => Some((failure.status, failure.reason.as_str())),
            },
            IntakeError::DispatchFault(_) | IntakeError::RoutingProtocolError(_) => {
                Some((500, "Server Internal Error"))
            }
        }
    }
}

/// Failures with a readable request header come from the normalizer; the rest
/// were reported by the parser.
impl From<ParseFailure> for IntakeError {
    fn from(failure: ParseFailure) -> Self {
        match failure.scope {
            FailureScope::Request => IntakeError::NormalizationFailure(failure),
            FailureScope::RequestPreHeader | FailureScope::Response => {
                IntakeError::StructuredParseError(failure)
            }
        }
    }
}

impl fmt::Display for IntakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntakeError::MalformedPacket(detail) => write!(f, "malformed packet: {}", detail),
            IntakeError::StructuredParseError(failure) => {
                write!(f, "structured parse error: {}", failure)
            }
            IntakeError::NormalizationFailure(failure) => {
                write!(f, "normalization failure: {}", failure)
            }
            IntakeError::DispatchFault(err) => write!(f, "dispatch fault: {:#}", err),
            IntakeError::RoutingProtocolError(err) => {
                write!(f, "routing protocol error: {:#}", err)
            }
        }
    }
}

impl std::error::Error for IntakeError {}

/// Result a supervised unit of work may report instead of panicking.
#[derive(Debug)]
pub enum TaskError {
    /// A SIP-level error the work chose to report.
    Sip { status: u16, reason: SmolStr },
    Fault(anyhow::Error),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskError::Sip { status, reason } => write!(f, "sip error {} {}", status, reason),
            TaskError::Fault(err) => write!(f, "{:#}", err),
        }
    }
}

impl std::error::Error for TaskError {}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Fault(err)
    }
}

impl From<ParseFailure> for TaskError {
    fn from(failure: ParseFailure) -> Self {
        TaskError::Sip {
            status: failure.status,
            reason: failure.reason,
        }
    }
}

impl From<IntakeError> for TaskError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::StructuredParseError(failure)
            | IntakeError::NormalizationFailure(failure) => failure.into(),
            other => TaskError::Fault(anyhow::anyhow!(other.to_string())),
        }
    }
}
