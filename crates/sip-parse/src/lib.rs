// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Structured SIP message parser.
//!
//! Turns one received packet into a [`ParseOutcome`]: a parsed
//! [`SipMessage`], a keepalive, or a [`StructuredError`] carrying the status
//! code the packet deserves. Multi-valued fields (Via, Route, Contact, ...)
//! are split so every value is its own header entry.

use bytes::{Bytes, BytesMut};
use sip_core::{
    method::is_token_char, Headers, Method, Request, RequestLine, Response, SipMessage,
    StatusLine, Uri,
};
use smol_str::SmolStr;

mod header_values;

pub use header_values::{
    cseq_method, parse_cseq, parse_from_header, parse_name_addr, parse_to_header,
    parse_via_header, split_quoted_commas, CSeq, NameAddr, MAX_CSEQ,
};

pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Fields that may be comma-joined on the wire and are split into one entry per value.
const LIST_HEADERS: &[&str] = &[
    "Via",
    "Route",
    "Record-Route",
    "Contact",
    "Path",
    "Service-Route",
];

/// Result of parsing one received packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Message(SipMessage),
    /// Empty or whitespace-only datagram (RFC 5626 CRLF keepalive).
    Keepalive,
    Error(StructuredError),
}

/// SIP-level parse failure with the status that describes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredError {
    pub status: u16,
    pub reason: SmolStr,
    pub extra_headers: Headers,
    /// Whatever header fields were tokenized before the failure, if any.
    pub headers: Option<Headers>,
    /// The start line looked like a status line.
    pub is_response: bool,
    /// Leading token of a request start line, read before anything else can fail.
    pub method: Option<Method>,
}

impl StructuredError {
    fn new(status: u16, reason: &str, is_response: bool) -> Self {
        Self {
            status,
            reason: SmolStr::new(reason),
            extra_headers: Headers::new(),
            headers: None,
            is_response,
            method: None,
        }
    }

    fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    fn with_method(mut self, method: Option<Method>) -> Self {
        self.method = method;
        self
    }
}

/// Parses a SIP message from raw network bytes.
pub fn parse_message(datagram: &Bytes) -> ParseOutcome {
    parse_message_with_limit(datagram, DEFAULT_MAX_MESSAGE_SIZE)
}

/// Parses a SIP message with an explicit max size check.
pub fn parse_message_with_limit(datagram: &Bytes, max_size: usize) -> ParseOutcome {
    let data = datagram.as_ref();
    let start = match data.iter().position(|b| !b.is_ascii_whitespace()) {
        Some(start) => start,
        None => return ParseOutcome::Keepalive,
    };
    // RFC 3261 §7.5: CRLFs before the start line are ignored.
    let data = &data[start..];
    let is_response = data.len() >= 4 && data[..4].eq_ignore_ascii_case(b"SIP/");
    let start_method = if is_response {
        None
    } else {
        start_line_method(data)
    };
    let fail = |status: u16, reason: &str| {
        StructuredError::new(status, reason, is_response).with_method(start_method.clone())
    };

    if datagram.len() > max_size {
        return ParseOutcome::Error(fail(513, "Message Too Large"));
    }

    let (head, body_bytes) = match split_head_body(data) {
        Some(parts) => parts,
        None => return ParseOutcome::Error(fail(400, "Malformed message")),
    };

    let mut lines = head.split("\r\n");
    let first = lines.next().unwrap_or_default().trim();

    let headers = match parse_headers(lines) {
        Some(headers) => headers,
        None => return ParseOutcome::Error(fail(400, "Malformed header line")),
    };

    let body = match extract_body(body_bytes, &headers) {
        Some(body) => body,
        None => {
            return ParseOutcome::Error(fail(400, "Content-Length mismatch").with_headers(headers))
        }
    };

    if is_response {
        let status = match parse_status_line(first) {
            Some(status) => status,
            None => {
                return ParseOutcome::Error(fail(400, "Malformed status line").with_headers(headers))
            }
        };
        return match Response::new(status, headers.clone(), body) {
            Ok(response) => ParseOutcome::Message(SipMessage::Response(response)),
            Err(_) => ParseOutcome::Error(fail(513, "Message Too Large").with_headers(headers)),
        };
    }

    let (method, uri) = match parse_request_line(first) {
        Some(parts) => parts,
        None => {
            return ParseOutcome::Error(fail(400, "Malformed request line").with_headers(headers))
        }
    };
    match Request::new(RequestLine::new(method, uri), headers.clone(), body) {
        Ok(request) => ParseOutcome::Message(SipMessage::Request(request)),
        Err(_) => ParseOutcome::Error(fail(513, "Message Too Large").with_headers(headers)),
    }
}

/// Serializes a SIP response while normalising the `Content-Length` header.
pub fn serialize_response(res: &Response) -> Bytes {
    let mut buf = String::new();
    use std::fmt::Write;

    let _ = write!(buf, "SIP/2.0 {} {}\r\n", res.code(), res.reason());

    for header in res.headers().iter() {
        if header.is("Content-Length") {
            continue;
        }
        let _ = write!(buf, "{}: {}\r\n", header.name, header.value);
    }

    let _ = write!(buf, "Content-Length: {}\r\n", res.body().len());

    buf.push_str("\r\n");

    let mut out = BytesMut::with_capacity(buf.len() + res.body().len());
    out.extend_from_slice(buf.as_bytes());
    out.extend_from_slice(res.body().as_ref());
    out.freeze()
}

/// Parses the request-line into a method and request URI.
///
/// A URI that does not resolve to `sip:`/`sips:` still yields a request; it is
/// carried as [`Uri::Unparseable`] so the proxy can answer 416.
fn parse_request_line(line: &str) -> Option<(Method, Uri)> {
    use nom::{
        bytes::complete::{tag_no_case, take_while1},
        character::complete::space1,
        combinator::eof,
        sequence::tuple,
    };

    let mut parser = tuple((
        take_while1::<_, _, nom::error::Error<_>>(is_token_char),
        space1::<_, nom::error::Error<_>>,
        take_while1::<_, _, nom::error::Error<_>>(|c: char| !c.is_whitespace()),
        space1::<_, nom::error::Error<_>>,
        tag_no_case::<_, _, nom::error::Error<_>>("SIP/2.0"),
        eof::<_, nom::error::Error<_>>,
    ));
    let (_, (method_token, _, uri_token, _, _, _)) = parser(line.trim()).ok()?;

    let method = Method::new(method_token)?;
    Some((method, Uri::parse(uri_token)))
}

/// Parses the status-line of a SIP response.
fn parse_status_line(line: &str) -> Option<StatusLine> {
    use nom::{
        bytes::complete::tag_no_case,
        character::complete::{space0, space1, u16 as nom_u16},
        combinator::rest,
        sequence::tuple,
    };

    let mut parser = tuple((
        tag_no_case::<_, _, nom::error::Error<_>>("SIP/2.0"),
        space1::<_, nom::error::Error<_>>,
        nom_u16::<_, nom::error::Error<_>>,
        space0::<_, nom::error::Error<_>>,
        rest::<_, nom::error::Error<_>>,
    ));
    let (_, (_, _, code, _, reason)) = parser(line.trim()).ok()?;

    StatusLine::new(code, reason.trim()).ok()
}

/// Splits raw bytes into header text and body slice using the `\r\n\r\n` separator.
/// First token of a request start line, taken from the raw bytes so that it
/// survives a broken header block, a non-UTF-8 head or an oversized packet.
fn start_line_method(data: &[u8]) -> Option<Method> {
    let end = data
        .iter()
        .position(|b| matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .unwrap_or(data.len());
    Method::new(std::str::from_utf8(&data[..end]).ok()?)
}

fn split_head_body(data: &[u8]) -> Option<(&str, &[u8])> {
    let delim = b"\r\n\r\n";

    if let Some(pos) = data.windows(delim.len()).position(|window| window == delim) {
        let head = std::str::from_utf8(&data[..pos]).ok()?;
        let body = &data[pos + delim.len()..];
        Some((head, body))
    } else {
        // Stream framing may strip the trailing blank line.
        let head = std::str::from_utf8(data).ok()?;
        Some((head.trim_end_matches("\r\n"), &[]))
    }
}

/// Parses SIP headers, handling folded continuation lines per RFC 3261 §7.3.1.
fn parse_headers<'a, I>(lines: I) -> Option<Headers>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut fields: Vec<(SmolStr, String)> = Vec::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        if line.starts_with(' ') || line.starts_with('\t') {
            let value = line.trim();
            let (_, current) = fields.last_mut()?;
            if !value.is_empty() {
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(value);
            }
            continue;
        }

        let (name, value) = line.split_once(':')?;
        let name = name.trim();
        if name.is_empty() || !name.chars().all(is_token_char) {
            return None;
        }
        fields.push((canonical_header_name(name), value.trim().to_owned()));
    }

    let mut headers = Headers::new();
    for (name, value) in fields {
        if LIST_HEADERS.iter().any(|list| name.eq_ignore_ascii_case(list)) {
            for part in split_quoted_commas(&value) {
                headers.push(name.clone(), part);
            }
        } else {
            headers.push(name, value);
        }
    }
    Some(headers)
}

fn canonical_header_name(name: &str) -> SmolStr {
    let lower = name.to_ascii_lowercase();
    let canonical = match lower.as_str() {
        "i" | "call-id" => "Call-ID",
        "f" | "from" => "From",
        "t" | "to" => "To",
        "m" | "contact" => "Contact",
        "l" | "content-length" => "Content-Length",
        "c" | "content-type" => "Content-Type",
        "v" | "via" => "Via",
        "k" => "Supported",
        "s" => "Subject",
        "cseq" => "CSeq",
        "route" => "Route",
        "record-route" => "Record-Route",
        _ => name,
    };
    SmolStr::new(canonical)
}

/// Returns the body truncated to the declared `Content-Length`, or [`None`] if shorter.
fn extract_body(body_bytes: &[u8], headers: &Headers) -> Option<Bytes> {
    let declared = match headers.get("Content-Length") {
        Some(value) => value.trim().parse::<usize>().ok()?,
        None => body_bytes.len(),
    };
    if declared > body_bytes.len() {
        return None;
    }
    Some(Bytes::copy_from_slice(&body_bytes[..declared]))
}
