// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use sip_core::{Headers, Request, Response};
use sip_parse::{cseq_method, parse_name_addr};

use crate::Origin;

/// One-line description of a message for operational logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSummary(String);

impl LogSummary {
    /// `INVITE sip:bob@example.org [client=udp:192.0.2.1:5060, from=<..>, to=<..>]`
    pub fn for_request(request: &Request, origin: &Origin) -> Self {
        Self(format!(
            "{} {} [{}]",
            request.method(),
            request.uri(),
            parties(request.headers(), origin)
        ))
    }

    /// `response to INVITE: '200 OK' [client=udp:192.0.2.1:5060, from=<..>, to=<..>]`
    pub fn for_response(response: &Response, origin: &Origin) -> Self {
        let method = cseq_method(response.headers())
            .map(|m| m.to_string())
            .unwrap_or_else(|| "?".to_owned());
        Self(format!(
            "response to {}: '{} {}' [{}]",
            method,
            response.code(),
            response.reason(),
            parties(response.headers(), origin)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parties(headers: &Headers, origin: &Origin) -> String {
    format!(
        "client={}, from=<{}>, to=<{}>",
        origin,
        address_of(headers, "From"),
        address_of(headers, "To")
    )
}

fn address_of(headers: &Headers, name: &str) -> String {
    match headers.get(name) {
        Some(value) => match parse_name_addr(value) {
            Some(addr) => addr.uri.as_str().to_owned(),
            None => value.to_string(),
        },
        None => "?".to_owned(),
    }
}
