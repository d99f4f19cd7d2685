// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::BTreeMap;

use sip_core::{Headers, Method, Uri, ViaHeader};
use smol_str::SmolStr;

/// Generic SIP name-addr (From/To/Route/Contact values).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAddr {
    pub display_name: Option<SmolStr>,
    pub uri: Uri,
    pub params: BTreeMap<SmolStr, Option<SmolStr>>,
}

impl NameAddr {
    /// Looks up a header parameter such as `tag`.
    pub fn param(&self, name: &str) -> Option<&Option<SmolStr>> {
        self.params.get(&SmolStr::new(name.to_ascii_lowercase()))
    }

    /// Returns the `tag` parameter value, if any.
    pub fn tag(&self) -> Option<&str> {
        self.param("tag").and_then(|v| v.as_deref())
    }
}

/// Parsed CSeq header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeq {
    pub number: u32,
    pub method: Method,
}

/// Largest CSeq number allowed by RFC 3261 §8.1.1.5.
pub const MAX_CSEQ: u32 = (1 << 31) - 1;

/// Parses one Via value (`SIP/2.0/UDP host:port;params`).
pub fn parse_via_header(value: &str) -> Option<ViaHeader> {
    use nom::{
        bytes::complete::{tag_no_case, take_while1},
        character::complete::space1,
        combinator::rest,
        sequence::tuple,
    };

    let input = value.trim();
    let transport_token =
        take_while1::<_, _, nom::error::Error<_>>(|c: char| c.is_ascii_alphanumeric() || c == '-');
    let mut parser = tuple((
        tag_no_case::<_, _, nom::error::Error<_>>("SIP/2.0/"),
        transport_token,
        space1::<_, nom::error::Error<_>>,
        rest::<_, nom::error::Error<_>>,
    ));
    let (_, (_, transport, _, remainder)) = parser(input).ok()?;

    let (sent_by, params_part) = match remainder.split_once(';') {
        Some((sent_by, params)) => (sent_by.trim(), params),
        None => (remainder.trim(), ""),
    };
    if sent_by.is_empty() {
        return None;
    }
    let (host, port) = split_sent_by(sent_by)?;

    let params = parse_params(params_part)
        .into_iter()
        .map(|(name, value)| (name, value.unwrap_or_default()))
        .collect();

    Some(ViaHeader {
        transport: SmolStr::new(transport.to_ascii_uppercase()),
        host: SmolStr::new(host),
        port,
        params,
    })
}

/// Parses the `CSeq` header value (`<number> <method>`).
pub fn parse_cseq(value: &str) -> Option<CSeq> {
    let mut parts = value.split_whitespace();
    let number = parts.next()?.parse::<u32>().ok()?;
    if number > MAX_CSEQ {
        return None;
    }
    let method = Method::new(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some(CSeq { number, method })
}

/// Returns the method named in the CSeq header, if it parses.
pub fn cseq_method(headers: &Headers) -> Option<Method> {
    headers
        .get("CSeq")
        .and_then(|value| parse_cseq(value))
        .map(|cseq| cseq.method)
}

/// Parses a name-addr or addr-spec value.
///
/// A bare addr-spec keeps everything after the first `;` as header parameters,
/// as RFC 3261 §20 requires for From/To/Contact.
pub fn parse_name_addr(value: &str) -> Option<NameAddr> {
    let input = value.trim();
    if input.is_empty() {
        return None;
    }
    if let Some(start) = input.find('<') {
        let end_rel = input[start + 1..].find('>')?;
        let end = start + 1 + end_rel;
        let display = input[..start].trim().trim_matches('"').trim();
        let uri = input[start + 1..end].trim();
        if uri.is_empty() {
            return None;
        }
        Some(NameAddr {
            display_name: (!display.is_empty()).then(|| SmolStr::new(display)),
            uri: Uri::parse(uri),
            params: parse_params(input[end + 1..].trim().trim_start_matches(';'))
                .into_iter()
                .collect(),
        })
    } else {
        let (uri, params) = match input.split_once(';') {
            Some((uri, params)) => (uri.trim(), params),
            None => (input, ""),
        };
        Some(NameAddr {
            display_name: None,
            uri: Uri::parse(uri),
            params: parse_params(params).into_iter().collect(),
        })
    }
}

/// Parses the From header, if present and well formed.
pub fn parse_from_header(headers: &Headers) -> Option<NameAddr> {
    headers.get("From").and_then(|v| parse_name_addr(v))
}

/// Parses the To header, if present and well formed.
pub fn parse_to_header(headers: &Headers) -> Option<NameAddr> {
    headers.get("To").and_then(|v| parse_name_addr(v))
}

/// Splits a comma-separated field value, ignoring commas inside quotes and `<...>`.
pub fn split_quoted_commas(input: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_angle = false;
    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            '<' if !in_quotes => {
                in_angle = true;
                current.push(ch);
            }
            '>' if !in_quotes => {
                in_angle = false;
                current.push(ch);
            }
            ',' if !in_quotes && !in_angle => {
                if !current.trim().is_empty() {
                    parts.push(current.trim().to_owned());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_owned());
    }
    parts
}

fn parse_params(input: &str) -> Vec<(SmolStr, Option<SmolStr>)> {
    input
        .split(';')
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(|raw| match raw.split_once('=') {
            Some((name, value)) => (
                SmolStr::new(name.trim().to_ascii_lowercase()),
                Some(SmolStr::new(value.trim().trim_matches('"'))),
            ),
            None => (SmolStr::new(raw.to_ascii_lowercase()), None),
        })
        .collect()
}

/// Splits a Via sent-by into host and optional port, unbracketing IPv6.
fn split_sent_by(input: &str) -> Option<(&str, Option<u16>)> {
    if let Some(stripped) = input.strip_prefix('[') {
        let end = stripped.find(']')?;
        let host = &stripped[..end];
        match stripped[end + 1..].trim() {
            "" => Some((host, None)),
            rest => Some((host, Some(rest.strip_prefix(':')?.trim().parse().ok()?))),
        }
    } else if let Some((host, port)) = input.rsplit_once(':') {
        if host.contains(':') {
            return None;
        }
        Some((host.trim(), Some(port.trim().parse().ok()?)))
    } else {
        Some((input, None))
    }
}
