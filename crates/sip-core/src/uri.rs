// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::collections::BTreeMap;
use std::fmt;

use percent_encoding::percent_decode_str;
use smol_str::SmolStr;

/// Parsed representation of a SIP URI (RFC 3261 §19).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SipUri {
    pub raw: SmolStr,
    pub sips: bool,
    pub user: Option<SmolStr>,
    pub host: SmolStr,
    pub port: Option<u16>,
    pub params: BTreeMap<SmolStr, Option<SmolStr>>,
    pub headers: BTreeMap<SmolStr, SmolStr>,
}

impl SipUri {
    /// Attempts to parse a SIP or SIPS URI from the provided string.
    ///
    /// Returns `None` for other schemes and for URIs without a host.
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let raw = SmolStr::new(input);
        let (scheme, rest) = input.split_once(':')?;
        let sips = scheme.eq_ignore_ascii_case("sips");
        if !sips && !scheme.eq_ignore_ascii_case("sip") {
            return None;
        }

        let (addr_part, headers_part) = match rest.split_once('?') {
            Some((addr, headers)) => (addr, Some(headers)),
            None => (rest, None),
        };

        let mut params = BTreeMap::new();
        let mut addr_iter = addr_part.split(';');
        let base = addr_iter.next()?.trim();
        for param in addr_iter {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            match param.split_once('=') {
                Some((k, v)) => {
                    params.insert(
                        SmolStr::new(k.trim().to_ascii_lowercase()),
                        Some(SmolStr::new(v.trim())),
                    );
                }
                None => {
                    params.insert(SmolStr::new(param.to_ascii_lowercase()), None);
                }
            }
        }

        let (user, host_port) = match base.rsplit_once('@') {
            Some((user, host)) => (
                percent_decode_str(user.trim())
                    .decode_utf8()
                    .ok()
                    .map(|s| SmolStr::new(s.as_ref())),
                host.trim(),
            ),
            None => (None, base),
        };

        if host_port.is_empty() {
            return None;
        }

        let (host, port) = split_host_port(host_port)?;
        if host.is_empty() {
            return None;
        }
        let host = percent_decode_str(host)
            .decode_utf8()
            .ok()?
            .to_ascii_lowercase();

        let mut headers = BTreeMap::new();
        if let Some(headers_part) = headers_part {
            for pair in headers_part.split('&') {
                if let Some((k, v)) = pair.split_once('=') {
                    headers.insert(SmolStr::new(k.trim()), SmolStr::new(v.trim()));
                }
            }
        }

        Some(Self {
            raw,
            sips,
            user: user.filter(|u| !u.is_empty()),
            host: SmolStr::new(host),
            port,
            params,
            headers,
        })
    }

    /// Returns the original textual representation of the URI.
    pub fn as_str(&self) -> &str {
        self.raw.as_str()
    }

    /// Returns the explicit port, or 5061 for `sips:` and 5060 otherwise.
    pub fn port_or_default(&self) -> u16 {
        self.port.unwrap_or(if self.sips { 5061 } else { 5060 })
    }

    /// Looks up a URI parameter; `Some(None)` means present without a value.
    pub fn param(&self, name: &str) -> Option<&Option<SmolStr>> {
        self.params.get(&SmolStr::new(name.to_ascii_lowercase()))
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A Request-URI or routing URI.
///
/// Anything that cannot be resolved into a SIP URI is kept as `Unparseable`
/// with its original text so it can still be logged and rejected with 416.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Uri {
    Sip(SipUri),
    Unparseable(SmolStr),
}

impl Uri {
    /// Parses a URI string, falling back to `Unparseable`.
    pub fn parse(input: &str) -> Self {
        match SipUri::parse(input) {
            Some(uri) => Uri::Sip(uri),
            None => Uri::Unparseable(SmolStr::new(input.trim())),
        }
    }

    /// Returns the URI as a string.
    pub fn as_str(&self) -> &str {
        match self {
            Uri::Sip(uri) => uri.as_str(),
            Uri::Unparseable(raw) => raw.as_str(),
        }
    }

    /// Returns the inner SipUri if this is a SIP URI, None otherwise.
    pub fn as_sip(&self) -> Option<&SipUri> {
        match self {
            Uri::Sip(uri) => Some(uri),
            Uri::Unparseable(_) => None,
        }
    }

    /// Returns true if this is a SIP or SIPS URI.
    pub fn is_sip(&self) -> bool {
        matches!(self, Uri::Sip(_))
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SipUri> for Uri {
    fn from(uri: SipUri) -> Self {
        Uri::Sip(uri)
    }
}

/// Splits a host[:port] or IPv6 literal "[host]:port" string.
fn split_host_port(input: &str) -> Option<(&str, Option<u16>)> {
    if input.starts_with('[') {
        let end = input.find(']')?;
        let host = &input[1..end];
        let remainder = &input[end + 1..];
        match remainder.strip_prefix(':') {
            Some(port) => Some((host, Some(port.parse().ok()?))),
            None if remainder.is_empty() => Some((host, None)),
            None => None,
        }
    } else if let Some((host, port)) = input.rsplit_once(':') {
        if host.contains(':') {
            return None;
        }
        Some((host, Some(port.parse().ok()?)))
    } else {
        Some((input, None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_user_host_port_and_params() {
        let uri = SipUri::parse("sip:alice@Example.COM:5070;transport=tcp;lr").unwrap();
        assert_eq!(uri.user.as_deref(), Some("alice"));
        assert_eq!(uri.host, "example.com");
        assert_eq!(uri.port, Some(5070));
        assert_eq!(uri.param("transport"), Some(&Some(SmolStr::new("tcp"))));
        assert_eq!(uri.param("lr"), Some(&None));
    }

    #[test]
    fn default_ports_follow_scheme() {
        assert_eq!(SipUri::parse("sip:example.com").unwrap().port_or_default(), 5060);
        assert_eq!(SipUri::parse("sips:example.com").unwrap().port_or_default(), 5061);
    }

    #[test]
    fn hostless_uri_is_unparseable() {
        assert!(SipUri::parse("sip:alice@").is_none());
        assert!(matches!(Uri::parse("sip:"), Uri::Unparseable(_)));
    }

    #[test]
    fn foreign_scheme_keeps_raw_text() {
        let uri = Uri::parse("tel:+15551234567");
        assert_eq!(uri, Uri::Unparseable(SmolStr::new("tel:+15551234567")));
        assert_eq!(uri.to_string(), "tel:+15551234567");
    }

    #[test]
    fn parses_bracketed_ipv6() {
        let uri = SipUri::parse("sip:[2001:db8::1]:5062").unwrap();
        assert_eq!(uri.host, "2001:db8::1");
        assert_eq!(uri.port, Some(5062));
    }

    #[test]
    fn rejects_unbracketed_ipv6_host() {
        assert!(SipUri::parse("sip:2001:db8::1").is_none());
    }

    #[test]
    fn rejects_non_numeric_port() {
        assert!(SipUri::parse("sip:example.com:abc").is_none());
    }
}
