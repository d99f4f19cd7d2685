// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Predicates deciding whether a URI or Route entry names this proxy.

use std::sync::Arc;

use sip_core::{Headers, SipUri, Uri};
use sip_parse::{parse_name_addr, split_quoted_commas};
use tracing::{debug, warn};

use crate::config::ProxyConfig;

#[derive(Debug, Clone)]
pub struct RouteMatcher {
    config: Arc<ProxyConfig>,
}

impl RouteMatcher {
    pub fn new(config: Arc<ProxyConfig>) -> Self {
        Self { config }
    }

    /// Detects a Request-URI that a strict router copied out of our Record-Route.
    ///
    /// RFC 3261 §16.4: the URI must have no user part, name one of our hosts
    /// on one of our ports, and carry a `maddr` naming us if it carries one
    /// at all. Some clients strip URI parameters, so a missing `maddr` still
    /// counts. There must also be a Route to pop.
    pub fn looks_like_own_record_route(&self, uri: &Uri, headers: &Headers) -> bool {
        let sip = match uri.as_sip() {
            Some(sip) => sip,
            None => return false,
        };
        if sip.user.is_some() || !self.names_this_proxy(sip) {
            return false;
        }
        if let Some(Some(maddr)) = sip.param("maddr") {
            if !self.config.is_local_host(maddr) {
                return false;
            }
        }
        if !headers.contains("Route") {
            warn!(uri = %uri, "Request-URI names this proxy but there is no Route to pop");
            return false;
        }
        true
    }

    /// True iff `uri` names one of our hosts on one of our listening ports.
    pub fn matches_this_proxy(&self, uri: &Uri) -> bool {
        uri.as_sip()
            .map(|sip| self.names_this_proxy(sip))
            .unwrap_or(false)
    }

    /// Pops the first Route entry if it names this proxy (RFC 3261 §16.4).
    ///
    /// Only the leading entry is examined; the rest keep their order.
    pub fn remove_route_matching_me(&self, headers: &Headers) -> Headers {
        let mut routes = route_entries(headers);
        let first_is_mine = routes
            .first()
            .and_then(|entry| parse_name_addr(entry))
            .map(|route| self.matches_this_proxy(&route.uri))
            .unwrap_or(false);
        if !first_is_mine {
            return headers.clone();
        }
        let popped = routes.remove(0);
        debug!(route = %popped, "removed Route naming this proxy");
        headers.with_values("Route", routes)
    }

    fn names_this_proxy(&self, uri: &SipUri) -> bool {
        self.config.is_local_host(&uri.host)
            && self.config.listen_ports().contains(&uri_port(uri))
    }
}

/// Explicit port, else the default for the URI's scheme and transport.
fn uri_port(uri: &SipUri) -> u16 {
    if let Some(port) = uri.port {
        return port;
    }
    let tls = matches!(
        uri.param("transport"),
        Some(Some(transport)) if transport.eq_ignore_ascii_case("tls")
    );
    if uri.sips || tls {
        5061
    } else {
        5060
    }
}

/// Every Route entry in order, one per element even if the field was comma-joined.
pub(crate) fn route_entries(headers: &Headers) -> Vec<String> {
    headers
        .get_all("Route")
        .flat_map(|value| split_quoted_commas(value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use smol_str::SmolStr;

    fn matcher() -> RouteMatcher {
        RouteMatcher::new(Arc::new(ProxyConfig {
            hostnames: vec![SmolStr::new("proxy.example.com")],
            local_addresses: vec!["192.0.2.10".parse().unwrap()],
            ..ProxyConfig::default()
        }))
    }

    fn routed(values: &[&str]) -> Headers {
        let mut headers = Headers::new();
        headers.push("Via", "SIP/2.0/UDP client.example.com;branch=z9hG4bK1");
        for value in values {
            headers.push("Route", *value);
        }
        headers.push("Call-ID", "r1");
        headers
    }

    #[test]
    fn own_record_route_with_maddr() {
        let uri = Uri::parse("sip:proxy.example.com:5060;maddr=192.0.2.10;lr");
        assert!(matcher().looks_like_own_record_route(&uri, &routed(&["<sip:next.example.net>"])));
    }

    #[test]
    fn user_part_is_never_own_record_route() {
        let uri = Uri::parse("sip:alice@proxy.example.com:5060;maddr=192.0.2.10");
        assert!(!matcher().looks_like_own_record_route(&uri, &routed(&["<sip:next.example.net>"])));
    }

    #[test]
    fn missing_maddr_still_matches() {
        let uri = Uri::parse("sip:192.0.2.10");
        assert!(matcher().looks_like_own_record_route(&uri, &routed(&["<sip:next.example.net>"])));
    }

    #[test]
    fn foreign_maddr_or_port_does_not_match() {
        let routes = routed(&["<sip:next.example.net>"]);
        let m = matcher();
        assert!(!m.looks_like_own_record_route(
            &Uri::parse("sip:proxy.example.com;maddr=198.51.100.1"),
            &routes
        ));
        assert!(!m.looks_like_own_record_route(&Uri::parse("sip:proxy.example.com:5080"), &routes));
        assert!(!m.looks_like_own_record_route(&Uri::parse("tel:+15551234"), &routes));
    }

    #[test]
    fn no_route_is_not_actionable() {
        let uri = Uri::parse("sip:proxy.example.com");
        assert!(!matcher().looks_like_own_record_route(&uri, &routed(&[])));
    }

    #[test]
    fn tls_default_port_is_5061() {
        let m = matcher();
        assert!(m.matches_this_proxy(&Uri::parse("sips:proxy.example.com")));
        assert!(m.matches_this_proxy(&Uri::parse("sip:PROXY.example.com;transport=tls")));
        assert!(!m.matches_this_proxy(&Uri::parse("sip:proxy.example.org")));
    }

    #[test]
    fn removes_only_leading_self_route() {
        let headers = routed(&[
            "<sip:proxy.example.com;lr>",
            "<sip:192.0.2.10;lr>",
            "<sip:next.example.net;lr>",
        ]);
        let once = matcher().remove_route_matching_me(&headers);
        assert_eq!(
            once.values("Route"),
            vec!["<sip:192.0.2.10;lr>", "<sip:next.example.net;lr>"]
        );
        assert_eq!(once.get("Call-ID").unwrap(), "r1");

        let twice = matcher().remove_route_matching_me(&once);
        assert_eq!(twice.values("Route"), vec!["<sip:next.example.net;lr>"]);

        let thrice = matcher().remove_route_matching_me(&twice);
        assert_eq!(thrice, twice);
    }

    #[test]
    fn foreign_first_route_is_untouched() {
        let headers = routed(&["<sip:next.example.net;lr>", "<sip:proxy.example.com;lr>"]);
        assert_eq!(matcher().remove_route_matching_me(&headers), headers);
    }
}
