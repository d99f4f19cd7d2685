// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loop detection (RFC 3261 §16.3 item 4, §16.6 step 8).
//!
//! When this proxy forwards a request it stamps a branch ending in
//! `-o<cookie>`, where the cookie is derived from fields that stay fixed while
//! a request loops. On intake, a Via that names this proxy and carries a branch
//! with that suffix means the request has come back around.

use std::sync::Arc;

use rand::{distributions::Alphanumeric, Rng};
use sip_core::{Headers, Uri, ViaHeader};
use sip_parse::{parse_cseq, parse_from_header, parse_to_header, parse_via_header};
use sip_transport::TransportKind;
use smol_str::SmolStr;
use tracing::{debug, warn};

use crate::{config::ProxyConfig, error::ParseFailure, Origin};

/// Deterministic fingerprint of a request for loop detection.
///
/// Identical inputs must give identical cookies; distinct requests should not
/// collide.
pub trait LoopCookie: Send + Sync {
    fn cookie(&self, headers: &Headers, uri: &Uri, transport: TransportKind) -> SmolStr;
}

/// MD5 over the fields RFC 3261 §16.6 step 8 lists, minus Via.
///
/// Via is left out because the Via stack grows on every hop, so a looped
/// request would otherwise never reproduce the cookie.
#[derive(Debug, Default, Clone, Copy)]
pub struct DigestLoopCookie;

impl LoopCookie for DigestLoopCookie {
    fn cookie(&self, headers: &Headers, uri: &Uri, transport: TransportKind) -> SmolStr {
        let to_tag = parse_to_header(headers)
            .and_then(|to| to.tag().map(str::to_owned))
            .unwrap_or_default();
        let from_tag = parse_from_header(headers)
            .and_then(|from| from.tag().map(str::to_owned))
            .unwrap_or_default();
        let cseq = headers
            .get("CSeq")
            .and_then(|value| parse_cseq(value))
            .map(|cseq| cseq.number.to_string())
            .unwrap_or_default();
        let proxy_require = headers.values("Proxy-Require").join(",");
        let proxy_authorization = headers.values("Proxy-Authorization").join(",");

        let mut input = String::new();
        for part in [
            to_tag.as_str(),
            from_tag.as_str(),
            headers.get("Call-ID").map(|v| v.as_str()).unwrap_or(""),
            cseq.as_str(),
            uri.as_str(),
            proxy_require.as_str(),
            proxy_authorization.as_str(),
            transport.via_transport(),
        ] {
            input.push_str(part);
            input.push('\n');
        }
        SmolStr::new(format!("{:x}", md5::compute(input.as_bytes())))
    }
}

/// Branch a forwarding proxy stamps so that [`LoopDetector`] can recognise it later.
pub fn loop_branch(cookie: &str) -> SmolStr {
    let mut rng = rand::thread_rng();
    let random: String = (&mut rng)
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect();
    SmolStr::new(format!("z9hG4bK{}-o{}", random, cookie))
}

#[derive(Clone)]
pub struct LoopDetector {
    config: Arc<ProxyConfig>,
    cookie: Arc<dyn LoopCookie>,
}

impl LoopDetector {
    pub fn new(config: Arc<ProxyConfig>, cookie: Arc<dyn LoopCookie>) -> Self {
        Self { config, cookie }
    }

    /// Fails with 482 when a Via naming this proxy carries our loop cookie.
    ///
    /// All matching Vias are checked, top-down: the request may have passed
    /// through here more than once. A matching Via without a branch is logged
    /// and skipped.
    pub fn detect(&self, headers: &Headers, uri: &Uri, origin: &Origin) -> Result<(), ParseFailure> {
        if !self.config.detect_loops {
            return Ok(());
        }

        let cookie = self.cookie.cookie(headers, uri, origin.transport);
        let suffix = format!("-o{}", cookie);
        let mine = self.config.via_for(origin.transport);

        for value in headers.get_all("Via") {
            let via = match parse_via_header(value) {
                Some(via) => via,
                None => {
                    debug!(via = %value, "skipping unparseable Via during loop check");
                    continue;
                }
            };
            if !same_sent_by(&via, &mine) {
                continue;
            }
            match via.branch() {
                None => {
                    warn!(via = %value, "Via matching this proxy has no branch; cannot check for loop");
                }
                Some(branch) if branch.ends_with(&suffix) => {
                    return Err(ParseFailure::request(headers.clone(), 482, "Loop Detected"));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

/// Compares host (case-insensitive) and port, each side defaulting by its own protocol.
pub(crate) fn same_sent_by(via: &ViaHeader, mine: &ViaHeader) -> bool {
    via.host.eq_ignore_ascii_case(&mine.host)
        && via.port_or(default_port(via)) == mine.port_or(default_port(mine))
}

fn default_port(via: &ViaHeader) -> u16 {
    TransportKind::for_via(via.transport(), false)
        .map(|kind| kind.default_port())
        .unwrap_or(5060)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Arc<ProxyConfig> {
        Arc::new(ProxyConfig {
            hostnames: vec![SmolStr::new("proxy.example.com")],
            ..ProxyConfig::default()
        })
    }

    fn origin() -> Origin {
        Origin::detached(TransportKind::Udp, "192.0.2.30:5060".parse().unwrap())
    }

    fn base_headers() -> Headers {
        let mut headers = Headers::new();
        headers.push("From", "<sip:alice@example.com>;tag=a1");
        headers.push("To", "<sip:bob@example.org>");
        headers.push("Call-ID", "loop-1@example.com");
        headers.push("CSeq", "1 INVITE");
        headers
    }

    fn uri() -> Uri {
        Uri::parse("sip:bob@example.org")
    }

    fn with_vias(lower_branch: &str) -> Headers {
        let mut headers = Headers::new();
        headers.push("Via", "SIP/2.0/UDP 192.0.2.30;branch=z9hG4bKtop");
        headers.push(
            "Via",
            format!("SIP/2.0/UDP proxy.example.com:5060;branch={}", lower_branch),
        );
        headers.merged(&base_headers())
    }

    #[test]
    fn cookie_ignores_via_and_is_stable() {
        let cookie = DigestLoopCookie;
        let a = cookie.cookie(&base_headers(), &uri(), TransportKind::Udp);
        let b = cookie.cookie(&with_vias("z9hG4bKx"), &uri(), TransportKind::Udp);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);

        let other = cookie.cookie(&base_headers(), &uri(), TransportKind::Tcp);
        assert_ne!(a, other);
    }

    #[test]
    fn lower_via_with_cookie_is_loop() {
        let detector = LoopDetector::new(config(), Arc::new(DigestLoopCookie));
        let cookie = DigestLoopCookie.cookie(&base_headers(), &uri(), TransportKind::Udp);
        let headers = with_vias(&loop_branch(&cookie));

        let failure = detector.detect(&headers, &uri(), &origin()).unwrap_err();
        assert_eq!(failure.status, 482);
        assert_eq!(failure.reason, "Loop Detected");
    }

    #[test]
    fn different_suffix_is_not_loop() {
        let detector = LoopDetector::new(config(), Arc::new(DigestLoopCookie));
        let cookie = DigestLoopCookie.cookie(&base_headers(), &uri(), TransportKind::Udp);
        let headers = with_vias(&format!("z9hG4bKabc-o{}x", cookie));
        assert!(detector.detect(&headers, &uri(), &origin()).is_ok());
    }

    #[test]
    fn missing_branch_is_skipped() {
        let detector = LoopDetector::new(config(), Arc::new(DigestLoopCookie));
        let mut headers = Headers::new();
        headers.push("Via", "SIP/2.0/UDP proxy.example.com");
        let headers = headers.merged(&base_headers());
        assert!(detector.detect(&headers, &uri(), &origin()).is_ok());
    }

    #[test]
    fn disabled_detection_never_fails() {
        let config = Arc::new(ProxyConfig {
            detect_loops: false,
            ..(*config()).clone()
        });
        let detector = LoopDetector::new(config, Arc::new(DigestLoopCookie));
        let cookie = DigestLoopCookie.cookie(&base_headers(), &uri(), TransportKind::Udp);
        let headers = with_vias(&loop_branch(&cookie));
        assert!(detector.detect(&headers, &uri(), &origin()).is_ok());
    }

    #[test]
    fn branch_carries_cookie_suffix() {
        let branch = loop_branch("abc");
        assert!(branch.starts_with("z9hG4bK"));
        assert!(branch.ends_with("-oabc"));
        assert_ne!(loop_branch("abc"), branch);
    }
}
