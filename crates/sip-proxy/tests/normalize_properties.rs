// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use proptest::prelude::*;
use sip_core::{Headers, Uri};
use sip_parse::parse_via_header;
use sip_proxy::normalize::fix_top_via;
use sip_proxy::{
    loop_branch, DigestLoopCookie, LoopCookie, LoopDetector, Origin, ProxyConfig, RouteMatcher,
};
use sip_transport::TransportKind;
use smol_str::SmolStr;

const MINE: &str = "<sip:proxy.example.com;lr>";

fn config() -> Arc<ProxyConfig> {
    Arc::new(ProxyConfig {
        hostnames: vec![SmolStr::new("proxy.example.com")],
        ..ProxyConfig::default()
    })
}

fn origin(octet: u8, port: u16) -> Origin {
    Origin::detached(
        TransportKind::Udp,
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, octet)), port),
    )
}

fn dialog_headers(vias: &[String], call_id: &str, cseq: u32) -> Headers {
    let mut headers = Headers::new();
    for via in vias {
        headers.push("Via", via.as_str());
    }
    headers.push("From", "<sip:alice@example.com>;tag=f1");
    headers.push("To", "<sip:bob@example.org>");
    headers.push("Call-ID", call_id);
    headers.push("CSeq", format!("{} INVITE", cseq));
    headers
}

proptest! {
    /// A Via host that is not the source address gets `received`; nothing else moves.
    #[test]
    fn received_added_when_host_differs(
        host in "[a-z]{1,10}\\.example\\.net",
        octet in 1u8..255,
        port in 1024u16..65535,
        lower in prop::collection::vec("[a-z]{1,8}", 0..3),
    ) {
        let mut vias = vec![format!("SIP/2.0/UDP {};branch=z9hG4bKtop", host)];
        vias.extend(lower.iter().map(|h| format!("SIP/2.0/UDP {};branch=z9hG4bK{}", h, h)));
        let headers = dialog_headers(&vias, "prop-1", 1);
        let origin = origin(octet, port);

        let fixed = fix_top_via(&headers, &origin).unwrap();
        let top = parse_via_header(fixed.get("Via").unwrap()).unwrap();
        let addr = origin.addr_text();
        prop_assert_eq!(top.param("received").map(|v| v.as_str()), Some(addr.as_str()));
        prop_assert_eq!(top.branch(), Some("z9hG4bKtop"));
        prop_assert!(top.param("rport").is_none());
        prop_assert_eq!(&fixed.values("Via")[1..], &headers.values("Via")[1..]);
    }

    /// A Via that already names the source, without rport, is left byte-for-byte alone.
    #[test]
    fn matching_via_is_untouched(octet in 1u8..255, port in 1024u16..65535) {
        let origin = origin(octet, port);
        let vias = vec![format!("SIP/2.0/UDP {}:{};branch=z9hG4bKx", origin.addr_text(), port)];
        let headers = dialog_headers(&vias, "prop-2", 1);
        prop_assert_eq!(fix_top_via(&headers, &origin).unwrap(), headers);
    }

    /// An empty rport is always filled with the source port, along with received.
    #[test]
    fn empty_rport_is_filled(
        same_host in prop::bool::ANY,
        octet in 1u8..255,
        port in 1024u16..65535,
    ) {
        let origin = origin(octet, port);
        let host = if same_host { origin.addr_text() } else { "client.example.com".to_owned() };
        let vias = vec![format!("SIP/2.0/UDP {};rport;branch=z9hG4bKr", host)];
        let headers = dialog_headers(&vias, "prop-3", 1);

        let fixed = fix_top_via(&headers, &origin).unwrap();
        let top = parse_via_header(fixed.get("Via").unwrap()).unwrap();
        let port_text = port.to_string();
        let addr = origin.addr_text();
        prop_assert_eq!(top.param("rport").map(|v| v.as_str()), Some(port_text.as_str()));
        prop_assert_eq!(top.param("received").map(|v| v.as_str()), Some(addr.as_str()));
    }

    /// Loop detection gives the same answer however often it is asked, and
    /// always fires once our own cookie branch is in the Via stack.
    #[test]
    fn loop_detection_is_stable(
        call_id in "[a-z0-9]{4,16}",
        cseq in 1u32..100_000,
        looped in prop::bool::ANY,
    ) {
        let config = config();
        let detector = LoopDetector::new(config, Arc::new(DigestLoopCookie));
        let uri = Uri::parse("sip:bob@example.org");
        let origin = origin(7, 5060);

        let mut vias = vec!["SIP/2.0/UDP 203.0.113.7;branch=z9hG4bKc".to_owned()];
        let base = dialog_headers(&vias, &call_id, cseq);
        if looped {
            let cookie = DigestLoopCookie.cookie(&base, &uri, TransportKind::Udp);
            vias.push(format!("SIP/2.0/UDP proxy.example.com;branch={}", loop_branch(&cookie)));
        } else {
            vias.push("SIP/2.0/UDP proxy.example.com;branch=z9hG4bKunrelated".to_owned());
        }
        let headers = dialog_headers(&vias, &call_id, cseq);

        let first = detector.detect(&headers, &uri, &origin);
        let second = detector.detect(&headers, &uri, &origin);
        prop_assert_eq!(first.is_err(), looped);
        prop_assert_eq!(first, second);
    }

    /// Only a leading Route naming this proxy is removed; the rest keep their order.
    #[test]
    fn route_removal_pops_only_leading_self_entry(
        lead_is_mine in prop::bool::ANY,
        foreign in prop::collection::vec("[a-z]{1,8}", 0..5),
        trailing_mine in prop::bool::ANY,
    ) {
        let matcher = RouteMatcher::new(config());
        let mut routes: Vec<String> = Vec::new();
        if lead_is_mine {
            routes.push(MINE.to_owned());
        }
        routes.extend(foreign.iter().map(|h| format!("<sip:{}.example.net;lr>", h)));
        if trailing_mine {
            routes.push(MINE.to_owned());
        }

        let mut headers = dialog_headers(&["SIP/2.0/UDP a.example.com".to_owned()], "prop-5", 1);
        for route in &routes {
            headers.push("Route", route.as_str());
        }

        let once = matcher.remove_route_matching_me(&headers);
        let expected: Vec<SmolStr> = routes
            .iter()
            .skip(usize::from(lead_is_mine))
            .map(SmolStr::new)
            .collect();
        prop_assert_eq!(once.values("Route"), expected);

        // A second pass only removes what still leads with this proxy.
        let twice = matcher.remove_route_matching_me(&once);
        let second_lead_is_mine = once.values("Route").first().map(|r| r == MINE).unwrap_or(false);
        prop_assert_eq!(
            twice.values("Route").len() + usize::from(second_lead_is_mine),
            once.values("Route").len()
        );
    }
}
