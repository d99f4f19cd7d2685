#![no_main]
use std::sync::Arc;

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;
use sip_proxy::{adapt, DigestLoopCookie, IntakeOutcome, Normalizer, Origin, ProxyConfig, SipParser};
use sip_transport::TransportKind;
use smol_str::SmolStr;

static NORMALIZER: Lazy<Normalizer> = Lazy::new(|| {
    let config = ProxyConfig {
        hostnames: vec![SmolStr::new("proxy.example.com")],
        ..ProxyConfig::default()
    };
    Normalizer::new(Arc::new(config), Arc::new(DigestLoopCookie))
});

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    // First byte picks the transport so every Via fixup path gets exercised.
    let kind = match data[0] % 4 {
        0 => TransportKind::Udp,
        1 => TransportKind::Tcp,
        2 => TransportKind::Tls,
        _ => TransportKind::Udp6,
    };
    let peer = if kind.is_ipv6() {
        "[2001:db8::7]:5070".parse().unwrap()
    } else {
        "192.0.2.7:5070".parse().unwrap()
    };
    let origin = Origin::detached(kind, peer);
    let bytes = Bytes::copy_from_slice(&data[1..]);

    // A parser fault would come back as Dropped; the normalizer must not fault at all.
    if let IntakeOutcome::Message(message, _) = adapt(&SipParser::default(), &bytes, &origin, &NORMALIZER) {
        // Nothing reaches dispatch without a top Via to answer over.
        assert!(message.headers().get("Via").is_some());
    }
});
