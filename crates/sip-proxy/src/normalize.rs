// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-message normalization applied before dispatch.
//!
//! Requests get their top Via fixed up (RFC 3261 §18.2.1 `received`,
//! RFC 3581 §4 `rport`), are sanity and loop checked, and have strict-router
//! and self-addressed Route entries resolved (RFC 3261 §16.4). Responses are
//! only let through when their top Via is ours (RFC 3261 §16.7 step 2).

use std::sync::Arc;

use sip_core::{Headers, Method, Request, Response, SipMessage, Uri};
use sip_observe::intake_metrics;
use sip_parse::{parse_cseq, parse_name_addr, parse_via_header};
use sip_transport::TransportKind;
use tracing::{error, info, warn};

use crate::{
    adapter::IntakeOutcome,
    config::ProxyConfig,
    error::ParseFailure,
    loop_detect::{same_sent_by, LoopCookie, LoopDetector},
    route_match::{route_entries, RouteMatcher},
    summary::LogSummary,
    Origin,
};

#[derive(Clone)]
pub struct Normalizer {
    config: Arc<ProxyConfig>,
    loops: LoopDetector,
    routes: RouteMatcher,
}

impl Normalizer {
    pub fn new(config: Arc<ProxyConfig>, cookie: Arc<dyn LoopCookie>) -> Self {
        Self {
            loops: LoopDetector::new(config.clone(), cookie),
            routes: RouteMatcher::new(config.clone()),
            config,
        }
    }

    /// Normalizes either kind of message into an intake outcome.
    pub fn normalize(&self, message: SipMessage, origin: &Origin) -> IntakeOutcome {
        match message {
            SipMessage::Request(request) => match self.normalize_request(request, origin) {
                Ok((request, summary)) => IntakeOutcome::Message(request.into(), summary),
                Err(failure) => IntakeOutcome::ParseFailure(failure),
            },
            SipMessage::Response(response) => self.normalize_response(response, origin),
        }
    }

    /// Runs the request pipeline: Via fixups, sanity and loop checks, strict
    /// router rewrite, then self-Route removal.
    ///
    /// Any failure carries the header as fixed up so far, so the error
    /// response can still be routed back over the corrected Via.
    pub fn normalize_request(
        &self,
        request: Request,
        origin: &Origin,
    ) -> Result<(Request, LogSummary), ParseFailure> {
        let headers = fix_top_via(request.headers(), origin)
            .map_err(|failure| failure.with_method(request.method().clone()))?;
        self.check_request(&headers, request.method(), request.uri(), origin)
            .map_err(|failure| failure.with_method(request.method().clone()))?;

        let mut request = request.with_headers(headers);

        if self
            .routes
            .looks_like_own_record_route(request.uri(), request.headers())
        {
            if let Some((uri, headers)) = pop_strict_route(request.headers()) {
                info!(from = %request.uri(), to = %uri, "strict router detected; restoring Request-URI from Route");
                request = request.with_uri(uri).with_headers(headers);
            }
        }

        let headers = self.routes.remove_route_matching_me(request.headers());
        let request = request.with_headers(headers);

        let summary = LogSummary::for_request(&request, origin);
        Ok((request, summary))
    }

    /// Accepts a response only if its top Via is the one this proxy stamped.
    pub fn normalize_response(&self, response: Response, origin: &Origin) -> IntakeOutcome {
        if let Err(reason) = check_parties(response.headers()) {
            info!(%origin, reason, "dropping response with malformed From/To");
            intake_metrics().on_dropped("response-sanity");
            return IntakeOutcome::Dropped;
        }

        let top = match response.headers().get("Via") {
            Some(top) => top,
            None => {
                info!(%origin, "dropping response without Via");
                intake_metrics().on_dropped("response-via");
                return IntakeOutcome::Dropped;
            }
        };
        let via = match parse_via_header(top) {
            Some(via) => via,
            None => {
                info!(%origin, via = %top, "dropping response with unparseable top Via");
                intake_metrics().on_dropped("response-via");
                return IntakeOutcome::Dropped;
            }
        };

        let expected = self.config.via_for(origin.transport);
        let accepted = if is_same_hop(&via, &expected) {
            true
        } else {
            match TransportKind::for_via(via.transport(), origin.transport.is_ipv6()) {
                Some(kind) if is_same_hop(&via, &self.config.via_for(kind)) => {
                    info!(
                        %origin,
                        via_transport = via.transport(),
                        "response arrived over a different transport than its request"
                    );
                    true
                }
                _ => false,
            }
        };

        if !accepted {
            info!(%origin, via = %top, "dropping response whose top Via is not ours");
            intake_metrics().on_dropped("response-via");
            return IntakeOutcome::Dropped;
        }

        let summary = LogSummary::for_response(&response, origin);
        IntakeOutcome::Message(response.into(), summary)
    }

    /// Request sanity checks (RFC 3261 §16.3), then loop detection.
    fn check_request(
        &self,
        headers: &Headers,
        method: &Method,
        uri: &Uri,
        origin: &Origin,
    ) -> Result<(), ParseFailure> {
        if !uri.is_sip() {
            return Err(ParseFailure::request(
                headers.clone(),
                416,
                "Unsupported URI Scheme",
            ));
        }
        check_parties(headers)
            .map_err(|reason| ParseFailure::request(headers.clone(), 400, reason))?;

        let cseq = headers
            .get("CSeq")
            .and_then(|value| parse_cseq(value))
            .ok_or_else(|| ParseFailure::request(headers.clone(), 400, "Invalid CSeq"))?;
        if &cseq.method != method {
            return Err(ParseFailure::request(
                headers.clone(),
                400,
                "CSeq method does not match request method",
            ));
        }

        self.loops.detect(headers, uri, origin)
    }
}

/// Applies the `received` and `rport` fixups to the top Via.
///
/// The top Via is only rewritten when a parameter actually changes; an
/// untouched Via keeps its original text.
pub fn fix_top_via(headers: &Headers, origin: &Origin) -> Result<Headers, ParseFailure> {
    let top = headers
        .get("Via")
        .ok_or_else(|| ParseFailure::request(headers.clone(), 400, "Missing Via header"))?;
    let mut via = parse_via_header(top)
        .ok_or_else(|| ParseFailure::request(headers.clone(), 400, "Invalid Via header"))?;

    let addr = origin.addr_text();
    let port = origin.port.to_string();
    let mut changed = false;

    // RFC 3581 §4 places received ahead of rport.
    if via.host != addr.as_str() {
        via = via.with_param_before("received", addr.as_str(), Some("rport"));
        changed = true;
    }

    match via.param("rport").cloned() {
        None => {}
        Some(rport) if rport.is_empty() => {
            via = via
                .with_param("rport", port.as_str())
                .with_param_before("received", addr.as_str(), Some("rport"));
            changed = true;
        }
        Some(rport) if rport == port.as_str() => {
            warn!(%origin, "client filled in rport itself; it should be left empty (RFC 3581 §4)");
        }
        Some(rport) => {
            error!(%origin, %rport, "Via rport does not match source port; overriding");
            via = via.with_param("rport", port.as_str());
            changed = true;
        }
    }

    if changed {
        Ok(headers.with_first_value("Via", via.to_string()))
    } else {
        Ok(headers.clone())
    }
}

/// Replaces the Request-URI with the last Route entry (RFC 3261 §16.4).
///
/// Returns the new Request-URI and the header with that entry removed; the
/// Route field is dropped when nothing remains.
pub fn pop_strict_route(headers: &Headers) -> Option<(Uri, Headers)> {
    let mut reversed = route_entries(headers);
    reversed.reverse();
    if reversed.is_empty() {
        return None;
    }
    let last = reversed.remove(0);
    let uri = match parse_name_addr(&last) {
        Some(route) => route.uri,
        None => {
            warn!(route = %last, "cannot parse Route entry for strict-router rewrite");
            return None;
        }
    };
    reversed.reverse();
    Some((uri, headers.with_values("Route", reversed)))
}

/// RFC 3261 §16.3 item 1: exactly one From and one To, each naming a SIP URI.
fn check_parties(headers: &Headers) -> Result<(), &'static str> {
    if !is_single_sip_party(headers, "From") {
        return Err("Invalid From header");
    }
    if !is_single_sip_party(headers, "To") {
        return Err("Invalid To header");
    }
    Ok(())
}

fn is_single_sip_party(headers: &Headers, name: &str) -> bool {
    let mut values = headers.get_all(name);
    match (values.next(), values.next()) {
        (Some(value), None) => parse_name_addr(value)
            .map(|party| party.uri.is_sip())
            .unwrap_or(false),
        _ => false,
    }
}

fn is_same_hop(via: &sip_core::ViaHeader, expected: &sip_core::ViaHeader) -> bool {
    via.transport().eq_ignore_ascii_case(expected.transport()) && same_sent_by(via, expected)
}
