// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Single entry point for a received packet.
//!
//! [`IntakePipeline::process`] parses, normalizes and dispatches one packet,
//! and answers whatever went wrong along the way. It never returns an error
//! and never lets a panic out: the returned [`Disposition`] only reports what
//! happened.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use bytes::Bytes;
use sip_core::{Headers, Request};
use sip_observe::{intake_metrics, span_with_origin};
use tracing::{debug, error, info, Instrument};

use crate::{
    adapter::{adapt, IntakeOutcome, MessageParser, SipParser},
    config::ProxyConfig,
    dispatch::{Destination, DispatchRouter, TransactionLayer},
    error::IntakeError,
    loop_detect::{DigestLoopCookie, LoopCookie},
    normalize::Normalizer,
    responder::{ErrorResponder, ResponseDisposition, ResponseTarget, Transport},
    supervise::panic_message,
    Origin,
};

/// What became of one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Dispatched,
    Keepalive,
    Dropped,
    /// An error response with this status was sent.
    Answered(u16),
    /// An error response with this status was due but the request was an ACK.
    Suppressed(u16),
}

#[derive(Clone)]
pub struct IntakePipeline {
    config: Arc<ProxyConfig>,
    parser: Arc<dyn MessageParser>,
    normalizer: Normalizer,
    router: DispatchRouter,
    responder: ErrorResponder,
    destination: Destination,
}

impl IntakePipeline {
    /// Pipeline with the stock parser and loop cookie, dispatching to the
    /// transaction layer.
    pub fn new(
        config: Arc<ProxyConfig>,
        transactions: Arc<dyn TransactionLayer>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            parser: Arc::new(SipParser::default()),
            normalizer: Normalizer::new(config.clone(), Arc::new(DigestLoopCookie)),
            router: DispatchRouter::new(transactions.clone()),
            responder: ErrorResponder::new(transactions, transport),
            destination: Destination::TransactionLayer,
            config,
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn MessageParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_loop_cookie(mut self, cookie: Arc<dyn LoopCookie>) -> Self {
        self.normalizer = Normalizer::new(self.config.clone(), cookie);
        self
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Consumes one received packet.
    pub async fn process(&self, datagram: Bytes, origin: Origin) -> Disposition {
        let span = span_with_origin(&origin);
        self.process_inner(datagram, origin).instrument(span).await
    }

    async fn process_inner(&self, datagram: Bytes, origin: Origin) -> Disposition {
        intake_metrics().on_packet(origin.transport.as_str());

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            adapt(self.parser.as_ref(), &datagram, &origin, &self.normalizer)
        }));
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(panic) => {
                let err = IntakeError::MalformedPacket(panic_message(panic.as_ref()));
                error!(error = %err, "intake fault; dropping packet");
                intake_metrics().on_dropped("normalizer");
                return Disposition::Dropped;
            }
        };

        match outcome {
            IntakeOutcome::Keepalive => Disposition::Keepalive,
            IntakeOutcome::Dropped => Disposition::Dropped,
            IntakeOutcome::ParseFailure(failure) => {
                self.answer_failure(failure.into(), &origin).await
            }
            IntakeOutcome::Message(message, summary) => {
                debug!(%summary, "dispatching");
                let request = message.as_request().cloned();

                let router = self.router.clone();
                let destination = self.destination.clone();
                let task_origin = origin.clone();
                let dispatched = tokio::spawn(
                    async move {
                        router
                            .route(&destination, message, &task_origin, &summary)
                            .await
                    }
                    .in_current_span(),
                )
                .await;

                let err = match dispatched {
                    Ok(Ok(())) => return Disposition::Dispatched,
                    Ok(Err(err)) => err,
                    Err(join) if join.is_panic() => IntakeError::DispatchFault(anyhow::anyhow!(
                        "handler panicked: {}",
                        panic_message(join.into_panic().as_ref())
                    )),
                    Err(join) => IntakeError::DispatchFault(anyhow::anyhow!(join.to_string())),
                };
                self.answer_dispatch_error(err, request.as_ref(), &origin).await
            }
        }
    }

    async fn answer_failure(&self, err: IntakeError, origin: &Origin) -> Disposition {
        let (failure, (status, reason)) = match (err.failure(), err.status()) {
            (Some(failure), Some(answer)) => (failure, answer),
            _ => {
                info!(error = %err, "dropping unparseable response");
                intake_metrics().on_dropped("response-parse");
                return Disposition::Dropped;
            }
        };

        info!(error = %err, "rejecting request");
        let headers = failure.headers.clone().unwrap_or_default();
        let target = match &failure.method {
            Some(method) => ResponseTarget::Rejected(method, &headers),
            None => ResponseTarget::Headers(&headers),
        };
        let disposition = self
            .responder
            .respond(target, &origin.socket, status, reason, &failure.extra_headers)
            .await;
        to_disposition(disposition, status)
    }

    async fn answer_dispatch_error(
        &self,
        err: IntakeError,
        request: Option<&Request>,
        origin: &Origin,
    ) -> Disposition {
        error!(error = %err, "dispatch failed");
        intake_metrics().on_dispatch_fault();

        let (status, reason) = match err.status() {
            Some(status) => status,
            None => return Disposition::Dropped,
        };
        match request {
            Some(request) => {
                let disposition = self
                    .responder
                    .respond(
                        ResponseTarget::Request(request),
                        &origin.socket,
                        status,
                        reason,
                        &Headers::new(),
                    )
                    .await;
                to_disposition(disposition, status)
            }
            // Responses are never answered.
            None => Disposition::Dropped,
        }
    }
}

fn to_disposition(disposition: ResponseDisposition, status: u16) -> Disposition {
    match disposition {
        ResponseDisposition::Sent | ResponseDisposition::SentDirect => Disposition::Answered(status),
        ResponseDisposition::Suppressed => Disposition::Suppressed(status),
        ResponseDisposition::Unroutable | ResponseDisposition::Failed => Disposition::Dropped,
    }
}

impl std::fmt::Debug for IntakePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntakePipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
