// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Observability hooks for the proxy intake layer.
//!
//! Provides tracing spans for transports and received packets, plus an
//! intake metrics sink counting keepalives, drops, and error responses.
//!
//! # Example
//! ```
//! use std::sync::Arc;
//! use sip_observe::{set_intake_metrics, TracingIntakeMetrics};
//! set_intake_metrics(Arc::new(TracingIntakeMetrics));
//! // Metrics automatically emitted via tracing events
//! ```

use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::Level;

/// Metrics sink used by the intake pipeline to emit observability events.
///
/// `stage` is a low-cardinality identifier such as "adapter" or "response-via";
/// implementations should not expect peer addresses or header values here.
pub trait IntakeMetrics: Send + Sync + 'static {
    fn on_packet(&self, transport: &str);
    fn on_keepalive(&self, transport: &str);
    fn on_dropped(&self, stage: &str);
    fn on_error_response(&self, status: u16);
    fn on_suppressed(&self, status: u16);
    fn on_dispatch_fault(&self);
}

#[derive(Debug, Default)]
struct NoopIntakeMetrics;

impl IntakeMetrics for NoopIntakeMetrics {
    fn on_packet(&self, _transport: &str) {}
    fn on_keepalive(&self, _transport: &str) {}
    fn on_dropped(&self, _stage: &str) {}
    fn on_error_response(&self, _status: u16) {}
    fn on_suppressed(&self, _status: u16) {}
    fn on_dispatch_fault(&self) {}
}

static INTAKE_METRICS: OnceCell<Arc<dyn IntakeMetrics>> = OnceCell::new();
static NOOP_INTAKE_METRICS: NoopIntakeMetrics = NoopIntakeMetrics;

/// Installs the global intake metrics implementation.
///
/// Returns `true` if the metrics sink was installed, or `false` if it was
/// already configured.
pub fn set_intake_metrics(metrics: Arc<dyn IntakeMetrics>) -> bool {
    INTAKE_METRICS.set(metrics).is_ok()
}

/// Returns the currently configured intake metrics sink.
pub fn intake_metrics() -> &'static dyn IntakeMetrics {
    INTAKE_METRICS
        .get()
        .map(|arc| arc.as_ref())
        .unwrap_or(&NOOP_INTAKE_METRICS)
}

/// Creates a tracing span associated with the given transport operation.
pub fn span_with_transport(name: &'static str, transport: &str) -> tracing::Span {
    tracing::span!(Level::INFO, "transport", op = name, transport = transport)
}

/// Creates a tracing span for one received packet, keyed by its origin.
pub fn span_with_origin(origin: &dyn std::fmt::Display) -> tracing::Span {
    tracing::span!(Level::INFO, "intake", origin = %origin)
}

/// Simple metrics implementation that logs via `tracing`.
#[derive(Debug, Default)]
pub struct TracingIntakeMetrics;

impl IntakeMetrics for TracingIntakeMetrics {
    fn on_packet(&self, transport: &str) {
        tracing::debug!(transport, "packet received");
    }

    fn on_keepalive(&self, transport: &str) {
        tracing::trace!(transport, "keepalive");
    }

    fn on_dropped(&self, stage: &str) {
        tracing::debug!(stage, "packet dropped");
    }

    fn on_error_response(&self, status: u16) {
        tracing::debug!(status, "error response sent");
    }

    fn on_suppressed(&self, status: u16) {
        tracing::debug!(status, "error response suppressed");
    }

    fn on_dispatch_fault(&self) {
        tracing::warn!("dispatch fault");
    }
}
