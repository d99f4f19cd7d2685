// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use sip_core::{Headers, Request, Response, SipMessage};
use tracing::debug;

use crate::{error::IntakeError, summary::LogSummary, Origin};

/// Application entry points a normalized message can be delivered to.
#[async_trait]
pub trait ApplicationHandler: Send + Sync {
    async fn request(&self, request: Request, origin: Origin, summary: LogSummary) -> Result<()>;

    async fn response(&self, response: Response, origin: Origin, summary: LogSummary)
        -> Result<()>;
}

/// What the transaction layer decided to do with an incoming message.
pub enum TransactionVerdict {
    /// Fully handled by a transaction; nothing else to do.
    Continue,
    /// No transaction owns it; hand it to this application handler.
    PassToCore(Arc<dyn ApplicationHandler>),
}

impl std::fmt::Debug for TransactionVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionVerdict::Continue => f.write_str("Continue"),
            TransactionVerdict::PassToCore(_) => f.write_str("PassToCore(..)"),
        }
    }
}

/// Transaction-matching collaborator (RFC 3261 §17).
#[async_trait]
pub trait TransactionLayer: Send + Sync {
    /// Matches a message to a transaction, or tells the router who gets it.
    ///
    /// An `Err` means the layer could not come to a decision and is answered
    /// with 500.
    async fn from_transport(
        &self,
        message: SipMessage,
        origin: &Origin,
        summary: &LogSummary,
    ) -> Result<TransactionVerdict>;

    /// Sends a response through the server transaction of `request`.
    async fn send_response_for_request(
        &self,
        request: &Request,
        status: u16,
        reason: &str,
        extra_headers: &Headers,
    ) -> Result<()>;
}

/// Where a normalized message goes first. Resolved once, when the pipeline is built.
#[derive(Clone)]
pub enum Destination {
    TransactionLayer,
    Application(Arc<dyn ApplicationHandler>),
}

#[derive(Clone)]
pub struct DispatchRouter {
    transactions: Arc<dyn TransactionLayer>,
}

impl DispatchRouter {
    pub fn new(transactions: Arc<dyn TransactionLayer>) -> Self {
        Self { transactions }
    }

    /// Delivers `message` to `destination`.
    ///
    /// A `PassToCore` verdict from the transaction layer is followed by
    /// delivery to the named handler.
    pub async fn route(
        &self,
        destination: &Destination,
        message: SipMessage,
        origin: &Origin,
        summary: &LogSummary,
    ) -> Result<(), IntakeError> {
        match destination {
            Destination::Application(handler) => {
                deliver(handler.as_ref(), message, origin, summary).await
            }
            Destination::TransactionLayer => {
                let verdict = self
                    .transactions
                    .from_transport(message.clone(), origin, summary)
                    .await
                    .map_err(IntakeError::RoutingProtocolError)?;
                match verdict {
                    TransactionVerdict::Continue => {
                        debug!(%summary, "handled by transaction layer");
                        Ok(())
                    }
                    TransactionVerdict::PassToCore(handler) => {
                        debug!(%summary, "passed to core");
                        deliver(handler.as_ref(), message, origin, summary).await
                    }
                }
            }
        }
    }
}

async fn deliver(
    handler: &dyn ApplicationHandler,
    message: SipMessage,
    origin: &Origin,
    summary: &LogSummary,
) -> Result<(), IntakeError> {
    let result = match message {
        SipMessage::Request(request) => {
            handler
                .request(request, origin.clone(), summary.clone())
                .await
        }
        SipMessage::Response(response) => {
            handler
                .response(response, origin.clone(), summary.clone())
                .await
        }
    };
    result.map_err(IntakeError::DispatchFault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use bytes::Bytes;
    use sip_core::{Method, RequestLine, SipUri};
    use sip_transport::TransportKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingApp {
        requests: AtomicUsize,
        responses: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ApplicationHandler for CountingApp {
        async fn request(&self, _request: Request, _origin: Origin, _summary: LogSummary) -> Result<()> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("handler failed"));
            }
            Ok(())
        }

        async fn response(&self, _response: Response, _origin: Origin, _summary: LogSummary) -> Result<()> {
            self.responses.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    enum Mode {
        Continue,
        Pass(Arc<dyn ApplicationHandler>),
        Fail,
    }

    struct ScriptedTransactions(Mode);

    #[async_trait]
    impl TransactionLayer for ScriptedTransactions {
        async fn from_transport(
            &self,
            _message: SipMessage,
            _origin: &Origin,
            _summary: &LogSummary,
        ) -> Result<TransactionVerdict> {
            match &self.0 {
                Mode::Continue => Ok(TransactionVerdict::Continue),
                Mode::Pass(handler) => Ok(TransactionVerdict::PassToCore(handler.clone())),
                Mode::Fail => Err(anyhow!("unexpected transaction state")),
            }
        }

        async fn send_response_for_request(
            &self,
            _request: &Request,
            _status: u16,
            _reason: &str,
            _extra_headers: &Headers,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn message() -> SipMessage {
        Request::new(
            RequestLine::new(Method::OPTIONS, SipUri::parse("sip:example.org").unwrap()),
            Headers::new(),
            Bytes::new(),
        )
        .unwrap()
        .into()
    }

    fn origin() -> Origin {
        Origin::detached(TransportKind::Udp, "192.0.2.1:5060".parse().unwrap())
    }

    fn summary() -> LogSummary {
        match message() {
            SipMessage::Request(req) => LogSummary::for_request(&req, &origin()),
            SipMessage::Response(_) => unreachable!(),
        }
    }

    #[tokio::test]
    async fn application_destination_receives_request() {
        let app = Arc::new(CountingApp::default());
        let router = DispatchRouter::new(Arc::new(ScriptedTransactions(Mode::Continue)));
        router
            .route(&Destination::Application(app.clone()), message(), &origin(), &summary())
            .await
            .unwrap();
        assert_eq!(app.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pass_to_core_reaches_handler() {
        let app = Arc::new(CountingApp::default());
        let router = DispatchRouter::new(Arc::new(ScriptedTransactions(Mode::Pass(app.clone()))));
        router
            .route(&Destination::TransactionLayer, message(), &origin(), &summary())
            .await
            .unwrap();
        assert_eq!(app.requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn continue_stops_at_transaction_layer() {
        let router = DispatchRouter::new(Arc::new(ScriptedTransactions(Mode::Continue)));
        assert!(router
            .route(&Destination::TransactionLayer, message(), &origin(), &summary())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn transaction_error_is_routing_protocol_error() {
        let router = DispatchRouter::new(Arc::new(ScriptedTransactions(Mode::Fail)));
        let err = router
            .route(&Destination::TransactionLayer, message(), &origin(), &summary())
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::RoutingProtocolError(_)));
    }

    #[tokio::test]
    async fn handler_error_is_dispatch_fault() {
        let app = Arc::new(CountingApp {
            fail: true,
            ..CountingApp::default()
        });
        let router = DispatchRouter::new(Arc::new(ScriptedTransactions(Mode::Continue)));
        let err = router
            .route(&Destination::Application(app), message(), &origin(), &summary())
            .await
            .unwrap_err();
        assert!(matches!(err, IntakeError::DispatchFault(_)));
    }
}
