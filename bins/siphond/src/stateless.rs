// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sip_core::{Headers, Request, SipMessage};
use sip_proxy::{ApplicationHandler, LogSummary, Origin, TransactionLayer, TransactionVerdict};
use tracing::trace;

/// Transaction layer for a stateless daemon: every message goes straight to
/// the application and no server transaction ever exists.
pub struct StatelessTransactions {
    app: Arc<dyn ApplicationHandler>,
}

impl StatelessTransactions {
    pub fn new(app: Arc<dyn ApplicationHandler>) -> Self {
        Self { app }
    }
}

#[async_trait]
impl TransactionLayer for StatelessTransactions {
    async fn from_transport(
        &self,
        _message: SipMessage,
        _origin: &Origin,
        summary: &LogSummary,
    ) -> Result<TransactionVerdict> {
        trace!(%summary, "stateless pass-through");
        Ok(TransactionVerdict::PassToCore(self.app.clone()))
    }

    async fn send_response_for_request(
        &self,
        _request: &Request,
        status: u16,
        _reason: &str,
        _extra_headers: &Headers,
    ) -> Result<()> {
        // The responder falls back to a direct send.
        Err(anyhow!("no server transaction for {} response", status))
    }
}
