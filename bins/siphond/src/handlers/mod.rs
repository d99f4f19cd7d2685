// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Application handlers the daemon hands normalized messages to.

pub mod options;

use anyhow::Result;
use sip_core::{Headers, Request};
use sip_parse::serialize_response;
use sip_proxy::{build_error_response, Origin};

/// Sends a transaction-less response for `request` back on the socket it came in on.
pub async fn reply(
    request: &Request,
    origin: &Origin,
    status: u16,
    reason: &str,
    extra_headers: &Headers,
) -> Result<()> {
    let response = build_error_response(request.headers(), status, reason, extra_headers)?;
    origin.socket.send(serialize_response(&response)).await
}
