// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Message intake and normalization for a SIP proxy.
//!
//! Takes a packet just read off a socket and turns it into a validated
//! request or response for the transaction layer or an application handler,
//! or into a correctly sent (or correctly suppressed) error response.
//!
//! - **Parsing**: [`adapt`] classifies the parser's result and contains parser panics
//! - **Normalization**: [`Normalizer`] applies Via `received`/`rport` fixups
//!   (RFC 3261 §18.2.1, RFC 3581), sanity and loop checks, strict-router
//!   rewriting and self-Route popping (RFC 3261 §16.4)
//! - **Dispatch**: [`DispatchRouter`] delivers to the [`TransactionLayer`] or an
//!   [`ApplicationHandler`]
//! - **Errors**: [`ErrorResponder`] answers failures and never answers an ACK
//! - **Entry point**: [`IntakePipeline::process`]
//!
//! # Example
//! ```no_run
//! use std::sync::Arc;
//! use sip_proxy::{IntakePipeline, Origin, ProxyConfig, SocketTransport, TransactionLayer};
//! # async fn run(transactions: Arc<dyn TransactionLayer>, origin: Origin, packet: bytes::Bytes) {
//! let config = Arc::new(ProxyConfig::from_json_file("proxy.json").unwrap());
//! let pipeline = IntakePipeline::new(config, transactions, Arc::new(SocketTransport));
//! let disposition = pipeline.process(packet, origin).await;
//! # let _ = disposition;
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod loop_detect;
pub mod normalize;
pub mod origin;
pub mod pipeline;
pub mod responder;
pub mod route_match;
pub mod summary;
pub mod supervise;

pub use adapter::{adapt, IntakeOutcome, MessageParser, SipParser};
pub use config::ProxyConfig;
pub use dispatch::{
    ApplicationHandler, Destination, DispatchRouter, TransactionLayer, TransactionVerdict,
};
pub use error::{FailureScope, IntakeError, ParseFailure, TaskError};
pub use loop_detect::{loop_branch, DigestLoopCookie, LoopCookie, LoopDetector};
pub use normalize::Normalizer;
pub use origin::Origin;
pub use pipeline::{Disposition, IntakePipeline};
pub use responder::{
    build_error_response, ErrorResponder, ResponseDisposition, ResponseTarget, SocketTransport,
    Transport,
};
pub use route_match::RouteMatcher;
pub use summary::LogSummary;
pub use supervise::launch;
