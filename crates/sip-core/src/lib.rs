// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core SIP types used by the proxy intake layer.
//!
//! - **Messages**: [`Request`], [`Response`], [`SipMessage`]
//! - **URIs**: [`SipUri`] and [`Uri`], which keeps unresolvable URIs as raw text
//! - **Headers**: [`Headers`], an ordered multi-map with case-insensitive names
//! - **Via**: [`ViaHeader`], the structured form of one Via value
//!
//! Strings use [`SmolStr`](smol_str::SmolStr) and bodies use [`Bytes`](bytes::Bytes)
//! so messages can be cloned cheaply as they move between pipeline stages.
//!
//! # Examples
//!
//! ```
//! # use sip_core::*;
//! let uri = SipUri::parse("sip:alice@example.com").unwrap();
//! assert_eq!(uri.port_or_default(), 5060);
//!
//! let mut headers = Headers::new();
//! headers.push("Via", "SIP/2.0/UDP pc33.example.com");
//! let headers = headers.with_appended("Via", "SIP/2.0/UDP 192.0.2.4");
//! assert_eq!(headers.get_all("via").count(), 2);
//! ```

pub mod headers;
pub mod method;
pub mod msg;
pub mod uri;
pub mod via;

pub use headers::{Header, Headers};
pub use method::Method;
pub use msg::{MessageError, Request, RequestLine, Response, SipMessage, StatusLine};
pub use uri::{SipUri, Uri};
pub use via::ViaHeader;
