// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use smol_str::SmolStr;

/// A SIP request method token.
///
/// Methods are case-sensitive in SIP (RFC 3261 §7.1); the token is kept as
/// received so extension methods pass through the proxy unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method(SmolStr);

impl Method {
    pub const INVITE: Method = Method(SmolStr::new_inline("INVITE"));
    pub const ACK: Method = Method(SmolStr::new_inline("ACK"));
    pub const BYE: Method = Method(SmolStr::new_inline("BYE"));
    pub const CANCEL: Method = Method(SmolStr::new_inline("CANCEL"));
    pub const REGISTER: Method = Method(SmolStr::new_inline("REGISTER"));
    pub const OPTIONS: Method = Method(SmolStr::new_inline("OPTIONS"));

    /// Wraps a method token. Returns `None` for an empty or non-token string.
    pub fn new(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.is_empty() || !token.chars().all(is_token_char) {
            return None;
        }
        Some(Method(SmolStr::new(token)))
    }

    /// Returns the method token.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns `true` for ACK, which must never be answered.
    pub fn is_ack(&self) -> bool {
        self.0 == "ACK"
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// RFC 3261 `token` characters.
pub fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-.!%*_+`'~".contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_extension_methods() {
        let method = Method::new("PUBLISH").unwrap();
        assert_eq!(method.as_str(), "PUBLISH");
        assert!(!method.is_ack());
    }

    #[test]
    fn rejects_empty_and_garbage() {
        assert!(Method::new("").is_none());
        assert!(Method::new("IN VITE").is_none());
        assert!(Method::new("A:B").is_none());
    }

    #[test]
    fn constants_compare_with_parsed() {
        assert_eq!(Method::new("ACK").unwrap(), Method::ACK);
        assert!(Method::ACK.is_ack());
        assert!(!Method::new("ack").unwrap().is_ack());
    }
}
