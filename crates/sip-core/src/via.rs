// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;

use smol_str::SmolStr;

/// Structured representation of one Via field value.
///
/// Parameter names are stored lowercased and kept in the order received. A
/// parameter that appeared without a value (`;rport`) is present with an empty
/// string, never absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViaHeader {
    pub transport: SmolStr,
    pub host: SmolStr,
    pub port: Option<u16>,
    pub params: Vec<(SmolStr, SmolStr)>,
}

impl ViaHeader {
    /// Builds a Via without parameters.
    pub fn new(transport: impl Into<SmolStr>, host: impl Into<SmolStr>, port: Option<u16>) -> Self {
        Self {
            transport: transport.into(),
            host: host.into(),
            port,
            params: Vec::new(),
        }
    }

    /// Returns the transport token (e.g. UDP/TCP/TLS) associated with this Via.
    pub fn transport(&self) -> &str {
        self.transport.as_str()
    }

    /// Looks up the provided parameter ignoring ASCII case.
    pub fn param(&self, name: &str) -> Option<&SmolStr> {
        self.params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Returns the `branch` parameter, if any.
    pub fn branch(&self) -> Option<&str> {
        self.param("branch").map(SmolStr::as_str)
    }

    /// Returns a copy with `name` set to `value`, replaced in place or appended.
    pub fn with_param(&self, name: &str, value: impl Into<SmolStr>) -> Self {
        self.with_param_before(name, value, None)
    }

    /// Like [`with_param`](Self::with_param), but a new parameter goes in
    /// front of `anchor` when that parameter is present.
    pub fn with_param_before(
        &self,
        name: &str,
        value: impl Into<SmolStr>,
        anchor: Option<&str>,
    ) -> Self {
        let mut via = self.clone();
        let value = value.into();
        if let Some(slot) = via
            .params
            .iter_mut()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
        {
            slot.1 = value;
            return via;
        }
        let entry = (SmolStr::new(name.to_ascii_lowercase()), value);
        let at = anchor.and_then(|anchor| {
            via.params
                .iter()
                .position(|(key, _)| key.eq_ignore_ascii_case(anchor))
        });
        match at {
            Some(index) => via.params.insert(index, entry),
            None => via.params.push(entry),
        }
        via
    }

    /// Returns the explicit port or the supplied default.
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }
}

impl fmt::Display for ViaHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} ", self.transport)?;
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (name, value) in &self.params {
            if value.is_empty() {
                write!(f, ";{}", name)?;
            } else {
                write!(f, ";{}={}", name, value)?;
            }
        }
        Ok(())
    }
}
