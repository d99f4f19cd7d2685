// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Read-only proxy identity and policy.
//!
//! Loaded once at startup and shared as `Arc<ProxyConfig>`; nothing in the
//! intake path mutates it.

use std::net::IpAddr;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sip_core::ViaHeader;
use sip_transport::TransportKind;
use smol_str::SmolStr;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Names this proxy answers to. The first one goes into our Via.
    pub hostnames: Vec<SmolStr>,
    pub local_addresses: Vec<IpAddr>,
    /// UDP and TCP listening port.
    pub listen_port: u16,
    pub tls_listen_port: u16,
    pub detect_loops: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            hostnames: Vec::new(),
            local_addresses: Vec::new(),
            listen_port: 5060,
            tls_listen_port: 5061,
            detect_loops: true,
        }
    }
}

impl ProxyConfig {
    /// Parses a JSON document; missing keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid proxy configuration")
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_json_str(&text)
    }

    /// Host this proxy writes into its own Via and Record-Route entries.
    pub fn my_hostname(&self) -> SmolStr {
        if let Some(name) = self.hostnames.first() {
            return name.clone();
        }
        match self.local_addresses.first() {
            Some(addr) => SmolStr::new(addr.to_string()),
            None => SmolStr::new_inline("localhost"),
        }
    }

    pub fn listen_port_for(&self, transport: TransportKind) -> u16 {
        if transport.is_secure() {
            self.tls_listen_port
        } else {
            self.listen_port
        }
    }

    pub fn listen_ports(&self) -> Vec<u16> {
        let mut ports = vec![self.listen_port, self.tls_listen_port];
        ports.dedup();
        ports
    }

    /// True if `host` is one of our hostnames (case-insensitive) or local addresses.
    pub fn is_local_host(&self, host: &str) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if self
            .hostnames
            .iter()
            .any(|name| name.eq_ignore_ascii_case(host))
        {
            return true;
        }
        match host.parse::<IpAddr>() {
            Ok(ip) => self.local_addresses.contains(&ip),
            Err(_) => false,
        }
    }

    /// The Via this proxy stamps when forwarding over `transport`, without parameters.
    pub fn via_for(&self, transport: TransportKind) -> ViaHeader {
        ViaHeader::new(
            transport.via_transport(),
            self.my_hostname(),
            Some(self.listen_port_for(transport)),
        )
    }
}
