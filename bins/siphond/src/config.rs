// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

/// Builds the proxy configuration from an optional JSON file plus command-line overrides.
use std::net::SocketAddr;
use std::path::Path;

use anyhow::Result;
use sip_proxy::ProxyConfig;
use smol_str::SmolStr;

pub fn load(
    path: Option<&Path>,
    hostnames: &[String],
    udp_bind: SocketAddr,
) -> Result<ProxyConfig> {
    let mut config = match path {
        Some(path) => ProxyConfig::from_json_file(path)?,
        None => ProxyConfig::default(),
    };

    if !hostnames.is_empty() {
        config.hostnames = hostnames.iter().map(SmolStr::new).collect();
    }
    if config.listen_port == ProxyConfig::default().listen_port {
        config.listen_port = udp_bind.port();
    }
    if !udp_bind.ip().is_unspecified() && !config.local_addresses.contains(&udp_bind.ip()) {
        config.local_addresses.push(udp_bind.ip());
    }
    if config.hostnames.is_empty() {
        // Without a name our Via would be unusable; fall back to the bind address.
        config.hostnames.push(SmolStr::new(udp_bind.ip().to_string()));
    }
    Ok(config)
}
