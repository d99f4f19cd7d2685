// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use sip_transport::{InboundPacket, SocketHandle, TransportKind};

/// Where a packet came from and how to answer it.
///
/// Built once per received packet and never modified afterwards.
#[derive(Debug, Clone)]
pub struct Origin {
    pub transport: TransportKind,
    pub addr: IpAddr,
    pub port: u16,
    pub socket: SocketHandle,
}

impl Origin {
    pub fn new(transport: TransportKind, addr: IpAddr, port: u16, socket: SocketHandle) -> Self {
        Self {
            transport,
            addr,
            port,
            socket,
        }
    }

    /// Builds the origin of a packet handed over by a transport listener.
    pub fn from_packet(packet: &InboundPacket) -> Self {
        let transport = packet.transport.with_ipv6(packet.peer.is_ipv6());
        Self::new(
            transport,
            packet.peer.ip(),
            packet.peer.port(),
            packet.socket.clone(),
        )
    }

    /// Origin without a reply path, for replayed captures and tests.
    pub fn detached(transport: TransportKind, peer: SocketAddr) -> Self {
        Self::new(transport, peer.ip(), peer.port(), SocketHandle::Detached)
    }

    /// Source address as it is written into a Via `received` parameter.
    pub fn addr_text(&self) -> String {
        self.addr.to_string()
    }

    pub fn peer(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transport.as_str(), self.peer())
    }
}
