// siphon-rs - The Siphon SIP Stack
// Copyright (C) 2025 James Ferris <ferrous.communications@gmail.com>
// SPDX-License-Identifier: Apache-2.0 OR MIT

mod config;
mod handlers;
mod stateless;

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use sip_observe::{set_intake_metrics, TracingIntakeMetrics};
use sip_proxy::{launch, IntakePipeline, Origin, SocketTransport, TaskError};
use sip_transport::{run_tcp, run_udp, InboundPacket};
use tokio::{net::UdpSocket, sync::mpsc};
use tracing::info;

use crate::handlers::options::OptionsHandler;
use crate::stateless::StatelessTransactions;

pub(crate) const USER_AGENT: &str = "siphond/0.1";

/// Stateless SIP intake daemon: normalizes every packet and answers OPTIONS
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Bind address (UDP)
    #[arg(long, default_value = "0.0.0.0:5060")]
    udp_bind: SocketAddr,
    /// Bind address (TCP)
    #[arg(long, default_value = "0.0.0.0:5060")]
    tcp_bind: String,
    /// JSON proxy configuration
    #[arg(long)]
    config: Option<PathBuf>,
    /// Host name this proxy answers to; may be repeated
    #[arg(long = "hostname")]
    hostnames: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();
    set_intake_metrics(Arc::new(TracingIntakeMetrics::default()));

    let args = Args::parse();
    let config = Arc::new(
        config::load(args.config.as_deref(), &args.hostnames, args.udp_bind)
            .context("loading proxy configuration")?,
    );

    let app = Arc::new(OptionsHandler::new());
    let pipeline = IntakePipeline::new(
        config.clone(),
        Arc::new(StatelessTransactions::new(app)),
        Arc::new(SocketTransport),
    );

    let socket = Arc::new(
        UdpSocket::bind(args.udp_bind)
            .await
            .with_context(|| format!("binding udp {}", args.udp_bind))?,
    );

    let (tx, mut rx) = mpsc::channel::<InboundPacket>(1024);
    tokio::spawn({
        let tx = tx.clone();
        let bind = args.udp_bind;
        async move {
            if let Err(e) = run_udp(socket, tx).await {
                tracing::error!(%e, %bind, "udp listener exited");
            }
        }
    });
    tokio::spawn({
        let bind = args.tcp_bind.clone();
        async move {
            if let Err(e) = run_tcp(&bind, tx).await {
                tracing::error!(%e, bind = %bind, "tcp listener exited");
            }
        }
    });

    info!(
        udp = %args.udp_bind,
        tcp = %args.tcp_bind,
        hostname = %config.my_hostname(),
        "siphond started"
    );
    while let Some(packet) = rx.recv().await {
        let pipeline = pipeline.clone();
        launch("intake", async move {
            let origin = Origin::from_packet(&packet);
            pipeline.process(packet.payload, origin).await;
            Ok::<(), TaskError>(())
        });
    }
    Ok(())
}
