use crate::{
    check::{self, ProbeReport},
    config::ProbeConfig,
    dns::{SystemResolver, TlsaLookup},
    metrics::encode_report,
};
use anyhow::Context;
use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::FutureExt;
use std::{
    net::{IpAddr, SocketAddr},
    panic::AssertUnwindSafe,
    sync::Arc,
};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};

/// Shared, read-only state of the metrics endpoint
pub struct Scrape<L> {
    pub config: ProbeConfig,
    pub lookup: L,
}

/// Router exposing `GET /metrics`
#[must_use]
pub fn router<L: TlsaLookup + 'static>(config: ProbeConfig, lookup: L) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler::<L>))
        .with_state(Arc::new(Scrape { config, lookup }))
}

/// Start the metrics exporter
///
/// # Errors
///
/// Returns an error if the service fails to start or bind to the port
pub async fn start(config: ProbeConfig, listen: Option<IpAddr>, port: u16) -> anyhow::Result<()> {
    // Bind to socket with smart fallback
    let (listener, bind_addr) = match listen {
        Some(addr) => {
            // Explicit address specified - bind to it
            let socket_addr = SocketAddr::new(addr, port).to_string();
            let listener = TcpListener::bind(&socket_addr)
                .await
                .with_context(|| format!("failed to bind {socket_addr}"))?;
            (listener, socket_addr)
        }
        None => {
            // Auto mode: try IPv6 first, fallback to IPv4
            if let Ok(l) = TcpListener::bind(format!("[::]:{port}")).await {
                (l, format!("[::]:{port}"))
            } else {
                let socket_addr = format!("0.0.0.0:{port}");
                let listener = TcpListener::bind(&socket_addr)
                    .await
                    .with_context(|| format!("failed to bind {socket_addr}"))?;
                (listener, socket_addr)
            }
        }
    };

    info!(
        address = %bind_addr,
        tlsa_record = %config.tlsa_record,
        timeout_ms = config.timeout.as_millis(),
        "listening"
    );

    axum::serve(listener, router(config, SystemResolver).into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {e}");
            }
        })
        .await?;

    Ok(())
}

/// Probe once and print the report as JSON
///
/// # Errors
///
/// Returns an error if the report cannot be serialized
pub async fn once(config: &ProbeConfig) -> anyhow::Result<()> {
    let report = check::probe(config, &SystemResolver).await;
    println!("{}", render_json(&report)?);
    Ok(())
}

fn render_json(report: &ProbeReport) -> anyhow::Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize probe report")
}

async fn metrics_handler<L: TlsaLookup + 'static>(
    State(scrape): State<Arc<Scrape<L>>>,
) -> Response {
    // each scrape is an independent probe; a panic must not take the exporter down
    let outcome = AssertUnwindSafe(async {
        let report = check::probe(&scrape.config, &scrape.lookup).await;
        encode_report(&report)
    })
    .catch_unwind()
    .await;

    match outcome {
        Ok(Ok(buffer)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            buffer,
        )
            .into_response(),
        Ok(Err(e)) => {
            error!("{e}");
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response()
        }
        Err(_) => {
            error!("probe panicked while assembling results");
            (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response()
        }
    }
}
