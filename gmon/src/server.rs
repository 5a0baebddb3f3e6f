//! HTTP surface: the Prometheus `/metrics` endpoint
//!
//! The metrics server binds all interfaces on the configured port; the
//! optional profiling-port listener serves the same registry but only on
//! loopback. Bind or serve failures are logged and do not take the monitor
//! down, matching the fire-and-forget way the endpoint is started.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use log::{error, info};

use crate::metrics::Metrics;

pub fn metrics_addr(port: u16) -> SocketAddr {
    (IpAddr::V4(Ipv4Addr::UNSPECIFIED), port).into()
}

pub fn pprof_addr(port: u16) -> SocketAddr {
    (IpAddr::V4(Ipv4Addr::LOCALHOST), port).into()
}

pub async fn serve_metrics(metrics: Arc<Metrics>, addr: SocketAddr) {
    let app = Router::new().route("/metrics", get(metrics_handler)).with_state(metrics);

    match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => {
            info!("metrics endpoint listening on http://{addr}/metrics");
            if let Err(e) = axum::serve(listener, app).await {
                error!("metrics server failed: {e}");
            }
        }
        Err(e) => error!("failed to bind metrics endpoint on {addr}: {e}"),
    }
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => {
            ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body).into_response()
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
