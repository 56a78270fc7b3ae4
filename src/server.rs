//! HTTP exposition endpoint.
//!
//! One router, two routes: a small index page and the metrics path. Scrapes
//! gather from the registry inside `spawn_blocking` because a scrape walks
//! the filesystem and hashes file content, which must not stall the async
//! workers serving other connections.

use std::io;
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{error, info};

/// Normalizes a listen address: a bare `:port` binds every interface.
pub fn normalize_listen_address(listen: &str) -> String {
    if let Some(port) = listen.strip_prefix(':') {
        format!("0.0.0.0:{port}")
    } else {
        listen.to_string()
    }
}

/// Normalizes a metrics path to a single leading slash.
pub fn normalize_metrics_path(path: &str) -> String {
    format!("/{}", path.trim_start_matches('/'))
}

#[derive(Clone)]
struct ServerState {
    registry: Arc<Registry>,
}

/// Serves the exposition endpoint until Ctrl-C.
pub async fn serve(listen: &str, metrics_path: &str, registry: Arc<Registry>) -> io::Result<()> {
    let metrics_path = normalize_metrics_path(metrics_path);

    let mut app = Router::new().route(&metrics_path, get(handle_metrics));
    // When metrics live at the root, the index page would shadow them.
    if metrics_path != "/" {
        let index = index_page(&metrics_path);
        app = app.route("/", get(move || async move { Html(index) }));
    }
    let app = app.with_state(ServerState { registry });

    let addr = normalize_listen_address(listen);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(listen = %addr, path = %metrics_path, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(reason = %e, "failed to install shutdown handler");
        return;
    }
    info!("shutdown signal received");
}

fn index_page(metrics_path: &str) -> String {
    format!(
        "<html>\
         <head><title>File Statistics Exporter</title></head>\
         <body><h1>File Statistics Exporter</h1>\
         <p><a href=\"{metrics_path}\">Metrics</a></p>\
         </body></html>"
    )
}

async fn handle_metrics(State(state): State<ServerState>) -> Response {
    let registry = state.registry.clone();
    // A gather walks and hashes the configured trees; keep it off the
    // async workers.
    let result = tokio::task::spawn_blocking(move || {
        let families = registry.gather();
        let encoder = TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).map(|()| buf)
    })
    .await;

    match result {
        Ok(Ok(body)) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Ok(Err(e)) => {
            error!(reason = %e, "error encoding metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(e) => {
            error!(reason = %e, "scrape task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
