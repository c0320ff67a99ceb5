use std::net::SocketAddr;

use anyhow::anyhow;
use axum::{Json, Router, extract::State, routing::get};
use config::{HealthConfig, TlsServerConfig};
use http::StatusCode;
use llm::RequestRegistry;

#[derive(Debug, serde::Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub(crate) enum HealthState {
    /// The server is accepting requests.
    Healthy {
        /// Chat requests currently streaming.
        in_flight: usize,
    },
}

/// Reports the server as healthy, along with the number of live chat requests.
pub(crate) async fn health(State(registry): State<RequestRegistry>) -> (StatusCode, Json<HealthState>) {
    let state = HealthState::Healthy {
        in_flight: registry.len(),
    };

    (StatusCode::OK, Json(state))
}

pub(crate) fn router(health_config: &HealthConfig, registry: RequestRegistry) -> Router {
    Router::new()
        .route(&health_config.path, get(health))
        .with_state(registry)
}

/// Serves the health endpoint on its own listener.
pub(super) async fn bind_health_endpoint(
    addr: SocketAddr,
    tls_config: Option<TlsServerConfig>,
    health_config: HealthConfig,
    registry: RequestRegistry,
) -> anyhow::Result<()> {
    let scheme = if tls_config.is_some() { "https" } else { "http" };
    let path = &health_config.path;
    let app = router(&health_config, registry).into_make_service();

    log::info!("Health check endpoint exposed at {scheme}://{addr}{path}");

    match tls_config {
        Some(tls) => {
            let rustls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.certificate, &tls.key)
                .await
                .map_err(|e| anyhow!("Failed to load TLS certificate and key: {e}"))?;

            axum_server::bind_rustls(addr, rustls_config)
                .serve(app)
                .await
                .map_err(|e| anyhow!("Failed to start HTTP server in the health endpoint: {e}"))?;
        }
        None => axum_server::bind(addr)
            .serve(app)
            .await
            .map_err(|e| anyhow!("Failed to start HTTP server in the health endpoint: {e}"))?,
    }

    Ok(())
}
