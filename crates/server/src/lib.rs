//! Relay server library.
//!
//! Provides a reusable server function to serve the relay either for the binary, or for the integration tests.

#![deny(missing_docs)]

mod cors;
mod health;

use std::net::SocketAddr;

use anyhow::anyhow;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use config::Config;
use llm::RequestRegistry;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

/// Configuration for serving the relay.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized relay TOML configuration.
    pub config: Config,
}

/// Starts and runs the relay server with the provided configuration.
pub async fn serve(ServeConfig { listen_address, config }: ServeConfig) -> anyhow::Result<()> {
    let mut app = Router::new();

    let cors = if let Some(cors_config) = &config.server.cors {
        cors::generate(cors_config)
    } else {
        CorsLayer::permissive()
    };

    // Live chat requests. Lives as long as the server, and every connection shares it.
    let registry = RequestRegistry::new();

    let mut llm_exposed = false;

    if config.llm.enabled() {
        match llm::router(&config, registry.clone()).await {
            Ok(llm_router) => {
                app = app.merge(llm_router.layer(cors.clone()));
                llm_exposed = true;
            }
            Err(e) => {
                log::error!("Failed to initialize chat router: {e}");
            }
        }
    } else {
        log::debug!("Chat endpoints are disabled in the configuration");
    }

    if config.server.health.enabled {
        if let Some(listen) = config.server.health.listen {
            tokio::spawn(health::bind_health_endpoint(
                listen,
                config.server.tls.clone(),
                config.server.health.clone(),
                registry.clone(),
            ));
        } else {
            let health_router = health::router(&config.server.health, registry.clone()).layer(cors.clone());
            app = app.merge(health_router);
        }
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    if !llm_exposed {
        log::warn!("Server starting with no functional endpoints. Enable the [llm] section to serve chat requests.");
    }

    match &config.server.tls {
        Some(tls_config) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls_config.certificate, &tls_config.key)
                .await
                .map_err(|e| anyhow!("Failed to load TLS certificate and key: {e}"))?;

            if llm_exposed {
                log::info!("Chat endpoint available at: https://{listen_address}{}/chat", config.llm.path);
            }

            axum_server::from_tcp_rustls(listener.into_std()?, rustls_config)
                .serve(app.into_make_service())
                .await
                .map_err(|e| anyhow!("Failed to start HTTPS server: {e}"))?;
        }
        None => {
            if llm_exposed {
                log::info!("Chat endpoint available at: http://{listen_address}{}/chat", config.llm.path);
            }

            axum::serve(listener, app)
                .await
                .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;
        }
    }

    Ok(())
}
