use config::{AllowedOrigins, CorsConfig};
use http::HeaderValue;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

/// Builds the CORS layer from configuration.
///
/// Methods and headers are mirrored from the preflight request. Wildcards cannot be
/// combined with credentials, so `"*"` origins are mirrored as well when credentials are
/// allowed.
pub(super) fn generate(
    CorsConfig {
        allow_credentials,
        allow_origins,
        max_age,
    }: &CorsConfig,
) -> CorsLayer {
    let mut cors_layer = CorsLayer::new()
        .allow_credentials(*allow_credentials)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request());

    if let Some(allow_origins) = allow_origins {
        cors_layer = cors_layer.allow_origin(match allow_origins {
            AllowedOrigins::Any if *allow_credentials => AllowOrigin::mirror_request(),
            AllowedOrigins::Any => AllowOrigin::any(),
            AllowedOrigins::List(origins) => AllowOrigin::list(origins.iter().filter_map(|origin| origin_header(origin))),
        });
    }

    if let Some(max_age) = max_age {
        cors_layer = cors_layer.max_age(*max_age);
    }

    cors_layer
}

/// Reduces a configured origin to `scheme://host[:port]`.
fn origin_header(origin: &str) -> Option<HeaderValue> {
    let url = match url::Url::parse(origin) {
        Ok(url) => url,
        Err(e) => {
            log::warn!("Ignoring invalid CORS origin '{origin}': {e}");
            return None;
        }
    };

    let origin = &url[..url::Position::BeforePath];

    match HeaderValue::from_str(origin) {
        Ok(value) => Some(value),
        Err(e) => {
            log::warn!("Ignoring CORS origin '{origin}': {e}");
            None
        }
    }
}
