//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, LINK};
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

const CORS_MAX_AGE: Duration = Duration::from_secs(300);

/// Build the CORS layer from the configured origins.
///
/// An empty list mirrors any http or https origin back to the caller.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.is_empty() {
        AllowOrigin::predicate(|origin: &HeaderValue, _| {
            origin
                .to_str()
                .is_ok_and(|o| o.starts_with("http://") || o.starts_with("https://"))
        })
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(origin = %origin, error = %e, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT,
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static("x-csrf-token"),
        ])
        .expose_headers([LINK])
        .max_age(CORS_MAX_AGE)
}

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let browse_routes = Router::new()
        // Identity
        .route("/auth/whoami", get(handlers::whoami))
        // Browsing (AuthenticatedUser extractor rejects anonymous callers)
        .route("/list", get(handlers::list_tree))
        .route("/folder", get(handlers::list_folder))
        .route("/folder/size", get(handlers::folder_size))
        // Transfers
        .route("/download", get(handlers::download))
        .route("/upload", post(handlers::upload));

    let public_routes = Router::new()
        .route("/", get(handlers::root))
        // Health check (intentionally unauthenticated for load balancer probes)
        .route("/health", get(handlers::health_check));

    let mut router = Router::new().merge(public_routes).merge(browse_routes);

    // SECURITY: When enabled, this endpoint should be network-restricted
    // to authorized Prometheus scraper IPs only.
    // See crate::metrics module documentation for details.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Middleware layers are applied in reverse order (outermost first).
    // Order of execution: TraceLayer -> CORS -> Auth -> Handler
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(cors_layer(&state.config.server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
