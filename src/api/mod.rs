//! HTTP surface: axum router, middleware and server loop.

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header::CONTENT_TYPE, HeaderName, HeaderValue, Method, Request},
    routing::{get, post},
    Extension, Router,
};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

use crate::account::AccountService;

pub mod handlers;
mod openapi;
pub mod types;

pub use openapi::openapi;

/// Shared by every handler through an `Extension`.
pub struct AppState {
    accounts: AccountService,
    pool: Option<PgPool>,
    trust_proxy: bool,
}

impl AppState {
    #[must_use]
    pub fn new(accounts: AccountService) -> Self {
        Self {
            accounts,
            pool: None,
            trust_proxy: false,
        }
    }

    /// Honour `X-Forwarded-For` / `X-Real-IP` when resolving the client IP.
    #[must_use]
    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    #[must_use]
    pub fn trust_proxy(&self) -> bool {
        self.trust_proxy
    }

    /// Database probed by `/health`.
    #[must_use]
    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    #[must_use]
    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }
}

/// Build the application router with middleware attached.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    Router::new()
        .route("/health", get(handlers::health::health).options(handlers::health::health))
        .route("/login", post(handlers::login::login))
        .route("/login/verify", post(handlers::login::verify))
        .route("/register/check", post(handlers::register::check))
        .route("/register/code", post(handlers::register::request_code))
        .route("/register", post(handlers::register::register))
        .route("/retrieve/check", post(handlers::retrieve::check))
        .route("/retrieve/code", post(handlers::retrieve::request_code))
        .route("/retrieve", post(handlers::retrieve::retrieve))
        .route("/user/info", post(handlers::user::info))
        .route("/user/offline", post(handlers::user::offline))
        .route("/user/offline/all", post(handlers::user::offline_all))
        .route("/user/name", post(handlers::user::change_name))
        .route("/user/java-id", post(handlers::user::link_java_id))
        .route("/user/xbox-id", post(handlers::user::link_xbox_id))
        .route("/user/password", post(handlers::user::change_password))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        )
}

/// Start the server and run until `shutdown` resolves.
/// # Errors
/// Return error if failed to bind or serve
pub async fn new<F>(port: u16, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
