pub mod auth;
pub mod health;
pub mod invitations;
pub mod metrics;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::{AuthError, AuthResult};
use crate::state::AppState;

/// Runs a multi-step operation on its own task. A client disconnect drops the
/// response but never aborts the operation between two writes.
pub(crate) async fn detached<F, T>(operation: F) -> AuthResult<T>
where
    F: std::future::Future<Output = AuthResult<T>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(operation)
        .await
        .map_err(|e| AuthError::Internal(e.into()))?
}

/// `Json` whose rejection uses the API error shape instead of axum's plain text.
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| AuthError::BadRequest(e.body_text()))?;
        Ok(Self(value))
    }
}

pub fn router(state: AppState) -> Router {
    // Allow the app origin, plus localhost for development.
    let base = state.config.app_base_url.trim_end_matches('/').to_string();
    let cors_origin = AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        let Ok(o) = origin.to_str() else {
            return false;
        };
        o.starts_with("http://localhost") || o.starts_with("http://127.0.0.1") || o == base
    });

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(cors_origin);

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics_handler))
        // Auth
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/logout-all", post(auth::logout_all))
        .route("/auth/logout-others", post(auth::logout_others))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/verify-email/request", post(auth::request_email_verification))
        .route("/auth/verify-email", post(auth::verify_email))
        .route("/auth/me", get(auth::me))
        // Invitations
        .route("/invitations", post(invitations::create_invitation))
        .route("/invitations/accept", post(invitations::accept_invitation))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
