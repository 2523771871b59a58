use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AuthResult,
    models::{
        auth::{
            Actor, ClientInfo, EmailRequest, LoginRequest, LoginResponse, RefreshTokenRequest,
            ResetPasswordRequest, TokenPair, VerifyEmailRequest,
        },
        user::UserProfile,
    },
    routes::{detached, JsonBody},
    state::AppState,
};

pub async fn login(
    State(state): State<AppState>,
    client: ClientInfo,
    JsonBody(body): JsonBody<LoginRequest>,
) -> AuthResult<Json<LoginResponse>> {
    let auth = state.auth.clone();
    let (user, tokens) =
        detached(async move { auth.login(&body.email, &body.password, &client).await }).await?;
    Ok(Json(LoginResponse::new(user, tokens)))
}

pub async fn refresh_token(
    State(state): State<AppState>,
    client: ClientInfo,
    JsonBody(body): JsonBody<RefreshTokenRequest>,
) -> AuthResult<Json<TokenPair>> {
    let auth = state.auth.clone();
    let tokens = detached(async move { auth.refresh(&body.refresh_token, &client).await }).await?;
    Ok(Json(tokens))
}

pub async fn logout(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RefreshTokenRequest>,
) -> AuthResult<StatusCode> {
    state.auth.logout(&body.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn logout_all(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RefreshTokenRequest>,
) -> AuthResult<StatusCode> {
    let auth = state.auth.clone();
    detached(async move { auth.logout_all(&body.refresh_token).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn logout_others(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<RefreshTokenRequest>,
) -> AuthResult<StatusCode> {
    state.auth.logout_others(&body.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Always 204 unless rate limited, whether or not the account exists.
pub async fn forgot_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EmailRequest>,
) -> AuthResult<StatusCode> {
    state.auth.request_password_reset(&body.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn reset_password(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<ResetPasswordRequest>,
) -> AuthResult<StatusCode> {
    let auth = state.auth.clone();
    detached(async move { auth.reset_password(&body.token, &body.new_password).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn request_email_verification(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<EmailRequest>,
) -> AuthResult<StatusCode> {
    state.auth.request_email_verification(&body.email).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn verify_email(
    State(state): State<AppState>,
    JsonBody(body): JsonBody<VerifyEmailRequest>,
) -> AuthResult<StatusCode> {
    let auth = state.auth.clone();
    detached(async move { auth.verify_email(&body.token).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(actor: Actor) -> Json<UserProfile> {
    Json(actor.user.into())
}
