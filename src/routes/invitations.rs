use axum::{extract::State, http::StatusCode, Json};

use crate::{
    error::AuthResult,
    models::auth::{
        AcceptInvitationRequest, Actor, ClientInfo, InvitationResponse, InviteUserRequest,
        LoginResponse,
    },
    routes::{detached, JsonBody},
    state::AppState,
};

pub async fn create_invitation(
    State(state): State<AppState>,
    actor: Actor,
    JsonBody(body): JsonBody<InviteUserRequest>,
) -> AuthResult<(StatusCode, Json<InvitationResponse>)> {
    let invitation = state
        .auth
        .create_invitation(&actor, &body.email, body.role)
        .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

pub async fn accept_invitation(
    State(state): State<AppState>,
    client: ClientInfo,
    JsonBody(body): JsonBody<AcceptInvitationRequest>,
) -> AuthResult<Json<LoginResponse>> {
    let auth = state.auth.clone();
    let (user, tokens) = detached(async move {
        auth.accept_invitation(
            &body.token,
            &body.first_name,
            &body.last_name,
            &body.password,
            &client,
        )
        .await
    })
    .await?;
    Ok(Json(LoginResponse::new(user, tokens)))
}
