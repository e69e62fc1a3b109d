use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Form, Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{AuthResponse, ConfirmRequest, LoginRequest, PublicUser, RegisterForm, UpdateProfileForm},
        errors::AccountError,
        extractors::CurrentUser,
        jwt::JwtKeys,
        services,
    },
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/confirm", post(confirm))
}

pub fn me_routes() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_me))
        .route("/me/profile", post(update_profile))
}

fn issue_token(state: &AppState, user: &PublicUser) -> Result<String, AccountError> {
    JwtKeys::from_ref(state)
        .sign(user.id, &user.email)
        .map_err(|e| AccountError::Internal(format!("jwt sign failed: {e}")))
}

#[instrument(skip(state, form))]
pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> Result<(StatusCode, Json<PublicUser>), AccountError> {
    let user = services::register(state.store.as_ref(), state.verifier.as_ref(), form).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AccountError> {
    let user: PublicUser =
        services::login(state.store.as_ref(), &payload.email, &payload.password).await?.into();
    let access_token = issue_token(&state, &user)?;
    Ok(Json(AuthResponse { access_token, user }))
}

#[instrument(skip(state, payload))]
pub async fn confirm(
    State(state): State<AppState>,
    Json(payload): Json<ConfirmRequest>,
) -> Result<Json<PublicUser>, AccountError> {
    let user = services::confirm(state.store.as_ref(), &payload.email, &payload.code).await?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<PublicUser>, AccountError> {
    let user = services::profile(state.store.as_ref(), &current).await?;
    Ok(Json(user))
}

/// The token is reissued because the email it carries may have changed.
#[instrument(skip(state, form))]
pub async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<UpdateProfileForm>,
) -> Result<Json<AuthResponse>, AccountError> {
    let user = services::update_profile(state.store.as_ref(), &current, form).await?;
    let access_token = issue_token(&state, &user)?;
    Ok(Json(AuthResponse { access_token, user }))
}
