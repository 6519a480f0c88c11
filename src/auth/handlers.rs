use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{
            AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, PrivateResponse,
            ProfileResponse, SignupRequest, UpdateProfileRequest, UsersResponse,
        },
        extractors::{AuthUser, JsonBody},
    },
    error::AppError,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/profile", get(get_profile).put(update_profile))
        .route("/change-password", put(change_password))
        .route("/users", get(list_users))
        .route("/private", get(private))
}

#[instrument(skip(state, payload))]
pub async fn signup(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let session = state.accounts.signup(payload).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User created successfully",
            user: session.user,
            access_token: session.access_token,
        }),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let session = state.accounts.login(payload).await?;
    Ok(Json(AuthResponse {
        message: "Login successful",
        user: session.user,
        access_token: session.access_token,
    }))
}

#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state.accounts.get_profile(user_id).await?;
    Ok(Json(ProfileResponse {
        message: None,
        user,
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<UpdateProfileRequest>,
) -> Result<Json<ProfileResponse>, AppError> {
    let user = state.accounts.update_profile(user_id, payload).await?;
    Ok(Json(ProfileResponse {
        message: Some("Profile updated successfully"),
        user,
    }))
}

#[instrument(skip(state, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    JsonBody(payload): JsonBody<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    state.accounts.change_password(user_id, payload).await?;
    Ok(Json(MessageResponse {
        message: "Password changed successfully",
    }))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<UsersResponse>, AppError> {
    let users = state.accounts.list_users(user_id).await?;
    Ok(Json(UsersResponse {
        total: users.len(),
        users,
    }))
}

#[instrument(skip(state))]
pub async fn private(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<PrivateResponse>, AppError> {
    let user = state.accounts.get_profile(user_id).await?;
    Ok(Json(PrivateResponse {
        message: format!("Hello {}! This is a private route.", user.email),
        user_id,
    }))
}
