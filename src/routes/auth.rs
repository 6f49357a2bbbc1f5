use axum::extract::State;
use axum::http::{header::SET_COOKIE, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{
    dummy_password_hash, hash_password, hash_token, sign_jwt, verify_password, AuthUser,
    TOKEN_COOKIE,
};
use crate::constants::MAX_SESSIONS_PER_USER;
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::store::operations::organizations::Organization;
use crate::store::operations::sessions::Session;
use crate::store::operations::users::User;
use crate::store::StoreError;
use crate::validation::{is_valid_email, validate_password, validate_username};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/logout", post(logout))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub username: String,
    pub organization_id: String,
}

impl From<&User> for UserProfile {
    fn from(value: &User) -> Self {
        Self {
            id: value.id.clone(),
            email: value.email.clone(),
            username: value.username.clone(),
            organization_id: value.organization_id.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Sign a token for the user and persist its session.
fn issue_token(user: &User, state: &AppState) -> Result<String, AppError> {
    if let Err(e) = state
        .store()
        .cleanup_oldest_user_sessions(&user.id, MAX_SESSIONS_PER_USER.saturating_sub(1))
    {
        tracing::warn!(user_id = %user.id, error = %e, "清理多余会话失败");
    }

    let hours = state.config().jwt_expires_in_hours;
    let token = sign_jwt(
        &user.id,
        &user.organization_id,
        &state.config().jwt_secret,
        hours,
    )?;

    let now = Utc::now();
    state.store().create_session(&Session {
        token_hash: hash_token(&token),
        user_id: user.id.clone(),
        created_at: now,
        expires_at: now + Duration::hours(hours as i64),
        revoked: false,
    })?;

    Ok(token)
}

async fn register(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<Response, AppError> {
    let email = req.email.trim().to_lowercase();
    if !is_valid_email(&email) {
        return Err(AppError::bad_request(
            "AUTH_INVALID_EMAIL",
            "Invalid email format",
        ));
    }
    let username = req.username.trim();
    if let Err(msg) = validate_username(username) {
        return Err(AppError::bad_request("AUTH_INVALID_USERNAME", msg));
    }
    if let Err(msg) = validate_password(&req.password) {
        return Err(AppError::bad_request("AUTH_WEAK_PASSWORD", msg));
    }

    let now = Utc::now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email,
        username: username.to_string(),
        password_hash: hash_password(&req.password)?,
        organization_id: uuid::Uuid::new_v4().to_string(),
        created_at: now,
        updated_at: now,
    };

    match state.store().create_user(&user) {
        Ok(()) => {}
        Err(StoreError::Conflict { .. }) => {
            return Err(AppError::conflict(
                "AUTH_EMAIL_EXISTS",
                "Email already registered",
            ))
        }
        Err(e) => return Err(e.into()),
    }

    state.store().upsert_organization(&Organization {
        id: user.organization_id.clone(),
        name: format!("{}'s organization", user.username),
        owner_user_id: Some(user.id.clone()),
        created_at: now,
    })?;
    tracing::info!(user_id = %user.id, organization_id = %user.organization_id, "User registered");

    let token = issue_token(&user, &state)?;
    let mut response = created(AuthResponse {
        token: token.clone(),
        user: UserProfile::from(&user),
    })
    .into_response();
    set_token_cookie(&mut response, &token)?;
    Ok(response)
}

async fn login(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Response, AppError> {
    let email = req.email.trim().to_lowercase();
    let Some(user) = state.store().get_user_by_email(&email)? else {
        let _ = verify_password(&req.password, dummy_password_hash());
        return Err(AppError::unauthorized("Invalid email or password"));
    };

    if !verify_password(&req.password, &user.password_hash)? {
        return Err(AppError::unauthorized("Invalid email or password"));
    }

    let token = issue_token(&user, &state)?;
    let mut response = ok(AuthResponse {
        token: token.clone(),
        user: UserProfile::from(&user),
    })
    .into_response();
    set_token_cookie(&mut response, &token)?;
    Ok(response)
}

/// Ends the session the request was made with; other devices stay signed in.
async fn logout(auth: AuthUser, State(state): State<AppState>) -> Result<Response, AppError> {
    state.store().delete_session(&auth.token_hash)?;

    let mut response = ok(serde_json::json!({ "loggedOut": true })).into_response();
    append_set_cookie(
        &mut response,
        &format!("{TOKEN_COOKIE}=; Path=/; Max-Age=0; SameSite=Lax; HttpOnly; Secure"),
    )?;
    Ok(response)
}

fn set_token_cookie(response: &mut Response, token: &str) -> Result<(), AppError> {
    append_set_cookie(
        response,
        &format!("{TOKEN_COOKIE}={token}; Path=/; SameSite=Lax; HttpOnly; Secure"),
    )
}

fn append_set_cookie(response: &mut Response, cookie: &str) -> Result<(), AppError> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| AppError::internal(&format!("set-cookie failed: {e}")))?;
    response.headers_mut().append(SET_COOKIE, value);
    Ok(())
}
