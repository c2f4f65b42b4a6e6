use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration as CookieDuration;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    models::{NewUser, Role},
    web::{
        AppState,
        responses::{ApiError, Success},
        session::AuthUser,
    },
};

pub const SESSION_COOKIE: &str = "auth";

#[derive(Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct WhoAmI {
    #[serde(rename = "loggedIn")]
    logged_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

/// Resolves the caller's session and enforces `required` when given.
///
/// Missing, malformed, expired or revoked tokens are `Unauthorized`; a live
/// session whose role differs from `required` is `Forbidden`.
pub async fn require_session(
    state: &AppState,
    jar: &CookieJar,
    required: Option<Role>,
) -> Result<AuthUser, ApiError> {
    let token = session_token(jar).ok_or(ApiError::Unauthorized)?;

    let user = state
        .sessions()
        .resolve(token)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::Unauthorized)?;

    match required {
        Some(role) if user.role != role => Err(ApiError::Forbidden),
        _ => Ok(user),
    }
}

pub async fn require_admin(state: &AppState, jar: &CookieJar) -> Result<AuthUser, ApiError> {
    require_session(state, jar, Some(Role::Admin)).await
}

/// Best-effort lookup of the caller, treating lookup failures as anonymous.
pub async fn current_user(state: &AppState, jar: &CookieJar) -> Option<AuthUser> {
    let token = session_token(jar)?;
    match state.sessions().resolve(token).await {
        Ok(user) => user,
        Err(err) => {
            error!(%err, "failed to resolve session");
            None
        }
    }
}

fn session_token(jar: &CookieJar) -> Option<Uuid> {
    let cookie = jar.get(SESSION_COOKIE)?;
    Uuid::parse_str(cookie.value()).ok()
}

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(body) = payload.map_err(|_| ApiError::bad_request("Invalid JSON"))?;

    let username = body.username.trim();
    let email = body.email.trim();
    if username.is_empty() || email.is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Missing required fields"));
    }

    let role = match body.role.as_deref().map(str::trim) {
        None | Some("") | Some("user") => Role::User,
        Some("admin") => Role::Admin,
        Some(_) => return Err(ApiError::bad_request("Invalid role")),
    };

    if role == Role::Admin && !state.config().allow_admin_signup {
        let caller = current_user(&state, &jar).await;
        if !matches!(caller, Some(AuthUser { role: Role::Admin, .. })) {
            return Err(ApiError::Forbidden);
        }
    }

    let password_hash = hash_password(&body.password)
        .map_err(|err| ApiError::internal(anyhow::anyhow!("failed to hash password: {err}")))?;

    state
        .store()
        .create_user(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            role,
        })
        .await
        .map_err(|err| match ApiError::from(err) {
            ApiError::Conflict(_) => ApiError::conflict("User already exists"),
            other => other,
        })?;

    info!(username, %role, "registered user");
    Ok(StatusCode::CREATED)
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<Success>), ApiError> {
    let Json(body) = payload.map_err(|_| ApiError::bad_request("Invalid JSON"))?;

    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        return Err(ApiError::bad_request("Missing credentials"));
    }

    let user = state
        .store()
        .find_user_by_username(username)
        .await?
        .ok_or(ApiError::Unauthorized)?;

    if !verify_password(&body.password, &user.password_hash) {
        return Err(ApiError::Unauthorized);
    }

    let token = state
        .sessions()
        .issue(
            AuthUser {
                id: user.id,
                username: user.username,
                role: user.role,
            },
            state.session_ttl(),
        )
        .await?;

    let cookie = session_cookie(
        token.to_string(),
        CookieDuration::hours(state.config().session_ttl_hours),
    );
    Ok((jar.add(cookie), Json(Success::OK)))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<Success>) {
    if let Some(token) = session_token(&jar) {
        if let Err(err) = state.sessions().revoke(token).await {
            error!(%err, "failed to remove session during logout");
        }
    }

    let removal = session_cookie(String::new(), CookieDuration::ZERO);
    (jar.remove(removal), Json(Success::OK))
}

/// The `auth` cookie with the attributes shared by login and logout.
fn session_cookie(value: String, max_age: CookieDuration) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

pub async fn whoami(State(state): State<AppState>, jar: CookieJar) -> Json<WhoAmI> {
    let response = match current_user(&state, &jar).await {
        Some(user) => WhoAmI {
            logged_in: true,
            role: Some(user.role),
            username: Some(user.username),
        },
        None => WhoAmI {
            logged_in: false,
            role: None,
            username: None,
        },
    };
    Json(response)
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = PasswordHash::new(password_hash);
    match parsed {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}
