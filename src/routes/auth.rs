use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    middleware,
    response::{AppendHeaders, IntoResponse, Response},
    routing::post,
};
use serde::{Deserialize, Serialize};

use crate::{
    auth::{
        Claims, Role,
        gate::{Policy, RequirePolicyLayer},
        password,
        token::session_auth,
    },
    clock,
    db::entities::user,
    error::{AppError, ServiceError},
    state::AppState,
};

const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    email: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateUserRequest {
    #[serde(rename = "userId")]
    user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RequestResetRequest {
    email: String,
}

#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    id: i64,
    token: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct UserView {
    id: i64,
    email: String,
    username: String,
}

impl From<&user::Model> for UserView {
    fn from(user: &user::Model) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    success: bool,
    access_token: String,
    user: UserView,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    success: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(logout))
        .layer(middleware::from_fn_with_state(state.clone(), session_auth));

    let admin = Router::new()
        .route("/auth/invalidateUserTokens", post(invalidate_user_tokens))
        .route("/auth/invalidateAllTokens", post(invalidate_all_tokens))
        .layer(RequirePolicyLayer::new(
            Policy::any_of(vec![Role::Admin, Role::Super]),
            state.dao.role(),
        ))
        .layer(middleware::from_fn_with_state(state.clone(), session_auth));

    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/signup", post(signup))
        .route("/auth/refreshLogin", post(refresh_login))
        .route("/auth/requestPasswordReset", post(request_password_reset))
        .route("/auth/setPasswordOnReset", post(set_password_on_reset))
        .merge(protected)
        .merge(admin)
        .with_state(state)
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, AppError> {
    let user = state
        .dao
        .user()
        .find_by_email(&body.email)
        .await
        .map_err(ServiceError::from)?
        .ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;

    if user.banned {
        return Err(AppError::forbidden("Account is banned"));
    }

    let hash = user
        .password_hash
        .as_deref()
        .ok_or_else(|| AppError::unauthorized("Invalid credentials"))?;
    if !password::verify_secret(&body.password, hash)? {
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    state
        .dao
        .user()
        .set_last_login(user.id, clock::now_fixed())
        .await
        .map_err(ServiceError::from)?;

    let pair = state.sessions.issue_pair(&user, "local", None).await?;
    Ok(session_response(&state, &user, pair.auth_token, &pair.refresh_token))
}

async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SignupRequest>,
) -> Result<Response, AppError> {
    let email = body.email.trim();
    let username = body.username.trim();
    if email.is_empty() || username.is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "Email and username required",
        ));
    }

    let users = state.dao.user();
    if users
        .find_by_email(email)
        .await
        .map_err(ServiceError::from)?
        .is_some()
        || users
            .find_by_username(username)
            .await
            .map_err(ServiceError::from)?
            .is_some()
    {
        return Err(AppError::new(StatusCode::CONFLICT, "User already exists"));
    }

    let hash = password::hash_password(&body.password)?;
    let user = users
        .create_user(email, username, Some(&hash))
        .await
        .map_err(ServiceError::from)?;
    state
        .dao
        .role()
        .grant(user.id, Role::Student)
        .await
        .map_err(ServiceError::from)?;

    let pair = state.sessions.issue_pair(&user, "local", None).await?;
    Ok(session_response(&state, &user, pair.auth_token, &pair.refresh_token))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    claims: Claims,
) -> Result<Response, AppError> {
    state
        .sessions
        .reject_user_before_iat(claims.sub, None)
        .await?;

    let headers = AppendHeaders([(header::SET_COOKIE, clear_refresh_cookie())]);
    Ok((headers, Json(SuccessResponse { success: true })).into_response())
}

async fn refresh_login(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let token = cookie_value(&headers, REFRESH_COOKIE)
        .ok_or_else(|| AppError::unauthorized("Missing refresh token"))?;

    let rotated = state.sessions.rotate_refresh_token(&token).await?;
    Ok(session_response(
        &state,
        &rotated.user,
        rotated.auth_token,
        &rotated.refresh_token,
    ))
}

async fn invalidate_user_tokens(
    State(state): State<Arc<AppState>>,
    Json(body): Json<InvalidateUserRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .sessions
        .reject_user_before_iat(body.user_id, None)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn invalidate_all_tokens(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SuccessResponse>, AppError> {
    state.sessions.reject_globally_before_iat(None).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn request_password_reset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RequestResetRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    match state.password_reset.request(&body.email).await {
        Ok(()) => {}
        // Unknown addresses get the same answer as known ones.
        Err(ServiceError::NotFound(_)) => {
            tracing::info!("password reset requested for unknown address");
        }
        Err(err) => return Err(err.into()),
    }
    Ok(Json(SuccessResponse { success: true }))
}

async fn set_password_on_reset(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetPasswordRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    state
        .password_reset
        .redeem(body.id, &body.token, &body.password)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

fn session_response(
    state: &AppState,
    user: &user::Model,
    access_token: String,
    refresh_token: &str,
) -> Response {
    let cookie = refresh_cookie(state.sessions.auto_logout_minutes(), refresh_token);
    let headers = AppendHeaders([(header::SET_COOKIE, cookie)]);
    let body = Json(SessionResponse {
        success: true,
        access_token,
        user: UserView::from(user),
    });
    (headers, body).into_response()
}

fn refresh_cookie(auto_logout_minutes: i64, token: &str) -> String {
    // Secure is dropped only outside release builds so local http works.
    let secure = if cfg!(debug_assertions) { "" } else { "; Secure" };
    format!(
        "{REFRESH_COOKIE}={token}; Path=/auth; Max-Age={}; HttpOnly; SameSite=Lax{secure}",
        auto_logout_minutes * 60
    )
}

fn clear_refresh_cookie() -> String {
    format!("{REFRESH_COOKIE}=; Path=/auth; Max-Age=0; HttpOnly")
}

fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    raw.split(';').find_map(|pair| {
        pair.trim()
            .strip_prefix(name)
            .and_then(|rest| rest.strip_prefix('='))
            .map(str::to_string)
    })
}
