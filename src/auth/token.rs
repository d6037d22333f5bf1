use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};

use super::{Claims, Role};
use crate::{clock, error::AppError, error::ServiceError, state::AppState};

#[derive(Clone)]
pub struct JwtKeys {
    pub enc: EncodingKey,
    pub dec: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            enc: EncodingKey::from_secret(secret),
            dec: DecodingKey::from_secret(secret),
        }
    }
}

pub fn make_claims(
    iss: &str,
    sub: i64,
    method: &str,
    expires_in_minutes: i64,
    roles: Option<Vec<Role>>,
    original_iss: Option<String>,
) -> Claims {
    let iat = clock::now_unix();
    let exp = iat + (expires_in_minutes.max(0) as usize) * 60;
    Claims {
        iss: iss.to_string(),
        sub,
        iat,
        exp,
        nbf: None,
        method: method.to_string(),
        roles,
        original_iss,
    }
}

pub fn encode_token(keys: &JwtKeys, claims: &Claims) -> Result<String, ServiceError> {
    let mut header = Header::new(Algorithm::HS256);
    header.typ = Some("JWT".into());

    encode(&header, claims, &keys.enc).map_err(|err| ServiceError::Signing(err.to_string()))
}

/// Signature, expiry and not-before in one pass, zero leeway. Any failure is
/// `None`: callers never learn why a token was refused at this layer. The
/// reason is logged at debug for operators.
pub fn decode_token(keys: &JwtKeys, token: &str) -> Option<Claims> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    validation.validate_exp = true;
    validation.validate_nbf = true;

    match decode::<Claims>(token, &keys.dec, &validation) {
        Ok(data) => Some(data.claims),
        Err(err) => {
            tracing::debug!(reason = %describe(err.kind()), "token verification failed");
            None
        }
    }
}

fn describe(kind: &ErrorKind) -> &'static str {
    match kind {
        ErrorKind::ExpiredSignature => "jwt expired",
        ErrorKind::ImmatureSignature => "jwt not active",
        ErrorKind::InvalidSignature => "invalid signature",
        _ => "malformed token",
    }
}

/// Route middleware: verify the bearer token (signature, expiry, watermark)
/// and stash the claims for extractors downstream.
pub async fn session_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let token = auth.strip_prefix("Bearer ").ok_or_else(|| {
        AppError::unauthorized("Missing/invalid Authorization header").into_response()
    })?;

    let claims = state
        .sessions
        .verify_auth(token)
        .await
        .ok_or_else(|| AppError::unauthorized("Invalid or expired token").into_response())?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
