use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Duration, FixedOffset};

use crate::{
    auth::{
        Claims, Role,
        token::{JwtKeys, decode_token, encode_token, make_claims},
    },
    clock,
    config::AppConfig,
    db::dao::{DaoBase, DaoContext, InvalidationDao, RoleDao, UserDao},
    db::entities::user,
    error::ServiceError,
};

pub const DEFAULT_AUTH_TTL_MINUTES: i64 = 5;

#[derive(Debug)]
pub struct SignAuth {
    pub user_id: i64,
    pub method: String,
    /// Defaults to [`DEFAULT_AUTH_TTL_MINUTES`].
    pub expires_in_minutes: Option<i64>,
    /// When absent, the user's current roles are loaded and embedded.
    pub roles: Option<Vec<Role>>,
}

#[derive(Debug)]
pub struct SignRefresh {
    pub user_id: i64,
    pub method: String,
    pub original_iss: String,
    /// Defaults to `AUTO_LOGOUT_MINUTES`.
    pub expires_in_minutes: Option<i64>,
}

#[derive(Debug)]
pub struct SessionPair {
    pub auth_token: String,
    pub refresh_token: String,
}

#[derive(Debug)]
pub struct RotatedSession {
    pub user: user::Model,
    pub auth_token: String,
    pub refresh_token: String,
}

/// Orchestrates issuance, validation, rotation and revocation of auth/refresh
/// token pairs. One instance per process component; no ambient state. The only
/// constructor is [`SessionService::init`], so a service that answers
/// `validate_*` has always seeded its global-watermark cache first.
#[derive(Clone)]
pub struct SessionService {
    users: UserDao,
    roles: RoleDao,
    invalidations: InvalidationDao,
    auth_keys: JwtKeys,
    refresh_keys: JwtKeys,
    issuer: String,
    auto_logout_minutes: i64,
    /// Unix seconds. Read on every validation; written only by
    /// `reject_globally_before_iat` and `init`.
    global_watermark: Arc<AtomicI64>,
}

impl SessionService {
    /// Loads the persisted global watermark if one exists; otherwise tokens
    /// issued before the service ever started are treated as stale by seeding
    /// the cache to `now - AUTO_LOGOUT_MINUTES`.
    pub async fn init(cfg: &AppConfig, dao: &DaoContext) -> Result<Self, ServiceError> {
        let invalidations = dao.invalidation();
        let seed = match invalidations.global_watermark().await? {
            Some(row) => clock::unix_from_datetime(&row.min_issued_at),
            None => clock::now_unix() as i64 - cfg.auto_logout_minutes * 60,
        };

        Ok(Self {
            users: dao.user(),
            roles: dao.role(),
            invalidations,
            auth_keys: JwtKeys::from_secret(cfg.auth_token_secret.as_bytes()),
            refresh_keys: JwtKeys::from_secret(cfg.refresh_token_secret.as_bytes()),
            issuer: cfg.app_name.clone(),
            auto_logout_minutes: cfg.auto_logout_minutes,
            global_watermark: Arc::new(AtomicI64::new(seed)),
        })
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub async fn sign_auth(&self, req: SignAuth) -> Result<String, ServiceError> {
        let roles = match req.roles {
            Some(roles) => roles,
            None => self.roles.roles_for_user(req.user_id).await?,
        };
        let ttl = req.expires_in_minutes.unwrap_or(DEFAULT_AUTH_TTL_MINUTES);
        let claims = make_claims(&self.issuer, req.user_id, &req.method, ttl, Some(roles), None);
        encode_token(&self.auth_keys, &claims)
    }

    pub async fn sign_refresh(&self, req: SignRefresh) -> Result<String, ServiceError> {
        let ttl = req.expires_in_minutes.unwrap_or(self.auto_logout_minutes);
        let claims = make_claims(
            &self.issuer,
            req.user_id,
            &req.method,
            ttl,
            None,
            Some(req.original_iss),
        );
        encode_token(&self.refresh_keys, &claims)
    }

    pub async fn verify_auth(&self, token: &str) -> Option<Claims> {
        self.verify(token, &self.auth_keys).await
    }

    pub async fn verify_refresh(&self, token: &str) -> Option<Claims> {
        self.verify(token, &self.refresh_keys).await
    }

    pub async fn validate_auth(&self, token: &str) -> bool {
        self.verify_auth(token).await.is_some()
    }

    pub async fn validate_refresh(&self, token: &str) -> bool {
        self.verify_refresh(token).await.is_some()
    }

    async fn verify(&self, token: &str, keys: &JwtKeys) -> Option<Claims> {
        let claims = decode_token(keys, token)?;
        let iat = claims.iat as i64;
        let now = clock::now_unix() as i64;

        if iat > now {
            tracing::warn!(sub = claims.sub, "token claims an issued-at in the future");
            return None;
        }

        let mut watermark = self.global_watermark.load(Ordering::Relaxed);
        match self.invalidations.watermark_for_user(claims.sub).await {
            Ok(Some(row)) => {
                watermark = watermark.max(clock::unix_from_datetime(&row.min_issued_at));
            }
            Ok(None) => {}
            Err(err) => {
                // fail closed: an unreadable watermark must not admit a token
                tracing::warn!(error = %err, sub = claims.sub, "watermark lookup failed");
                return None;
            }
        }

        if iat < watermark {
            return None; // withdrawn
        }

        Some(claims)
    }

    /// Upsert the per-user watermark. `minimum_iat` must not be in the future;
    /// callers revoking "before now" while about to mint should pass a
    /// timestamp strictly earlier than now (see [`Self::issue_pair`]).
    pub async fn reject_user_before_iat(
        &self,
        user_id: i64,
        minimum_iat: Option<DateTime<FixedOffset>>,
    ) -> Result<(), ServiceError> {
        let minimum = minimum_iat.unwrap_or_else(clock::now_fixed);
        self.check_not_future(&minimum)?;

        self.invalidations
            .upsert_watermark(user_id, minimum)
            .await
            .map_err(|err| ServiceError::Revocation(err.to_string()))
    }

    /// Replace every watermark with the global sentinel, then refresh the
    /// cache. Between the database commit and the cache store a concurrent
    /// validation can still observe the pre-revoke cached value; the revoke is
    /// already durable for every later request, so this window is accepted as
    /// a best-effort control rather than a strict atomicity guarantee.
    pub async fn reject_globally_before_iat(
        &self,
        minimum_iat: Option<DateTime<FixedOffset>>,
    ) -> Result<(), ServiceError> {
        let minimum = minimum_iat.unwrap_or_else(clock::now_fixed);
        self.check_not_future(&minimum)?;

        self.invalidations
            .replace_all_with_global(minimum)
            .await
            .map_err(|err| ServiceError::Revocation(err.to_string()))?;

        self.global_watermark
            .store(clock::unix_from_datetime(&minimum), Ordering::Relaxed);
        Ok(())
    }

    /// Single-use rotation: the presented refresh token (and everything issued
    /// before it) is withdrawn before the replacement pair is minted.
    pub async fn rotate_refresh_token(
        &self,
        refresh_token: &str,
    ) -> Result<RotatedSession, ServiceError> {
        let claims = self
            .verify_refresh(refresh_token)
            .await
            .ok_or(ServiceError::InvalidToken)?;
        if claims.sub <= 0 {
            return Err(ServiceError::InvalidToken);
        }

        let user = self
            .users
            .find_by_id(claims.sub)
            .await
            .map_err(|_| ServiceError::InvalidToken)?;

        self.reject_user_before_iat(user.id, Some(clock::now_fixed()))
            .await?;

        let original_iss = claims
            .original_iss
            .clone()
            .unwrap_or_else(|| claims.iss.clone());
        let auth_token = self
            .sign_auth(SignAuth {
                user_id: user.id,
                method: claims.method.clone(),
                expires_in_minutes: None,
                roles: None,
            })
            .await?;
        let refresh_token = self
            .sign_refresh(SignRefresh {
                user_id: user.id,
                method: claims.method,
                original_iss,
                expires_in_minutes: None,
            })
            .await?;

        Ok(RotatedSession {
            user,
            auth_token,
            refresh_token,
        })
    }

    /// Login/signup path: revoke everything issued before `now - 1s`, then
    /// mint. The one-second backdate guarantees the pair minted here survives
    /// its own revocation call instead of racing two `now` reads.
    pub async fn issue_pair(
        &self,
        user: &user::Model,
        method: &str,
        original_iss: Option<String>,
    ) -> Result<SessionPair, ServiceError> {
        let cutoff = clock::now_fixed() - Duration::seconds(1);
        self.reject_user_before_iat(user.id, Some(cutoff)).await?;

        let auth_token = self
            .sign_auth(SignAuth {
                user_id: user.id,
                method: method.to_string(),
                expires_in_minutes: None,
                roles: None,
            })
            .await?;
        let refresh_token = self
            .sign_refresh(SignRefresh {
                user_id: user.id,
                method: method.to_string(),
                original_iss: original_iss.unwrap_or_else(|| self.issuer.clone()),
                expires_in_minutes: None,
            })
            .await?;

        Ok(SessionPair {
            auth_token,
            refresh_token,
        })
    }

    pub fn auto_logout_minutes(&self) -> i64 {
        self.auto_logout_minutes
    }

    fn check_not_future(&self, minimum: &DateTime<FixedOffset>) -> Result<(), ServiceError> {
        if clock::unix_from_datetime(minimum) > clock::now_unix() as i64 {
            return Err(ServiceError::Revocation(
                "revocation date must not be in the future".into(),
            ));
        }
        Ok(())
    }
}
