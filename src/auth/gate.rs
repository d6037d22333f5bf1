use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

use super::{Claims, Role};
use crate::db::dao::{DaoResult, RoleDao};

pub const INSUFFICIENT_PRIVILEGES: &str = "Insufficient priviledges";
pub const EXCLUDED_PRIVILEGE: &str = "Has a privilege that must not be held";
pub const MISSING_PRIVILEGES: &str = "Missing required privileges";

/// Declarative role policy. A policy with no clauses always passes. Clause
/// order is part of the contract: the first failing clause decides the
/// returned message.
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub any_of: Option<Vec<Role>>,
    pub all_of: Option<Vec<Role>>,
    pub exclude: Option<Vec<Role>>,
}

impl Policy {
    pub fn any_of(roles: impl Into<Vec<Role>>) -> Self {
        Self {
            any_of: Some(roles.into()),
            ..Default::default()
        }
    }

    pub fn all_of(roles: impl Into<Vec<Role>>) -> Self {
        Self {
            all_of: Some(roles.into()),
            ..Default::default()
        }
    }

    pub fn exclude(roles: impl Into<Vec<Role>>) -> Self {
        Self {
            exclude: Some(roles.into()),
            ..Default::default()
        }
    }

    pub fn and_exclude(mut self, roles: impl Into<Vec<Role>>) -> Self {
        self.exclude = Some(roles.into());
        self
    }

    /// Empty string means pass; anything else is the block reason. `Student`
    /// (ordinal 0) participates like any other role — clauses are `Option`s
    /// precisely so "no clause" is distinct from "clause naming ordinal 0".
    pub fn evaluate(&self, held: &[Role]) -> &'static str {
        if let Some(any) = &self.any_of
            && !any.iter().any(|role| held.contains(role))
        {
            return INSUFFICIENT_PRIVILEGES;
        }
        if let Some(excluded) = &self.exclude
            && excluded.iter().any(|role| held.contains(role))
        {
            return EXCLUDED_PRIVILEGE;
        }
        if let Some(all) = &self.all_of
            && !all.iter().all(|role| held.contains(role))
        {
            return MISSING_PRIVILEGES;
        }
        ""
    }
}

/// Request-scoped role set, loaded from the role table on first use and
/// reused for every gate check in the same request.
#[derive(Debug)]
pub struct RoleCache {
    user_id: i64,
    roles: Option<Vec<Role>>,
}

impl RoleCache {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            roles: None,
        }
    }

    /// Seed from roles already resolved elsewhere (e.g. an auth token).
    pub fn preloaded(user_id: i64, roles: Vec<Role>) -> Self {
        Self {
            user_id,
            roles: Some(roles),
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub async fn resolve(&mut self, roles_dao: &RoleDao) -> DaoResult<&[Role]> {
        if self.roles.is_none() {
            self.roles = Some(roles_dao.roles_for_user(self.user_id).await?);
        }
        Ok(self.roles.as_deref().unwrap_or_default())
    }
}

pub async fn meet_roles(
    policy: &Policy,
    cache: &mut RoleCache,
    roles_dao: &RoleDao,
) -> DaoResult<&'static str> {
    let held = cache.resolve(roles_dao).await?;
    Ok(policy.evaluate(held))
}

/// Route-level enforcement of a [`Policy`]. Roles embedded in the verified
/// auth token seed the request's [`RoleCache`]; a token without embedded roles
/// falls back to one lookup against the role table.
#[derive(Clone)]
pub struct RequirePolicyLayer {
    policy: Arc<Policy>,
    roles: RoleDao,
}

impl RequirePolicyLayer {
    pub fn new(policy: Policy, roles: RoleDao) -> Self {
        Self {
            policy: Arc::new(policy),
            roles,
        }
    }
}

impl<S> Layer<S> for RequirePolicyLayer {
    type Service = RequirePolicy<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequirePolicy {
            inner,
            policy: Arc::clone(&self.policy),
            roles: self.roles.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RequirePolicy<S> {
    inner: S,
    policy: Arc<Policy>,
    roles: RoleDao,
}

impl<S> Service<Request<Body>> for RequirePolicy<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let policy = Arc::clone(&self.policy);
        let roles_dao = self.roles.clone();

        // tower Services are allowed to be called concurrently, so clone inner
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let claims = match req.extensions().get::<Claims>() {
                Some(claims) => claims.clone(),
                None => return Ok((StatusCode::UNAUTHORIZED, "No claims in request").into_response()),
            };

            let mut cache = match claims.roles {
                Some(held) => RoleCache::preloaded(claims.sub, held),
                None => RoleCache::new(claims.sub),
            };
            let reason = match meet_roles(&policy, &mut cache, &roles_dao).await {
                Ok(reason) => reason,
                Err(err) => {
                    // fail closed: an unreadable role set must not pass a gate
                    tracing::warn!(error = %err, sub = claims.sub, "role lookup failed");
                    return Ok(
                        (StatusCode::INTERNAL_SERVER_ERROR, "Role lookup failed").into_response()
                    );
                }
            };
            if !reason.is_empty() {
                return Ok((StatusCode::FORBIDDEN, reason).into_response());
            }

            inner.call(req).await
        })
    }
}
