use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use serde_json::json;

use super::mailer::Mailer;
use crate::{
    auth::password::{hash_password, hash_secret, verify_secret},
    db::dao::{DaoBase, DaoContext, ResetChallengeDao, UserDao},
    error::ServiceError,
};

pub const RESET_TTL_MINUTES: i64 = 5;
const RESET_TOKEN_BYTES: usize = 128;

/// Short-TTL, single-use, hashed reset challenges. The raw token exists only
/// in the email; the row stores a one-way hash.
#[derive(Clone)]
pub struct PasswordResetFlow {
    users: UserDao,
    challenges: ResetChallengeDao,
    mailer: Arc<dyn Mailer>,
    app_name: String,
}

impl PasswordResetFlow {
    pub fn new(dao: &DaoContext, mailer: Arc<dyn Mailer>, app_name: String) -> Self {
        Self {
            users: dao.user(),
            challenges: dao.reset_challenge(),
            mailer,
            app_name,
        }
    }

    /// Create a fresh challenge and mail the raw token. A missing address is
    /// signalled explicitly; the route decides whether to suppress it to avoid
    /// enumeration. An undelivered email is a failure of the whole operation.
    pub async fn request(&self, email: &str) -> Result<(), ServiceError> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::NotFound("User"))?;

        let mut bytes = [0u8; RESET_TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let raw_token = URL_SAFE_NO_PAD.encode(bytes);
        let token_hash = hash_secret(&raw_token)?;

        let challenge = self.challenges.replace_for_user(user.id, &token_hash).await?;

        self.mailer
            .send(
                &user.email,
                &format!("{} password reset", self.app_name),
                json!({
                    "id": challenge.id,
                    "token": raw_token,
                    "username": user.username,
                }),
                "password_reset",
            )
            .await
            .map_err(|err| ServiceError::Mail(err.to_string()))
    }

    /// Redeem a challenge within its TTL. Stale, missing and mismatched all
    /// collapse into the same error so nothing about the row leaks.
    pub async fn redeem(
        &self,
        challenge_id: i64,
        raw_token: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let challenge = self
            .challenges
            .find_fresh(challenge_id, RESET_TTL_MINUTES)
            .await?
            .ok_or(ServiceError::InvalidChallenge)?;

        // Presenting the stored hash itself must never redeem.
        if raw_token == challenge.token_hash {
            return Err(ServiceError::InvalidChallenge);
        }
        if !verify_secret(raw_token, &challenge.token_hash)? {
            return Err(ServiceError::InvalidChallenge);
        }

        let user = self
            .users
            .find_by_id(challenge.user_id)
            .await
            .map_err(|_| ServiceError::InvalidChallenge)?;

        let password_hash = hash_password(new_password)?;
        self.users.set_password(user.id, &password_hash).await?;
        self.challenges.destroy(challenge.id).await?;

        // The password is already changed; a lost notice is not worth a rollback.
        if let Err(err) = self
            .mailer
            .send(
                &user.email,
                "Your password was changed",
                json!({ "username": user.username }),
                "password_changed",
            )
            .await
        {
            tracing::warn!(error = %err, user_id = user.id, "password-changed notice failed");
        }

        Ok(())
    }
}
