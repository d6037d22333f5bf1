use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::password_reset_challenge::{self, Entity as PasswordResetChallenge};

#[derive(Clone)]
pub struct ResetChallengeDao {
    db: DatabaseConnection,
}

impl DaoBase for ResetChallengeDao {
    type Entity = PasswordResetChallenge;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl ResetChallengeDao {
    /// At most one live challenge per user: any prior challenge is discarded
    /// before the replacement is stored.
    pub async fn replace_for_user(
        &self,
        user_id: i64,
        token_hash: &str,
    ) -> DaoResult<password_reset_challenge::Model> {
        PasswordResetChallenge::delete_many()
            .filter(password_reset_challenge::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;

        let model = password_reset_challenge::ActiveModel {
            user_id: Set(user_id),
            token_hash: Set(token_hash.to_string()),
            ..Default::default()
        };
        self.create(model).await
    }

    /// Load a challenge only while its `created_at` is within the TTL. A stale
    /// challenge is indistinguishable from a missing one to the caller.
    pub async fn find_fresh(
        &self,
        id: i64,
        ttl_minutes: i64,
    ) -> DaoResult<Option<password_reset_challenge::Model>> {
        let cutoff = Utc::now().fixed_offset() - Duration::minutes(ttl_minutes);
        self.find(1, 1, move |query| {
            query
                .filter(password_reset_challenge::Column::Id.eq(id))
                .filter(password_reset_challenge::Column::CreatedAt.gte(cutoff))
        })
        .await
        .map(|rows| rows.into_iter().next())
    }

    pub async fn destroy(&self, id: i64) -> DaoResult<i64> {
        self.delete(id).await
    }
}
