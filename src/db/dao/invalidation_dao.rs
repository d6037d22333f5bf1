use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, DbErr, EntityTrait, QueryFilter,
    Set, TransactionTrait,
    sea_query::OnConflict,
    sqlx::{self, Connection},
};

use super::{DaoBase, DaoLayerError, DaoResult};
use crate::db::entities::invalidation_record::{self, Entity as InvalidationRecord};

/// The sentinel row revoking every session system-wide.
pub const GLOBAL_USER_ID: i64 = 0;

#[derive(Clone)]
pub struct InvalidationDao {
    db: DatabaseConnection,
}

impl DaoBase for InvalidationDao {
    type Entity = InvalidationRecord;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl InvalidationDao {
    /// Set-or-replace the watermark for one user. Insert-on-conflict-update,
    /// never read-modify-write: two concurrent revocations for the same user
    /// must collapse to latest-wins, not a lost update.
    pub async fn upsert_watermark(
        &self,
        user_id: i64,
        min_issued_at: DateTime<FixedOffset>,
    ) -> DaoResult<()> {
        let now = Utc::now().fixed_offset();
        let model = invalidation_record::ActiveModel {
            user_id: Set(user_id),
            min_issued_at: Set(min_issued_at),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        InvalidationRecord::insert(model)
            .on_conflict(
                OnConflict::column(invalidation_record::Column::UserId)
                    .update_columns([
                        invalidation_record::Column::MinIssuedAt,
                        invalidation_record::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(())
    }

    pub async fn watermark_for_user(
        &self,
        user_id: i64,
    ) -> DaoResult<Option<invalidation_record::Model>> {
        self.find(1, 1, move |query| {
            query.filter(invalidation_record::Column::UserId.eq(user_id))
        })
        .await
        .map(|rows| rows.into_iter().next())
    }

    pub async fn global_watermark(&self) -> DaoResult<Option<invalidation_record::Model>> {
        self.watermark_for_user(GLOBAL_USER_ID).await
    }

    /// Clear every watermark and insert the global sentinel. The sentinel has
    /// no backing user row, so constraint checks are suspended while the swap
    /// runs. The suspension is connection-local state on both backends, so it
    /// must be issued on the very connection that runs the swap (a pooled
    /// sibling would keep enforcing, or worse, stay suspended for later
    /// traffic), and enforcement must come back on every exit path.
    pub async fn replace_all_with_global(
        &self,
        min_issued_at: DateTime<FixedOffset>,
    ) -> DaoResult<()> {
        match self.db.get_database_backend() {
            DbBackend::Postgres => self.swap_with_replication_role(min_issued_at).await,
            DbBackend::Sqlite => self.swap_on_dedicated_sqlite_conn(min_issued_at).await,
            other => Err(DaoLayerError::Db(DbErr::Custom(format!(
                "global revocation is not supported on {other:?}"
            )))),
        }
    }

    /// Postgres: `SET LOCAL` lives and dies with the transaction, which owns
    /// one connection for its whole lifetime. The server restores enforcement
    /// at commit and rollback alike.
    async fn swap_with_replication_role(
        &self,
        min_issued_at: DateTime<FixedOffset>,
    ) -> DaoResult<()> {
        let txn = self.db.begin().await.map_err(DaoLayerError::Db)?;
        txn.execute_unprepared("SET LOCAL session_replication_role = 'replica'")
            .await
            .map_err(DaoLayerError::Db)?;

        InvalidationRecord::delete_many()
            .exec(&txn)
            .await
            .map_err(DaoLayerError::Db)?;

        let now = Utc::now().fixed_offset();
        let sentinel = invalidation_record::ActiveModel {
            user_id: Set(GLOBAL_USER_ID),
            min_issued_at: Set(min_issued_at),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };
        InvalidationRecord::insert(sentinel)
            .exec(&txn)
            .await
            .map_err(DaoLayerError::Db)?;

        txn.commit().await.map_err(DaoLayerError::Db)
    }

    /// Sqlite: `PRAGMA foreign_keys` is per-connection and a no-op inside a
    /// transaction, so the toggle cannot go through the pool or the
    /// transaction. Check out one connection, toggle on it, run the
    /// transaction on it, and restore on it whether the swap succeeded or not.
    async fn swap_on_dedicated_sqlite_conn(
        &self,
        min_issued_at: DateTime<FixedOffset>,
    ) -> DaoResult<()> {
        let pool = self.db.get_sqlite_connection_pool();
        let mut conn = pool.acquire().await.map_err(sqlx_err)?;

        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&mut *conn)
            .await
            .map_err(sqlx_err)?;

        let outcome = sqlite_clear_and_insert(&mut conn, min_issued_at).await;

        if let Err(err) = sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut *conn)
            .await
        {
            // never hand a connection with enforcement off back to the pool
            let _ = conn.detach().close().await;
            outcome?;
            return Err(sqlx_err(err));
        }

        outcome
    }
}

async fn sqlite_clear_and_insert(
    conn: &mut sqlx::pool::PoolConnection<sqlx::Sqlite>,
    min_issued_at: DateTime<FixedOffset>,
) -> DaoResult<()> {
    let mut txn = conn.begin().await.map_err(sqlx_err)?;

    sqlx::query("DELETE FROM invalidation_records")
        .execute(&mut *txn)
        .await
        .map_err(sqlx_err)?;

    let now = Utc::now().fixed_offset();
    sqlx::query(
        "INSERT INTO invalidation_records (user_id, min_issued_at, created_at, updated_at) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(GLOBAL_USER_ID)
    .bind(min_issued_at)
    .bind(now)
    .bind(now)
    .execute(&mut *txn)
    .await
    .map_err(sqlx_err)?;

    txn.commit().await.map_err(sqlx_err)
}

fn sqlx_err(err: sqlx::Error) -> DaoLayerError {
    DaoLayerError::Db(DbErr::Custom(err.to_string()))
}
