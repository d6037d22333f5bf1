use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use super::{DaoBase, DaoLayerError, DaoResult};
use crate::auth::Role;
use crate::db::entities::role::{self, Entity as RoleAssignment};

#[derive(Clone)]
pub struct RoleDao {
    db: DatabaseConnection,
}

impl DaoBase for RoleDao {
    type Entity = RoleAssignment;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl RoleDao {
    pub async fn roles_for_user(&self, user_id: i64) -> DaoResult<Vec<Role>> {
        let rows = RoleAssignment::find()
            .filter(role::Column::UserId.eq(user_id))
            .all(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;

        // Unknown ordinals are skipped rather than failing the whole lookup.
        Ok(rows
            .iter()
            .filter_map(|row| Role::try_from(row.role).ok())
            .collect())
    }

    /// Grant is idempotent at the application level: the table has no
    /// uniqueness constraint on (user_id, role).
    pub async fn grant(&self, user_id: i64, role: Role) -> DaoResult<()> {
        let existing = RoleAssignment::find()
            .filter(role::Column::UserId.eq(user_id))
            .filter(role::Column::Role.eq(role.ordinal()))
            .one(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        if existing.is_some() {
            return Ok(());
        }

        let model = role::ActiveModel {
            user_id: Set(user_id),
            role: Set(role.ordinal()),
            ..Default::default()
        };
        self.create(model).await?;
        Ok(())
    }

    pub async fn revoke(&self, user_id: i64, role: Role) -> DaoResult<()> {
        RoleAssignment::delete_many()
            .filter(role::Column::UserId.eq(user_id))
            .filter(role::Column::Role.eq(role.ordinal()))
            .exec(&self.db)
            .await
            .map_err(DaoLayerError::Db)?;
        Ok(())
    }
}
