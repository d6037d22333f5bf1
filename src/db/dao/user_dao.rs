use chrono::{DateTime, FixedOffset};
use sea_orm::{ColumnTrait, DatabaseConnection, QueryFilter, Set};

use super::{DaoBase, DaoResult};
use crate::db::entities::user::{self, Entity as User};

#[derive(Clone)]
pub struct UserDao {
    db: DatabaseConnection,
}

impl DaoBase for UserDao {
    type Entity = User;

    fn from_db(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn db(&self) -> &DatabaseConnection {
        &self.db
    }
}

impl UserDao {
    pub async fn find_by_email(&self, email: &str) -> DaoResult<Option<user::Model>> {
        let email = email.to_string();
        self.find(1, 1, move |query| {
            query.filter(user::Column::Email.eq(email))
        })
        .await
        .map(|rows| rows.into_iter().next())
    }

    pub async fn find_by_username(&self, username: &str) -> DaoResult<Option<user::Model>> {
        let username = username.to_string();
        self.find(1, 1, move |query| {
            query.filter(user::Column::Username.eq(username))
        })
        .await
        .map(|rows| rows.into_iter().next())
    }

    pub async fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: Option<&str>,
    ) -> DaoResult<user::Model> {
        let model = user::ActiveModel {
            email: Set(email.to_string()),
            username: Set(username.to_string()),
            password_hash: Set(password_hash.map(str::to_string)),
            banned: Set(false),
            last_login_at: Set(None),
            ..Default::default()
        };
        self.create(model).await
    }

    pub async fn set_last_login(
        &self,
        id: i64,
        at: DateTime<FixedOffset>,
    ) -> DaoResult<user::Model> {
        self.update(id, |active| {
            active.last_login_at = Set(Some(at));
        })
        .await
    }

    pub async fn set_password(&self, id: i64, password_hash: &str) -> DaoResult<user::Model> {
        let hash = password_hash.to_string();
        self.update(id, move |active| {
            active.password_hash = Set(Some(hash));
        })
        .await
    }

    pub async fn set_banned(&self, id: i64, banned: bool) -> DaoResult<user::Model> {
        self.update(id, move |active| {
            active.banned = Set(banned);
        })
        .await
    }
}
