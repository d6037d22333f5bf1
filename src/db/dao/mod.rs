use sea_orm::DatabaseConnection;

pub mod base;
pub mod base_traits;
pub mod error;
pub mod invalidation_dao;
pub mod reset_challenge_dao;
pub mod role_dao;
pub mod user_dao;

pub use base::DaoBase;
pub use base_traits::TimestampedActiveModel;
pub use error::{DaoLayerError, DaoResult};
pub use invalidation_dao::{GLOBAL_USER_ID, InvalidationDao};
pub use reset_challenge_dao::ResetChallengeDao;
pub use role_dao::RoleDao;
pub use user_dao::UserDao;

#[derive(Clone)]
pub struct DaoContext {
    db: DatabaseConnection,
}

impl DaoContext {
    pub fn new(db: &DatabaseConnection) -> Self {
        Self { db: db.clone() }
    }

    pub fn user(&self) -> UserDao {
        DaoBase::new(&self.db)
    }

    pub fn role(&self) -> RoleDao {
        DaoBase::new(&self.db)
    }

    pub fn invalidation(&self) -> InvalidationDao {
        DaoBase::new(&self.db)
    }

    pub fn reset_challenge(&self) -> ResetChallengeDao {
        DaoBase::new(&self.db)
    }
}
