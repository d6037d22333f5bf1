use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    config::AppConfig,
    db::dao::DaoContext,
    error::ServiceError,
    services::{Mailer, PasswordResetFlow, SessionService},
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: DatabaseConnection,
    pub dao: DaoContext,
    pub sessions: SessionService,
    pub password_reset: PasswordResetFlow,
}

impl AppState {
    /// Builds every service up front; [`SessionService::init`] runs here, so a
    /// state that exists can already answer `validate_*` calls.
    pub async fn init(
        config: AppConfig,
        db: DatabaseConnection,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Arc<Self>, ServiceError> {
        let dao = DaoContext::new(&db);
        let sessions = SessionService::init(&config, &dao).await?;
        let password_reset = PasswordResetFlow::new(&dao, mailer, config.app_name.clone());

        Ok(Arc::new(Self {
            config,
            db,
            dao,
            sessions,
            password_reset,
        }))
    }
}
