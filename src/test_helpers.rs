use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::{
    config::AppConfig,
    routes::router,
    services::{MailError, Mailer},
    state::AppState,
};

/// In-memory sqlite with the schema synced from the entity registry. One
/// pooled connection so every handle sees the same database.
pub async fn memory_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).sqlx_logging(false);

    let db = Database::connect(opt).await.expect("connect sqlite memory");
    db.get_schema_registry("campus_server::db::entities::*")
        .sync(&db)
        .await
        .expect("sync schema");
    db
}

/// File-backed sqlite with a real multi-connection pool, for paths whose
/// correctness depends on which pooled connection a statement lands on.
/// `sqlite::memory:` cannot stand in here: every pooled connection would get
/// a private database.
pub async fn pooled_file_db(max_connections: u32) -> DatabaseConnection {
    static NEXT: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let path = std::env::temp_dir().join(format!(
        "campus-test-{}-{}.sqlite",
        std::process::id(),
        NEXT.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
    ));

    let mut opt = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    opt.max_connections(max_connections).sqlx_logging(false);

    let db = Database::connect(opt).await.expect("connect sqlite file");
    db.get_schema_registry("campus_server::db::entities::*")
        .sync(&db)
        .await
        .expect("sync schema");
    db
}

pub fn test_config() -> AppConfig {
    AppConfig {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: "sqlite::memory:".into(),
        db_max_connections: 1,
        db_min_idle: 1,
        app_name: "campus-test".into(),
        auth_token_secret: "test-auth-secret".into(),
        refresh_token_secret: "test-refresh-secret".into(),
        auto_logout_minutes: 60,
        admin_email: "admin@example.com".into(),
        admin_username: "admin".into(),
        admin_password: "admin-password".into(),
        log_level: "warn".into(),
    }
}

pub async fn test_state_with_mailer(mailer: Arc<dyn Mailer>) -> Arc<AppState> {
    let db = memory_db().await;
    AppState::init(test_config(), db, mailer)
        .await
        .expect("init app state")
}

pub async fn test_state_on(db: DatabaseConnection) -> Arc<AppState> {
    AppState::init(test_config(), db, Arc::new(RecordingMailer::default()))
        .await
        .expect("init app state")
}

pub async fn test_state() -> Arc<AppState> {
    test_state_with_mailer(Arc::new(RecordingMailer::default())).await
}

pub async fn test_router() -> (Router, Arc<AppState>) {
    let state = test_state().await;
    (router(Arc::clone(&state)), state)
}

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub payload: serde_json::Value,
    pub template: String,
}

/// Captures outgoing mail instead of delivering it; flip `fail` to simulate a
/// transport outage.
#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<SentMail>>,
    pub fail: std::sync::atomic::AtomicBool,
}

impl RecordingMailer {
    pub fn last(&self) -> Option<SentMail> {
        self.sent.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        payload: serde_json::Value,
        template: &str,
    ) -> Result<(), MailError> {
        if self.fail.load(std::sync::atomic::Ordering::Relaxed) {
            return Err(MailError("simulated outage".into()));
        }
        self.sent.lock().unwrap().push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            payload,
            template: template.to_string(),
        });
        Ok(())
    }
}
