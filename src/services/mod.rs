pub mod mailer;
pub mod password_reset;
pub mod session_service;

pub use mailer::{MailError, Mailer, TracingMailer};
pub use password_reset::PasswordResetFlow;
pub use session_service::{RotatedSession, SessionPair, SessionService, SignAuth, SignRefresh};
