use async_trait::async_trait;

/// Delivery is a black box: templating and transport live elsewhere. The flow
/// only cares whether the message left the building.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MailError(pub String);

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        payload: serde_json::Value,
        template: &str,
    ) -> Result<(), MailError>;
}

/// Logs instead of delivering. Stands in for the real transport in
/// development and as the default collaborator in tests.
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        payload: serde_json::Value,
        template: &str,
    ) -> Result<(), MailError> {
        tracing::info!(to, subject, template, payload = %payload, "email dispatched");
        Ok(())
    }
}
