use async_trait::async_trait;
use tracing::info;

use shared::types::ContactData;

/// Receives validated contact-form submissions (mailer, queue, table).
#[async_trait]
pub trait ContactSink: Send + Sync {
    async fn submit(&self, submission: ContactData) -> anyhow::Result<()>;
}

/// Default sink: records the submission in the log and nothing else.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingContactSink;

#[async_trait]
impl ContactSink for TracingContactSink {
    async fn submit(&self, submission: ContactData) -> anyhow::Result<()> {
        info!(
            name = %submission.name,
            email = %submission.email,
            message_len = submission.message.len(),
            "Contact form submission received"
        );
        Ok(())
    }
}
