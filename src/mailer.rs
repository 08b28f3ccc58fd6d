use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;
use tracing::info;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str) -> anyhow::Result<()>;
}

/// Sends mail through the Resend HTTP API.
pub struct ResendMailer {
    http: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, to: &str, subject: &str, text: &str) -> anyhow::Result<()> {
        self.http
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from,
                "to": [to],
                "subject": subject,
                "text": text,
            }))
            .send()
            .await
            .context("resend request")?
            .error_for_status()
            .context("resend response")?;
        info!(to, subject, "email sent");
        Ok(())
    }
}

/// Used when no mail provider is configured; codes only reach the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, text: &str) -> anyhow::Result<()> {
        info!(to, subject, body = text, "email not sent: no provider configured");
        Ok(())
    }
}

pub fn verification_email(code: &str) -> (&'static str, String) {
    (
        "Verify your PackRat email",
        format!("Your PackRat verification code is {code}. It expires in 10 minutes."),
    )
}

pub fn password_reset_email(code: &str) -> (&'static str, String) {
    (
        "Reset your PackRat password",
        format!(
            "Use code {code} to reset your PackRat password. \
             If you did not ask for this, you can ignore this email."
        ),
    )
}
