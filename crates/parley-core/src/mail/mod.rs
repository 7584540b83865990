//! Outbound mail for booking confirmations
//!
//! Mail leaves the process through a `Mailer`. The HTTP relay mailer hands
//! the message to a transactional mail service over HTTPS; the log mailer
//! writes it to the log for development setups without a relay.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::booking::BookingRecord;
use crate::config::{MailConfig, MailTransport};
use crate::errors::AgentError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConfirmationEmail {
    pub from: String,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,
    pub subject: String,
    pub text: String,
}

impl ConfirmationEmail {
    pub fn for_booking(booking: &BookingRecord, settings: &MailSettings) -> Self {
        let subject = format!("Interview Confirmation - {}", settings.organization);
        let text = format!(
            "Dear {name},\n\n\
             This email confirms your interview slot with {org}.\n\n\
             Date: {date}\n\
             Time: {time}\n\n\
             We look forward to speaking with you.\n\n\
             Best regards,\n\
             The {org} HR Team",
            name = booking.full_name,
            org = settings.organization,
            date = booking.interview_date,
            time = booking.interview_time,
        );

        Self {
            from: settings.sender.clone(),
            to: booking.email.clone(),
            bcc: settings.bcc.clone(),
            subject,
            text,
        }
    }
}

/// Sender identity used when composing confirmations.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub sender: String,
    pub organization: String,
    pub bcc: Option<String>,
}

impl From<&MailConfig> for MailSettings {
    fn from(config: &MailConfig) -> Self {
        Self {
            sender: config.sender.clone(),
            organization: config.organization.clone(),
            bcc: config.bcc.clone(),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &ConfirmationEmail) -> Result<(), AgentError>;
}

/// Delivers mail by POSTing it as JSON to an HTTP relay.
pub struct HttpMailer {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpMailer {
    pub fn new(endpoint: String, api_key: Option<String>, timeout: Duration) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AgentError::Mail(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint,
            api_key,
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, email: &ConfirmationEmail) -> Result<(), AgentError> {
        let mut request = self.client.post(&self.endpoint).json(email);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AgentError::Mail(format!("Mail relay request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::Mail(format!(
                "Mail relay rejected message with status {}: {}",
                status, body
            )));
        }

        log::info!("Confirmation email sent to {}", email.to);
        Ok(())
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &ConfirmationEmail) -> Result<(), AgentError> {
        log::info!(
            "Mail (not delivered) from={} to={} subject={:?}\n{}",
            email.from,
            email.to,
            email.subject,
            email.text
        );
        Ok(())
    }
}

pub fn create_mailer(config: &MailConfig) -> Result<Arc<dyn Mailer>, AgentError> {
    match &config.transport {
        MailTransport::Log => {
            log::warn!("Mail transport is 'log'; confirmation emails will not be delivered");
            Ok(Arc::new(LogMailer))
        }
        MailTransport::Http { endpoint } => Ok(Arc::new(HttpMailer::new(
            endpoint.clone(),
            config.api_key.clone(),
            Duration::from_secs(config.timeout_seconds),
        )?)),
    }
}
