use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::Config;

pub const DEFAULT_EMAIL_API_URL: &str = "https://api.resend.com/emails";

// --- Mailer trait ---

pub trait Mailer {
    fn send_password(&self, email: &str, name: &str, password: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

impl EmailConfig {
    /// `None` when no API key is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        let api_key = config.email_api_key.clone()?;
        Some(Self {
            api_url: config.email_api_url.clone(),
            api_key,
            from: config.email_from.clone(),
        })
    }
}

/// Picks the HTTP mailer when configured, otherwise the console mock.
pub fn create_mailer(config: Option<EmailConfig>) -> Box<dyn Mailer> {
    match config {
        Some(config) => Box::new(HttpMailer::new(config)),
        None => {
            tracing::warn!("No e-mail API key configured, password e-mails will only be logged");
            Box::new(ConsoleMailer)
        }
    }
}

struct PasswordMessage {
    subject: String,
    text: String,
    html: String,
}

fn password_message(name: &str, password: &str) -> PasswordMessage {
    PasswordMessage {
        subject: "Your account has been approved".to_string(),
        text: format!(
            "Hello {name},\n\n\
            Your registration has been approved. You can now sign in with your e-mail address \
            and this one-time password:\n\n\
            {password}\n\n\
            Please change it after your first sign-in."
        ),
        html: format!(
            "<p>Hello {name},</p>\
            <p>Your registration has been approved. You can now sign in with your e-mail address \
            and this one-time password:</p>\
            <p style=\"font-size:20px;font-weight:bold;letter-spacing:4px\">{password}</p>\
            <p>Please change it after your first sign-in.</p>"
        ),
    }
}

// --- Transactional e-mail API ---

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    text: &'a str,
    html: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

pub struct HttpMailer {
    config: EmailConfig,
    client: reqwest::blocking::Client,
}

impl HttpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self {
            config,
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Mailer for HttpMailer {
    fn send_password(&self, email: &str, name: &str, password: &str) -> Result<()> {
        let message = password_message(name, password);
        let request = SendRequest {
            from: &self.config.from,
            to: vec![email],
            subject: &message.subject,
            text: &message.text,
            html: &message.html,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .context("Failed to send request to e-mail API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "E-mail API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let sent: SendResponse = response
            .json()
            .context("Failed to parse e-mail API response")?;
        tracing::info!(to = email, message_id = %sent.id, "password e-mail sent");
        Ok(())
    }
}

// --- Console fallback ---

/// Stand-in used when no e-mail API is configured. Never fails.
pub struct ConsoleMailer;

impl Mailer for ConsoleMailer {
    fn send_password(&self, email: &str, name: &str, password: &str) -> Result<()> {
        let message = password_message(name, password);
        tracing::info!(
            to = email,
            subject = %message.subject,
            "mock e-mail (not sent):\n{}",
            message.text
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records every password e-mail instead of sending it.
    #[derive(Default)]
    pub(crate) struct RecordingMailer {
        pub sent: RefCell<Vec<(String, String, String)>>,
        pub fail: bool,
    }

    impl Mailer for RecordingMailer {
        fn send_password(&self, email: &str, name: &str, password: &str) -> Result<()> {
            self.sent
                .borrow_mut()
                .push((email.to_string(), name.to_string(), password.to_string()));
            if self.fail {
                return Err(anyhow!("mail server unavailable"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_password_message_contains_password() {
        let message = password_message("Jānis", "482913");
        assert!(message.text.contains("Hello Jānis"));
        assert!(message.text.contains("482913"));
        assert!(message.html.contains("482913"));
    }

    #[test]
    fn test_console_mailer_never_fails() {
        assert!(ConsoleMailer.send_password("a@example.com", "A", "123456").is_ok());
    }

    #[test]
    fn test_email_config_requires_api_key() {
        let mut config = Config::default_for(std::path::PathBuf::from("/tmp/crew"));
        assert!(EmailConfig::from_config(&config).is_none());

        config.email_api_key = Some("re_test".to_string());
        let email = EmailConfig::from_config(&config).unwrap();
        assert_eq!(email.api_key, "re_test");
        assert_eq!(email.api_url, DEFAULT_EMAIL_API_URL);
    }
}
