//! Verification email delivery.
//!
//! With an API key and sender configured, mail goes out through a
//! Brevo-compatible transactional email API. Otherwise the code is only
//! written to the log, which is enough for development.

use serde::Serialize;
use tracing::{debug, info};

use dreamlib_core::config::MailConfig;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail API error ({status}): {body}")]
    Api { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendEmailBody<'a> {
    sender: Address<'a>,
    to: Vec<Address<'a>>,
    subject: &'a str,
    html_content: String,
    text_content: String,
}

#[derive(Debug)]
pub struct ApiMailer {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_email: String,
    sender_name: String,
}

#[derive(Debug)]
pub enum Mailer {
    /// Logs the message instead of sending it.
    Log,
    Api(ApiMailer),
}

const SUBJECT: &str = "[Dream Library] Email verification code";

fn text_body(code: &str, ttl_minutes: i64) -> String {
    format!(
        "Your Dream Library verification code is {code}.\n\
         It is valid for {ttl_minutes} minutes. If you did not request it, ignore this email."
    )
}

impl Mailer {
    pub fn from_config(config: &MailConfig) -> Result<Self, MailError> {
        if !config.is_configured() {
            return Ok(Self::Log);
        }
        let (Some(api_key), Some(sender_email)) = (&config.api_key, &config.sender_email) else {
            return Ok(Self::Log);
        };

        // reqwest is built with rustls-no-provider; an Err here only means a
        // provider is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let http = reqwest::Client::builder().build()?;

        Ok(Self::Api(ApiMailer {
            http,
            api_url: config.api_url.clone(),
            api_key: api_key.trim().to_string(),
            sender_email: sender_email.trim().to_string(),
            sender_name: config.sender_name.clone(),
        }))
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Api(_) => "api",
        }
    }

    /// Deliver a verification code to `to`.
    pub async fn send_verification_code(
        &self,
        to: &str,
        code: &str,
        ttl_minutes: i64,
    ) -> Result<(), MailError> {
        match self {
            Self::Log => {
                log_unsent(to, code);
                Ok(())
            }
            Self::Api(api) => api.send(to, code, ttl_minutes).await,
        }
    }
}

/// The code only appears at debug level.
fn log_unsent(to: &str, code: &str) {
    info!(to, "Mail delivery not configured; verification email not sent");
    debug!(to, code, "Undelivered verification code");
}

impl ApiMailer {
    async fn send(&self, to: &str, code: &str, ttl_minutes: i64) -> Result<(), MailError> {
        let text = text_body(code, ttl_minutes);
        let body = SendEmailBody {
            sender: Address {
                email: &self.sender_email,
                name: Some(&self.sender_name),
            },
            to: vec![Address {
                email: to,
                name: None,
            }],
            subject: SUBJECT,
            html_content: format!("<p>{}</p>", text.replace('\n', "<br>")),
            text_content: text,
        };

        let resp = self
            .http
            .post(&self.api_url)
            .header("api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(MailError::Api {
                status: status.as_u16(),
                body,
            });
        }
        debug!(to, "Verification email sent");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    struct CapturedWriter(Arc<Mutex<Vec<u8>>>);

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = CapturedWriter;

        fn make_writer(&'a self) -> Self::Writer {
            CapturedWriter(Arc::clone(&self.0))
        }
    }

    impl io::Write for CapturedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn logs_at(level: Level) -> String {
        let sink = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(sink.clone())
            .with_ansi(false)
            .with_max_level(level)
            .finish();
        tracing::subscriber::with_default(subscriber, || {
            log_unsent("reader@example.com", "482913");
        });
        let bytes = sink.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn unsent_code_stays_out_of_info_logs() {
        let info = logs_at(Level::INFO);
        assert!(info.contains("reader@example.com"));
        assert!(!info.contains("482913"));

        let debug = logs_at(Level::DEBUG);
        assert!(debug.contains("482913"));
    }

    #[test]
    fn unconfigured_mail_logs_only() {
        let mailer = Mailer::from_config(&MailConfig::default()).unwrap();
        assert_eq!(mailer.kind(), "log");

        let blank_key = MailConfig {
            api_key: Some("  ".into()),
            sender_email: Some("noreply@example.com".into()),
            ..MailConfig::default()
        };
        assert_eq!(Mailer::from_config(&blank_key).unwrap().kind(), "log");
    }

    #[test]
    fn configured_mail_uses_api() {
        let config = MailConfig {
            api_key: Some("key".into()),
            sender_email: Some("noreply@example.com".into()),
            ..MailConfig::default()
        };
        assert_eq!(Mailer::from_config(&config).unwrap().kind(), "api");
    }

    #[test]
    fn body_serializes_camel_case() {
        let body = SendEmailBody {
            sender: Address {
                email: "noreply@example.com",
                name: Some("Dream Library"),
            },
            to: vec![Address {
                email: "reader@example.com",
                name: None,
            }],
            subject: SUBJECT,
            html_content: "<p>x</p>".into(),
            text_content: text_body("123456", 5),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["sender"]["name"], "Dream Library");
        assert!(json["to"][0].get("name").is_none());
        assert!(json["textContent"].as_str().unwrap().contains("123456"));
        assert!(json.get("htmlContent").is_some());
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        Mailer::Log
            .send_verification_code("reader@example.com", "123456", 5)
            .await
            .unwrap();
    }
}
