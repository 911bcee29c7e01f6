//! HTTP mail/SMS gateway dispatcher.
//!
//! Posts JSON documents to `<base>/email` and `<base>/sms`. Any 2xx response
//! counts as delivered.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::dispatch::Dispatcher;
use super::{NotificationError, Template};

#[derive(Debug, Serialize)]
pub struct EmailRequest<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub subject: &'a str,
    pub template: &'a str,
    pub display_name: &'a str,
    pub code: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SmsRequest<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub body: &'a str,
}

#[derive(Debug)]
pub struct HttpDispatcher {
    http: reqwest::Client,
    base_url: String,
    sender_email: String,
    sender_sms: String,
}

impl HttpDispatcher {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        sender_email: impl Into<String>,
        sender_sms: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            sender_email: sender_email.into(),
            sender_sms: sender_sms.into(),
        }
    }

    /// Build a client with the `ring` crypto provider and wrap it.
    pub fn connect(
        base_url: &str,
        sender_email: impl Into<String>,
        sender_sms: impl Into<String>,
    ) -> Result<Self, NotificationError> {
        // reqwest is built without a provider; `Err` means one is already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| NotificationError::Request(e.to_string()))?;
        Ok(Self::new(http, base_url, sender_email, sender_sms))
    }

    #[cfg(test)]
    #[allow(clippy::expect_used)]
    pub(crate) fn for_testing(base_url: &str) -> Self {
        Self::connect(base_url, "no-reply@warden.test", "warden")
            .expect("failed to build test HTTP client")
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), NotificationError> {
        let response = self
            .http
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|e| NotificationError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(path, "Gateway accepted message");
            Ok(())
        } else {
            let status_code = status.as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(status = status_code, body = %body, "Gateway returned error");
            Err(NotificationError::ApiError {
                status: status_code,
                body,
            })
        }
    }
}

#[async_trait]
impl Dispatcher for HttpDispatcher {
    async fn send_confirmation_email(
        &self,
        to: &str,
        display_name: &str,
        code: &str,
    ) -> Result<(), NotificationError> {
        let template = Template::ConfirmHolderRegistration;
        let request = EmailRequest {
            from: &self.sender_email,
            to,
            subject: template.subject(),
            template: template.name(),
            display_name,
            code,
        };
        self.post("email", &request).await
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotificationError> {
        let request = SmsRequest {
            from: &self.sender_sms,
            to,
            body,
        };
        self.post("sms", &request).await
    }
}
