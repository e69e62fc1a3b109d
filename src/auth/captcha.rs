use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::RecaptchaConfig;

/// Failure to obtain a verdict. Never an implicit accept or reject.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("verification request failed")]
    Transport(#[source] reqwest::Error),
    #[error("verification request timed out")]
    Timeout(#[source] reqwest::Error),
    #[error("verification service returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed verification response")]
    Decode(#[source] reqwest::Error),
}

impl VerificationError {
    /// A 4xx from the service points at our request or secret, not an outage.
    pub fn is_retryable(&self) -> bool {
        match self {
            VerificationError::Status(s) => s.is_server_error() || s.as_u16() == 429,
            _ => true,
        }
    }
}

impl From<reqwest::Error> for VerificationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            VerificationError::Timeout(e)
        } else if e.is_decode() {
            VerificationError::Decode(e)
        } else {
            VerificationError::Transport(e)
        }
    }
}

#[async_trait]
pub trait BotVerifier: Send + Sync {
    /// `Ok(true)` when the service accepted the user's response token.
    async fn verify(&self, response_token: &str) -> Result<bool, VerificationError>;
}

#[derive(Debug, Deserialize)]
struct SiteVerifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// Google reCAPTCHA `siteverify` client.
#[derive(Clone)]
pub struct RecaptchaClient {
    http: reqwest::Client,
    verify_url: String,
    secret: String,
}

impl RecaptchaClient {
    pub fn new(cfg: &RecaptchaConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            verify_url: cfg.verify_url.clone(),
            secret: cfg.secret.clone(),
        })
    }
}

#[async_trait]
impl BotVerifier for RecaptchaClient {
    #[instrument(skip_all)]
    async fn verify(&self, response_token: &str) -> Result<bool, VerificationError> {
        let response = self
            .http
            .post(&self.verify_url)
            .form(&[("secret", self.secret.as_str()), ("response", response_token)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(VerificationError::Status(status));
        }

        let body: SiteVerifyResponse = response.json().await?;
        debug!(success = body.success, error_codes = ?body.error_codes, "siteverify answered");
        Ok(body.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer, timeout_secs: u64) -> RecaptchaClient {
        RecaptchaClient::new(&RecaptchaConfig {
            secret: "shh".into(),
            verify_url: format!("{}/recaptcha/api/siteverify", server.uri()),
            timeout_secs,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn accepted_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/recaptcha/api/siteverify"))
            .and(body_string_contains("secret=shh"))
            .and(body_string_contains("response=tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client(&server, 5).verify("tok-1").await.unwrap());
    }

    #[tokio::test]
    async fn rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error-codes": ["invalid-input-response"]
            })))
            .mount(&server)
            .await;

        assert!(!client(&server, 5).verify("bogus").await.unwrap());
    }

    #[tokio::test]
    async fn server_error_is_not_a_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server, 5).verify("tok").await.unwrap_err();
        assert!(matches!(err, VerificationError::Status(s) if s.as_u16() == 503));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn malformed_body_is_not_a_verdict() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>nope</html>"))
            .mount(&server)
            .await;

        let err = client(&server, 5).verify("tok").await.unwrap_err();
        assert!(matches!(err, VerificationError::Decode(_)));
    }

    #[tokio::test]
    async fn bad_secret_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = client(&server, 5).verify("tok").await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn slow_service_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "success": true }))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let err = client(&server, 1).verify("tok").await.unwrap_err();
        assert!(matches!(err, VerificationError::Timeout(_)));
    }
}
