// src/services/notify.rs

use std::fmt;

use async_trait::async_trait;
use serde_json::json;

/// The kinds of email this service sends. Template rendering and delivery
/// belong to the relay; we only name the template and hand over its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailKind {
    Enrollment,
    AssessmentResult,
    CourseCompletion,
    RegistrationCode,
    PasswordResetCode,
    /// Delivery probe for the test endpoint.
    Probe,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::Enrollment => "enrollment",
            EmailKind::AssessmentResult => "assessment_result",
            EmailKind::CourseCompletion => "course_completion",
            EmailKind::RegistrationCode => "registration_code",
            EmailKind::PasswordResetCode => "password_reset_code",
            EmailKind::Probe => "probe",
        }
    }
}

#[derive(Debug)]
pub enum NotifyError {
    /// No relay endpoint configured.
    Disabled,
    /// The relay rejected the message or could not be reached.
    Relay(String),
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Disabled => write!(f, "email delivery is not configured"),
            NotifyError::Relay(msg) => write!(f, "email relay error: {}", msg),
        }
    }
}

impl std::error::Error for NotifyError {}

/// Outbound email port. Almost every call site is best-effort: failures are
/// logged and the request carries on. The exception is the one-time-code
/// senders, where the flow cannot proceed without the email.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        kind: EmailKind,
        to: &str,
        data: serde_json::Value,
    ) -> Result<(), NotifyError>;

    fn is_configured(&self) -> bool {
        true
    }
}

/// Production notifier: posts the message to an HTTP relay that owns
/// templates and SMTP.
pub struct HttpNotifier {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

impl HttpNotifier {
    pub fn new(endpoint: String, from: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            from,
        }
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn send(
        &self,
        kind: EmailKind,
        to: &str,
        data: serde_json::Value,
    ) -> Result<(), NotifyError> {
        let body = json!({
            "kind": kind.as_str(),
            "from": self.from,
            "to": to,
            "data": data,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| NotifyError::Relay(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Relay(format!(
                "relay returned {}",
                response.status()
            )));
        }

        tracing::info!("Sent '{}' email to {}", kind.as_str(), to);
        Ok(())
    }
}

/// Stand-in when NOTIFY_ENDPOINT is unset: every send fails with `Disabled`
/// so call sites log it and the status endpoint can report the gap.
pub struct DisabledNotifier;

#[async_trait]
impl Notifier for DisabledNotifier {
    async fn send(
        &self,
        _kind: EmailKind,
        _to: &str,
        _data: serde_json::Value,
    ) -> Result<(), NotifyError> {
        Err(NotifyError::Disabled)
    }

    fn is_configured(&self) -> bool {
        false
    }
}
