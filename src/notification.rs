//! Outbound notifications
//!
//! The core never talks to a chat API directly. Drivers hand a payload to a
//! `NotificationSender`, wrapped in `send_with_retry` for bounded
//! exponential backoff. `TelegramSender` posts to the Bot API; `LogSender`
//! is used when no bot token is configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::error::AppError;
use crate::types::TelegramConfig;

/// What a message is about. Lets senders format or route by kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Daily digest of contacts due for a reach-out.
    ReminderDigest,
    /// An event is about to start.
    EventReminder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Plain-text rendering used by chat transports.
    pub fn text(&self) -> String {
        if self.body.is_empty() {
            self.title.clone()
        } else {
            format!("{}\n\n{}", self.title, self.body)
        }
    }
}

/// Outcome of a single delivery attempt.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// Timeouts, rate limits, 5xx. Worth another attempt.
    #[error("retryable: {0}")]
    Retryable(String),
    /// The transport refused the message (unknown chat, blocked bot).
    #[error("rejected: {0}")]
    Rejected(String),
}

/// A transport that can deliver one message to one user.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(
        &self,
        user_id: i64,
        kind: MessageKind,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError>;
}

/// Successful delivery report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 4_000,
        }
    }
}

fn retry_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(
        policy
            .initial_backoff_ms
            .saturating_mul(exponent)
            .min(policy.max_backoff_ms),
    )
}

/// Deliver with bounded retries. Rejections are not retried. Exhausted or
/// rejected deliveries surface as `AppError::TransientDelivery` so the
/// driver can count them and move on.
pub async fn send_with_retry(
    sender: &dyn NotificationSender,
    user_id: i64,
    kind: MessageKind,
    payload: &NotificationPayload,
    policy: &RetryPolicy,
) -> Result<Delivery, AppError> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match sender.send(user_id, kind, payload).await {
            Ok(()) => return Ok(Delivery { attempts: attempt }),
            Err(DeliveryError::Rejected(message)) => {
                log::warn!(
                    "Notification: {:?} to user {} rejected: {}",
                    kind,
                    user_id,
                    message
                );
                return Err(AppError::TransientDelivery {
                    attempts: attempt,
                    message,
                });
            }
            Err(DeliveryError::Retryable(message)) => {
                last_error = message;
                if attempt < attempts {
                    let delay = retry_delay(attempt, policy);
                    log::warn!(
                        "Notification: retry {}/{} for user {} after: {} (sleep {:?})",
                        attempt,
                        attempts,
                        user_id,
                        last_error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(AppError::TransientDelivery {
        attempts,
        message: last_error,
    })
}

// ============================================================================
// Telegram
// ============================================================================

/// Telegram Bot API `sendMessage`. The chat id is the Telegram user id.
pub struct TelegramSender {
    client: reqwest::Client,
    endpoint: Url,
}

#[derive(serde::Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

impl TelegramSender {
    pub fn new(api_base: &str, bot_token: &str) -> Result<Self, AppError> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .map_err(|e| AppError::Configuration(format!("HTTP client: {}", e)))?,
            endpoint: send_message_url(api_base, bot_token)?,
        })
    }
}

fn send_message_url(api_base: &str, bot_token: &str) -> Result<Url, AppError> {
    if bot_token.trim().is_empty() {
        return Err(AppError::Configuration("Telegram bot token is empty".into()));
    }
    let mut base = api_base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Url::parse(&base)
        .and_then(|b| b.join(&format!("./bot{}/sendMessage", bot_token.trim())))
        .map_err(|e| AppError::Configuration(format!("Invalid Telegram API base '{}': {}", api_base, e)))
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(
        &self,
        user_id: i64,
        _kind: MessageKind,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        let body = serde_json::json!({
            "chat_id": user_id,
            "text": payload.text(),
        });
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                // reqwest errors can embed the URL, which carries the token.
                let e = e.without_url();
                if e.is_timeout() || e.is_connect() {
                    DeliveryError::Retryable(e.to_string())
                } else {
                    DeliveryError::Rejected(e.to_string())
                }
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(DeliveryError::Retryable(format!("Telegram API status {}", status)));
        }

        let parsed: Option<TelegramResponse> = resp.json().await.ok();
        match parsed {
            Some(r) if r.ok && status.is_success() => Ok(()),
            Some(r) => Err(DeliveryError::Rejected(format!(
                "Telegram API status {}: {}",
                status,
                r.description.unwrap_or_default()
            ))),
            None => Err(DeliveryError::Rejected(format!(
                "Telegram API status {} with unreadable body",
                status
            ))),
        }
    }
}

// ============================================================================
// Log-only
// ============================================================================

/// Writes notifications to the log instead of delivering them.
pub struct LogSender;

#[async_trait]
impl NotificationSender for LogSender {
    async fn send(
        &self,
        user_id: i64,
        kind: MessageKind,
        payload: &NotificationPayload,
    ) -> Result<(), DeliveryError> {
        log::info!(
            "Notification (log only): {:?} for user {}: {}",
            kind,
            user_id,
            payload.title
        );
        Ok(())
    }
}

/// Pick the sender for the configured transport.
pub fn sender_from_config(config: &TelegramConfig) -> Result<Arc<dyn NotificationSender>, AppError> {
    match config.bot_token.as_deref() {
        Some(token) if !token.trim().is_empty() => {
            Ok(Arc::new(TelegramSender::new(&config.api_base, token)?))
        }
        _ => {
            log::warn!("Notification: no Telegram bot token configured, logging messages only");
            Ok(Arc::new(LogSender))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Flaky {
        failures_before_success: u32,
        calls: AtomicU32,
        reject: bool,
    }

    #[async_trait]
    impl NotificationSender for Flaky {
        async fn send(
            &self,
            _user_id: i64,
            _kind: MessageKind,
            _payload: &NotificationPayload,
        ) -> Result<(), DeliveryError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.reject {
                return Err(DeliveryError::Rejected("chat not found".into()));
            }
            if call <= self.failures_before_success {
                Err(DeliveryError::Retryable("timeout".into()))
            } else {
                Ok(())
            }
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        }
    }

    fn payload() -> NotificationPayload {
        NotificationPayload::new("Time to reach out", "Ann, Bob")
    }

    #[tokio::test]
    async fn test_retry_then_succeed() {
        let sender = Flaky {
            failures_before_success: 2,
            calls: AtomicU32::new(0),
            reject: false,
        };
        let delivery = send_with_retry(&sender, 1, MessageKind::ReminderDigest, &payload(), &fast_policy())
            .await
            .unwrap();
        assert_eq!(delivery.attempts, 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_transient_error() {
        let sender = Flaky {
            failures_before_success: 10,
            calls: AtomicU32::new(0),
            reject: false,
        };
        let err = send_with_retry(&sender, 1, MessageKind::ReminderDigest, &payload(), &fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TransientDelivery { attempts: 3, .. }));
        assert!(err.is_retryable());
        assert_eq!(sender.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rejection_not_retried() {
        let sender = Flaky {
            failures_before_success: 0,
            calls: AtomicU32::new(0),
            reject: true,
        };
        let err = send_with_retry(&sender, 1, MessageKind::EventReminder, &payload(), &fast_policy())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TransientDelivery { attempts: 1, .. }));
        assert_eq!(sender.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(retry_delay(1, &policy), Duration::from_millis(500));
        assert_eq!(retry_delay(2, &policy), Duration::from_millis(1_000));
        assert_eq!(retry_delay(3, &policy), Duration::from_millis(2_000));
        assert_eq!(retry_delay(10, &policy), Duration::from_millis(4_000));
    }

    #[test]
    fn test_send_message_url() {
        let url = send_message_url("https://api.telegram.org", "123:abc").unwrap();
        assert_eq!(url.as_str(), "https://api.telegram.org/bot123:abc/sendMessage");
        let proxied = send_message_url("http://localhost:8081/tg/", "t").unwrap();
        assert_eq!(proxied.as_str(), "http://localhost:8081/tg/bott/sendMessage");
        assert!(send_message_url("https://api.telegram.org", " ").is_err());
        assert!(send_message_url("not a url", "t").is_err());
    }

    #[test]
    fn test_payload_text() {
        assert_eq!(payload().text(), "Time to reach out\n\nAnn, Bob");
        assert_eq!(NotificationPayload::new("Hi", "").text(), "Hi");
    }
}
