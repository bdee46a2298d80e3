//! Outbound notification collaborator
//!
//! The authentication core only needs `send(to, subject, body)`. Transport
//! is out of scope; [`LogNotifier`] records that a message would be sent
//! and [`MemoryNotifier`] keeps messages for inspection in tests and
//! local development.

pub mod templates;

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::{NotifyConfig, NotifyMode};
use crate::error::NotifyError;

/// Delivers messages to account holders
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// Notifier that only logs recipient and subject
///
/// Bodies contain single-use links and are never logged.
#[derive(Debug, Clone)]
pub struct LogNotifier {
    from_address: String,
}

impl LogNotifier {
    pub fn new(from_address: impl Into<String>) -> Self {
        Self {
            from_address: from_address.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<(), NotifyError> {
        if !to.contains('@') {
            return Err(NotifyError::InvalidRecipient(to.to_string()));
        }
        tracing::info!(from = %self.from_address, to = %to, subject = %subject, "Notification dispatched");
        Ok(())
    }
}

/// A message captured by [`MemoryNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

/// Notifier that keeps every message in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    messages: Mutex<Vec<SentMessage>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages sent so far, oldest first
    pub fn sent(&self) -> Vec<SentMessage> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Messages sent to `to`, oldest first
    pub fn sent_to(&self, to: &str) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.to.eq_ignore_ascii_case(to))
            .collect()
    }

    pub fn clear(&self) {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentMessage {
                to: to.to_string(),
                subject: subject.to_string(),
                body: body.to_string(),
                sent_at: Utc::now(),
            });
        Ok(())
    }
}

/// Build the notifier selected by configuration
pub fn from_config(config: &NotifyConfig) -> std::sync::Arc<dyn Notifier> {
    match config.mode {
        NotifyMode::Log => std::sync::Arc::new(LogNotifier::new(config.from_address.clone())),
        NotifyMode::Memory => std::sync::Arc::new(MemoryNotifier::new()),
    }
}
