//! Contact-form message dispatch with a persisted audit trail.
//!
//! [`Dispatcher::send`] turns a [`Message`] into provider template
//! parameters, hands them to a [`DeliveryProvider`] once, and records the
//! outcome in the [`AuditLog`]:
//!
//! ```text
//! validate ─▶ credentials ─▶ build params ─▶ deliver ─┬─▶ log success ─▶ Ok
//!                 │                                   └─▶ log error   ─▶ Err(Delivery)
//!                 └─▶ log error ─▶ Err(Configuration)
//! ```
//!
//! Errors always reach the caller, which owns the user-facing messaging.
//! A message that fails validation never counts as an attempt and is not
//! logged.

use crate::audit::{AttemptStatus, AuditLog, LogEntry};
use crate::config::DeliveryConfig;
use crate::provider::{DeliveryError, DeliveryProvider, ProviderResponse, TemplateParams};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Substituted for a missing phone number.
pub const PHONE_PLACEHOLDER: &str = "Not provided";

#[derive(Error, Debug)]
pub enum SendError {
    #[error("delivery configuration missing: {0}")]
    Configuration(&'static str),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// A contact-form submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender_name: String,
    pub sender_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_phone: Option<String>,
    pub subject: String,
    pub body: String,
}

impl Message {
    /// Reject submissions the provider template cannot render meaningfully.
    pub fn validate(&self) -> Result<(), SendError> {
        let required = [
            ("sender name", &self.sender_name),
            ("subject", &self.subject),
            ("body", &self.body),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SendError::InvalidMessage(format!("{field} is empty")));
            }
        }
        let email = self.sender_email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(SendError::InvalidMessage(format!(
                "sender email is not an address: {email:?}"
            ))),
        }
    }
}

/// The three required provider identifiers, all non-empty.
#[derive(Debug, Clone, Copy)]
pub struct Credentials<'a> {
    pub service_id: &'a str,
    pub template_id: &'a str,
    pub account_id: &'a str,
}

impl<'a> Credentials<'a> {
    /// Extract credentials, naming the first one that is missing.
    pub fn from_config(config: &'a DeliveryConfig) -> Result<Self, SendError> {
        let pick = |value: &'a str, name: &'static str| {
            let value = value.trim();
            if value.is_empty() {
                Err(SendError::Configuration(name))
            } else {
                Ok(value)
            }
        };
        Ok(Self {
            service_id: pick(&config.service_id, "service_id")?,
            template_id: pick(&config.template_id, "template_id")?,
            account_id: pick(&config.account_id, "account_id")?,
        })
    }
}

/// Format a send time the way the recipient's template displays it,
/// e.g. `3/7/2026, 2:05:09 PM`.
pub fn format_sent_at(at: NaiveDateTime) -> String {
    at.format("%-m/%-d/%Y, %-I:%M:%S %p").to_string()
}

/// Sends messages through a provider and records every attempt.
pub struct Dispatcher<P> {
    config: DeliveryConfig,
    provider: P,
    audit: Arc<AuditLog>,
}

impl<P: DeliveryProvider> Dispatcher<P> {
    pub fn new(config: DeliveryConfig, provider: P, audit: Arc<AuditLog>) -> Self {
        Self {
            config,
            provider,
            audit,
        }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Every recorded attempt, oldest first. Never fails.
    pub fn audit_log(&self) -> Vec<LogEntry> {
        self.audit.entries()
    }

    /// Template parameters for `message`, addressed to the configured
    /// recipient.
    pub fn build_params(&self, message: &Message, sent_at: &str) -> TemplateParams {
        let phone = message
            .sender_phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(PHONE_PLACEHOLDER);
        [
            ("to_name", self.config.recipient_name.as_str()),
            ("to_email", self.config.recipient_email.as_str()),
            ("from_name", message.sender_name.as_str()),
            ("from_email", message.sender_email.as_str()),
            ("phone", phone),
            ("subject", message.subject.as_str()),
            ("message", message.body.as_str()),
            ("sent_at", sent_at),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    /// Deliver `message` once and log the outcome.
    pub async fn send(&self, message: &Message) -> Result<ProviderResponse, SendError> {
        message.validate()?;

        let credentials = match Credentials::from_config(&self.config) {
            Ok(c) => c,
            Err(err) => {
                warn!("refusing to send: {err}");
                self.record(AttemptStatus::Error, message, err.to_string());
                return Err(err);
            }
        };

        let sent_at = format_sent_at(Local::now().naive_local());
        let params = self.build_params(message, &sent_at);
        let result = self
            .provider
            .deliver(
                credentials.service_id,
                credentials.template_id,
                &params,
                credentials.account_id,
            )
            .await;

        match result {
            Ok(response) => {
                info!(subject = %message.subject, "message delivered: {response}");
                self.record(AttemptStatus::Success, message, response.to_string());
                Ok(response)
            }
            Err(err) => {
                warn!(subject = %message.subject, "message delivery failed: {err}");
                self.record(AttemptStatus::Error, message, err.to_string());
                Err(err.into())
            }
        }
    }

    fn record(&self, status: AttemptStatus, message: &Message, detail: String) {
        self.audit.append(LogEntry::now(
            status,
            &message.sender_email,
            &message.subject,
            detail,
        ));
    }
}

impl<P> std::fmt::Debug for Dispatcher<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoint", &self.config.endpoint)
            .field("audit", &self.audit)
            .finish_non_exhaustive()
    }
}
