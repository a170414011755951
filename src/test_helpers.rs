//! Shared test doubles for the metrosite test suite.
//!
//! - [`MockFetcher`]: scripted [`ResourceFetcher`] with per-locator failures
//!   and gates that hold a fetch open until the test releases it.
//! - [`MockProvider`]: scripted [`DeliveryProvider`] that records its calls.
//! - [`FailingStore`]: an [`AuditStore`] whose every operation errors.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::audit::AuditStore;
use crate::config::DeliveryConfig;
use crate::dispatch::Message;
use crate::fetch::{FetchError, ResourceFetcher};
use crate::provider::{DeliveryError, DeliveryProvider, ProviderResponse, TemplateParams};

// =========================================================================
// Fetcher
// =========================================================================

#[derive(Default)]
pub struct MockFetcher {
    failures: HashSet<String>,
    gates: HashMap<String, Arc<Notify>>,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `locator` fail with a 404.
    pub fn failing(mut self, locator: &str) -> Self {
        self.failures.insert(locator.to_string());
        self
    }

    /// Hold `locator` open until `gate` is notified.
    pub fn gated(mut self, locator: &str, gate: Arc<Notify>) -> Self {
        self.gates.insert(locator.to_string(), gate);
        self
    }

    /// Locators fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResourceFetcher for MockFetcher {
    async fn fetch(&self, locator: &str) -> Result<(), FetchError> {
        self.calls.lock().unwrap().push(locator.to_string());
        if let Some(gate) = self.gates.get(locator) {
            gate.notified().await;
        }
        if self.failures.contains(locator) {
            Err(FetchError::Status(404))
        } else {
            Ok(())
        }
    }
}

// =========================================================================
// Provider
// =========================================================================

#[derive(Debug, Clone)]
pub struct RecordedDelivery {
    pub service_id: String,
    pub template_id: String,
    pub account_id: String,
    pub params: TemplateParams,
}

enum Scripted {
    Accept,
    Fail(String),
}

pub struct MockProvider {
    outcome: Scripted,
    calls: Mutex<Vec<RecordedDelivery>>,
}

impl MockProvider {
    pub fn accepting() -> Self {
        Self {
            outcome: Scripted::Accept,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Scripted::Fail(message.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<RecordedDelivery> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl DeliveryProvider for MockProvider {
    async fn deliver(
        &self,
        service_id: &str,
        template_id: &str,
        params: &TemplateParams,
        account_id: &str,
    ) -> Result<ProviderResponse, DeliveryError> {
        self.calls.lock().unwrap().push(RecordedDelivery {
            service_id: service_id.to_string(),
            template_id: template_id.to_string(),
            account_id: account_id.to_string(),
            params: params.clone(),
        });
        match &self.outcome {
            Scripted::Accept => Ok(ProviderResponse {
                status: 200,
                text: "OK".to_string(),
            }),
            Scripted::Fail(message) => Err(DeliveryError::Other(message.clone())),
        }
    }
}

// =========================================================================
// Store
// =========================================================================

pub struct FailingStore;

impl AuditStore for FailingStore {
    fn read(&self, _key: &str) -> io::Result<Option<String>> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read denied"))
    }

    fn write(&self, _key: &str, _value: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "write denied"))
    }

    fn remove(&self, _key: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "remove denied"))
    }
}

// =========================================================================
// Fixtures
// =========================================================================

/// Delivery config with all three credentials set.
pub fn configured_delivery() -> DeliveryConfig {
    DeliveryConfig {
        service_id: "service_test".into(),
        template_id: "template_test".into(),
        account_id: "public_key_test".into(),
        ..DeliveryConfig::default()
    }
}

pub fn sample_message() -> Message {
    Message {
        sender_name: "Jane Doe".into(),
        sender_email: "jane@example.com".into(),
        sender_phone: Some("+1 555 0100".into()),
        subject: "CMM calibration quote".into(),
        body: "Please quote a yearly calibration.".into(),
    }
}
