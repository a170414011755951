//! Delivery provider boundary for outgoing notifications.
//!
//! The [`DeliveryProvider`] trait mirrors the shape of hosted email-template
//! services: a service id, a template id, a flat map of template
//! parameters, and the account key that owns them. [`EmailJsProvider`]
//! speaks the EmailJS REST API.
//!
//! A single call is a single attempt. No retries, no timeout beyond the
//! HTTP client's own.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Default EmailJS send endpoint.
pub const EMAILJS_ENDPOINT: &str = "https://api.emailjs.com/api/v1.0/email/send";

/// Template parameters, keyed by template variable name.
pub type TemplateParams = BTreeMap<String, String>;

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("delivery request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider rejected the message ({status}): {text}")]
    Rejected { status: u16, text: String },
    #[error("{0}")]
    Other(String),
}

/// What the provider answered for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub status: u16,
    pub text: String,
}

impl fmt::Display for ProviderResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.status, self.text)
    }
}

#[async_trait]
pub trait DeliveryProvider: Send + Sync {
    async fn deliver(
        &self,
        service_id: &str,
        template_id: &str,
        params: &TemplateParams,
        account_id: &str,
    ) -> Result<ProviderResponse, DeliveryError>;
}

#[derive(Serialize)]
struct SendBody<'a> {
    service_id: &'a str,
    template_id: &'a str,
    user_id: &'a str,
    template_params: &'a TemplateParams,
}

/// EmailJS over HTTPS.
#[derive(Debug, Clone)]
pub struct EmailJsProvider {
    client: Client,
    endpoint: Url,
}

impl EmailJsProvider {
    pub fn new(client: Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl DeliveryProvider for EmailJsProvider {
    async fn deliver(
        &self,
        service_id: &str,
        template_id: &str,
        params: &TemplateParams,
        account_id: &str,
    ) -> Result<ProviderResponse, DeliveryError> {
        let body = SendBody {
            service_id,
            template_id,
            user_id: account_id,
            template_params: params,
        };
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(DeliveryError::Rejected { status, text });
        }
        Ok(ProviderResponse { status, text })
    }
}
