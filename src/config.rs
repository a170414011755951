//! Site configuration module.
//!
//! Handles loading, validating, and layering `config.toml`. Stock defaults
//! are overridden by the user's `config.toml`, which is in turn overridden by
//! environment variables for the delivery credentials.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [delivery]
//! service_id = ""           # Provider service id (required to send)
//! template_id = ""          # Provider template id (required to send)
//! account_id = ""           # Provider account/public key (required to send)
//! endpoint = "https://api.emailjs.com/api/v1.0/email/send"
//! recipient_name = "Sales Team"
//! recipient_email = "sales@example.com"
//!
//! [audit]
//! store_dir = ".metrosite"  # Where the audit log is persisted
//!
//! [preload]
//! # base_url = "https://example.com/"  # Base for relative locators
//! user_agent = "metrosite-preloader"
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Overrides |
//! |---|---|
//! | `METROSITE_SERVICE_ID` | `delivery.service_id` |
//! | `METROSITE_TEMPLATE_ID` | `delivery.template_id` |
//! | `METROSITE_ACCOUNT_ID` | `delivery.account_id` |
//! | `METROSITE_ENDPOINT` | `delivery.endpoint` |
//!
//! Empty variables are ignored. Unknown keys in `config.toml` are rejected
//! to catch typos early.

use crate::provider::EMAILJS_ENDPOINT;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Site configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SiteConfig {
    /// Contact-form delivery settings.
    pub delivery: DeliveryConfig,
    /// Audit log persistence.
    pub audit: AuditConfig,
    /// Image preloading.
    pub preload: PreloadConfig,
}

impl SiteConfig {
    /// Validate config values are well-formed.
    ///
    /// Missing credentials are not a validation error: the site can still
    /// preload without them, and `send` reports them when it is called.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if Url::parse(&self.delivery.endpoint).is_err() {
            return Err(ConfigError::Validation(format!(
                "delivery.endpoint is not a valid URL: {}",
                self.delivery.endpoint
            )));
        }
        if !self.delivery.recipient_email.contains('@') {
            return Err(ConfigError::Validation(
                "delivery.recipient_email must be an email address".into(),
            ));
        }
        if self.audit.store_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "audit.store_dir must not be empty".into(),
            ));
        }
        if let Some(base) = &self.preload.base_url
            && Url::parse(base).is_err()
        {
            return Err(ConfigError::Validation(format!(
                "preload.base_url is not a valid URL: {base}"
            )));
        }
        Ok(())
    }

    /// Apply environment overrides. `lookup` is `std::env::var` in
    /// production; tests pass a map.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let delivery = &mut self.delivery;
        let targets: [(&str, &mut String); 4] = [
            ("METROSITE_SERVICE_ID", &mut delivery.service_id),
            ("METROSITE_TEMPLATE_ID", &mut delivery.template_id),
            ("METROSITE_ACCOUNT_ID", &mut delivery.account_id),
            ("METROSITE_ENDPOINT", &mut delivery.endpoint),
        ];
        for (var, field) in targets {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                *field = value;
            }
        }
    }
}

/// Delivery provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Provider service id.
    pub service_id: String,
    /// Provider template id.
    pub template_id: String,
    /// Provider account id (EmailJS public key).
    pub account_id: String,
    /// Send endpoint.
    pub endpoint: String,
    /// Display name of the fixed recipient.
    pub recipient_name: String,
    /// Address of the fixed recipient.
    pub recipient_email: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            service_id: String::new(),
            template_id: String::new(),
            account_id: String::new(),
            endpoint: EMAILJS_ENDPOINT.to_string(),
            recipient_name: "Sales Team".to_string(),
            recipient_email: "sales@example.com".to_string(),
        }
    }
}

/// Audit log persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    /// Directory holding the file-backed store.
    pub store_dir: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            store_dir: ".metrosite".to_string(),
        }
    }
}

/// Preloading settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreloadConfig {
    /// Base URL that relative locators are joined onto.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// User-Agent header sent with every fetch.
    pub user_agent: String,
}

impl Default for PreloadConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            user_agent: "metrosite-preloader".to_string(),
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SiteConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value and deserialize.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<SiteConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    Ok(merged.try_into()?)
}

/// Load the full configuration: stock defaults, then `config.toml` from
/// `dir`, then the process environment. The result is validated.
pub fn load_config(dir: &Path) -> Result<SiteConfig, ConfigError> {
    load_config_with_env(dir, |var| std::env::var(var).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with_env(
    dir: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<SiteConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(dir)?;
    let mut config = resolve_config(base, overlay)?;
    config.apply_env(lookup);
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Metrosite Configuration
# =======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Contact-form delivery
# ---------------------------------------------------------------------------
[delivery]
# Provider credentials. All three are required to send a message.
# Prefer the METROSITE_SERVICE_ID / METROSITE_TEMPLATE_ID /
# METROSITE_ACCOUNT_ID environment variables over committing them here.
service_id = ""
template_id = ""
account_id = ""

# Provider send endpoint (METROSITE_ENDPOINT overrides).
endpoint = "https://api.emailjs.com/api/v1.0/email/send"

# Every message is addressed to this fixed recipient.
recipient_name = "Sales Team"
recipient_email = "sales@example.com"

# ---------------------------------------------------------------------------
# Audit log
# ---------------------------------------------------------------------------
[audit]
# Directory holding the persisted log of the last 50 send attempts.
store_dir = ".metrosite"

# ---------------------------------------------------------------------------
# Image preloading
# ---------------------------------------------------------------------------
[preload]
# Relative locators such as /images/hero.jpg are joined onto this URL.
# base_url = "https://example.com/"

# User-Agent header sent with every fetch.
user_agent = "metrosite-preloader"
"##
}
