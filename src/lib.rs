//! # Metrosite
//!
//! The asynchronous core behind a metrology company's marketing site: it
//! preloads the site's imagery with aggregate progress, and delivers
//! contact-form messages through a hosted email provider while keeping a
//! bounded, persisted audit trail of every attempt.
//!
//! Page layout, navigation, and the map widget live in the front end and
//! call into this crate through the two entry points below.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`preload`] | Concurrent batch preloading with loaded/failed sets, progress, and stale-invocation protection |
//! | [`fetch`] | Resource fetch boundary: [`fetch::ResourceFetcher`] and the reqwest-backed [`fetch::HttpFetcher`] |
//! | [`dispatch`] | Contact-form dispatch: payload construction, single delivery attempt, audit logging |
//! | [`provider`] | Delivery provider boundary: [`provider::DeliveryProvider`] and [`provider::EmailJsProvider`] |
//! | [`audit`] | Bounded FIFO audit trail persisted as JSON in a key-value store |
//! | [`config`] | Layered `config.toml` + environment configuration |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## One Task per Invocation
//!
//! A preload invocation polls all of its fetches from one task. Settlements
//! are applied one at a time, so the per-invocation state needs no lock;
//! only the handoff to observers (token check + publish) is synchronized.
//!
//! ## Tokens Instead of Cancellation
//!
//! Fetches cannot be aborted. A newer invocation takes a fresh token, and
//! an older one that settles late finds its token stale and stays silent.
//!
//! ## Best-Effort Audit Trail
//!
//! The audit trail must never be the reason a message fails to send. Store
//! errors are logged and swallowed; a corrupt store reads as empty and is
//! rewritten on the next append.

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod fetch;
pub mod output;
pub mod preload;
pub mod provider;

#[cfg(test)]
pub(crate) mod test_helpers;
