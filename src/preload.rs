//! Batch resource preloading with aggregate progress.
//!
//! A [`Preloader`] fetches a set of locators concurrently and tracks which
//! ones loaded and which failed. Failures are tolerated: a locator that
//! fails lands in the failed set, is reported through the error callback,
//! and never affects the other fetches. There are no retries.
//!
//! # Invocations and staleness
//!
//! Each call to [`Preloader::preload`] starts a new *invocation* with its
//! own [`LoadState`] accumulator and a fresh token. The preloader publishes
//! the state of the current invocation only. When a new invocation
//! supersedes an older one that is still in flight, the older one keeps
//! running (fetches cannot be cancelled), but its settlements are no longer
//! published and its callbacks and events are dropped.
//!
//! ```text
//! preload([a, b])   token 1 ──settle a── settle b──▶ (ignored after token 2)
//! preload([c])      token 2 ──settle c──▶ published, on_complete
//! ```
//!
//! # Scheduling
//!
//! All fetches of one invocation are polled from a single task through
//! `FuturesUnordered`, so settlements are applied one at a time in whatever
//! order they finish. Progress is a pure function of set sizes and does not
//! depend on that order.

use crate::fetch::{FetchError, ResourceFetcher};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::BTreeSet;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// A single locator that failed to load.
#[derive(Error, Debug)]
#[error("failed to load {locator}: {source}")]
pub struct ResourceLoadError {
    pub locator: String,
    #[source]
    pub source: FetchError,
}

/// Progress of one invocation.
///
/// A locator moves from pending into exactly one of `loaded` or `failed`,
/// at most once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadState {
    requested: BTreeSet<String>,
    loaded: BTreeSet<String>,
    failed: BTreeSet<String>,
}

impl LoadState {
    pub fn new<I, S>(locators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requested: locators.into_iter().map(Into::into).collect(),
            loaded: BTreeSet::new(),
            failed: BTreeSet::new(),
        }
    }

    pub fn requested(&self) -> &BTreeSet<String> {
        &self.requested
    }

    pub fn loaded(&self) -> &BTreeSet<String> {
        &self.loaded
    }

    pub fn failed(&self) -> &BTreeSet<String> {
        &self.failed
    }

    /// Number of locators that have loaded or failed.
    pub fn settled(&self) -> usize {
        self.loaded.len() + self.failed.len()
    }

    pub fn is_loading(&self) -> bool {
        self.settled() < self.requested.len()
    }

    /// Fraction of locators settled, in `[0, 1]`. An empty request is
    /// complete by definition.
    pub fn progress(&self) -> f64 {
        if self.requested.is_empty() {
            1.0
        } else {
            self.settled() as f64 / self.requested.len() as f64
        }
    }

    /// Record a successful load. Returns false if the locator was not
    /// requested or had already settled.
    pub fn mark_loaded(&mut self, locator: &str) -> bool {
        if !self.is_pending(locator) {
            return false;
        }
        self.loaded.insert(locator.to_string())
    }

    /// Record a failed load. Same rules as [`mark_loaded`](Self::mark_loaded).
    pub fn mark_failed(&mut self, locator: &str) -> bool {
        if !self.is_pending(locator) {
            return false;
        }
        self.failed.insert(locator.to_string())
    }

    fn is_pending(&self, locator: &str) -> bool {
        self.requested.contains(locator)
            && !self.loaded.contains(locator)
            && !self.failed.contains(locator)
    }
}

/// How a single locator settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Loaded,
    Failed(String),
}

/// Progress events sent to the optional event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PreloadEvent {
    Settled {
        locator: String,
        settlement: Settlement,
        settled: usize,
        total: usize,
    },
    Completed {
        loaded: usize,
        failed: usize,
    },
}

type CompleteCallback = Box<dyn FnOnce() + Send>;
type ErrorCallback = Box<dyn FnMut(&ResourceLoadError) + Send>;

/// Callbacks and event sink for one invocation.
///
/// Callbacks run on the invocation's task with no internal lock held. A
/// callback may start a new preload; from then on the calling invocation
/// is superseded and fires nothing further.
#[derive(Default)]
pub struct PreloadOptions {
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
    events: Option<Sender<PreloadEvent>>,
    completed: bool,
}

impl PreloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once, when every locator has settled.
    pub fn on_complete(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called for each locator that fails.
    pub fn on_error(mut self, f: impl FnMut(&ResourceLoadError) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn events(mut self, tx: Sender<PreloadEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    fn emit(&self, event: PreloadEvent) {
        if let Some(tx) = &self.events {
            // Receiver gone means nobody is watching; not an error.
            let _ = tx.send(event);
        }
    }

    fn report_error(&mut self, err: &ResourceLoadError) {
        if let Some(f) = self.on_error.as_mut() {
            f(err);
        }
    }

    /// Fire completion at most once per invocation.
    fn complete(&mut self, state: &LoadState) {
        if self.completed {
            return;
        }
        self.completed = true;
        self.emit(PreloadEvent::Completed {
            loaded: state.loaded().len(),
            failed: state.failed().len(),
        });
        if let Some(f) = self.on_complete.take() {
            f();
        }
    }
}

impl std::fmt::Debug for PreloadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreloadOptions")
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

/// The current token and the published state, updated together.
struct Published {
    token: Mutex<u64>,
    state: watch::Sender<LoadState>,
}

impl Published {
    fn start(&self, state: &LoadState) -> u64 {
        let mut token = match self.token.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        *token += 1;
        self.state.send_replace(state.clone());
        *token
    }

    fn is_current(&self, token: u64) -> bool {
        let current = match self.token.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        *current == token
    }

    /// Publish `state` if `token` is still current.
    fn publish(&self, token: u64, state: &LoadState) -> bool {
        let current = match self.token.lock() {
            Ok(t) => t,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *current != token {
            return false;
        }
        self.state.send_replace(state.clone());
        true
    }
}

/// Concurrent preloader over a [`ResourceFetcher`].
pub struct Preloader<F> {
    fetcher: Arc<F>,
    published: Arc<Published>,
}

impl<F: ResourceFetcher> Preloader<F> {
    pub fn new(fetcher: F) -> Self {
        let (state, _) = watch::channel(LoadState::default());
        Self {
            fetcher: Arc::new(fetcher),
            published: Arc::new(Published {
                token: Mutex::new(0),
                state,
            }),
        }
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Observe the state of the current invocation.
    pub fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.published.state.subscribe()
    }

    /// Snapshot of the current invocation's state.
    pub fn current(&self) -> LoadState {
        self.published.state.borrow().clone()
    }

    /// Start preloading `locators`, superseding any earlier invocation.
    ///
    /// Duplicate locators are fetched once. An empty set completes
    /// immediately without issuing any fetch.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn preload<I, S>(&self, locators: I, mut options: PreloadOptions) -> Invocation
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = LoadState::new(locators);
        let token = self.published.start(&state);
        info!(token, count = state.requested().len(), "preload started");

        if !state.is_loading() {
            options.complete(&state);
            return Invocation {
                token,
                inner: InvocationInner::Settled(state),
            };
        }

        let handle = tokio::spawn(drive(
            Arc::clone(&self.fetcher),
            Arc::clone(&self.published),
            token,
            state,
            options,
        ));
        Invocation {
            token,
            inner: InvocationInner::Running(handle),
        }
    }
}

impl<F> Clone for Preloader<F> {
    fn clone(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            published: Arc::clone(&self.published),
        }
    }
}

impl<F> std::fmt::Debug for Preloader<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preloader")
            .field("current", &*self.published.state.borrow())
            .finish_non_exhaustive()
    }
}

async fn drive<F: ResourceFetcher>(
    fetcher: Arc<F>,
    published: Arc<Published>,
    token: u64,
    mut state: LoadState,
    mut options: PreloadOptions,
) -> LoadState {
    let mut pending: FuturesUnordered<_> = state
        .requested()
        .iter()
        .cloned()
        .map(|locator| {
            let fetcher = Arc::clone(&fetcher);
            async move {
                let result = fetcher.fetch(&locator).await;
                (locator, result)
            }
        })
        .collect();

    while let Some((locator, result)) = pending.next().await {
        let (settlement, error) = match result {
            Ok(()) => {
                state.mark_loaded(&locator);
                (Settlement::Loaded, None)
            }
            Err(source) => {
                state.mark_failed(&locator);
                let err = ResourceLoadError {
                    locator: locator.clone(),
                    source,
                };
                (Settlement::Failed(err.source.to_string()), Some(err))
            }
        };

        if !published.publish(token, &state) {
            debug!(token, %locator, "dropping settlement from superseded preload");
            continue;
        }
        debug!(token, %locator, progress = state.progress(), "settled");

        // Callbacks run without the token lock held, so a newer invocation
        // may start while one is running. Re-check before each hand-off.
        if let Some(err) = &error {
            warn!("{err}");
            if published.is_current(token) {
                options.report_error(err);
            }
        }
        if !published.is_current(token) {
            debug!(token, %locator, "preload superseded during callback");
            continue;
        }
        options.emit(PreloadEvent::Settled {
            locator,
            settlement,
            settled: state.settled(),
            total: state.requested().len(),
        });
        if !state.is_loading() && published.is_current(token) {
            info!(
                token,
                loaded = state.loaded().len(),
                failed = state.failed().len(),
                "preload complete"
            );
            options.complete(&state);
        }
    }

    state
}

/// Handle to one invocation.
#[derive(Debug)]
pub struct Invocation {
    token: u64,
    inner: InvocationInner,
}

#[derive(Debug)]
enum InvocationInner {
    Settled(LoadState),
    Running(JoinHandle<LoadState>),
}

impl Invocation {
    pub fn token(&self) -> u64 {
        self.token
    }

    /// Wait for every fetch of this invocation to settle and return its
    /// own final state, whether or not it was superseded.
    pub async fn finished(self) -> Result<LoadState, JoinError> {
        match self.inner {
            InvocationInner::Settled(state) => Ok(state),
            InvocationInner::Running(handle) => handle.await,
        }
    }
}
