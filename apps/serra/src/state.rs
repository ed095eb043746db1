//! Shared application state handed to handlers, the executor and the
//! scheduler.

use crate::clock::unix_now;
use crate::config::ServerConfig;
use crate::driver::OutletDriver;
use crate::events::EventBus;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serra_core::storage::StateBackend;
use serra_core::{HomeState, Timestamp};
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    home: Arc<Mutex<HomeState>>,
    backend: Arc<dyn StateBackend>,
    pub driver: Arc<OutletDriver>,
    pub events: EventBus,
    pub stale_after_secs: u64,
    pub api_key: Option<Arc<str>>,
    pub rate_limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl AppState {
    /// Assemble state from a loaded home, its backend and the server config.
    pub fn new(
        home: HomeState,
        backend: Arc<dyn StateBackend>,
        driver: OutletDriver,
        config: &ServerConfig,
    ) -> Self {
        let rate_limiter = NonZeroU32::new(config.rate_limit)
            .map(|rate| Arc::new(RateLimiter::direct(Quota::per_second(rate))));
        Self {
            home: Arc::new(Mutex::new(home)),
            backend,
            driver: Arc::new(driver),
            events: EventBus::default(),
            stale_after_secs: config.sensor_stale_seconds,
            api_key: config.api_key.as_deref().map(Arc::from),
            rate_limiter,
        }
    }

    /// Lock the home state.
    pub async fn home(&self) -> MutexGuard<'_, HomeState> {
        self.home.lock().await
    }

    /// Save the state through the backend.
    pub fn persist(&self, home: &HomeState) -> serra_core::Result<()> {
        self.backend.save(home).inspect_err(|e| {
            error!(backend = self.backend.kind(), error = %e, "failed to persist state");
        })
    }

    /// Apply `change` to a copy of the home and install the copy only once
    /// it has been saved. A failed change or save leaves the home untouched.
    pub async fn commit<T>(
        &self,
        change: impl FnOnce(&mut HomeState) -> serra_core::Result<T>,
    ) -> serra_core::Result<T> {
        let mut home = self.home.lock().await;
        let mut draft = home.clone();
        let out = change(&mut draft)?;
        self.persist(&draft)?;
        *home = draft;
        Ok(out)
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Current time.
    pub fn now(&self) -> Timestamp {
        unix_now()
    }
}
