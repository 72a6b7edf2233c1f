//! Shared application state, built once at startup and injected into
//! handlers through `axum::extract::State`. The settings cache and the
//! rate limiter are the only mutable state in the process; both live here
//! rather than in module-level statics so their lifecycle is explicit
//! (created at boot, gone on restart).

use std::sync::Arc;

use crate::ratelimit::LoginRateLimiter;
use crate::settings::SettingsCache;
use crate::store::{self, Store};

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub settings: SettingsCache,
    pub limiter: LoginRateLimiter,
}

impl AppState {
    /// Select the storage backend and limiter from the environment.
    pub async fn from_env() -> Arc<Self> {
        let store = store::connect_from_env().await;
        let settings = SettingsCache::new(store.clone());
        let limiter = LoginRateLimiter::from_env().await;
        Arc::new(Self {
            store,
            settings,
            limiter,
        })
    }

    /// State over an explicit store with in-memory rate limiting; the
    /// constructor tests and local tools use.
    pub fn with_store(store: Arc<dyn Store>) -> Arc<Self> {
        let settings = SettingsCache::new(store.clone());
        Arc::new(Self {
            store,
            settings,
            limiter: LoginRateLimiter::in_memory(),
        })
    }
}
