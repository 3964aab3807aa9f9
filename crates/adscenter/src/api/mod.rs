// HTTP API routes
//
// Every route lives under /api/v1/adscenter and shares one AppState.
// Handlers resolve the caller, ask the services, and render ApiError on failure.

pub mod accounts;
pub mod bulk_actions;
pub mod mcc;
pub mod oauth;

use std::sync::Arc;

use autoads_core::IdempotencyStore;
use autoads_server::AuthConfig;
use axum::{extract::FromRef, http::HeaderMap, Router};

use crate::config::AdscenterConfig;
use crate::services::{
    Executor, LimitsService, MccService, OAuthService, PreflightService, SessionResolver,
};
use crate::ads::AdsApi;

pub const API_BASE: &str = "/api/v1/adscenter";

#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthConfig>,
    pub config: Arc<AdscenterConfig>,
    pub ads: Arc<dyn AdsApi>,
    pub sessions: Arc<SessionResolver>,
    pub limits: Arc<LimitsService>,
    pub oauth: Arc<OAuthService>,
    pub mcc: Arc<MccService>,
    pub preflight: Arc<PreflightService>,
    pub executor: Arc<Executor>,
    pub idempotency: Arc<dyn IdempotencyStore>,
}

impl FromRef<AppState> for Arc<AuthConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Create all Adscenter routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .nest(
            API_BASE,
            Router::new()
                .merge(accounts::routes())
                .merge(oauth::routes())
                .merge(mcc::routes())
                .merge(bulk_actions::routes()),
        )
        .with_state(state)
}

/// `Host` header, used to pick the OAuth redirect
pub(crate) fn request_host(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::HOST)
        .and_then(|v| v.to_str().ok())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use autoads_core::memory::{InMemoryBus, InMemoryStore};
    use autoads_core::ratelimit::RateSpec;
    use autoads_core::EventRecorder;
    use autoads_storage::{RefreshTokenVault, TokenCipher};

    use crate::ads::StubAdsClient;

    pub struct Harness {
        pub state: AppState,
        pub store: Arc<InMemoryStore>,
        pub bus: Arc<InMemoryBus>,
        pub ads: Arc<StubAdsClient>,
    }

    /// Stub-backed state; callers authenticate with `X-User-Id`
    pub fn harness(config: AdscenterConfig) -> Harness {
        let store = Arc::new(InMemoryStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let ads = Arc::new(StubAdsClient::new());
        let config = Arc::new(config);
        let vault = RefreshTokenVault::new(store.clone(), Arc::new(TokenCipher::plaintext()));
        let limits = Arc::new(LimitsService::new(
            RateSpec {
                rpm: 600,
                concurrency: 4,
            },
            store.clone(),
            None,
            None,
            None,
        ));
        let recorder = EventRecorder::new(store.clone(), bus.clone());
        let state = AppState {
            auth: Arc::new(AuthConfig::default()),
            config: config.clone(),
            ads: ads.clone(),
            sessions: Arc::new(SessionResolver::new(
                vault.clone(),
                config.credentials.clone(),
                limits.clone(),
            )),
            limits,
            oauth: Arc::new(OAuthService::new(config.clone(), None, vault)),
            mcc: Arc::new(MccService::new(config.clone(), ads.clone())),
            preflight: Arc::new(PreflightService::new(config.clone(), ads.clone())),
            executor: Arc::new(Executor::new(ads.clone(), store.clone(), recorder, config.live_mutate)),
            idempotency: store.clone(),
        };
        Harness {
            state,
            store,
            bus,
            ads,
        }
    }
}
