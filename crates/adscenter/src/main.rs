// Adscenter API server
// Decision: Live vs stub Ads client is chosen at startup from flags and credentials, never per request

use std::sync::Arc;

use anyhow::{Context, Result};
use autoads_adscenter::ads::{AdsApi, LiveAdsClient, OAuthClient, StubAdsClient, ThrottledAds};
use autoads_adscenter::api::{self, AppState};
use autoads_adscenter::config::AdscenterConfig;
use autoads_adscenter::openapi::ApiDoc;
use autoads_adscenter::services::{
    BrowserResolver, Executor, LimitsService, MccService, OAuthService, PreflightService,
    SessionResolver,
};
use autoads_cloud::{publisher_from_env, secrets_from_env};
use autoads_core::EventRecorder;
use autoads_server::{build_app, init_service, ops_state, serve, shutdown_token, AuthConfig, ServerConfig};
use autoads_storage::{RefreshTokenVault, Stores, TokenCipher};
use utoipa::OpenApi;

#[tokio::main]
async fn main() -> Result<()> {
    // Telemetry via OTEL_* and RUST_LOG; see autoads_core::telemetry
    let _telemetry = init_service("adscenter");

    let server_config = ServerConfig::from_env();
    let secrets = secrets_from_env();
    let config = Arc::new(
        AdscenterConfig::load(secrets.as_deref())
            .await
            .context("Failed to load adscenter configuration")?,
    );
    tracing::info!(
        precheck_live = config.precheck_live,
        mcc_live = config.mcc_live,
        live_mutate = config.live_mutate,
        "Adscenter configuration loaded"
    );

    let database_url = std::env::var("DATABASE_URL").ok();
    let stores = Stores::connect(database_url.as_deref(), server_config.run_migrations).await?;
    let recorder = EventRecorder::new(stores.events.clone(), publisher_from_env());

    let cipher = Arc::new(
        TokenCipher::from_env().context("Invalid REFRESH_TOKEN_ENC_KEY_B64 / REFRESH_TOKEN_ENC_KEY_B64_OLD")?,
    );
    if cipher.is_plaintext() {
        tracing::warn!("No refresh token encryption key configured, tokens are stored in plaintext");
    }
    let vault = RefreshTokenVault::new(stores.connections.clone(), cipher);

    let limits = Arc::new(LimitsService::new(
        config.rate,
        stores.plans.clone(),
        config.limits_secret.clone(),
        secrets.clone(),
        config.limits_json.as_deref(),
    ));

    let creds = &config.credentials;
    let oauth_client = match (&creds.client_id, &creds.client_secret) {
        (Some(id), Some(secret)) => Some(Arc::new(OAuthClient::new(&config.token_url, id, secret))),
        _ => None,
    };

    let inner: Arc<dyn AdsApi> = match (&oauth_client, &creds.developer_token) {
        (Some(oauth), Some(token)) if config.wants_live_client() => {
            tracing::info!(base_url = %config.ads_base_url, "Using live Google Ads client");
            Arc::new(LiveAdsClient::new(&config.ads_base_url, token, oauth.clone()))
        }
        _ => {
            tracing::info!("Using stub Google Ads client");
            Arc::new(StubAdsClient::new())
        }
    };
    let ads: Arc<dyn AdsApi> = Arc::new(ThrottledAds::new(
        inner,
        limits.global_spec().await,
        config.retry.clone(),
    ));

    let mut executor = Executor::new(ads.clone(), stores.bulk.clone(), recorder, config.live_mutate);
    if let Some(url) = &config.browser_exec_url {
        executor = executor.with_browser(Arc::new(BrowserResolver::new(url, config.browser_token.clone())));
    }

    let state = AppState {
        auth: Arc::new(AuthConfig::from_env()),
        config: config.clone(),
        ads: ads.clone(),
        sessions: Arc::new(SessionResolver::new(vault.clone(), creds.clone(), limits.clone())),
        limits,
        oauth: Arc::new(OAuthService::new(config.clone(), oauth_client, vault)),
        mcc: Arc::new(MccService::new(config.clone(), ads.clone())),
        preflight: Arc::new(PreflightService::new(config.clone(), ads)),
        executor: Arc::new(executor),
        idempotency: stores.idempotency.clone(),
    };

    let ops = ops_state("adscenter", Some(stores.readiness.clone()))?;
    let app = build_app(ops, api::routes(state), &server_config, Some(ApiDoc::openapi()));

    serve(app, server_config.port, shutdown_token()).await
}
