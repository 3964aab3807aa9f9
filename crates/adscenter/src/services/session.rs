// Ads session resolution
//
// A session acts with the user's own refresh token when they connected an
// account, else with the platform token. The manager account follows the
// same order.

use std::sync::Arc;

use autoads_core::ratelimit::ActionKind;
use autoads_storage::RefreshTokenVault;

use crate::ads::AdsSession;
use crate::config::AdsCredentials;
use crate::error::ServiceResult;
use crate::services::LimitsService;

pub struct SessionResolver {
    vault: RefreshTokenVault,
    credentials: AdsCredentials,
    limits: Arc<LimitsService>,
}

impl SessionResolver {
    pub fn new(vault: RefreshTokenVault, credentials: AdsCredentials, limits: Arc<LimitsService>) -> Self {
        Self {
            vault,
            credentials,
            limits,
        }
    }

    pub fn vault(&self) -> &RefreshTokenVault {
        &self.vault
    }

    /// Admit the request for `action`, then build the session
    pub async fn for_user(&self, user_id: &str, action: ActionKind) -> ServiceResult<AdsSession> {
        let rate = self.limits.admit(user_id, action).await?;
        let connection = self.vault.load(user_id).await?;

        let (refresh_token, login_customer_id) = match connection {
            Some(c) if !c.refresh_token.is_empty() => (
                c.refresh_token,
                c.login_customer_id
                    .or_else(|| self.credentials.login_customer_id.clone()),
            ),
            _ => (
                self.credentials.refresh_token.clone().unwrap_or_default(),
                self.credentials.login_customer_id.clone(),
            ),
        };

        Ok(AdsSession {
            refresh_token,
            login_customer_id,
            rate: None,
        }
        .with_rate(rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use autoads_core::memory::InMemoryStore;
    use autoads_core::ratelimit::RateSpec;
    use autoads_core::{PlanResolver, StoreResult};
    use autoads_storage::TokenCipher;

    struct Free;

    #[async_trait]
    impl PlanResolver for Free {
        async fn plan_for(&self, _user_id: &str) -> StoreResult<Option<String>> {
            Ok(None)
        }
    }

    fn resolver(store: Arc<InMemoryStore>) -> SessionResolver {
        let limits = Arc::new(LimitsService::new(
            RateSpec {
                rpm: 60,
                concurrency: 4,
            },
            Arc::new(Free),
            None,
            None,
            None,
        ));
        let credentials = AdsCredentials {
            refresh_token: Some("1//platform".into()),
            login_customer_id: Some("1112223333".into()),
            ..Default::default()
        };
        SessionResolver::new(
            RefreshTokenVault::new(store, Arc::new(TokenCipher::plaintext())),
            credentials,
            limits,
        )
    }

    #[tokio::test]
    async fn test_user_connection_wins() {
        let resolver = resolver(Arc::new(InMemoryStore::new()));
        resolver
            .vault()
            .save("u1", Some("4445556666".into()), None, "1//user")
            .await
            .unwrap();

        let session = resolver.for_user("u1", ActionKind::Mutate).await.unwrap();
        assert_eq!(session.refresh_token, "1//user");
        assert_eq!(session.login_customer_id.as_deref(), Some("4445556666"));
        assert_eq!(session.rate.unwrap().key, "u1:mutate");
    }

    #[tokio::test]
    async fn test_platform_token_fallback() {
        let resolver = resolver(Arc::new(InMemoryStore::new()));
        let session = resolver.for_user("u2", ActionKind::Preflight).await.unwrap();
        assert_eq!(session.refresh_token, "1//platform");
        assert_eq!(session.login_customer_id.as_deref(), Some("1112223333"));
    }
}
