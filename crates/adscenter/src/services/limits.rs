// Per-user rate admission
//
// The limits policy comes from a secret (re-read through the secret cache) or
// from inline JSON. Plans come from the subscription table; a missing plan
// is the free plan.

use std::collections::BTreeMap;
use std::sync::Arc;

use autoads_cloud::SecretCache;
use autoads_core::ratelimit::{ActionKind, DailyQuota, LimitsPolicy, RateSpec, RequestRate, FREE_PLAN};
use autoads_core::PlanResolver;
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::ServiceResult;

enum PolicySource {
    Secret {
        name: String,
        secrets: Arc<SecretCache>,
    },
    Static(LimitsPolicy),
}

/// Effective limits of the calling user
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LimitsView {
    pub plan: String,
    #[schema(value_type = Object)]
    pub actions: BTreeMap<String, RateSpec>,
    #[schema(value_type = Object)]
    pub global: RateSpec,
    pub daily_quota: Option<u64>,
    pub used_today: u64,
}

pub struct LimitsService {
    base: RateSpec,
    source: PolicySource,
    plans: Arc<dyn PlanResolver>,
    quota: DailyQuota,
}

impl LimitsService {
    /// Policy from `ADSCENTER_LIMITS_SECRET` when a secret cache is available,
    /// else from `ADSCENTER_LIMITS_JSON`, else defaults only.
    pub fn new(
        base: RateSpec,
        plans: Arc<dyn PlanResolver>,
        secret_name: Option<String>,
        secrets: Option<Arc<SecretCache>>,
        inline_json: Option<&str>,
    ) -> Self {
        let source = match (secret_name, secrets) {
            (Some(name), Some(secrets)) => PolicySource::Secret { name, secrets },
            (name, _) => {
                if name.is_some() {
                    tracing::warn!("ADSCENTER_LIMITS_SECRET set but Secret Manager is unavailable");
                }
                let policy = inline_json
                    .map(|raw| {
                        LimitsPolicy::from_json(raw).unwrap_or_else(|e| {
                            tracing::warn!("Invalid ADSCENTER_LIMITS_JSON, using defaults: {}", e);
                            LimitsPolicy::default()
                        })
                    })
                    .unwrap_or_default();
                PolicySource::Static(policy)
            }
        };
        Self {
            base,
            source,
            plans,
            quota: DailyQuota::new(),
        }
    }

    pub async fn policy(&self) -> LimitsPolicy {
        match &self.source {
            PolicySource::Static(policy) => policy.clone(),
            PolicySource::Secret { name, secrets } => match secrets.get(name).await {
                Ok(raw) => LimitsPolicy::from_json(&raw).unwrap_or_else(|e| {
                    tracing::warn!(secret = %name, "Invalid limits policy, using defaults: {}", e);
                    LimitsPolicy::default()
                }),
                Err(e) => {
                    tracing::warn!(secret = %name, "Failed to read limits policy: {}", e);
                    LimitsPolicy::default()
                }
            },
        }
    }

    pub async fn plan_for(&self, user_id: &str) -> String {
        match self.plans.plan_for(user_id).await {
            Ok(Some(plan)) if !plan.trim().is_empty() => plan,
            Ok(_) => FREE_PLAN.to_string(),
            Err(e) => {
                tracing::warn!(user_id, "Plan lookup failed, assuming free plan: {}", e);
                FREE_PLAN.to_string()
            }
        }
    }

    /// Process-wide cap for the throttled client
    pub async fn global_spec(&self) -> RateSpec {
        self.policy().await.global(self.base)
    }

    /// Count the request against the daily quota and return the caller's rate
    pub async fn admit(&self, user_id: &str, action: ActionKind) -> ServiceResult<RequestRate> {
        let policy = self.policy().await;
        let plan = self.plan_for(user_id).await;
        self.quota
            .try_consume(user_id, policy.daily_quota(&plan))?;
        Ok(RequestRate {
            key: format!("{}:{}", user_id, action),
            spec: policy.resolve(&plan, action, self.base),
        })
    }

    pub async fn me(&self, user_id: &str) -> LimitsView {
        let policy = self.policy().await;
        let plan = self.plan_for(user_id).await;
        let actions = [
            ActionKind::Preflight,
            ActionKind::Mutate,
            ActionKind::Diagnose,
            ActionKind::Mcc,
        ]
        .into_iter()
        .map(|kind| (kind.to_string(), policy.resolve(&plan, kind, self.base)))
        .collect();
        LimitsView {
            daily_quota: policy.daily_quota(&plan),
            global: policy.global(self.base),
            used_today: self.quota.usage(user_id),
            actions,
            plan,
        }
    }
}
