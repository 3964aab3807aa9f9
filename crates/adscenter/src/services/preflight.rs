// Preflight: read-only capability probe before any mutation
//
// Configuration checks always run. Live checks run only when enabled, each
// under its own deadline and all under a total budget; live failures degrade
// to `warn` and never block.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use autoads_core::ads::{is_valid_customer_id, normalize_customer_id};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;
use utoipa::ToSchema;

use crate::ads::{AdsApi, AdsResult, AdsSession};
use crate::config::AdscenterConfig;
use crate::services::mcc::find_manager_link;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    Warn,
    Error,
    Skip,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Check {
    #[schema(value_type = String)]
    pub code: &'static str,
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

impl Check {
    fn new(code: &'static str, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Summary {
    Ready,
    Degraded,
    Blocked,
}

/// Older clients read `{name, ok, message}`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LegacyCheck {
    pub name: String,
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub summary: Summary,
    pub checks: Vec<Check>,
    pub legacy_checks: Vec<LegacyCheck>,
}

impl PreflightReport {
    fn new(checks: Vec<Check>) -> Self {
        let summary = if checks.iter().any(|c| c.severity == Severity::Error) {
            Summary::Blocked
        } else if checks.iter().any(|c| c.severity == Severity::Warn) {
            Summary::Degraded
        } else {
            Summary::Ready
        };
        let legacy_checks = checks
            .iter()
            .map(|c| LegacyCheck {
                name: c.code.to_string(),
                ok: matches!(c.severity, Severity::Ok | Severity::Skip),
                message: c.message.clone(),
            })
            .collect();
        Self {
            summary,
            checks,
            legacy_checks,
        }
    }
}

pub struct PreflightService {
    config: Arc<AdscenterConfig>,
    ads: Arc<dyn AdsApi>,
}

impl PreflightService {
    pub fn new(config: Arc<AdscenterConfig>, ads: Arc<dyn AdsApi>) -> Self {
        Self { config, ads }
    }

    fn config_checks(&self, session: &AdsSession, account_id: Option<&str>) -> Vec<Check> {
        let creds = &self.config.credentials;
        let mut checks = Vec::with_capacity(11);

        checks.push(match &creds.developer_token {
            Some(_) => Check::new("env.developer_token", Severity::Ok, "Developer token configured"),
            None => Check::new("env.developer_token", Severity::Error, "GOOGLE_ADS_DEVELOPER_TOKEN is not set"),
        });

        checks.push(match (&creds.client_id, &creds.client_secret) {
            (Some(_), Some(_)) => Check::new("env.oauth_client", Severity::Ok, "OAuth client configured"),
            _ => Check::new(
                "env.oauth_client",
                Severity::Error,
                "GOOGLE_ADS_OAUTH_CLIENT_ID and GOOGLE_ADS_OAUTH_CLIENT_SECRET are required",
            ),
        });

        checks.push(match &session.login_customer_id {
            Some(id) if is_valid_customer_id(id) => {
                Check::new("env.login_customer_id", Severity::Ok, "Manager account configured")
            }
            Some(_) => Check::new(
                "env.login_customer_id",
                Severity::Error,
                "Login customer id must be 10 digits",
            ),
            None => Check::new(
                "env.login_customer_id",
                Severity::Warn,
                "No manager account; MCC features are unavailable",
            ),
        });

        checks.push(if session.refresh_token.is_empty() {
            Check::new(
                "env.refresh_token",
                Severity::Warn,
                "No refresh token; connect a Google Ads account",
            )
        } else {
            Check::new("env.refresh_token", Severity::Ok, "Refresh token available")
        });

        checks.push(match &creds.test_customer_id {
            None => Check::new("env.test_customer_id", Severity::Skip, "No test account configured"),
            Some(id) if is_valid_customer_id(id) => {
                Check::new("env.test_customer_id", Severity::Ok, "Test account configured")
            }
            Some(_) => Check::new(
                "env.test_customer_id",
                Severity::Warn,
                "Test customer id must be 10 digits",
            ),
        });

        checks.push(match account_id.map(str::trim).filter(|a| !a.is_empty()) {
            None => Check::new("request.account_id", Severity::Warn, "No accountId given"),
            Some(raw) => match normalize_customer_id(raw) {
                Some(id) => Check::new("request.account_id", Severity::Ok, "accountId is well-formed")
                    .with_details(json!({ "accountId": id })),
                None => Check::new(
                    "request.account_id",
                    Severity::Error,
                    "accountId must be a 10-digit customer id",
                )
                .with_details(json!({ "accountId": raw })),
            },
        });

        checks
    }

    fn live_enabled(&self, session: &AdsSession) -> bool {
        self.config.precheck_live
            && self.ads.is_live()
            && self.config.credentials.is_complete()
            && !session.refresh_token.is_empty()
    }

    pub async fn run(&self, session: &AdsSession, account_id: Option<&str>) -> PreflightReport {
        let mut checks = self.config_checks(session, account_id);
        let account = account_id.and_then(normalize_customer_id);

        if self.live_enabled(session) {
            checks.extend(self.live_checks(session, account.as_deref()).await);
        } else {
            for code in ["ads.accessible_customers", "ads.mcc_link", "ads.conversion_tracking", "ads.budget"] {
                checks.push(Check::new(code, Severity::Skip, "Live checks disabled"));
            }
        }

        checks.push(Check::new(
            "ads.validate_only_probe",
            Severity::Skip,
            "Reserved",
        ));
        PreflightReport::new(checks)
    }

    async fn live_checks(&self, session: &AdsSession, account: Option<&str>) -> Vec<Check> {
        let deadline = Instant::now() + self.config.precheck_total_timeout;
        let per_check = self.config.precheck_timeout;
        let ads = self.ads.as_ref();
        let mut checks = Vec::with_capacity(4);

        checks.push(
            match bounded(deadline, per_check, ads.list_accessible_customers(session)).await {
                Ok(customers) => {
                    let reachable = account.map(|a| customers.iter().any(|c| c.ends_with(&format!("/{}", a))));
                    let details = json!({ "count": customers.len(), "containsAccount": reachable });
                    let check = match reachable {
                        Some(false) => Check::new(
                            "ads.accessible_customers",
                            Severity::Warn,
                            "accountId is not directly accessible with this token",
                        ),
                        _ => Check::new(
                            "ads.accessible_customers",
                            Severity::Ok,
                            format!("{} accessible customers", customers.len()),
                        ),
                    };
                    check.with_details(details)
                }
                Err(message) => Check::new("ads.accessible_customers", Severity::Warn, message),
            },
        );

        let Some(account) = account else {
            for code in ["ads.mcc_link", "ads.conversion_tracking", "ads.budget"] {
                checks.push(Check::new(code, Severity::Skip, "No valid accountId"));
            }
            return checks;
        };

        checks.push(match &self.config.credentials.login_customer_id {
            None => Check::new("ads.mcc_link", Severity::Skip, "No manager account configured"),
            Some(manager) => {
                match bounded(deadline, per_check, find_manager_link(ads, session, account, manager)).await {
                    Ok(Some(link)) if link.status == "ACTIVE" => {
                        Check::new("ads.mcc_link", Severity::Ok, "Linked to the platform MCC")
                    }
                    Ok(Some(link)) => Check::new(
                        "ads.mcc_link",
                        Severity::Warn,
                        format!("MCC link is {}", link.status),
                    )
                    .with_details(json!({ "status": link.status })),
                    Ok(None) => Check::new("ads.mcc_link", Severity::Warn, "Not linked to the platform MCC"),
                    Err(message) => Check::new("ads.mcc_link", Severity::Warn, message),
                }
            }
        });

        checks.push(
            match bounded(deadline, per_check, ads.has_active_conversion_tracking(session, account)).await {
                Ok(true) => Check::new("ads.conversion_tracking", Severity::Ok, "Conversion tracking active"),
                Ok(false) => Check::new(
                    "ads.conversion_tracking",
                    Severity::Warn,
                    "No enabled conversion action",
                ),
                Err(message) => Check::new("ads.conversion_tracking", Severity::Warn, message),
            },
        );

        checks.push(
            match bounded(deadline, per_check, ads.has_sufficient_budget(session, account)).await {
                Ok(true) => Check::new("ads.budget", Severity::Ok, "Enabled budget found"),
                Ok(false) => Check::new("ads.budget", Severity::Warn, "No enabled budget above zero"),
                Err(message) => Check::new("ads.budget", Severity::Warn, message),
            },
        );

        checks
    }
}

/// Run `fut` under the per-check timeout and the shared deadline.
/// Errors come back as the check message.
async fn bounded<T>(
    deadline: Instant,
    per_check: Duration,
    fut: impl Future<Output = AdsResult<T>>,
) -> Result<T, String> {
    let now = Instant::now();
    if now >= deadline {
        return Err("Skipped: preflight time budget exhausted".to_string());
    }
    let limit = per_check.min(deadline - now);
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("Google Ads call failed: {}", e)),
        Err(_) => Err(format!("Timed out after {}ms", limit.as_millis())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ads::StubAdsClient;
    use crate::config::AdsCredentials;
    use async_trait::async_trait;

    struct SlowAds {
        customers: Vec<String>,
        delay: Duration,
    }

    #[async_trait]
    impl AdsApi for SlowAds {
        fn is_live(&self) -> bool {
            true
        }

        async fn list_accessible_customers(&self, _: &AdsSession) -> AdsResult<Vec<String>> {
            tokio::time::sleep(self.delay).await;
            Ok(self.customers.clone())
        }

        async fn search_stream(&self, _: &AdsSession, _: &str, query: &str) -> AdsResult<Vec<Value>> {
            tokio::time::sleep(self.delay).await;
            if query.contains("customer_manager_link") {
                return Ok(vec![json!({ "customerManagerLink": {
                    "resourceName": "customers/1234567890/customerManagerLinks/1112223333~1",
                    "managerCustomer": "customers/1112223333",
                    "status": "ACTIVE"
                }})]);
            }
            Ok(vec![json!({})])
        }

        async fn mutate(&self, _: &AdsSession, _: &str, _: &[Value], _: bool) -> AdsResult<Value> {
            Ok(Value::Null)
        }

        async fn mutate_manager_links(&self, _: &AdsSession, _: &str, _: &[Value]) -> AdsResult<Value> {
            Ok(Value::Null)
        }
    }

    fn complete_config(live: bool) -> Arc<AdscenterConfig> {
        Arc::new(AdscenterConfig {
            credentials: AdsCredentials {
                developer_token: Some("dev".into()),
                client_id: Some("cid".into()),
                client_secret: Some("secret".into()),
                login_customer_id: Some("1112223333".into()),
                ..Default::default()
            },
            precheck_live: live,
            ..Default::default()
        })
    }

    fn session() -> AdsSession {
        AdsSession {
            refresh_token: "1//r".into(),
            login_customer_id: Some("1112223333".into()),
            rate: None,
        }
    }

    fn severity(report: &PreflightReport, code: &str) -> Severity {
        report
            .checks
            .iter()
            .find(|c| c.code == code)
            .map(|c| c.severity)
            .unwrap_or_else(|| panic!("missing check {}", code))
    }

    #[tokio::test]
    async fn test_missing_credentials_block() {
        let preflight = PreflightService::new(Arc::new(AdscenterConfig::default()), Arc::new(StubAdsClient::new()));
        let report = preflight.run(&AdsSession::default(), Some("1234567890")).await;

        assert_eq!(report.summary, Summary::Blocked);
        assert_eq!(severity(&report, "env.developer_token"), Severity::Error);
        assert_eq!(severity(&report, "env.refresh_token"), Severity::Warn);
        assert_eq!(severity(&report, "ads.accessible_customers"), Severity::Skip);
        assert_eq!(severity(&report, "ads.validate_only_probe"), Severity::Skip);
        assert_eq!(report.checks.len(), 11);
        assert_eq!(report.legacy_checks.len(), 11);
        assert!(!report.legacy_checks[0].ok);
    }

    #[tokio::test]
    async fn test_bad_account_id_blocks() {
        let preflight = PreflightService::new(complete_config(false), Arc::new(StubAdsClient::new()));
        let report = preflight.run(&session(), Some("12345")).await;
        assert_eq!(severity(&report, "request.account_id"), Severity::Error);
        assert_eq!(report.summary, Summary::Blocked);
    }

    #[tokio::test]
    async fn test_ready_with_live_checks() {
        let ads = Arc::new(SlowAds {
            customers: vec!["customers/1234567890".into()],
            delay: Duration::from_millis(10),
        });
        let preflight = PreflightService::new(complete_config(true), ads);
        let report = preflight.run(&session(), Some("123-456-7890")).await;

        assert_eq!(severity(&report, "ads.accessible_customers"), Severity::Ok);
        assert_eq!(severity(&report, "ads.mcc_link"), Severity::Ok);
        assert_eq!(severity(&report, "ads.budget"), Severity::Ok);
        // Only the unset test account is skipped, nothing warns
        assert_eq!(report.summary, Summary::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_live_checks_soft_fail() {
        let ads = Arc::new(SlowAds {
            customers: vec!["customers/1234567890".into()],
            delay: Duration::from_secs(5),
        });
        let preflight = PreflightService::new(complete_config(true), ads);
        let report = preflight.run(&session(), Some("1234567890")).await;

        assert_eq!(severity(&report, "ads.accessible_customers"), Severity::Warn);
        assert_eq!(severity(&report, "ads.budget"), Severity::Warn);
        assert_eq!(report.summary, Summary::Degraded);
        let budget = report.checks.iter().find(|c| c.code == "ads.budget").unwrap();
        assert!(budget.message.contains("budget exhausted"));
    }
}
