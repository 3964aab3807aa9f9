// Brand-risk engine
//
// check() classifies keywords inline. Offline audits are accepted after
// validation and run detached: keywords come from the request or the
// warehouse, get filtered to one shard, and the verdicts are persisted.

use std::sync::Arc;

use autoads_core::brand::{self, in_shard, second_level_label, seed_host, Coverage, CoverageResult, KeywordRisk};
use autoads_core::task::catch_panic;
use autoads_core::{BrandStore, KeywordWarehouse};
use chrono::Utc;
use tracing::instrument;

use super::AliasService;
use crate::error::{ServiceError, ServiceResult};

/// Keywords pulled from the warehouse per audit
pub const WAREHOUSE_LIMIT: usize = 5000;

/// Account id used when a coverage audit names no account
pub const ALL_ACCOUNTS: &str = "all";

/// One offline audit or coverage audit
#[derive(Debug, Clone, Default)]
pub struct AuditJob {
    pub seed_domain: String,
    pub keywords: Vec<String>,
    pub account_id: Option<String>,
    pub landing_url: Option<String>,
    pub shard: Option<u32>,
    pub total_shards: Option<u32>,
}

impl AuditJob {
    fn account(&self) -> &str {
        self.account_id
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(ALL_ACCOUNTS)
    }
}

#[derive(Debug, Clone)]
pub struct BrandCheck {
    pub seed_domain: String,
    pub aliases: Vec<String>,
    pub items: Vec<KeywordRisk>,
}

#[derive(Debug, Clone)]
pub struct PlannedCoverage {
    pub seed_domain: String,
    pub aliases: Vec<String>,
    pub coverage: Coverage,
}

pub struct BrandEngine {
    aliases: AliasService,
    brands: Arc<dyn BrandStore>,
    warehouse: Option<Arc<dyn KeywordWarehouse>>,
}

fn clean(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

fn validate_seed(seed_domain: &str) -> ServiceResult<String> {
    let seed = seed_host(seed_domain);
    if second_level_label(&seed).is_none() {
        return Err(ServiceError::InvalidArgument("seedDomain is required".into()));
    }
    Ok(seed)
}

impl BrandEngine {
    pub fn new(
        aliases: AliasService,
        brands: Arc<dyn BrandStore>,
        warehouse: Option<Arc<dyn KeywordWarehouse>>,
    ) -> Self {
        Self {
            aliases,
            brands,
            warehouse,
        }
    }

    pub fn warehouse_enabled(&self) -> bool {
        self.warehouse.is_some()
    }

    /// Classify `keywords` against the seed's aliases
    pub async fn check(
        &self,
        seed_domain: &str,
        keywords: &[String],
        landing_url: Option<&str>,
    ) -> ServiceResult<BrandCheck> {
        let seed = validate_seed(seed_domain)?;
        let keywords = clean(keywords);
        if keywords.is_empty() {
            return Err(ServiceError::InvalidArgument("keywords must not be empty".into()));
        }
        let aliases = self.aliases.aliases_for(&seed, landing_url).await?;
        let items = keywords.iter().map(|k| brand::match_brand(k, &aliases)).collect();
        Ok(BrandCheck {
            seed_domain: seed,
            aliases,
            items,
        })
    }

    fn validate_job(&self, job: &AuditJob) -> ServiceResult<()> {
        validate_seed(&job.seed_domain)?;
        if let (Some(shard), Some(total)) = (job.shard, job.total_shards) {
            if total > 1 && shard >= total {
                return Err(ServiceError::InvalidArgument(format!(
                    "shard must be below totalShards ({} >= {})",
                    shard, total
                )));
            }
        }
        if clean(&job.keywords).is_empty() && self.warehouse.is_none() {
            return Err(ServiceError::InvalidArgument(
                "keywords are required when the keyword warehouse is disabled".into(),
            ));
        }
        Ok(())
    }

    /// Explicit keywords, or the warehouse's recent ones, filtered to the job's shard
    async fn keywords_for(&self, job: &AuditJob) -> ServiceResult<Vec<String>> {
        let mut keywords = clean(&job.keywords);
        if keywords.is_empty() {
            if let Some(warehouse) = &self.warehouse {
                keywords = clean(
                    &warehouse
                        .recent_keywords(job.account_id.as_deref(), WAREHOUSE_LIMIT)
                        .await?,
                );
            }
        }
        let shard = job.shard.unwrap_or(0);
        let total = job.total_shards.unwrap_or(1);
        keywords.retain(|k| in_shard(k, shard, total));
        Ok(keywords)
    }

    /// Validate and start an audit in the background
    pub fn start_audit(self: &Arc<Self>, job: AuditJob) -> ServiceResult<()> {
        self.validate_job(&job)?;
        let this = self.clone();
        tokio::spawn(async move {
            let seed = job.seed_domain.clone();
            let outcome = catch_panic(async { this.run_audit(&job).await.map_err(anyhow::Error::from) }).await;
            if let Err(e) = outcome {
                tracing::error!(seed_domain = %seed, "Brand audit failed: {}", e);
            }
        });
        Ok(())
    }

    /// Classify the job's keywords and persist one result row each
    #[instrument(skip(self, job), fields(seed_domain = %job.seed_domain))]
    pub async fn run_audit(&self, job: &AuditJob) -> ServiceResult<u64> {
        let seed = validate_seed(&job.seed_domain)?;
        let aliases = self.aliases.aliases_for(&seed, job.landing_url.as_deref()).await?;
        let keywords = self.keywords_for(job).await?;
        let results: Vec<KeywordRisk> = keywords.iter().map(|k| brand::match_brand(k, &aliases)).collect();
        let written = self.brands.insert_results(&seed, &results).await?;
        tracing::info!(
            keywords = keywords.len(),
            flagged = results.iter().filter(|r| r.contains_brand).count(),
            written,
            "Brand audit finished"
        );
        Ok(written)
    }

    /// Validate and start a coverage audit in the background
    pub fn start_coverage_audit(self: &Arc<Self>, job: AuditJob) -> ServiceResult<()> {
        self.validate_job(&job)?;
        let this = self.clone();
        tokio::spawn(async move {
            let seed = job.seed_domain.clone();
            let outcome =
                catch_panic(async { this.run_coverage_audit(&job).await.map_err(anyhow::Error::from) }).await;
            if let Err(e) = outcome {
                tracing::error!(seed_domain = %seed, "Brand coverage audit failed: {}", e);
            }
        });
        Ok(())
    }

    #[instrument(skip(self, job), fields(seed_domain = %job.seed_domain))]
    pub async fn run_coverage_audit(&self, job: &AuditJob) -> ServiceResult<CoverageResult> {
        let seed = validate_seed(&job.seed_domain)?;
        let aliases = self.aliases.aliases_for(&seed, job.landing_url.as_deref()).await?;
        let keywords = self.keywords_for(job).await?;
        let result = CoverageResult {
            seed_domain: seed,
            account_id: job.account().to_string(),
            coverage: brand::coverage(&keywords, &aliases),
            updated_at: Utc::now(),
        };
        self.brands.upsert_coverage(&result).await?;
        tracing::info!(
            account_id = %result.account_id,
            ratio = result.coverage.coverage_ratio,
            "Brand coverage stored"
        );
        Ok(result)
    }

    pub async fn get_coverage(&self, seed_domain: &str, account_id: Option<&str>) -> ServiceResult<CoverageResult> {
        let seed = validate_seed(seed_domain)?;
        let account = account_id
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(ALL_ACCOUNTS);
        self.brands
            .get_coverage(&seed, account)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No coverage for {} / {}", seed, account)))
    }

    /// Coverage of a planned keyword set; nothing is stored
    pub async fn planned_coverage(
        &self,
        seed_domain: &str,
        keywords: &[String],
        landing_url: Option<&str>,
    ) -> ServiceResult<PlannedCoverage> {
        let seed = validate_seed(seed_domain)?;
        let aliases = self.aliases.aliases_for(&seed, landing_url).await?;
        let coverage = brand::coverage(&clean(keywords), &aliases);
        Ok(PlannedCoverage {
            seed_domain: seed,
            aliases,
            coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use autoads_core::brand::RiskSeverity;
    use autoads_core::memory::{InMemoryStore, StaticWarehouse};

    use crate::signals::SignalFetcher;

    fn engine(store: Arc<InMemoryStore>, warehouse: Option<Arc<dyn KeywordWarehouse>>) -> BrandEngine {
        let aliases = AliasService::new(
            store.clone(),
            SignalFetcher::new(Duration::from_millis(200), 1024),
            Duration::from_secs(3600),
        );
        BrandEngine::new(aliases, store, warehouse)
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_check_classifies_keywords() {
        let engine = engine(Arc::new(InMemoryStore::new()), None);
        let check = engine
            .check("example.com", &words(&["buy example cheap", "exmple review", "shoes"]), None)
            .await
            .unwrap();
        let severities: Vec<RiskSeverity> = check.items.iter().map(|i| i.severity).collect();
        assert_eq!(severities, vec![RiskSeverity::Error, RiskSeverity::Warn, RiskSeverity::None]);
        assert_eq!(check.items[0].matched_alias.as_deref(), Some("example"));
    }

    #[tokio::test]
    async fn test_audit_requires_keywords_without_warehouse() {
        let engine = Arc::new(engine(Arc::new(InMemoryStore::new()), None));
        let job = AuditJob {
            seed_domain: "example.com".into(),
            ..Default::default()
        };
        assert!(matches!(engine.start_audit(job), Err(ServiceError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_shard_out_of_range_is_rejected() {
        let engine = Arc::new(engine(Arc::new(InMemoryStore::new()), None));
        let job = AuditJob {
            seed_domain: "example.com".into(),
            keywords: words(&["example"]),
            shard: Some(4),
            total_shards: Some(4),
            ..Default::default()
        };
        assert!(matches!(engine.start_audit(job), Err(ServiceError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_audit_persists_only_the_shard() {
        let store = Arc::new(InMemoryStore::new());
        let keywords = words(&["example shoes", "example boots", "red socks", "exmple", "hats", "gloves"]);
        let warehouse: Arc<dyn KeywordWarehouse> = Arc::new(StaticWarehouse::new(keywords.clone()));
        let engine = engine(store.clone(), Some(warehouse));

        let mut total = 0;
        for shard in 0..3 {
            let job = AuditJob {
                seed_domain: "example.com".into(),
                shard: Some(shard),
                total_shards: Some(3),
                ..Default::default()
            };
            let expected = keywords.iter().filter(|k| in_shard(k, shard, 3)).count() as u64;
            assert_eq!(engine.run_audit(&job).await.unwrap(), expected);
            total += expected;
        }
        assert_eq!(total, keywords.len() as u64);
        assert_eq!(store.keyword_results("example.com").len(), keywords.len());
    }

    #[tokio::test]
    async fn test_coverage_audit_and_lookup() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(store, None);
        let job = AuditJob {
            seed_domain: "https://example.com".into(),
            keywords: words(&["example shoes", "red socks"]),
            account_id: Some("123-456-7890".into()),
            ..Default::default()
        };
        engine.run_coverage_audit(&job).await.unwrap();

        let stored = engine.get_coverage("example.com", Some("123-456-7890")).await.unwrap();
        assert_eq!(stored.coverage.total_keywords, 2);
        assert_eq!(stored.coverage.brand_keywords, 1);
        assert_eq!(stored.coverage.missing_aliases, vec!["exmpl"]);
        assert!(matches!(
            engine.get_coverage("example.com", None).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_planned_coverage_is_not_stored() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine(store.clone(), None);
        let planned = engine
            .planned_coverage("example.com", &words(&["example", "exmpl outlet"]), None)
            .await
            .unwrap();
        assert_eq!(planned.coverage.coverage_ratio, 1.0);
        assert!(planned.coverage.missing_aliases.is_empty());
        assert!(store.get_coverage("example.com", ALL_ACCOUNTS).await.unwrap().is_none());
    }
}
