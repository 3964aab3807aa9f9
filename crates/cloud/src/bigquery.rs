// BigQuery keyword warehouse
//
// Pulls distinct keywords seen in the last 30 days through jobs.query.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoads_core::{KeywordWarehouse, UpstreamError};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::{check_status, CloudError};
use crate::token::TokenProvider;

pub const DEFAULT_BIGQUERY_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";
pub const MAX_KEYWORDS: usize = 5000;
const LOOKBACK_DAYS: u32 = 30;

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub project: String,
    pub dataset: String,
    pub table: String,
    pub keyword_column: String,
    pub date_field: String,
    pub account_column: String,
}

impl WarehouseConfig {
    /// Enabled by `BQ_ENABLED=true`; requires `BQ_PROJECT_ID` (or `GOOGLE_CLOUD_PROJECT`),
    /// `BQ_DATASET` and `BQ_TABLE`
    pub fn from_env() -> Option<Self> {
        let enabled = std::env::var("BQ_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(false);
        if !enabled {
            return None;
        }
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        Some(Self {
            project: var("BQ_PROJECT_ID").or_else(|| var("GOOGLE_CLOUD_PROJECT"))?,
            dataset: var("BQ_DATASET")?,
            table: var("BQ_TABLE")?,
            keyword_column: var("BQ_KEYWORD_COL").unwrap_or_else(|| "keyword".to_string()),
            date_field: var("BQ_DATE_FIELD").unwrap_or_else(|| "date".to_string()),
            account_column: var("BQ_ACCOUNT_COL").unwrap_or_else(|| "account_id".to_string()),
        })
    }

    fn validate(&self) -> Result<(), CloudError> {
        let identifiers = [
            &self.project,
            &self.dataset,
            &self.table,
            &self.keyword_column,
            &self.date_field,
            &self.account_column,
        ];
        for ident in identifiers {
            let ok = !ident.is_empty()
                && ident
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !ok {
                return Err(CloudError::NotConfigured(format!(
                    "invalid BigQuery identifier: {:?}",
                    ident
                )));
            }
        }
        Ok(())
    }

    fn sql(&self, with_account: bool) -> String {
        let mut sql = format!(
            "SELECT DISTINCT {kw} AS keyword FROM `{p}.{d}.{t}` \
             WHERE {date} >= DATE_SUB(CURRENT_DATE(), INTERVAL {days} DAY) AND {kw} IS NOT NULL",
            kw = self.keyword_column,
            p = self.project,
            d = self.dataset,
            t = self.table,
            date = self.date_field,
            days = LOOKBACK_DAYS,
        );
        if with_account {
            sql.push_str(&format!(
                " AND CAST({} AS STRING) = @account_id",
                self.account_column
            ));
        }
        sql.push_str(" LIMIT @limit");
        sql
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    #[serde(default)]
    rows: Vec<Row>,
}

#[derive(Deserialize)]
struct Row {
    f: Vec<Cell>,
}

#[derive(Deserialize)]
struct Cell {
    v: Value,
}

pub struct BigQueryWarehouse {
    http: reqwest::Client,
    base_url: String,
    config: WarehouseConfig,
    tokens: Arc<TokenProvider>,
}

impl BigQueryWarehouse {
    pub fn new(base_url: &str, config: WarehouseConfig, tokens: Arc<TokenProvider>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            config,
            tokens,
        }
    }

    pub fn from_env() -> Option<Self> {
        WarehouseConfig::from_env().map(|config| {
            Self::new(DEFAULT_BIGQUERY_URL, config, Arc::new(TokenProvider::from_env()))
        })
    }

    async fn run_query(&self, account_id: Option<&str>, limit: usize) -> Result<Vec<String>, CloudError> {
        self.config.validate()?;

        let mut params = vec![json!({
            "name": "limit",
            "parameterType": { "type": "INT64" },
            "parameterValue": { "value": limit.to_string() }
        })];
        if let Some(account) = account_id {
            params.push(json!({
                "name": "account_id",
                "parameterType": { "type": "STRING" },
                "parameterValue": { "value": account }
            }));
        }
        let body = json!({
            "query": self.config.sql(account_id.is_some()),
            "useLegacySql": false,
            "parameterMode": "NAMED",
            "queryParameters": params,
            "timeoutMs": 30000,
        });

        let url = format!("{}/projects/{}/queries", self.base_url, self.config.project);
        let request = self.tokens.authorize(self.http.post(&url).json(&body)).await?;
        let response = check_status(request.send().await?, "bigquery query").await?;
        let result: QueryResponse = response.json().await?;
        if !result.job_complete {
            return Err(CloudError::Timeout);
        }

        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| row.f.into_iter().next())
            .filter_map(|cell| match cell.v {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl KeywordWarehouse for BigQueryWarehouse {
    #[instrument(skip(self))]
    async fn recent_keywords(&self, account_id: Option<&str>, limit: usize) -> Result<Vec<String>, UpstreamError> {
        let limit = limit.clamp(1, MAX_KEYWORDS);
        let keywords = self.run_query(account_id, limit).await?;
        debug!(count = keywords.len(), "Fetched warehouse keywords");
        Ok(keywords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> WarehouseConfig {
        WarehouseConfig {
            project: "proj".into(),
            dataset: "ads".into(),
            table: "search_terms".into(),
            keyword_column: "keyword".into(),
            date_field: "date".into(),
            account_column: "account_id".into(),
        }
    }

    #[test]
    fn test_sql_shape() {
        let sql = config().sql(true);
        assert!(sql.contains("FROM `proj.ads.search_terms`"));
        assert!(sql.contains("INTERVAL 30 DAY"));
        assert!(sql.contains("@account_id"));
        assert!(sql.ends_with("LIMIT @limit"));
        assert!(!config().sql(false).contains("@account_id"));
    }

    #[test]
    fn test_rejects_injected_identifiers() {
        let mut bad = config();
        bad.table = "t`; DROP TABLE x; --".into();
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_recent_keywords_reads_rows() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/projects/proj/queries"))
            .and(body_partial_json(json!({ "useLegacySql": false })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jobComplete": true,
                "rows": [
                    { "f": [{ "v": "buy example" }] },
                    { "f": [{ "v": null }] },
                    { "f": [{ "v": "shoes" }] }
                ]
            })))
            .mount(&server)
            .await;

        let warehouse = BigQueryWarehouse::new(&server.uri(), config(), Arc::new(TokenProvider::anonymous()));
        let keywords = warehouse.recent_keywords(Some("123"), 10_000).await.unwrap();
        assert_eq!(keywords, vec!["buy example".to_string(), "shoes".to_string()]);
    }

    #[tokio::test]
    async fn test_incomplete_job_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "jobComplete": false })))
            .mount(&server)
            .await;

        let warehouse = BigQueryWarehouse::new(&server.uri(), config(), Arc::new(TokenProvider::anonymous()));
        let err = warehouse.recent_keywords(None, 10).await.unwrap_err();
        assert!(matches!(err, UpstreamError::Timeout));
    }
}
