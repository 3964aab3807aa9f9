// Google Ads REST client

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AdsApi, AdsError, AdsResult, AdsSession, OAuthClient};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessibleCustomers {
    #[serde(default)]
    resource_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SearchBatch {
    #[serde(default)]
    results: Vec<Value>,
}

pub struct LiveAdsClient {
    http: reqwest::Client,
    base_url: String,
    developer_token: String,
    oauth: Arc<OAuthClient>,
}

impl LiveAdsClient {
    /// `base_url` includes the API version, e.g. `https://googleads.googleapis.com/v17`
    pub fn new(base_url: &str, developer_token: &str, oauth: Arc<OAuthClient>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            developer_token: developer_token.to_string(),
            oauth,
        }
    }

    async fn request(
        &self,
        session: &AdsSession,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> AdsResult<reqwest::Response> {
        if session.refresh_token.is_empty() {
            return Err(AdsError::NotConnected);
        }
        let access_token = self.oauth.access_token(&session.refresh_token).await?;

        let mut request = self
            .http
            .request(method, format!("{}/{}", self.base_url, path))
            .bearer_auth(access_token)
            .header("developer-token", &self.developer_token);
        if let Some(login) = &session.login_customer_id {
            request = request.header("login-customer-id", login);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdsError::Http {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn post_json(&self, session: &AdsSession, path: &str, body: &Value) -> AdsResult<Value> {
        self.request(session, reqwest::Method::POST, path, Some(body))
            .await?
            .json::<Value>()
            .await
            .map_err(|e| AdsError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AdsApi for LiveAdsClient {
    fn is_live(&self) -> bool {
        true
    }

    async fn list_accessible_customers(&self, session: &AdsSession) -> AdsResult<Vec<String>> {
        let customers: AccessibleCustomers = self
            .request(session, reqwest::Method::GET, "customers:listAccessibleCustomers", None)
            .await?
            .json()
            .await
            .map_err(|e| AdsError::Decode(e.to_string()))?;
        Ok(customers.resource_names)
    }

    async fn search_stream(
        &self,
        session: &AdsSession,
        customer_id: &str,
        query: &str,
    ) -> AdsResult<Vec<Value>> {
        let batches: Vec<SearchBatch> = self
            .request(
                session,
                reqwest::Method::POST,
                &format!("customers/{}/googleAds:searchStream", customer_id),
                Some(&json!({ "query": query })),
            )
            .await?
            .json()
            .await
            .map_err(|e| AdsError::Decode(e.to_string()))?;
        Ok(batches.into_iter().flat_map(|b| b.results).collect())
    }

    async fn mutate(
        &self,
        session: &AdsSession,
        customer_id: &str,
        operations: &[Value],
        validate_only: bool,
    ) -> AdsResult<Value> {
        self.post_json(
            session,
            &format!("customers/{}/googleAds:mutate", customer_id),
            &json!({
                "mutateOperations": operations,
                "validateOnly": validate_only,
                "partialFailure": false,
            }),
        )
        .await
    }

    async fn mutate_manager_links(
        &self,
        session: &AdsSession,
        customer_id: &str,
        operations: &[Value],
    ) -> AdsResult<Value> {
        self.post_json(
            session,
            &format!("customers/{}/customerManagerLinks:mutate", customer_id),
            &json!({ "operations": operations }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client(server: &MockServer) -> LiveAdsClient {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "ya29.test",
                "expires_in": 3600
            })))
            .mount(server)
            .await;
        let oauth = Arc::new(OAuthClient::new(&format!("{}/token", server.uri()), "cid", "secret"));
        LiveAdsClient::new(&format!("{}/v17", server.uri()), "dev-token", oauth)
    }

    fn session() -> AdsSession {
        AdsSession {
            refresh_token: "1//r".into(),
            login_customer_id: Some("1112223333".into()),
            rate: None,
        }
    }

    #[tokio::test]
    async fn test_list_accessible_customers_sends_headers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v17/customers:listAccessibleCustomers"))
            .and(header("authorization", "Bearer ya29.test"))
            .and(header("developer-token", "dev-token"))
            .and(header("login-customer-id", "1112223333"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "resourceNames": ["customers/1234567890", "customers/9876543210"]
            })))
            .mount(&server)
            .await;

        let ads = client(&server).await;
        let customers = ads.list_accessible_customers(&session()).await.unwrap();
        assert_eq!(customers, vec!["customers/1234567890", "customers/9876543210"]);
    }

    #[tokio::test]
    async fn test_search_stream_flattens_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v17/customers/1234567890/googleAds:searchStream"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "results": [{ "campaignBudget": { "resourceName": "customers/1234567890/campaignBudgets/1" } }] },
                { "results": [{ "campaignBudget": { "resourceName": "customers/1234567890/campaignBudgets/2" } }] }
            ])))
            .mount(&server)
            .await;

        let ads = client(&server).await;
        let rows = ads
            .search_stream(&session(), "1234567890", "SELECT campaign_budget.resource_name FROM campaign_budget")
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(ads.has_sufficient_budget(&session(), "1234567890").await.unwrap());
    }

    #[tokio::test]
    async fn test_mutate_posts_validate_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v17/customers/1234567890/googleAds:mutate"))
            .and(body_partial_json(json!({ "validateOnly": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "mutateOperationResponses": [] })))
            .mount(&server)
            .await;

        let ads = client(&server).await;
        let op = json!({ "campaignBudgetOperation": { "update": { "resourceName": "customers/1234567890/campaignBudgets/1", "amountMicros": "1000000" }, "updateMask": "amount_micros" } });
        ads.mutate(&session(), "1234567890", &[op], true).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_errors_keep_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v17/customers/1234567890/googleAds:mutate"))
            .respond_with(ResponseTemplate::new(400).set_body_string("INVALID_ARGUMENT"))
            .mount(&server)
            .await;

        let ads = client(&server).await;
        match ads.mutate(&session(), "1234567890", &[], false).await {
            Err(AdsError::Http { status, .. }) => assert_eq!(status, 400),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_refresh_token_is_not_connected() {
        let server = MockServer::start().await;
        let ads = client(&server).await;
        let result = ads.list_accessible_customers(&AdsSession::default()).await;
        assert!(matches!(result, Err(AdsError::NotConnected)));
    }
}
