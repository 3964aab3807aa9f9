// Landing-page brand signals: `<title>` and `og:site_name`
//
// The browser executor's /page-signals is preferred; a direct GET capped at
// max_bytes is the fallback. The whole lookup is best effort within one budget.

use std::time::Duration;

use autoads_core::UpstreamError;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PageSignalsRequest<'a> {
    url: &'a str,
    timeout_ms: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageSignalsResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default, alias = "og:site_name", alias = "ogSiteName")]
    site_name: Option<String>,
}

pub struct SignalFetcher {
    http: reqwest::Client,
    browser_url: Option<String>,
    browser_token: Option<String>,
    timeout: Duration,
    max_bytes: usize,
}

impl SignalFetcher {
    pub fn new(timeout: Duration, max_bytes: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            browser_url: None,
            browser_token: None,
            timeout,
            max_bytes,
        }
    }

    pub fn with_browser(mut self, base_url: &str, token: Option<String>) -> Self {
        self.browser_url = Some(base_url.trim_end_matches('/').to_string());
        self.browser_token = token;
        self
    }

    /// Title and site name of `url`; empty when nothing arrives within the budget
    pub async fn fetch(&self, url: &str) -> Vec<String> {
        match tokio::time::timeout(self.timeout, self.lookup(url)).await {
            Ok(signals) => signals,
            Err(_) => {
                tracing::debug!(url, "Landing signals timed out");
                Vec::new()
            }
        }
    }

    async fn lookup(&self, url: &str) -> Vec<String> {
        if self.browser_url.is_some() {
            match self.from_browser(url).await {
                Ok(signals) if !signals.is_empty() => return signals,
                Ok(_) => {}
                Err(e) => tracing::debug!(url, "Browser page-signals failed: {}", e),
            }
        }
        match self.from_page(url).await {
            Ok(html) => parse_signals(&html),
            Err(e) => {
                tracing::debug!(url, "Landing page fetch failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn from_browser(&self, url: &str) -> Result<Vec<String>, UpstreamError> {
        let Some(base) = &self.browser_url else {
            return Ok(Vec::new());
        };
        let mut request = self
            .http
            .post(format!("{}/api/v1/browser/page-signals", base))
            .timeout(self.timeout)
            .json(&PageSignalsRequest {
                url,
                timeout_ms: self.timeout.as_millis() as u64,
            });
        if let Some(token) = &self.browser_token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(UpstreamError::Http {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let body: PageSignalsResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::Decode(e.to_string()))?;
        Ok([body.title, body.site_name]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    /// Page body, truncated to max_bytes
    async fn from_page(&self, url: &str) -> Result<String, UpstreamError> {
        let mut response = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(UpstreamError::Http {
                status: response.status().as_u16(),
                message: String::new(),
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?
        {
            let room = self.max_bytes.saturating_sub(body.len());
            body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            if body.len() >= self.max_bytes {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
}

/// `<title>` text and `og:site_name` content, in that order
pub fn parse_signals(html: &str) -> Vec<String> {
    let patterns = [
        r"(?is)<title[^>]*>(.*?)</title>",
        r#"(?is)<meta[^>]+property\s*=\s*["']og:site_name["'][^>]*content\s*=\s*["']([^"']*)["']"#,
        r#"(?is)<meta[^>]+content\s*=\s*["']([^"']*)["'][^>]*property\s*=\s*["']og:site_name["']"#,
    ];
    let mut signals: Vec<String> = Vec::new();
    for pattern in patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        if let Some(text) = re.captures(html).and_then(|c| c.get(1)) {
            let value = decode_entities(text.as_str().trim());
            if !value.is_empty() && !signals.contains(&value) {
                signals.push(value);
            }
        }
    }
    signals
}
