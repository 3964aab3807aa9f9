// Console configuration

use std::time::Duration;

pub const SCRAPE_TIMEOUT: Duration = Duration::from_millis(1200);
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(1000);
pub const ADSCENTER: &str = "adscenter";

/// One upstream service the console watches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTarget {
    pub name: String,
    pub base_url: String,
}

impl ServiceTarget {
    pub fn new(name: impl Into<String>, base_url: &str) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub services: Vec<ServiceTarget>,
    pub adscenter_url: Option<String>,
    /// Secret holding the adscenter limits policy
    pub limits_secret: Option<String>,
    pub scrape_timeout: Duration,
    pub probe_timeout: Duration,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            adscenter_url: None,
            limits_secret: None,
            scrape_timeout: SCRAPE_TIMEOUT,
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

/// Parse `name=url` pairs separated by commas; malformed entries are skipped
pub fn parse_services(raw: &str) -> Vec<ServiceTarget> {
    raw.split(',')
        .filter_map(|entry| {
            let (name, url) = entry.split_once('=')?;
            let (name, url) = (name.trim(), url.trim());
            if name.is_empty() || url.is_empty() {
                return None;
            }
            Some(ServiceTarget::new(name, url))
        })
        .collect()
}

impl ConsoleConfig {
    /// Create config from environment variables.
    /// - CONSOLE_SERVICES: `name=url` CSV of watched services
    /// - ADSCENTER_URL: proxy target, also watched as `adscenter`
    /// - ADSCENTER_LIMITS_SECRET: secret name of the limits policy
    pub fn from_env() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());
        let services = non_empty("CONSOLE_SERVICES")
            .map(|raw| parse_services(&raw))
            .unwrap_or_default();
        Self::default()
            .with_services(services, non_empty("ADSCENTER_URL"))
            .with_limits_secret(non_empty("ADSCENTER_LIMITS_SECRET"))
    }

    pub fn with_services(mut self, mut services: Vec<ServiceTarget>, adscenter_url: Option<String>) -> Self {
        if let Some(url) = &adscenter_url {
            if !services.iter().any(|s| s.name == ADSCENTER) {
                services.push(ServiceTarget::new(ADSCENTER, url));
            }
        }
        self.services = services;
        self.adscenter_url = adscenter_url.map(|u| u.trim().trim_end_matches('/').to_string());
        self
    }

    pub fn with_limits_secret(mut self, name: Option<String>) -> Self {
        self.limits_secret = name;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_services() {
        let services = parse_services("siterank=http://siterank:8080/, bad, =http://x, offers = http://offers");
        assert_eq!(
            services,
            vec![
                ServiceTarget::new("siterank", "http://siterank:8080"),
                ServiceTarget::new("offers", "http://offers"),
            ]
        );
        assert_eq!(services[0].url("/metrics"), "http://siterank:8080/metrics");
    }

    #[test]
    fn test_adscenter_is_watched_once() {
        let config = ConsoleConfig::default().with_services(
            parse_services("siterank=http://siterank"),
            Some("http://adscenter:8080/".into()),
        );
        assert_eq!(config.services.len(), 2);
        assert_eq!(config.services[1].name, ADSCENTER);
        assert_eq!(config.adscenter_url.as_deref(), Some("http://adscenter:8080"));

        let config = ConsoleConfig::default().with_services(
            parse_services("adscenter=http://internal-ads"),
            Some("http://adscenter:8080".into()),
        );
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].base_url, "http://internal-ads");
    }
}
