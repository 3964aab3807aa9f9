// Linking client accounts under the platform MCC

use std::sync::Arc;

use autoads_core::ads::normalize_customer_id;
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::ads::{AdsApi, AdsResult, AdsSession};
use crate::config::AdscenterConfig;
use crate::error::{ServiceError, ServiceResult};

const LINK_QUERY: &str = "SELECT customer_manager_link.resource_name, \
     customer_manager_link.manager_customer, customer_manager_link.status \
     FROM customer_manager_link";

/// A `customer_manager_link` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerLink {
    pub resource_name: String,
    pub status: String,
}

/// The link of `customer_id` to `manager_id`, if any
pub async fn find_manager_link(
    ads: &dyn AdsApi,
    session: &AdsSession,
    customer_id: &str,
    manager_id: &str,
) -> AdsResult<Option<ManagerLink>> {
    let rows = ads.search_stream(session, customer_id, LINK_QUERY).await?;
    Ok(link_from_rows(&rows, manager_id))
}

fn link_from_rows(rows: &[Value], manager_id: &str) -> Option<ManagerLink> {
    let suffix = format!("/{}", manager_id);
    rows.iter()
        .filter_map(|row| row.get("customerManagerLink"))
        .find(|link| {
            link.get("managerCustomer")
                .and_then(Value::as_str)
                .is_some_and(|m| m.ends_with(&suffix))
        })
        .map(|link| ManagerLink {
            resource_name: link
                .get("resourceName")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            status: link
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("UNKNOWN")
                .to_string(),
        })
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MccResult {
    pub customer_id: String,
    pub manager_customer_id: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,
    /// False when answered without calling Google Ads
    pub live: bool,
}

pub struct MccService {
    config: Arc<AdscenterConfig>,
    ads: Arc<dyn AdsApi>,
}

impl MccService {
    pub fn new(config: Arc<AdscenterConfig>, ads: Arc<dyn AdsApi>) -> Self {
        Self { config, ads }
    }

    fn manager_id(&self) -> ServiceResult<&str> {
        self.config
            .credentials
            .login_customer_id
            .as_deref()
            .ok_or_else(|| ServiceError::NotConfigured("GOOGLE_ADS_LOGIN_CUSTOMER_ID is not configured".into()))
    }

    fn live(&self) -> bool {
        self.config.mcc_live && self.ads.is_live()
    }

    fn parse_customer(raw: &str) -> ServiceResult<String> {
        normalize_customer_id(raw).ok_or_else(|| ServiceError::invalid("customerId must be a 10-digit customer id"))
    }

    fn result(&self, customer_id: String, manager: &str, status: &str, resource_name: Option<String>) -> MccResult {
        MccResult {
            customer_id,
            manager_customer_id: manager.to_string(),
            status: status.to_string(),
            resource_name,
            live: self.live(),
        }
    }

    /// Invite the platform MCC from the client account
    pub async fn link(&self, session: &AdsSession, customer_id: &str) -> ServiceResult<MccResult> {
        let customer_id = Self::parse_customer(customer_id)?;
        let manager = self.manager_id()?;
        if !self.live() {
            return Ok(self.result(customer_id, manager, "queued", None));
        }

        let operation = json!({
            "create": {
                "manager": format!("customers/{}", manager),
                "status": "PENDING",
            }
        });
        let response = self
            .ads
            .mutate_manager_links(session, &customer_id, &[operation])
            .await?;
        let resource_name = response
            .pointer("/results/0/resourceName")
            .and_then(Value::as_str)
            .map(str::to_string);
        tracing::info!(customer_id = %customer_id, "Requested MCC link");
        Ok(self.result(customer_id, manager, "PENDING", resource_name))
    }

    pub async fn status(&self, session: &AdsSession, customer_id: &str) -> ServiceResult<MccResult> {
        let customer_id = Self::parse_customer(customer_id)?;
        let manager = self.manager_id()?;
        if !self.live() {
            return Ok(self.result(customer_id, manager, "pending", None));
        }

        let link = find_manager_link(self.ads.as_ref(), session, &customer_id, manager).await?;
        Ok(match link {
            Some(link) => self.result(customer_id, manager, &link.status, Some(link.resource_name)),
            None => self.result(customer_id, manager, "NOT_LINKED", None),
        })
    }

    /// Set the link INACTIVE
    pub async fn unlink(&self, session: &AdsSession, customer_id: &str) -> ServiceResult<MccResult> {
        let customer_id = Self::parse_customer(customer_id)?;
        let manager = self.manager_id()?;
        if !self.live() {
            return Ok(self.result(customer_id, manager, "queued", None));
        }

        let link = find_manager_link(self.ads.as_ref(), session, &customer_id, manager)
            .await?
            .filter(|l| !l.resource_name.is_empty())
            .ok_or_else(|| ServiceError::NotFound(format!("No MCC link for customer {}", customer_id)))?;

        let operation = json!({
            "update": { "resourceName": link.resource_name, "status": "INACTIVE" },
            "updateMask": "status",
        });
        self.ads
            .mutate_manager_links(session, &customer_id, &[operation])
            .await
            .inspect_err(|e| tracing::warn!(customer_id = %customer_id, "Failed to unlink MCC: {}", e))?;
        Ok(self.result(customer_id, manager, "INACTIVE", Some(link.resource_name)))
    }
}
