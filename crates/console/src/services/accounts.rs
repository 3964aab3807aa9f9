// Account administration: roles, token grants and subscriptions
//
// Grants and subscription edits commit together with their event record;
// the publish follows the commit.

use std::sync::Arc;

use autoads_core::console::{token_kind, Role, Subscription, TokenBalance, UserRecord};
use autoads_core::events::{SUBSCRIPTION_UPDATED, TOKEN_GRANTED};
use autoads_core::{ConsoleStore, Envelope, EventData, EventRecord, EventRecorder, TokenLedger};
use serde_json::json;
use tracing::instrument;

use super::EVENT_SOURCE;
use crate::error::{ServiceError, ServiceResult};

pub const DEFAULT_PAGE: i64 = 50;
pub const MAX_PAGE: i64 = 200;

pub struct AccountAdmin {
    console: Arc<dyn ConsoleStore>,
    ledger: Arc<dyn TokenLedger>,
    recorder: EventRecorder,
}

impl AccountAdmin {
    pub fn new(console: Arc<dyn ConsoleStore>, ledger: Arc<dyn TokenLedger>, recorder: EventRecorder) -> Self {
        Self {
            console,
            ledger,
            recorder,
        }
    }

    pub async fn list_users(&self, limit: Option<i64>, offset: Option<i64>) -> ServiceResult<Vec<UserRecord>> {
        let limit = match limit {
            Some(l) if l > 0 => l.min(MAX_PAGE),
            _ => DEFAULT_PAGE,
        };
        Ok(self.console.list_users(limit, offset.unwrap_or(0).max(0)).await?)
    }

    pub async fn get_user(&self, id: &str) -> ServiceResult<UserRecord> {
        self.console
            .get_user(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", id)))
    }

    pub async fn set_role(&self, id: &str, role: &str) -> ServiceResult<UserRecord> {
        let role: Role = role.parse().map_err(ServiceError::InvalidArgument)?;
        let user = self.console.set_role(id, role).await?;
        tracing::info!(user_id = id, role = %role, "User role updated");
        Ok(user)
    }

    pub async fn balance(&self, user_id: &str) -> ServiceResult<TokenBalance> {
        Ok(self.ledger.balance(user_id).await?)
    }

    #[instrument(skip(self, reason))]
    pub async fn grant_tokens(
        &self,
        user_id: &str,
        amount: i64,
        reason: Option<&str>,
        actor: &str,
    ) -> ServiceResult<TokenBalance> {
        if amount <= 0 {
            return Err(ServiceError::InvalidArgument("amount must be positive".into()));
        }
        let envelope = Envelope::new(
            EVENT_SOURCE,
            EventData::Other {
                event_type: TOKEN_GRANTED.to_string(),
                data: json!({
                    "userId": user_id,
                    "amount": amount,
                    "reason": reason,
                    "grantedBy": actor,
                }),
            },
        )
        .with_subject(user_id);
        let record = EventRecord::from_envelope(&envelope, None);
        let balance = self
            .ledger
            .apply(user_id, amount, token_kind::GRANT, reason, Some(&record))
            .await?;
        self.recorder.publish(&envelope, None).await;
        tracing::info!(event_id = %envelope.id, balance = balance.balance, "Tokens granted");
        Ok(balance)
    }

    pub async fn subscription(&self, user_id: &str) -> ServiceResult<Subscription> {
        self.console
            .get_subscription(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("No subscription for user {}", user_id)))
    }

    #[instrument(skip(self))]
    pub async fn set_subscription(
        &self,
        user_id: &str,
        plan: &str,
        status: &str,
        actor: &str,
    ) -> ServiceResult<Subscription> {
        let (plan, status) = (plan.trim(), status.trim().to_ascii_lowercase());
        if plan.is_empty() || status.is_empty() {
            return Err(ServiceError::InvalidArgument("plan and status are required".into()));
        }
        let envelope = Envelope::new(
            EVENT_SOURCE,
            EventData::Other {
                event_type: SUBSCRIPTION_UPDATED.to_string(),
                data: json!({
                    "userId": user_id,
                    "plan": plan,
                    "status": status,
                    "updatedBy": actor,
                }),
            },
        )
        .with_subject(user_id);
        let record = EventRecord::from_envelope(&envelope, None);
        let subscription = self
            .console
            .upsert_subscription(user_id, plan, &status, Some(&record))
            .await?;
        self.recorder.publish(&envelope, None).await;
        Ok(subscription)
    }
}
