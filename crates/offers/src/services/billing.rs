// Token billing
//
// reserve holds tokens (balance goes down), debit settles a reservation or
// charges directly, revert hands reserved tokens back. Each move commits
// together with its Token* event record; the publish follows the commit.

use std::sync::Arc;

use autoads_core::console::{token_kind, TokenBalance};
use autoads_core::events::{EventData, TokenData};
use autoads_core::{Envelope, EventRecord, EventRecorder, TokenLedger};
use serde::Serialize;
use serde_json::Map;
use tracing::instrument;
use utoipa::ToSchema;

use super::EVENT_SOURCE;
use crate::error::{ServiceError, ServiceResult};

pub struct Billing {
    ledger: Arc<dyn TokenLedger>,
    recorder: EventRecorder,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BillingReceipt {
    /// Id of the Token* event this request produced
    pub event_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation_id: Option<String>,
    pub balance: i64,
    /// True when an earlier request with the same idempotency key is answered
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub replayed: bool,
}

fn positive(amount: i64) -> ServiceResult<i64> {
    if amount <= 0 {
        return Err(ServiceError::InvalidArgument("amount must be positive".into()));
    }
    Ok(amount)
}

impl Billing {
    pub fn new(ledger: Arc<dyn TokenLedger>, recorder: EventRecorder) -> Self {
        Self { ledger, recorder }
    }

    pub async fn balance(&self, user_id: &str) -> ServiceResult<TokenBalance> {
        Ok(self.ledger.balance(user_id).await?)
    }

    /// Receipt for a request already answered under the same idempotency key
    pub async fn replay(&self, user_id: &str, event_id: &str, reserved: bool) -> ServiceResult<BillingReceipt> {
        let balance = self.ledger.balance(user_id).await?;
        Ok(BillingReceipt {
            event_id: event_id.to_string(),
            reservation_id: reserved.then(|| event_id.to_string()),
            balance: balance.balance,
            replayed: true,
        })
    }

    #[instrument(skip(self, reason, idempotency_key))]
    pub async fn reserve(
        &self,
        user_id: &str,
        amount: i64,
        reason: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> ServiceResult<BillingReceipt> {
        let amount = positive(amount)?;
        let envelope = Envelope::new(
            EVENT_SOURCE,
            EventData::TokenReserved(TokenData {
                user_id: user_id.to_string(),
                amount,
                reservation_id: None,
                reason: reason.map(str::to_string),
                extra: Map::new(),
            }),
        );
        let reservation_id = envelope.id.clone();
        let envelope = envelope.with_subject(reservation_id.clone());
        let mut receipt = self
            .commit(user_id, -amount, token_kind::RESERVE, reason, envelope, idempotency_key)
            .await?;
        receipt.reservation_id = Some(reservation_id);
        Ok(receipt)
    }

    /// Settle a reservation (no balance change), or charge directly without one
    #[instrument(skip(self, reason, idempotency_key))]
    pub async fn debit(
        &self,
        user_id: &str,
        amount: i64,
        reservation_id: Option<&str>,
        reason: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> ServiceResult<BillingReceipt> {
        let amount = positive(amount)?;
        let reservation_id = reservation_id.map(str::trim).filter(|r| !r.is_empty());
        let delta = if reservation_id.is_some() { 0 } else { -amount };
        let envelope = Envelope::new(
            EVENT_SOURCE,
            EventData::TokenDebited(TokenData {
                user_id: user_id.to_string(),
                amount,
                reservation_id: reservation_id.map(str::to_string),
                reason: reason.map(str::to_string),
                extra: Map::new(),
            }),
        );
        let mut receipt = self
            .commit(user_id, delta, token_kind::DEBIT, reason, envelope, idempotency_key)
            .await?;
        receipt.reservation_id = reservation_id.map(str::to_string);
        Ok(receipt)
    }

    /// Return reserved tokens to the balance
    #[instrument(skip(self, reason, idempotency_key))]
    pub async fn revert(
        &self,
        user_id: &str,
        amount: i64,
        reservation_id: &str,
        reason: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> ServiceResult<BillingReceipt> {
        let amount = positive(amount)?;
        let reservation_id = reservation_id.trim();
        if reservation_id.is_empty() {
            return Err(ServiceError::InvalidArgument("reservationId is required".into()));
        }
        let envelope = Envelope::new(
            EVENT_SOURCE,
            EventData::TokenReverted(TokenData {
                user_id: user_id.to_string(),
                amount,
                reservation_id: Some(reservation_id.to_string()),
                reason: reason.map(str::to_string),
                extra: Map::new(),
            }),
        );
        let mut receipt = self
            .commit(user_id, amount, token_kind::REVERT, reason, envelope, idempotency_key)
            .await?;
        receipt.reservation_id = Some(reservation_id.to_string());
        Ok(receipt)
    }

    async fn commit(
        &self,
        user_id: &str,
        delta: i64,
        kind: &str,
        reason: Option<&str>,
        envelope: Envelope,
        idempotency_key: Option<&str>,
    ) -> ServiceResult<BillingReceipt> {
        let record = EventRecord::from_envelope(&envelope, idempotency_key);
        let balance = self
            .ledger
            .apply(user_id, delta, kind, reason, Some(&record))
            .await?;
        self.recorder.publish(&envelope, idempotency_key).await;
        tracing::info!(
            event_id = %envelope.id,
            kind,
            delta,
            balance = balance.balance,
            "Token ledger updated"
        );
        Ok(BillingReceipt {
            event_id: envelope.id,
            reservation_id: None,
            balance: balance.balance,
            replayed: false,
        })
    }
}
