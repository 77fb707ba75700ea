use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::PoolResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    Succeeded,
    Declined,
}

/// A single charge against a member's payment method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub confirmed_trip_id: Uuid,
    pub member_id: String,
    pub amount: i64,
    pub currency: String,
    pub method: String,
    pub reference: Option<String>,
    pub requested_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeReceipt {
    pub provider_id: String,
    pub status: ChargeStatus,
    pub message: Option<String>,
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Charge the member. `Err` means the provider could not be reached;
    /// a decline is a successful call with `ChargeStatus::Declined`.
    async fn charge(&self, request: &ChargeRequest) -> PoolResult<ChargeReceipt>;
}
