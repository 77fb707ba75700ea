use async_trait::async_trait;
use pooling_core::payment::{ChargeReceipt, ChargeRequest, ChargeStatus, PaymentAdapter};
use pooling_core::{PoolError, PoolResult};
use std::sync::Arc;

pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>) -> Self {
        Self { adapter }
    }

    /// Charge a member once. Never retried here: a lost response may still
    /// have moved money.
    pub async fn charge(&self, request: &ChargeRequest) -> PoolResult<ChargeReceipt> {
        if request.amount <= 0 {
            return Err(PoolError::Validation(format!(
                "payment amount must be positive, got {}",
                request.amount
            )));
        }

        let receipt = self.adapter.charge(request).await.map_err(|e| {
            tracing::error!(
                "Charge for {} on trip {} failed in transport: {}",
                request.member_id,
                request.confirmed_trip_id,
                e
            );
            e
        })?;

        if receipt.status == ChargeStatus::Declined {
            tracing::warn!(
                "Charge {} for {} declined: {}",
                receipt.provider_id,
                request.member_id,
                receipt.message.as_deref().unwrap_or("no reason given")
            );
        }
        Ok(receipt)
    }
}

/// Accepts every charge except the magic references used in tests and
/// local runs: `decline` is declined, `fail-network` never reaches the provider.
pub struct MockPaymentAdapter;

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn charge(&self, request: &ChargeRequest) -> PoolResult<ChargeReceipt> {
        match request.reference.as_deref() {
            Some("fail-network") => Err(PoolError::Network("simulated payment gateway timeout".to_string())),
            Some("decline") => Ok(ChargeReceipt {
                provider_id: format!("mock_ch_{}", uuid::Uuid::new_v4().simple()),
                status: ChargeStatus::Declined,
                message: Some("card declined".to_string()),
            }),
            _ => Ok(ChargeReceipt {
                provider_id: format!("mock_ch_{}", uuid::Uuid::new_v4().simple()),
                status: ChargeStatus::Succeeded,
                message: None,
            }),
        }
    }
}
