use std::sync::Arc;

use tracing::info;

use super::store::AccountStore;
use crate::error::{AppError, AppResult};

/// Ledger credits granted per qualifying event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardPolicy {
    pub activation: i64,
    pub renewal: i64,
    pub payment: i64,
    pub trial: i64,
}

impl Default for RewardPolicy {
    fn default() -> Self {
        Self {
            activation: 5,
            renewal: 3,
            payment: 10,
            trial: 5,
        }
    }
}

/// key: trial-gate -> one-shot free grant
#[derive(Clone)]
pub struct TrialGate {
    store: Arc<dyn AccountStore>,
}

impl TrialGate {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn is_eligible(&self, user_id: i64) -> AppResult<bool> {
        let used = self
            .store
            .get_trial_used(user_id)
            .await
            .map_err(AppError::Storage)?;
        Ok(!used)
    }

    /// Burns the grant. Callers invoke this only after the trial entitlement exists.
    pub async fn mark_used(&self, user_id: i64) -> AppResult<()> {
        self.store
            .set_trial_used(user_id)
            .await
            .map_err(AppError::Storage)?;
        info!(%user_id, "trial marked as used");
        Ok(())
    }
}

/// key: ledger-updater -> additive reward credits
#[derive(Clone)]
pub struct LedgerUpdater {
    store: Arc<dyn AccountStore>,
}

impl LedgerUpdater {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn credit(&self, user_id: i64, amount: i64) -> AppResult<i64> {
        if amount < 0 {
            return Err(AppError::validation("amount", "credit must be non-negative"));
        }
        let balance = self
            .store
            .credit_balance(user_id, amount)
            .await
            .map_err(AppError::Storage)?;
        info!(%user_id, amount, balance, "ledger credited");
        Ok(balance)
    }
}
