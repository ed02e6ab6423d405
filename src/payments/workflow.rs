use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::gateway::PaymentGateway;
use super::models::{
    LineItem, PaymentAction, PaymentIntent, PaymentRequest, PaymentStatus, ProviderKey,
    ReturnUrls,
};
use crate::accounts::{LedgerUpdater, RewardPolicy};
use crate::error::{AppError, AppResult};
use crate::locks::KeyedLocks;
use crate::provisioning::{ProvisionedEntitlement, ProvisioningPolicy, ProvisioningReconciler};

/// Price and redirect configuration for every intent.
#[derive(Debug, Clone)]
pub struct PaymentPricing {
    pub amount: f64,
    pub currency: String,
    pub return_url: String,
}

/// Outcome of one confirmation poll.
#[derive(Debug)]
pub enum Settlement {
    /// The gateway has not reported success yet.
    Pending(PaymentIntent),
    /// First observed success: provisioning ran and the ledger was credited.
    Settled {
        intent: PaymentIntent,
        entitlement: ProvisionedEntitlement,
    },
    /// First observed success, ledger credited, but provisioning failed.
    SettledUnfulfilled {
        intent: PaymentIntent,
        error: AppError,
    },
    /// Poll on an intent that had already settled. Nothing was triggered.
    AlreadySettled(PaymentIntent),
}

/// key: payments-workflow -> pay-before-provision state machine
///
/// Each intent moves Pending -> Settled | Abandoned exactly once. Settlement is serialized
/// per intent, and the status flips to Settled before fulfilment runs, so repeated
/// confirmation polls never provision or credit twice.
pub struct PaymentWorkflow {
    gateway: PaymentGateway,
    reconciler: Arc<ProvisioningReconciler>,
    ledger: LedgerUpdater,
    policy: ProvisioningPolicy,
    rewards: RewardPolicy,
    pricing: PaymentPricing,
    intents: DashMap<Uuid, PaymentIntent>,
    locks: KeyedLocks<Uuid>,
}

impl PaymentWorkflow {
    pub fn new(
        gateway: PaymentGateway,
        reconciler: Arc<ProvisioningReconciler>,
        ledger: LedgerUpdater,
        policy: ProvisioningPolicy,
        rewards: RewardPolicy,
        pricing: PaymentPricing,
    ) -> Self {
        Self {
            gateway,
            reconciler,
            ledger,
            policy,
            rewards,
            pricing,
            intents: DashMap::new(),
            locks: KeyedLocks::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.gateway.is_enabled()
    }

    pub fn available_providers(&self) -> Vec<ProviderKey> {
        self.gateway.available()
    }

    pub fn intent(&self, intent_id: Uuid) -> Option<PaymentIntent> {
        self.intents.get(&intent_id).map(|entry| entry.clone())
    }

    /// Opens a payment with the chosen provider and records a Pending intent.
    pub async fn select_method(
        &self,
        user_id: i64,
        provider_key: ProviderKey,
        action: PaymentAction,
    ) -> AppResult<PaymentIntent> {
        if !self.gateway.is_enabled() {
            return Err(AppError::Conflict("payments are disabled".into()));
        }
        let provider = self.gateway.provider(provider_key).ok_or_else(|| {
            AppError::validation("provider", format!("{provider_key} is not available"))
        })?;

        let request = self.payment_request(user_id, action);
        let created = provider.create_payment(&request).await.map_err(|err| {
            warn!(?err, %user_id, provider = %provider_key, "payment creation failed");
            AppError::Provider(format!("{provider_key}: {err:#}"))
        })?;

        let intent = PaymentIntent {
            id: Uuid::new_v4(),
            user_id,
            provider: provider_key,
            provider_payment_id: created.payment_id,
            redirect_url: created.redirect_url,
            amount: request.amount,
            currency: request.currency,
            action,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
            settled_at: None,
        };
        info!(
            %user_id,
            intent_id = %intent.id,
            provider = %provider_key,
            payment_id = %intent.provider_payment_id,
            action = action.as_str(),
            "payment intent created"
        );
        self.intents.insert(intent.id, intent.clone());
        Ok(intent)
    }

    /// Discards a pending intent. Local only; nothing is sent to the gateway.
    pub async fn cancel(&self, user_id: i64, intent_id: Uuid) -> AppResult<PaymentIntent> {
        let guard = self.locks.acquire(&intent_id).await;
        let result = self.cancel_locked(user_id, intent_id);
        drop(guard);
        self.locks.release(&intent_id);
        result
    }

    fn cancel_locked(&self, user_id: i64, intent_id: Uuid) -> AppResult<PaymentIntent> {
        let mut entry = self
            .intents
            .get_mut(&intent_id)
            .filter(|entry| entry.user_id == user_id)
            .ok_or_else(|| AppError::Conflict(format!("unknown payment intent {intent_id}")))?;

        match entry.status {
            PaymentStatus::Pending => {
                entry.status = PaymentStatus::Abandoned;
                info!(%user_id, %intent_id, "payment intent abandoned");
                Ok(entry.clone())
            }
            PaymentStatus::Abandoned => Ok(entry.clone()),
            PaymentStatus::Settled => Err(AppError::Conflict(format!(
                "payment intent {intent_id} already settled"
            ))),
        }
    }

    /// Polls the gateway and, on the first observed success, fulfils the intent once.
    pub async fn check_and_settle(&self, user_id: i64, intent_id: Uuid) -> AppResult<Settlement> {
        let guard = self.locks.acquire(&intent_id).await;
        let result = self.settle_locked(user_id, intent_id).await;
        drop(guard);
        self.locks.release(&intent_id);
        result
    }

    /// Forgets a settled or abandoned intent once its outcome has reached the user.
    /// Pending intents stay. Returns whether an entry was removed.
    pub async fn acknowledge(&self, user_id: i64, intent_id: Uuid) -> bool {
        let guard = self.locks.acquire(&intent_id).await;
        let removed = self
            .intents
            .remove_if(&intent_id, |_, intent| {
                intent.user_id == user_id && intent.status != PaymentStatus::Pending
            })
            .is_some();
        drop(guard);
        self.locks.release(&intent_id);
        if removed {
            debug!(%user_id, %intent_id, "closed payment intent forgotten");
        }
        removed
    }

    /// Intents still held in memory, in any status.
    pub fn open_intents(&self) -> usize {
        self.intents.len()
    }

    pub fn lock_slots(&self) -> usize {
        self.locks.len()
    }

    async fn settle_locked(&self, user_id: i64, intent_id: Uuid) -> AppResult<Settlement> {
        let intent = self
            .intent(intent_id)
            .filter(|intent| intent.user_id == user_id)
            .ok_or_else(|| AppError::Conflict(format!("unknown payment intent {intent_id}")))?;

        match intent.status {
            PaymentStatus::Settled => return Ok(Settlement::AlreadySettled(intent)),
            PaymentStatus::Abandoned => {
                return Err(AppError::Conflict(format!(
                    "payment intent {intent_id} was abandoned"
                )))
            }
            PaymentStatus::Pending => {}
        }

        let provider = self.gateway.provider(intent.provider).ok_or_else(|| {
            AppError::Provider(format!("{} is no longer configured", intent.provider))
        })?;
        let paid = provider
            .check_payment(&intent.provider_payment_id)
            .await
            .map_err(|err| {
                warn!(?err, %user_id, %intent_id, "payment status check failed");
                AppError::Provider(format!("{}: {err:#}", intent.provider))
            })?;
        if !paid {
            return Ok(Settlement::Pending(intent));
        }

        let intent = self.mark_settled(intent_id)?;
        info!(%user_id, %intent_id, action = intent.action.as_str(), "payment settled");

        let fulfilment = match intent.action {
            PaymentAction::Create => {
                self.reconciler
                    .provision(
                        user_id,
                        self.policy.subscription_days,
                        self.policy.quota_gb,
                        false,
                    )
                    .await
            }
            PaymentAction::Renew => {
                self.reconciler
                    .renew(user_id, self.policy.subscription_days, self.policy.quota_gb)
                    .await
            }
        };

        if let Err(err) = self.ledger.credit(user_id, self.rewards.payment).await {
            error!(?err, %user_id, %intent_id, "failed to credit payment reward");
        }

        match fulfilment {
            Ok(entitlement) => Ok(Settlement::Settled {
                intent,
                entitlement,
            }),
            Err(error) => {
                error!(%error, %user_id, %intent_id, "settled payment could not be fulfilled");
                Ok(Settlement::SettledUnfulfilled { intent, error })
            }
        }
    }

    fn mark_settled(&self, intent_id: Uuid) -> AppResult<PaymentIntent> {
        let mut entry = self
            .intents
            .get_mut(&intent_id)
            .ok_or_else(|| AppError::Conflict(format!("unknown payment intent {intent_id}")))?;
        entry.status = PaymentStatus::Settled;
        entry.settled_at = Some(Utc::now());
        Ok(entry.clone())
    }

    fn payment_request(&self, user_id: i64, action: PaymentAction) -> PaymentRequest {
        let base = self.pricing.return_url.trim_end_matches('/');
        PaymentRequest {
            amount: self.pricing.amount,
            currency: self.pricing.currency.clone(),
            description: action.description().to_string(),
            return_urls: ReturnUrls {
                success: format!("{base}?start=payment_success_{user_id}"),
                fail: format!("{base}?start=payment_fail_{user_id}"),
            },
            line_items: vec![LineItem::single(action.description(), self.pricing.amount)],
            metadata: BTreeMap::from([
                ("action".to_string(), action.as_str().to_string()),
                ("user_id".to_string(), user_id.to_string()),
            ]),
        }
    }
}
