use std::sync::Arc;

use tracing::{error, info, warn};

use crate::accounts::{
    Account, AccountProfile, AccountStore, LedgerUpdater, RewardPolicy, TrialGate,
};
use crate::error::{AppError, AppResult};
use crate::onboarding::{validate_field, OnboardingGate, ProfileField};
use crate::payments::{PaymentAction, PaymentIntent, PaymentWorkflow, ProviderKey, Settlement};
use crate::provisioning::{
    render_qr_png, EntitlementStatus, ProvisionKind, ProvisionedEntitlement, ProvisioningPolicy,
    ProvisioningReconciler, RemainingDays,
};
use crate::session::{ConversationState, SessionStore};

/// Successful results the front end renders.
#[derive(Debug)]
pub enum Reply {
    Granted(ProvisionedEntitlement),
    Status(Option<EntitlementStatus>),
    Connection {
        uri: String,
        qr_png: bytes::Bytes,
        remaining: RemainingDays,
    },
    Profile(Account),
    PaymentCreated(PaymentIntent),
    PaymentPending(PaymentIntent),
    PaymentAlreadySettled(PaymentIntent),
    Declined,
    /// The state that was left and the one now in effect.
    Back {
        left: ConversationState,
        current: ConversationState,
    },
}

/// key: orchestrator-outcome -> tagged result per intent
#[derive(Debug)]
pub enum Outcome {
    Success(Reply),
    PaymentRequired {
        action: PaymentAction,
        providers: Vec<ProviderKey>,
    },
    ConfirmationRequired {
        existing_days: RemainingDays,
    },
    OnboardingRequired {
        missing: Vec<ProfileField>,
    },
    Error(AppError),
}

impl Outcome {
    fn failed(error: AppError) -> Self {
        warn!(%error, "request ended with an error outcome");
        Outcome::Error(error)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }
}

/// key: subscription-orchestrator -> user intent -> gated provisioning
///
/// Composes the onboarding gate, trial gate, payment workflow, reconciler and ledger. Each
/// call is one conversation turn. The only state carried across turns is the explicit
/// [`ConversationState`] in the session store, and no lock outlives a single call.
pub struct SubscriptionOrchestrator {
    reconciler: Arc<ProvisioningReconciler>,
    payments: Arc<PaymentWorkflow>,
    store: Arc<dyn AccountStore>,
    trial: TrialGate,
    ledger: LedgerUpdater,
    onboarding: OnboardingGate,
    sessions: SessionStore,
    policy: ProvisioningPolicy,
    rewards: RewardPolicy,
}

impl SubscriptionOrchestrator {
    pub fn new(
        reconciler: Arc<ProvisioningReconciler>,
        payments: Arc<PaymentWorkflow>,
        store: Arc<dyn AccountStore>,
        onboarding: OnboardingGate,
        policy: ProvisioningPolicy,
        rewards: RewardPolicy,
    ) -> Self {
        Self {
            reconciler,
            payments,
            trial: TrialGate::new(store.clone()),
            ledger: LedgerUpdater::new(store.clone()),
            store,
            onboarding,
            sessions: SessionStore::new(),
            policy,
            rewards,
        }
    }

    pub fn session(&self, user_id: i64) -> ConversationState {
        self.sessions.get(user_id)
    }

    pub async fn request_subscription(&self, user_id: i64, username: Option<&str>) -> Outcome {
        self.try_request_subscription(user_id, username)
            .await
            .unwrap_or_else(Outcome::failed)
    }

    async fn try_request_subscription(
        &self,
        user_id: i64,
        username: Option<&str>,
    ) -> AppResult<Outcome> {
        self.capture_username(user_id, username).await?;
        if let Some(outcome) = self.onboarding_outcome(user_id).await? {
            return Ok(outcome);
        }

        let status = self.reconciler.status(user_id).await?;
        if let Some(status) = status.as_ref().filter(|status| status.is_active()) {
            info!(%user_id, remaining = %status.remaining, "active entitlement; asking before overwrite");
            self.sessions.set(
                user_id,
                ConversationState::ConfirmingOverwrite {
                    existing_days: status.remaining,
                },
            );
            return Ok(Outcome::ConfirmationRequired {
                existing_days: status.remaining,
            });
        }

        if let Some(outcome) = self.payment_required(user_id, PaymentAction::Create) {
            return Ok(outcome);
        }

        // An expired or disabled record is refreshed in place rather than reused.
        let allow_existing = status.is_none();
        let entitlement = self
            .reconciler
            .provision(
                user_id,
                self.policy.subscription_days,
                self.policy.quota_gb,
                allow_existing,
            )
            .await?;
        if entitlement.kind != ProvisionKind::Existing {
            self.reward(user_id, self.rewards.activation).await;
        }
        self.sessions.reset(user_id);
        Ok(Outcome::Success(Reply::Granted(entitlement)))
    }

    /// Answers a pending overwrite prompt. Accepting discards the remaining time.
    pub async fn confirm_overwrite(&self, user_id: i64, accept: bool) -> Outcome {
        self.try_confirm_overwrite(user_id, accept)
            .await
            .unwrap_or_else(Outcome::failed)
    }

    async fn try_confirm_overwrite(&self, user_id: i64, accept: bool) -> AppResult<Outcome> {
        let Some(existing_days) = self.sessions.take_overwrite_confirmation(user_id) else {
            return Err(AppError::Conflict("no overwrite confirmation pending".into()));
        };
        if !accept {
            info!(%user_id, "overwrite declined");
            return Ok(Outcome::Success(Reply::Declined));
        }

        if let Some(outcome) = self.payment_required(user_id, PaymentAction::Create) {
            return Ok(outcome);
        }

        info!(%user_id, discarded = %existing_days, "overwriting active entitlement");
        let entitlement = self
            .reconciler
            .provision(
                user_id,
                self.policy.subscription_days,
                self.policy.quota_gb,
                false,
            )
            .await?;
        self.reward(user_id, self.rewards.activation).await;
        Ok(Outcome::Success(Reply::Granted(entitlement)))
    }

    pub async fn request_renewal(&self, user_id: i64) -> Outcome {
        self.try_request_renewal(user_id)
            .await
            .unwrap_or_else(Outcome::failed)
    }

    async fn try_request_renewal(&self, user_id: i64) -> AppResult<Outcome> {
        if self.payments.is_enabled() {
            // A renewal payment needs an entitlement to apply to.
            if self.reconciler.status(user_id).await?.is_none() {
                return Err(AppError::NotFound(user_id));
            }
        }
        if let Some(outcome) = self.payment_required(user_id, PaymentAction::Renew) {
            return Ok(outcome);
        }

        let entitlement = self
            .reconciler
            .renew(user_id, self.policy.subscription_days, self.policy.quota_gb)
            .await?;
        self.reward(user_id, self.rewards.renewal).await;
        self.sessions.reset(user_id);
        Ok(Outcome::Success(Reply::Granted(entitlement)))
    }

    pub async fn request_trial(&self, user_id: i64, username: Option<&str>) -> Outcome {
        self.try_request_trial(user_id, username)
            .await
            .unwrap_or_else(Outcome::failed)
    }

    async fn try_request_trial(&self, user_id: i64, username: Option<&str>) -> AppResult<Outcome> {
        if !self.policy.trial_enabled {
            return Err(AppError::Conflict("trial is disabled".into()));
        }
        if !self.trial.is_eligible(user_id).await? {
            info!(%user_id, "trial already used");
            return Err(AppError::Conflict("trial already used".into()));
        }

        self.capture_username(user_id, username).await?;
        if let Some(outcome) = self.onboarding_outcome(user_id).await? {
            return Ok(outcome);
        }

        let entitlement = self
            .reconciler
            .provision(user_id, self.policy.trial_days, self.policy.quota_gb, true)
            .await?;

        if entitlement.kind == ProvisionKind::Existing {
            info!(%user_id, remaining = %entitlement.remaining, "trial refused; active entitlement in place");
            return Err(AppError::Conflict(
                "an active subscription is already in place".into(),
            ));
        }

        self.trial.mark_used(user_id).await?;
        self.reward(user_id, self.rewards.trial).await;
        Ok(Outcome::Success(Reply::Granted(entitlement)))
    }

    /// Read-only. A user without an entitlement is a valid answer, not an error.
    pub async fn status(&self, user_id: i64) -> Outcome {
        match self.reconciler.status(user_id).await {
            Ok(status) => Outcome::Success(Reply::Status(status)),
            Err(error) => Outcome::failed(error),
        }
    }

    pub async fn connection(&self, user_id: i64) -> Outcome {
        self.try_connection(user_id)
            .await
            .unwrap_or_else(Outcome::failed)
    }

    async fn try_connection(&self, user_id: i64) -> AppResult<Outcome> {
        let status = self
            .reconciler
            .status(user_id)
            .await?
            .ok_or(AppError::NotFound(user_id))?;
        let uri = self
            .store
            .get_connection_string(user_id)
            .await
            .map_err(AppError::Storage)?
            .ok_or(AppError::NotFound(user_id))?;
        let qr_png = render_qr_png(&uri).map_err(AppError::Panel)?;
        Ok(Outcome::Success(Reply::Connection {
            uri,
            qr_png,
            remaining: status.remaining,
        }))
    }

    pub async fn profile(&self, user_id: i64) -> Outcome {
        match self.store.get_account(user_id).await {
            Ok(account) => Outcome::Success(Reply::Profile(
                account.unwrap_or_else(|| Account::new(user_id)),
            )),
            Err(error) => Outcome::failed(AppError::Storage(error)),
        }
    }

    /// Stores one validated registration answer.
    pub async fn update_profile(&self, user_id: i64, field: ProfileField, value: &str) -> Outcome {
        self.try_update_profile(user_id, field, value)
            .await
            .unwrap_or_else(Outcome::failed)
    }

    async fn try_update_profile(
        &self,
        user_id: i64,
        field: ProfileField,
        value: &str,
    ) -> AppResult<Outcome> {
        let value = validate_field(field, value)?;
        let account = self
            .store
            .upsert_account(user_id, &field.profile_update(value))
            .await
            .map_err(AppError::Storage)?;
        info!(%user_id, %field, "profile field stored");
        Ok(Outcome::Success(Reply::Profile(account)))
    }

    pub async fn select_payment(&self, user_id: i64, provider: ProviderKey) -> Outcome {
        self.try_select_payment(user_id, provider)
            .await
            .unwrap_or_else(Outcome::failed)
    }

    async fn try_select_payment(&self, user_id: i64, provider: ProviderKey) -> AppResult<Outcome> {
        let ConversationState::SelectingPaymentMethod { action } = self.sessions.get(user_id)
        else {
            return Err(AppError::Conflict("no payment method selection pending".into()));
        };
        let intent = self.payments.select_method(user_id, provider, action).await?;
        self.sessions.set(
            user_id,
            ConversationState::AwaitingPayment {
                intent_id: intent.id,
                action,
            },
        );
        Ok(Outcome::Success(Reply::PaymentCreated(intent)))
    }

    pub async fn check_payment(&self, user_id: i64) -> Outcome {
        self.try_check_payment(user_id)
            .await
            .unwrap_or_else(Outcome::failed)
    }

    async fn try_check_payment(&self, user_id: i64) -> AppResult<Outcome> {
        let ConversationState::AwaitingPayment { intent_id, .. } = self.sessions.get(user_id)
        else {
            return Err(AppError::Conflict("no payment awaiting confirmation".into()));
        };

        let settlement = self.payments.check_and_settle(user_id, intent_id).await?;
        if !matches!(settlement, Settlement::Pending(_)) {
            self.sessions.reset(user_id);
            self.payments.acknowledge(user_id, intent_id).await;
        }

        match settlement {
            Settlement::Pending(intent) => Ok(Outcome::Success(Reply::PaymentPending(intent))),
            Settlement::Settled { entitlement, .. } => {
                Ok(Outcome::Success(Reply::Granted(entitlement)))
            }
            Settlement::SettledUnfulfilled { error, .. } => Err(error),
            Settlement::AlreadySettled(intent) => {
                Ok(Outcome::Success(Reply::PaymentAlreadySettled(intent)))
            }
        }
    }

    /// "Back" from the current state. Leaving AwaitingPayment abandons its intent.
    pub async fn back(&self, user_id: i64) -> Outcome {
        let left = self.sessions.back(user_id);
        if let ConversationState::AwaitingPayment { intent_id, .. } = left {
            match self.payments.cancel(user_id, intent_id).await {
                Ok(_) => {
                    self.payments.acknowledge(user_id, intent_id).await;
                }
                Err(error) => {
                    warn!(%error, %user_id, %intent_id, "failed to abandon payment intent")
                }
            }
        }
        Outcome::Success(Reply::Back {
            left,
            current: self.sessions.get(user_id),
        })
    }

    pub fn payments(&self) -> &PaymentWorkflow {
        &self.payments
    }

    async fn capture_username(&self, user_id: i64, username: Option<&str>) -> AppResult<()> {
        let Some(username) = username.map(str::trim).filter(|name| !name.is_empty()) else {
            return Ok(());
        };
        self.store
            .upsert_account(user_id, &AccountProfile::with_username(username))
            .await
            .map_err(AppError::Storage)?;
        Ok(())
    }

    async fn onboarding_outcome(&self, user_id: i64) -> AppResult<Option<Outcome>> {
        if self.onboarding.required().is_empty() {
            return Ok(None);
        }
        let account = self
            .store
            .get_account(user_id)
            .await
            .map_err(AppError::Storage)?;
        let missing = self.onboarding.missing(account.as_ref());
        if missing.is_empty() {
            return Ok(None);
        }
        info!(%user_id, ?missing, "onboarding incomplete");
        Ok(Some(Outcome::OnboardingRequired { missing }))
    }

    fn payment_required(&self, user_id: i64, action: PaymentAction) -> Option<Outcome> {
        if !self.payments.is_enabled() {
            return None;
        }
        self.sessions
            .set(user_id, ConversationState::SelectingPaymentMethod { action });
        Some(Outcome::PaymentRequired {
            action,
            providers: self.payments.available_providers(),
        })
    }

    async fn reward(&self, user_id: i64, amount: i64) {
        if let Err(err) = self.ledger.credit(user_id, amount).await {
            error!(%err, %user_id, amount, "failed to credit reward");
        }
    }
}
