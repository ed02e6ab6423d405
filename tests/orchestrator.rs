mod common;

use common::{now_ms, policy, FakePanel, HarnessBuilder, DAY_MS};
use vpn_backend::error::AppError;
use vpn_backend::onboarding::{OnboardingGate, ProfileField};
use vpn_backend::orchestrator::{Outcome, Reply};
use vpn_backend::provisioning::{ProvisionKind, RemainingDays};
use vpn_backend::session::ConversationState;

// key: orchestrator-tests -> subscription,trial,overwrite,status

fn granted(outcome: Outcome) -> vpn_backend::provisioning::ProvisionedEntitlement {
    match outcome {
        Outcome::Success(Reply::Granted(entitlement)) => entitlement,
        other => panic!("expected a grant, got {other:?}"),
    }
}

#[tokio::test]
async fn new_subscription_provisions_and_credits_activation_reward() {
    let harness = HarnessBuilder::new().build();

    let entitlement = granted(
        harness
            .orchestrator
            .request_subscription(42, Some("alice"))
            .await,
    );

    assert_eq!(entitlement.kind, ProvisionKind::Created);
    let account = harness.store.account(42).unwrap();
    assert_eq!(account.username.as_deref(), Some("alice"));
    assert_eq!(account.balance, 5);
    assert_eq!(
        account.connection_string.as_deref(),
        Some(entitlement.artifact.uri.as_str())
    );
}

#[tokio::test]
async fn active_entitlement_requires_confirmation_before_overwrite() {
    let now = now_ms();
    let panel = FakePanel::default().with_client("42", now + 9 * DAY_MS + DAY_MS / 2);
    let harness = HarnessBuilder::new().panel(panel).build();

    let outcome = harness.orchestrator.request_subscription(42, None).await;
    assert!(matches!(
        outcome,
        Outcome::ConfirmationRequired {
            existing_days: RemainingDays::Days(10)
        }
    ));
    assert_eq!(FakePanel::count(&harness.panel.calls.update), 0);
    assert_eq!(FakePanel::count(&harness.panel.calls.create), 0);

    let entitlement = granted(harness.orchestrator.confirm_overwrite(42, true).await);
    assert_eq!(entitlement.kind, ProvisionKind::Overwritten);
    assert_eq!(entitlement.identity, "uuid-42");
    assert_eq!(entitlement.remaining, RemainingDays::Days(31));
    assert_eq!(FakePanel::count(&harness.panel.calls.update), 1);
    // Prior time is discarded, not added on top.
    assert!(harness.panel.client("42").unwrap().expiry_time < now + 31 * DAY_MS);
}

#[tokio::test]
async fn declining_overwrite_keeps_the_entitlement() {
    let panel = FakePanel::default().with_client("42", now_ms() + 5 * DAY_MS);
    let harness = HarnessBuilder::new().panel(panel).build();

    harness.orchestrator.request_subscription(42, None).await;
    let outcome = harness.orchestrator.confirm_overwrite(42, false).await;

    assert!(matches!(outcome, Outcome::Success(Reply::Declined)));
    assert_eq!(harness.orchestrator.session(42), ConversationState::Idle);
    assert_eq!(FakePanel::count(&harness.panel.calls.update), 0);
}

#[tokio::test]
async fn confirm_without_prompt_is_a_conflict() {
    let harness = HarnessBuilder::new().build();

    let outcome = harness.orchestrator.confirm_overwrite(42, true).await;

    assert!(matches!(outcome, Outcome::Error(AppError::Conflict(_))));
    assert_eq!(harness.panel.calls.total(), 0);
}

#[tokio::test]
async fn expired_entitlement_is_refreshed_without_prompt() {
    let panel = FakePanel::default().with_client("42", now_ms() - DAY_MS);
    let harness = HarnessBuilder::new().panel(panel).build();

    let entitlement = granted(harness.orchestrator.request_subscription(42, None).await);

    assert_eq!(entitlement.kind, ProvisionKind::Overwritten);
    assert_eq!(entitlement.remaining, RemainingDays::Days(31));
}

#[tokio::test]
async fn expired_client_missed_by_lookup_is_refreshed_and_rewarded() {
    let now = now_ms();
    let panel = FakePanel::default().with_client("42", now - 2 * DAY_MS);
    panel
        .state
        .lock()
        .unwrap()
        .hidden_from_probe
        .push("42".into());
    let harness = HarnessBuilder::new().panel(panel).build();

    let entitlement = granted(harness.orchestrator.request_subscription(42, None).await);

    assert_eq!(entitlement.kind, ProvisionKind::Overwritten);
    assert_eq!(entitlement.identity, "uuid-42");
    assert_eq!(entitlement.remaining, RemainingDays::Days(31));
    assert!(harness.panel.client("42").unwrap().expiry_time > now);
    assert_eq!(FakePanel::count(&harness.panel.calls.update), 1);
    assert_eq!(harness.store.balance(42), 5);
}

#[tokio::test]
async fn second_trial_is_refused_without_panel_calls() {
    let harness = HarnessBuilder::new().build();

    let entitlement = granted(harness.orchestrator.request_trial(42, Some("bob")).await);
    assert_eq!(entitlement.remaining, RemainingDays::Days(4));
    let account = harness.store.account(42).unwrap();
    assert!(account.trial_used);
    assert_eq!(account.balance, 5);

    let calls_before = harness.panel.calls.total();
    let outcome = harness.orchestrator.request_trial(42, Some("bob")).await;

    assert!(matches!(outcome, Outcome::Error(AppError::Conflict(_))));
    assert_eq!(harness.panel.calls.total(), calls_before);
    assert_eq!(harness.store.balance(42), 5);
}

#[tokio::test]
async fn failed_trial_provisioning_keeps_the_grant() {
    let panel = FakePanel::default();
    panel.state.lock().unwrap().fail_create = true;
    let harness = HarnessBuilder::new().panel(panel).build();

    let outcome = harness.orchestrator.request_trial(42, None).await;

    assert!(matches!(outcome, Outcome::Error(AppError::Panel(_))));
    let account = harness.store.account(42);
    assert!(!account.map_or(false, |account| account.trial_used));
    assert_eq!(harness.store.balance(42), 0);

    harness.panel.state.lock().unwrap().fail_create = false;
    let retried = granted(harness.orchestrator.request_trial(42, None).await);
    assert_eq!(retried.kind, ProvisionKind::Created);
}

#[tokio::test]
async fn trial_over_expired_client_grants_fresh_terms() {
    let now = now_ms();
    let panel = FakePanel::default().with_client("42", now - 5 * DAY_MS);
    let harness = HarnessBuilder::new().panel(panel).build();

    let entitlement = granted(harness.orchestrator.request_trial(42, None).await);

    assert_eq!(entitlement.kind, ProvisionKind::Overwritten);
    assert_eq!(entitlement.remaining, RemainingDays::Days(4));
    assert!(harness.panel.client("42").unwrap().expiry_time > now);
    let account = harness.store.account(42).unwrap();
    assert!(account.trial_used);
    assert_eq!(account.balance, 5);

    let again = harness.orchestrator.request_trial(42, None).await;
    assert!(matches!(again, Outcome::Error(AppError::Conflict(_))));
}

#[tokio::test]
async fn trial_with_active_subscription_is_refused_and_not_burned() {
    let panel = FakePanel::default().with_client("42", now_ms() + 10 * DAY_MS);
    let harness = HarnessBuilder::new().panel(panel).build();

    let outcome = harness.orchestrator.request_trial(42, None).await;

    assert!(matches!(outcome, Outcome::Error(AppError::Conflict(_))));
    assert!(!harness
        .store
        .account(42)
        .map_or(false, |account| account.trial_used));
    assert_eq!(harness.store.balance(42), 0);
    assert_eq!(FakePanel::count(&harness.panel.calls.update), 0);
}

#[tokio::test]
async fn disabled_trial_touches_nothing() {
    let mut policy = policy();
    policy.trial_enabled = false;
    let harness = HarnessBuilder::new().policy(policy).build();

    let outcome = harness.orchestrator.request_trial(42, Some("carol")).await;

    assert!(matches!(outcome, Outcome::Error(AppError::Conflict(_))));
    assert_eq!(harness.panel.calls.total(), 0);
    assert!(harness.store.account(42).is_none());
}

#[tokio::test]
async fn onboarding_blocks_provisioning_until_fields_are_filled() {
    let harness = HarnessBuilder::new()
        .onboarding(OnboardingGate::new(vec![
            ProfileField::Email,
            ProfileField::Phone,
        ]))
        .build();

    let outcome = harness.orchestrator.request_subscription(42, None).await;
    match outcome {
        Outcome::OnboardingRequired { missing } => {
            assert_eq!(missing, vec![ProfileField::Email, ProfileField::Phone])
        }
        other => panic!("expected onboarding, got {other:?}"),
    }
    assert_eq!(harness.panel.calls.total(), 0);

    let invalid = harness
        .orchestrator
        .update_profile(42, ProfileField::Email, "not-an-email")
        .await;
    assert!(matches!(invalid, Outcome::Error(AppError::Validation { .. })));

    harness
        .orchestrator
        .update_profile(42, ProfileField::Email, "a@example.com")
        .await;
    harness
        .orchestrator
        .update_profile(42, ProfileField::Phone, "+7 900 123")
        .await;

    let entitlement = granted(harness.orchestrator.request_subscription(42, None).await);
    assert_eq!(entitlement.kind, ProvisionKind::Created);
}

#[tokio::test]
async fn status_of_unknown_user_is_not_an_error() {
    let harness = HarnessBuilder::new().build();

    let outcome = harness.orchestrator.status(99).await;

    assert!(matches!(outcome, Outcome::Success(Reply::Status(None))));
}

#[tokio::test]
async fn renewal_without_entitlement_asks_to_subscribe_first() {
    let harness = HarnessBuilder::new().build();

    let outcome = harness.orchestrator.request_renewal(42).await;

    match outcome {
        Outcome::Error(error) => {
            assert!(matches!(error, AppError::NotFound(42)));
            assert!(error.user_message().contains("subscribe first"));
        }
        other => panic!("expected not found, got {other:?}"),
    }
    assert_eq!(harness.store.balance(42), 0);
}

#[tokio::test]
async fn renewal_during_lookup_fault_is_not_reported_as_missing() {
    let panel = FakePanel::default().with_client("42", now_ms() + 3 * DAY_MS);
    panel.state.lock().unwrap().fail_lookup = true;
    let harness = HarnessBuilder::new().panel(panel).build();

    let outcome = harness.orchestrator.request_renewal(42).await;

    assert!(matches!(outcome, Outcome::Error(AppError::Panel(_))));
    assert_eq!(harness.store.balance(42), 0);
}

#[tokio::test]
async fn renewal_extends_and_credits_renewal_reward() {
    let panel = FakePanel::default().with_client("42", now_ms() + 3 * DAY_MS);
    let harness = HarnessBuilder::new().panel(panel).build();

    let entitlement = granted(harness.orchestrator.request_renewal(42).await);

    assert_eq!(entitlement.kind, ProvisionKind::Renewed);
    assert_eq!(harness.store.balance(42), 3);
}

#[tokio::test]
async fn connection_returns_stored_uri_with_fresh_qr() {
    let harness = HarnessBuilder::new().build();
    let entitlement = granted(harness.orchestrator.request_subscription(42, None).await);

    match harness.orchestrator.connection(42).await {
        Outcome::Success(Reply::Connection { uri, qr_png, .. }) => {
            assert_eq!(uri, entitlement.artifact.uri);
            assert_eq!(qr_png, entitlement.artifact.qr_png);
        }
        other => panic!("expected connection, got {other:?}"),
    }

    assert!(matches!(
        harness.orchestrator.connection(7).await,
        Outcome::Error(AppError::NotFound(7))
    ));
}

#[tokio::test]
async fn profile_of_new_user_is_empty_account() {
    let harness = HarnessBuilder::new().build();

    match harness.orchestrator.profile(11).await {
        Outcome::Success(Reply::Profile(account)) => {
            assert_eq!(account.user_id, 11);
            assert_eq!(account.balance, 0);
            assert!(!account.trial_used);
        }
        other => panic!("expected profile, got {other:?}"),
    }
}
