#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use vpn_backend::accounts::{Account, AccountProfile, AccountStore, RewardPolicy};
use vpn_backend::onboarding::OnboardingGate;
use vpn_backend::orchestrator::SubscriptionOrchestrator;
use vpn_backend::panel::{
    ClientSpec, ClientView, InboundClient, InboundSnapshot, PanelApi, PanelSession, RealityParams,
};
use vpn_backend::payments::{
    CreatedPayment, PaymentGateway, PaymentPricing, PaymentProvider, PaymentRequest, ProviderKey,
};
use vpn_backend::provisioning::{ConnectionEndpoint, ProvisioningPolicy};
use vpn_backend::Dependencies;

pub const INBOUND_ID: u32 = 1;
pub const DAY_MS: i64 = 86_400_000;

#[derive(Default)]
pub struct PanelCalls {
    pub authenticate: AtomicUsize,
    pub get_inbound: AtomicUsize,
    pub find_client: AtomicUsize,
    pub create: AtomicUsize,
    pub update: AtomicUsize,
}

impl PanelCalls {
    pub fn total(&self) -> usize {
        [
            &self.authenticate,
            &self.get_inbound,
            &self.find_client,
            &self.create,
            &self.update,
        ]
        .iter()
        .map(|counter| counter.load(Ordering::SeqCst))
        .sum()
    }
}

#[derive(Default)]
pub struct PanelState {
    pub clients: Vec<InboundClient>,
    pub fail_auth: bool,
    pub fail_create: bool,
    /// Refuse the email-keyed lookup the way a faulting panel does.
    pub fail_lookup: bool,
    /// Acknowledge creates without listing the client afterwards.
    pub drop_created: bool,
    /// Emails the email-keyed lookup pretends not to know.
    pub hidden_from_probe: Vec<String>,
}

/// In-memory panel with a single reality inbound.
#[derive(Clone, Default)]
pub struct FakePanel {
    pub state: Arc<Mutex<PanelState>>,
    pub calls: Arc<PanelCalls>,
}

impl FakePanel {
    pub fn with_client(self, email: &str, expiry_time: i64) -> Self {
        self.state.lock().unwrap().clients.push(InboundClient {
            id: format!("uuid-{email}"),
            email: email.to_string(),
            enable: true,
            expiry_time,
            total_bytes: 0,
        });
        self
    }

    pub fn client(&self, email: &str) -> Option<InboundClient> {
        self.state
            .lock()
            .unwrap()
            .clients
            .iter()
            .find(|client| client.email == email)
            .cloned()
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PanelApi for FakePanel {
    async fn authenticate(&self) -> Result<Box<dyn PanelSession>> {
        self.calls.authenticate.fetch_add(1, Ordering::SeqCst);
        if self.state.lock().unwrap().fail_auth {
            bail!("bad credentials");
        }
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl PanelSession for FakePanel {
    async fn get_inbound(&self, inbound_id: u32) -> Result<InboundSnapshot> {
        self.calls.get_inbound.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        Ok(InboundSnapshot {
            id: inbound_id,
            remark: "Srv".into(),
            reality: RealityParams {
                public_key: "PK".into(),
                server_names: vec!["example.com".into()],
                short_ids: vec!["ab".into()],
            },
            clients: state.clients.clone(),
        })
    }

    async fn find_client_by_email(&self, email: &str) -> Result<Option<ClientView>> {
        self.calls.find_client.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock().unwrap();
        if state.fail_lookup {
            bail!("panel refused client lookup for {email}: database is locked");
        }
        if state.hidden_from_probe.iter().any(|hidden| hidden == email) {
            return Ok(None);
        }
        Ok(state
            .clients
            .iter()
            .enumerate()
            .find(|(_, client)| client.email == email)
            .map(|(index, client)| ClientView {
                id: index as i64 + 100,
                inbound_id: INBOUND_ID,
                email: client.email.clone(),
                enable: client.enable,
                expiry_time: client.expiry_time,
                total_bytes: client.total_bytes,
            }))
    }

    async fn create_client(&self, _inbound_id: u32, client: &ClientSpec) -> Result<()> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if state.fail_create {
            bail!("panel timed out");
        }
        if !state.drop_created {
            state.clients.push(InboundClient {
                id: client.id.clone(),
                email: client.email.clone(),
                enable: client.enable,
                expiry_time: client.expiry_time,
                total_bytes: client.total_bytes,
            });
        }
        Ok(())
    }

    async fn update_client(
        &self,
        _inbound_id: u32,
        identity: &str,
        client: &ClientSpec,
    ) -> Result<()> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let existing = state
            .clients
            .iter_mut()
            .find(|existing| existing.id == identity)
            .ok_or_else(|| anyhow!("client {identity} not found"))?;
        existing.enable = client.enable;
        existing.expiry_time = client.expiry_time;
        existing.total_bytes = client.total_bytes;
        Ok(())
    }
}

/// In-memory account store.
#[derive(Default)]
pub struct MemoryStore {
    pub accounts: Mutex<HashMap<i64, Account>>,
    pub credits: AtomicUsize,
}

impl MemoryStore {
    pub fn account(&self, user_id: i64) -> Option<Account> {
        self.accounts.lock().unwrap().get(&user_id).cloned()
    }

    pub fn balance(&self, user_id: i64) -> i64 {
        self.account(user_id).map_or(0, |account| account.balance)
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn get_account(&self, user_id: i64) -> Result<Option<Account>> {
        Ok(self.account(user_id))
    }

    async fn upsert_account(&self, user_id: i64, profile: &AccountProfile) -> Result<Account> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .entry(user_id)
            .or_insert_with(|| Account::new(user_id));
        account.apply_profile(profile);
        Ok(account.clone())
    }

    async fn credit_balance(&self, user_id: i64, amount: i64) -> Result<i64> {
        self.credits.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .entry(user_id)
            .or_insert_with(|| Account::new(user_id));
        account.balance += amount;
        account.updated_at = Utc::now();
        Ok(account.balance)
    }

    async fn get_trial_used(&self, user_id: i64) -> Result<bool> {
        Ok(self.account(user_id).map_or(false, |account| account.trial_used))
    }

    async fn set_trial_used(&self, user_id: i64) -> Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        accounts
            .entry(user_id)
            .or_insert_with(|| Account::new(user_id))
            .trial_used = true;
        Ok(())
    }

    async fn save_connection_string(&self, user_id: i64, connection_string: &str) -> Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        accounts
            .entry(user_id)
            .or_insert_with(|| Account::new(user_id))
            .connection_string = Some(connection_string.to_string());
        Ok(())
    }

    async fn get_connection_string(&self, user_id: i64) -> Result<Option<String>> {
        Ok(self
            .account(user_id)
            .and_then(|account| account.connection_string))
    }
}

/// Payment provider whose status answers are scripted poll by poll.
pub struct ScriptedProvider {
    key: ProviderKey,
    pub answers: Mutex<VecDeque<bool>>,
    pub fail_create: bool,
    pub created: AtomicUsize,
    pub checks: AtomicUsize,
    pub last_request: Mutex<Option<PaymentRequest>>,
}

impl ScriptedProvider {
    pub fn new(key: ProviderKey, answers: &[bool]) -> Self {
        Self {
            key,
            answers: Mutex::new(answers.iter().copied().collect()),
            fail_create: false,
            created: AtomicUsize::new(0),
            checks: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn failing(key: ProviderKey) -> Self {
        Self {
            fail_create: true,
            ..Self::new(key, &[])
        }
    }
}

#[async_trait]
impl PaymentProvider for ScriptedProvider {
    fn key(&self) -> ProviderKey {
        self.key
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<CreatedPayment> {
        if self.fail_create {
            bail!("gateway returned 500");
        }
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(CreatedPayment {
            payment_id: format!("pay-{n}"),
            redirect_url: format!("https://pay.example.com/pay-{n}"),
        })
    }

    async fn check_payment(&self, _payment_id: &str) -> Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.lock().unwrap().pop_front().unwrap_or(false))
    }
}

pub fn policy() -> ProvisioningPolicy {
    ProvisioningPolicy {
        inbound_id: INBOUND_ID,
        subscription_days: 30,
        trial_days: 3,
        trial_enabled: true,
        quota_gb: 0,
        endpoint: ConnectionEndpoint {
            host: "1.2.3.4".into(),
            port: 443,
        },
    }
}

pub fn pricing() -> PaymentPricing {
    PaymentPricing {
        amount: 199.0,
        currency: "RUB".into(),
        return_url: "https://t.me/vpn_bot".into(),
    }
}

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct Harness {
    pub panel: FakePanel,
    pub store: Arc<MemoryStore>,
    pub orchestrator: SubscriptionOrchestrator,
}

pub struct HarnessBuilder {
    panel: FakePanel,
    providers: Vec<Arc<dyn PaymentProvider>>,
    payments_enabled: bool,
    policy: ProvisioningPolicy,
    onboarding: OnboardingGate,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            panel: FakePanel::default(),
            providers: Vec::new(),
            payments_enabled: false,
            policy: policy(),
            onboarding: OnboardingGate::default(),
        }
    }

    pub fn panel(mut self, panel: FakePanel) -> Self {
        self.panel = panel;
        self
    }

    pub fn provider(mut self, provider: Arc<dyn PaymentProvider>) -> Self {
        self.payments_enabled = true;
        self.providers.push(provider);
        self
    }

    pub fn policy(mut self, policy: ProvisioningPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn onboarding(mut self, onboarding: OnboardingGate) -> Self {
        self.onboarding = onboarding;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::default());
        let orchestrator = Dependencies {
            panel: Arc::new(self.panel.clone()),
            store: store.clone(),
            gateway: PaymentGateway::new(self.payments_enabled, self.providers),
            policy: self.policy,
            rewards: RewardPolicy::default(),
            pricing: pricing(),
            onboarding: self.onboarding,
        }
        .into_orchestrator();
        Harness {
            panel: self.panel,
            store,
            orchestrator,
        }
    }
}

pub fn timeout() -> Duration {
    Duration::from_secs(5)
}
