use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::payments::PaymentAction;
use crate::provisioning::RemainingDays;

/// key: session-state -> per-user conversation position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConversationState {
    #[default]
    Idle,
    ConfirmingOverwrite {
        existing_days: RemainingDays,
    },
    SelectingPaymentMethod {
        action: PaymentAction,
    },
    AwaitingPayment {
        intent_id: Uuid,
        action: PaymentAction,
    },
}

impl ConversationState {
    /// Where "back" leads from this state.
    pub fn back(&self) -> ConversationState {
        match self {
            ConversationState::AwaitingPayment { action, .. } => {
                ConversationState::SelectingPaymentMethod { action: *action }
            }
            _ => ConversationState::Idle,
        }
    }
}

/// Conversation state for every user. Each entry is owned by its user's sequential turns.
#[derive(Debug, Default)]
pub struct SessionStore {
    states: DashMap<i64, ConversationState>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: i64) -> ConversationState {
        self.states
            .get(&user_id)
            .map(|entry| entry.clone())
            .unwrap_or_default()
    }

    pub fn set(&self, user_id: i64, state: ConversationState) {
        if state == ConversationState::Idle {
            self.states.remove(&user_id);
        } else {
            self.states.insert(user_id, state);
        }
    }

    pub fn reset(&self, user_id: i64) {
        self.states.remove(&user_id);
    }

    /// Applies "back" and returns the state that was left.
    pub fn back(&self, user_id: i64) -> ConversationState {
        let previous = self.get(user_id);
        self.set(user_id, previous.back());
        previous
    }

    /// Leaves ConfirmingOverwrite, returning the days that were on offer.
    pub fn take_overwrite_confirmation(&self, user_id: i64) -> Option<RemainingDays> {
        let (_, state) = self.states.remove_if(&user_id, |_, state| {
            matches!(state, ConversationState::ConfirmingOverwrite { .. })
        })?;
        match state {
            ConversationState::ConfirmingOverwrite { existing_days } => Some(existing_days),
            _ => None,
        }
    }
}
