pub mod ledger;
pub mod models;
pub mod store;

pub use ledger::{LedgerUpdater, RewardPolicy, TrialGate};
pub use models::{Account, AccountProfile};
pub use store::{AccountStore, PgAccountStore};
