use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// key: accounts-model -> balance,trial flag,connection string
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub user_id: i64,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub patronymic: Option<String>,
    pub balance: i64,
    pub trial_used: bool,
    pub connection_string: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            username: None,
            display_name: None,
            email: None,
            phone_number: None,
            first_name: None,
            last_name: None,
            patronymic: None,
            balance: 0,
            trial_used: false,
            connection_string: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Overlays the provided profile fields. Absent fields keep their stored value.
    pub fn apply_profile(&mut self, profile: &AccountProfile) {
        fn merge(target: &mut Option<String>, value: &Option<String>) {
            if let Some(value) = value {
                *target = Some(value.clone());
            }
        }
        merge(&mut self.username, &profile.username);
        merge(&mut self.display_name, &profile.display_name);
        merge(&mut self.email, &profile.email);
        merge(&mut self.phone_number, &profile.phone_number);
        merge(&mut self.first_name, &profile.first_name);
        merge(&mut self.last_name, &profile.last_name);
        merge(&mut self.patronymic, &profile.patronymic);
        self.updated_at = Utc::now();
    }
}

/// Profile fields written by `upsert_account`. `None` means "leave as is".
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountProfile {
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub patronymic: Option<String>,
}

impl AccountProfile {
    pub fn with_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Self::default()
        }
    }
}
