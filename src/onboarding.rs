use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::accounts::{Account, AccountProfile};
use crate::error::{AppError, AppResult};

/// key: onboarding-field -> collectable profile attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Email,
    Phone,
    FirstName,
    LastName,
    Patronymic,
}

impl ProfileField {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileField::Email => "email",
            ProfileField::Phone => "phone",
            ProfileField::FirstName => "first_name",
            ProfileField::LastName => "last_name",
            ProfileField::Patronymic => "patronymic",
        }
    }

    fn value<'a>(&self, account: &'a Account) -> Option<&'a str> {
        match self {
            ProfileField::Email => account.email.as_deref(),
            ProfileField::Phone => account.phone_number.as_deref(),
            ProfileField::FirstName => account.first_name.as_deref(),
            ProfileField::LastName => account.last_name.as_deref(),
            ProfileField::Patronymic => account.patronymic.as_deref(),
        }
    }

    /// Builds the partial profile that writes just this field.
    pub fn profile_update(&self, value: String) -> AccountProfile {
        let mut profile = AccountProfile::default();
        match self {
            ProfileField::Email => profile.email = Some(value),
            ProfileField::Phone => profile.phone_number = Some(value),
            ProfileField::FirstName => profile.first_name = Some(value),
            ProfileField::LastName => profile.last_name = Some(value),
            ProfileField::Patronymic => profile.patronymic = Some(value),
        }
        profile
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(ProfileField::Email),
            "phone" | "phone_number" => Ok(ProfileField::Phone),
            "first_name" => Ok(ProfileField::FirstName),
            "last_name" => Ok(ProfileField::LastName),
            "patronymic" => Ok(ProfileField::Patronymic),
            other => Err(format!("unknown profile field '{other}'")),
        }
    }
}

/// key: onboarding-gate -> provisioning prerequisite
///
/// Holds the ordered list of profile fields that must be present on the account before
/// any grant is provisioned. An empty list disables the gate.
#[derive(Debug, Clone, Default)]
pub struct OnboardingGate {
    required: Vec<ProfileField>,
}

impl OnboardingGate {
    pub fn new(required: Vec<ProfileField>) -> Self {
        Self { required }
    }

    pub fn required(&self) -> &[ProfileField] {
        &self.required
    }

    /// Fields still missing, in configured order.
    pub fn missing(&self, account: Option<&Account>) -> Vec<ProfileField> {
        self.required
            .iter()
            .copied()
            .filter(|field| {
                account
                    .and_then(|account| field.value(account))
                    .map_or(true, |value| value.trim().is_empty())
            })
            .collect()
    }
}

/// Checks one registration answer and returns it trimmed.
pub fn validate_field(field: ProfileField, value: &str) -> AppResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(field.as_str(), "value must not be empty"));
    }

    let valid = match field {
        ProfileField::Email => value.contains('@') && value.contains('.'),
        ProfileField::Phone => {
            value.chars().any(|c| c.is_ascii_digit()) && value.chars().count() >= 5
        }
        ProfileField::FirstName | ProfileField::LastName | ProfileField::Patronymic => {
            value.chars().count() >= 2
        }
    };

    if valid {
        Ok(value.to_string())
    } else {
        let reason = match field {
            ProfileField::Email => "expected an address like name@example.com",
            ProfileField::Phone => "expected at least five characters including digits",
            _ => "expected at least two characters",
        };
        Err(AppError::validation(field.as_str(), reason))
    }
}
