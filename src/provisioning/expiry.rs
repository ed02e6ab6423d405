use std::fmt;

use serde::{Serialize, Serializer};

pub const MS_PER_DAY: i64 = 86_400_000;
pub const BYTES_PER_GB: u64 = 1_000_000_000;

/// Days left on an entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemainingDays {
    Unlimited,
    Days(u32),
}

impl RemainingDays {
    pub fn is_expired(&self) -> bool {
        matches!(self, RemainingDays::Days(0))
    }
}

impl fmt::Display for RemainingDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemainingDays::Unlimited => f.write_str("unlimited"),
            RemainingDays::Days(days) => write!(f, "{days}"),
        }
    }
}

impl Serialize for RemainingDays {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RemainingDays::Unlimited => serializer.serialize_str("unlimited"),
            RemainingDays::Days(days) => serializer.serialize_u32(*days),
        }
    }
}

/// Remaining days counted inclusive of the current day; `0` once expired.
pub fn remaining_days(expiry_ms: i64, now_ms: i64) -> RemainingDays {
    if expiry_ms == 0 {
        return RemainingDays::Unlimited;
    }
    let days = (expiry_ms - now_ms).div_euclid(MS_PER_DAY);
    if days >= 0 {
        RemainingDays::Days(u32::try_from(days + 1).unwrap_or(u32::MAX))
    } else {
        RemainingDays::Days(0)
    }
}

/// Absolute expiry in epoch-ms, `0` for an unlimited grant.
pub fn expiry_ms(duration_days: u32, now_ms: i64) -> i64 {
    if duration_days == 0 {
        0
    } else {
        now_ms + i64::from(duration_days) * MS_PER_DAY
    }
}

/// Quota in decimal bytes, `0` for unlimited.
pub fn quota_bytes(quota_gb: u64) -> i64 {
    i64::try_from(quota_gb.saturating_mul(BYTES_PER_GB)).unwrap_or(i64::MAX)
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
