use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::PgPool;

use super::models::{Account, AccountProfile};

/// key: accounts-store -> persistence capability
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, user_id: i64) -> Result<Option<Account>>;
    async fn upsert_account(&self, user_id: i64, profile: &AccountProfile) -> Result<Account>;
    async fn credit_balance(&self, user_id: i64, amount: i64) -> Result<i64>;
    async fn get_trial_used(&self, user_id: i64) -> Result<bool>;
    async fn set_trial_used(&self, user_id: i64) -> Result<()>;
    async fn save_connection_string(&self, user_id: i64, connection_string: &str) -> Result<()>;
    async fn get_connection_string(&self, user_id: i64) -> Result<Option<String>>;
}

/// key: accounts-store-postgres -> sqlx implementation
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn get_account(&self, user_id: i64) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("failed to load account")?;
        Ok(account)
    }

    async fn upsert_account(&self, user_id: i64, profile: &AccountProfile) -> Result<Account> {
        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (
                user_id,
                username,
                display_name,
                email,
                phone_number,
                first_name,
                last_name,
                patronymic
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id)
            DO UPDATE SET
                username = COALESCE(EXCLUDED.username, accounts.username),
                display_name = COALESCE(EXCLUDED.display_name, accounts.display_name),
                email = COALESCE(EXCLUDED.email, accounts.email),
                phone_number = COALESCE(EXCLUDED.phone_number, accounts.phone_number),
                first_name = COALESCE(EXCLUDED.first_name, accounts.first_name),
                last_name = COALESCE(EXCLUDED.last_name, accounts.last_name),
                patronymic = COALESCE(EXCLUDED.patronymic, accounts.patronymic),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(profile.username.as_deref())
        .bind(profile.display_name.as_deref())
        .bind(profile.email.as_deref())
        .bind(profile.phone_number.as_deref())
        .bind(profile.first_name.as_deref())
        .bind(profile.last_name.as_deref())
        .bind(profile.patronymic.as_deref())
        .fetch_one(&self.pool)
        .await
        .context("failed to upsert account")?;
        Ok(account)
    }

    async fn credit_balance(&self, user_id: i64, amount: i64) -> Result<i64> {
        if amount < 0 {
            bail!("credit amount must be non-negative");
        }
        let balance: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO accounts (user_id, balance) VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET
                balance = accounts.balance + EXCLUDED.balance,
                updated_at = NOW()
            RETURNING balance
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .fetch_one(&self.pool)
        .await
        .context("failed to credit balance")?;
        Ok(balance)
    }

    async fn get_trial_used(&self, user_id: i64) -> Result<bool> {
        let used: Option<bool> =
            sqlx::query_scalar("SELECT trial_used FROM accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to read trial flag")?;
        Ok(used.unwrap_or(false))
    }

    async fn set_trial_used(&self, user_id: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, trial_used) VALUES ($1, TRUE)
            ON CONFLICT (user_id)
            DO UPDATE SET trial_used = TRUE, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("failed to mark trial used")?;
        Ok(())
    }

    async fn save_connection_string(&self, user_id: i64, connection_string: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, connection_string) VALUES ($1, $2)
            ON CONFLICT (user_id)
            DO UPDATE SET connection_string = EXCLUDED.connection_string, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(connection_string)
        .execute(&self.pool)
        .await
        .context("failed to save connection string")?;
        Ok(())
    }

    async fn get_connection_string(&self, user_id: i64) -> Result<Option<String>> {
        let value: Option<Option<String>> =
            sqlx::query_scalar("SELECT connection_string FROM accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .context("failed to read connection string")?;
        Ok(value.flatten())
    }
}
