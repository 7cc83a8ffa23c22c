//! PostgreSQL account store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use async_trait::async_trait;
use sqlx::{Connection, PgPool, Row, postgres::PgRow};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::account::{Account, AccountStatus, AccountStore, FailedLogin};

// Right-hand sides see the row before the update; concurrent updates of the
// same row are serialized by the row lock.
const RECORD_FAILED_LOGIN: &str = r"
    UPDATE accounts
    SET login_attempts = CASE
            WHEN last_failed_login IS NOT NULL AND last_failed_login < $3 THEN 1
            ELSE login_attempts + 1
        END,
        last_failed_login = $2,
        locked_until = CASE WHEN locked_until <= $2 THEN NULL ELSE locked_until END,
        updated_at = NOW()
    WHERE id = $1
    RETURNING login_attempts, locked_until
";

const EXTEND_LOCKOUT: &str = r"
    UPDATE accounts
    SET locked_until = GREATEST(locked_until, $2),
        updated_at = NOW()
    WHERE id = $1
";

const CLEAR_EXPIRED_LOCKOUT: &str = r"
    UPDATE accounts
    SET login_attempts = 0,
        locked_until = NULL,
        last_failed_login = NULL,
        updated_at = NOW()
    WHERE id = $1 AND locked_until <= $2
";

const SELECT_ACCOUNT: &str = r"
    SELECT id, company_id, email, password_hash, role, is_super_admin,
           status::text AS status, login_attempts, locked_until, last_failed_login
    FROM accounts
";

#[derive(Clone, Debug)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(
        &self,
        query: &str,
        operation: &'static str,
        bind: Binding<'_>,
    ) -> Result<Option<Account>> {
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let statement = sqlx::query(query);
        let statement = match bind {
            Binding::Email(email) => statement.bind(email),
            Binding::Id(id) => statement.bind(id),
        };
        let row = statement
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to {operation}"))?;

        row.map(|row| account_from_row(&row)).transpose()
    }
}

enum Binding<'a> {
    Email(&'a str),
    Id(Uuid),
}

fn update_span(statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = statement
    )
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    let status: String = row.try_get("status").context("missing status column")?;
    Ok(Account {
        id: row.try_get("id")?,
        company_id: row.try_get("company_id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: row.try_get("role")?,
        is_super_admin: row.try_get("is_super_admin")?,
        status: status.parse::<AccountStatus>()?,
        login_attempts: row.try_get("login_attempts")?,
        locked_until: row.try_get("locked_until")?,
        last_failed_login: row.try_get("last_failed_login")?,
    })
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        let query = format!("{SELECT_ACCOUNT} WHERE email = $1");
        self.fetch_one_by(&query, "lookup account by email", Binding::Email(email))
            .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let query = format!("{SELECT_ACCOUNT} WHERE id = $1");
        self.fetch_one_by(&query, "lookup account by id", Binding::Id(id))
            .await
    }

    async fn save(&self, account: &Account) -> Result<()> {
        let query = r"
            UPDATE accounts
            SET login_attempts = $2,
                locked_until = $3,
                last_failed_login = $4,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = update_span(query);
        let result = sqlx::query(query)
            .bind(account.id)
            .bind(account.login_attempts)
            .bind(account.locked_until)
            .bind(account.last_failed_login)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update account lockout fields")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("account {} not found", account.id);
        }
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        decay_cutoff: DateTime<Utc>,
    ) -> Result<Option<FailedLogin>> {
        let span = update_span(RECORD_FAILED_LOGIN);
        let row = sqlx::query(RECORD_FAILED_LOGIN)
            .bind(id)
            .bind(now)
            .bind(decay_cutoff)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to record failed login")?;

        row.map(|row| -> Result<FailedLogin> {
            Ok(FailedLogin {
                attempts: row.try_get("login_attempts")?,
                locked_until: row.try_get("locked_until")?,
            })
        })
        .transpose()
    }

    async fn extend_lockout(&self, id: Uuid, until: DateTime<Utc>) -> Result<()> {
        let span = update_span(EXTEND_LOCKOUT);
        let result = sqlx::query(EXTEND_LOCKOUT)
            .bind(id)
            .bind(until)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to extend account lockout")?;

        if result.rows_affected() == 0 {
            anyhow::bail!("account {id} not found");
        }
        Ok(())
    }

    async fn clear_expired_lockout(&self, id: Uuid, now: DateTime<Utc>) -> Result<()> {
        let span = update_span(CLEAR_EXPIRED_LOCKOUT);
        sqlx::query(CLEAR_EXPIRED_LOCKOUT)
            .bind(id)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear expired lockout")?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self
            .pool
            .acquire()
            .instrument(acquire_span)
            .await
            .context("failed to acquire database connection")?;

        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping()
            .instrument(ping_span)
            .await
            .context("failed to ping database")
    }
}
