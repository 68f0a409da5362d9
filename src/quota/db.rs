use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use super::types::{Plan, SubscriptionRow, UserSubscription};
use super::{LedgerError, QuotaLedger, remaining_for};

const SUBSCRIPTION_SELECT: &str = r#"
    SELECT us.id,
           us.user_id,
           us.generations_used,
           us.period_started_at,
           p.id AS plan_id,
           p.name AS plan_name,
           p.max_generations,
           p.price::float8 AS price
    FROM user_subscriptions us
    JOIN plans p ON p.id = us.plan_id
    WHERE us.user_id = $1
"#;

/// Postgres-backed ledger over `user_subscriptions` and `plans`.
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaLedger for PgLedger {
    async fn remaining(&self, user_id: Uuid) -> Result<Option<u32>, LedgerError> {
        let row: Option<(i32, Option<Uuid>, Option<i32>)> = sqlx::query_as(
            r#"
            SELECT us.generations_used, p.id, p.max_generations
            FROM user_subscriptions us
            LEFT JOIN plans p ON p.id = us.plan_id
            WHERE us.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Err(LedgerError::SubscriptionNotFound(user_id)),
            Some((_, None, _)) => Err(LedgerError::PlanNotFound(format!("subscription of {user_id}"))),
            Some((used, Some(_), max)) => Ok(remaining_for(max, used)),
        }
    }

    async fn consume(&self, user_id: Uuid) -> bool {
        // single conditional increment; concurrent callers cannot overshoot the cap
        let res = sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE user_subscriptions us
            SET generations_used = us.generations_used + 1,
                updated_at = now()
            FROM plans p
            WHERE us.plan_id = p.id
              AND us.user_id = $1
              AND (p.max_generations IS NULL OR us.generations_used < p.max_generations)
            RETURNING us.generations_used
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;

        match res {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                warn!(user = %user_id, error = %e, "quota consume failed");
                false
            }
        }
    }
}

pub async fn list_plans(pool: &PgPool) -> Result<Vec<Plan>, LedgerError> {
    let plans = sqlx::query_as::<_, Plan>(
        r#"
        SELECT id, name, max_generations, price::float8 AS price
        FROM plans
        ORDER BY price, name
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(plans)
}

pub async fn find_plan(pool: &PgPool, name: &str) -> Result<Plan, LedgerError> {
    sqlx::query_as::<_, Plan>(
        "SELECT id, name, max_generations, price::float8 AS price FROM plans WHERE name = $1",
    )
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| LedgerError::PlanNotFound(name.to_string()))
}

pub async fn get_user_subscription(pool: &PgPool, user_id: Uuid) -> Result<UserSubscription, LedgerError> {
    sqlx::query_as::<_, SubscriptionRow>(SUBSCRIPTION_SELECT)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .map(UserSubscription::from)
        .ok_or(LedgerError::SubscriptionNotFound(user_id))
}

/// Move the user onto `plan_name` with a fresh period and a zeroed counter.
pub async fn change_plan(pool: &PgPool, user_id: Uuid, plan_name: &str) -> Result<UserSubscription, LedgerError> {
    let plan = find_plan(pool, plan_name).await?;
    sqlx::query(
        r#"
        INSERT INTO user_subscriptions (user_id, plan_id, generations_used, period_started_at)
        VALUES ($1, $2, 0, now())
        ON CONFLICT (user_id)
        DO UPDATE SET plan_id = EXCLUDED.plan_id,
                      generations_used = 0,
                      period_started_at = now(),
                      updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(plan.id)
    .execute(pool)
    .await?;
    get_user_subscription(pool, user_id).await
}

pub async fn expired_periods(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<Uuid>, LedgerError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        SELECT user_id
        FROM user_subscriptions
        WHERE period_started_at <= $1 - INTERVAL '1 month'
        ORDER BY user_id
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Reset counters for every subscription whose month has elapsed at `now`.
pub async fn renew_expired_periods(pool: &PgPool, now: DateTime<Utc>) -> Result<Vec<Uuid>, LedgerError> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        r#"
        UPDATE user_subscriptions
        SET generations_used = 0,
            period_started_at = $1,
            updated_at = now()
        WHERE period_started_at <= $1 - INTERVAL '1 month'
        RETURNING user_id
        "#,
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn check_connection(pool: &PgPool) -> Result<(), LedgerError> {
    sqlx::query("SELECT 1 FROM plans LIMIT 1")
        .fetch_optional(pool)
        .await?;
    Ok(())
}

// Run against a live database: DATABASE_URL=... cargo test -- --ignored
#[cfg(test)]
mod tests {
    use super::*;

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn concurrent_consume_stops_exactly_at_the_cap(pool: PgPool) {
        let user = Uuid::new_v4();
        change_plan(&pool, user, "free").await.unwrap();
        let ledger = PgLedger::new(pool.clone());

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.consume(user).await })
            })
            .collect();
        let mut charged = 0;
        for h in handles {
            if h.await.unwrap() { charged += 1; }
        }

        assert_eq!(charged, 5);
        assert_eq!(ledger.remaining(user).await.unwrap(), Some(0));
        assert_eq!(get_user_subscription(&pool, user).await.unwrap().generations_used, 5);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn unlimited_plan_always_charges(pool: PgPool) {
        let user = Uuid::new_v4();
        change_plan(&pool, user, "business").await.unwrap();
        let ledger = PgLedger::new(pool);

        for _ in 0..3 {
            assert!(ledger.consume(user).await);
        }
        assert_eq!(ledger.remaining(user).await.unwrap(), None);
    }

    #[sqlx::test(migrations = "./migrations")]
    #[ignore = "needs DATABASE_URL"]
    async fn unknown_user_is_not_charged(pool: PgPool) {
        let ledger = PgLedger::new(pool);
        let user = Uuid::new_v4();
        assert!(!ledger.consume(user).await);
        assert!(matches!(ledger.remaining(user).await, Err(LedgerError::SubscriptionNotFound(_))));
    }
}
