use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::remaining_for;

#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    /// `None` is unlimited.
    pub max_generations: Option<i32>,
    pub price: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub generations_used: i32,
    pub period_started_at: DateTime<Utc>,
    pub plan: Plan,
}

impl UserSubscription {
    pub fn remaining(&self) -> Option<u32> {
        remaining_for(self.plan.max_generations, self.generations_used)
    }
}

// Flat shape of `user_subscriptions JOIN plans`.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub generations_used: i32,
    pub period_started_at: DateTime<Utc>,
    pub plan_id: Uuid,
    pub plan_name: String,
    pub max_generations: Option<i32>,
    pub price: f64,
}

impl From<SubscriptionRow> for UserSubscription {
    fn from(r: SubscriptionRow) -> Self {
        UserSubscription {
            id: r.id,
            user_id: r.user_id,
            generations_used: r.generations_used,
            period_started_at: r.period_started_at,
            plan: Plan {
                id: r.plan_id,
                name: r.plan_name,
                max_generations: r.max_generations,
                price: r.price,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanList {
    pub plans: Vec<Plan>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_remaining_uses_plan_cap() {
        let sub = UserSubscription::from(SubscriptionRow {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            generations_used: 3,
            period_started_at: Utc::now(),
            plan_id: Uuid::new_v4(),
            plan_name: "free".into(),
            max_generations: Some(5),
            price: 0.0,
        });
        assert_eq!(sub.plan.name, "free");
        assert_eq!(sub.remaining(), Some(2));
    }
}
