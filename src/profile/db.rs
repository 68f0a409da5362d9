use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use super::{Profile, ProfileUpdate};

pub async fn get_profile(pool: &PgPool, user_id: Uuid) -> Result<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>(
        "SELECT id, email, full_name, updated_at FROM profiles WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(profile)
}

pub async fn update_profile(pool: &PgPool, user_id: Uuid, update: &ProfileUpdate) -> Result<Option<Profile>> {
    let profile = sqlx::query_as::<_, Profile>(
        r#"
        UPDATE profiles
        SET email = COALESCE($2, email),
            full_name = COALESCE($3, full_name),
            updated_at = now()
        WHERE id = $1
        RETURNING id, email, full_name, updated_at
        "#,
    )
    .bind(user_id)
    .bind(update.email.as_deref())
    .bind(update.full_name.as_deref())
    .fetch_optional(pool)
    .await?;
    Ok(profile)
}
