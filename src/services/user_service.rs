use uuid::Uuid;

use crate::{
    audit,
    db::DbPool,
    dto::{
        recipes::RecipeShort,
        users::{SubscriptionDto, SubscriptionList, UserDto, UserList},
    },
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    response::{ApiResponse, Meta},
    routes::params::{Pagination, SubscriptionsQuery},
};

pub async fn list_users(
    pool: &DbPool,
    viewer: Option<Uuid>,
    pagination: Pagination,
) -> AppResult<ApiResponse<UserList>> {
    let (page, limit, offset) = pagination.normalize();
    let users = sqlx::query_as::<_, User>(
        "SELECT * FROM users ORDER BY created_at LIMIT $1 OFFSET $2",
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(users.len());
    for user in &users {
        let subscribed = is_subscribed(pool, viewer, user.id).await?;
        items.push(UserDto::from_user(user, subscribed));
    }

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", UserList { items }, Some(meta)))
}

pub async fn get_user(
    pool: &DbPool,
    viewer: Option<Uuid>,
    user_id: Uuid,
) -> AppResult<ApiResponse<UserDto>> {
    let user = fetch_user(pool, user_id).await?;
    let subscribed = is_subscribed(pool, viewer, user.id).await?;
    Ok(ApiResponse::success(
        "OK",
        UserDto::from_user(&user, subscribed),
        None,
    ))
}

pub async fn me(pool: &DbPool, user: &AuthUser) -> AppResult<ApiResponse<UserDto>> {
    let user = fetch_user(pool, user.user_id).await?;
    Ok(ApiResponse::success(
        "OK",
        UserDto::from_user(&user, false),
        None,
    ))
}

/// Authors the user follows, newest subscription first, each with a
/// truncated recipe list.
pub async fn subscriptions(
    pool: &DbPool,
    user: &AuthUser,
    query: SubscriptionsQuery,
) -> AppResult<ApiResponse<SubscriptionList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let authors = sqlx::query_as::<_, User>(
        r#"
        SELECT u.*
        FROM follows f
        JOIN users u ON u.id = f.following_id
        WHERE f.user_id = $1
        ORDER BY f.created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(user.user_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    let mut items = Vec::with_capacity(authors.len());
    for author in &authors {
        items.push(subscription_entry(pool, author, query.recipes_limit).await?);
    }

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM follows WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(pool)
        .await?;

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success(
        "OK",
        SubscriptionList { items },
        Some(meta),
    ))
}

pub async fn subscribe(
    pool: &DbPool,
    user: &AuthUser,
    following_id: Uuid,
) -> AppResult<ApiResponse<SubscriptionDto>> {
    let followee = fetch_user(pool, following_id).await?;

    if user.user_id == following_id {
        return Err(AppError::SelfReference);
    }

    // The unique index is the authoritative guard against concurrent adds.
    let result = sqlx::query(
        r#"
        INSERT INTO follows (id, user_id, following_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, following_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(following_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Duplicate(
            "Subscription already exists".to_string(),
        ));
    }

    if let Err(err) = audit::record(
        pool,
        Some(user.user_id),
        "follow_add",
        Some("follows"),
        Some(serde_json::json!({ "following_id": following_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit record failed");
    }

    let entry = subscription_entry(pool, &followee, None).await?;
    Ok(ApiResponse::success("Subscribed", entry, None))
}

pub async fn unsubscribe(pool: &DbPool, user: &AuthUser, following_id: Uuid) -> AppResult<()> {
    fetch_user(pool, following_id).await?;

    let result = sqlx::query("DELETE FROM follows WHERE user_id = $1 AND following_id = $2")
        .bind(user.user_id)
        .bind(following_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = audit::record(
        pool,
        Some(user.user_id),
        "follow_remove",
        Some("follows"),
        Some(serde_json::json!({ "following_id": following_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit record failed");
    }

    Ok(())
}

async fn fetch_user(pool: &DbPool, user_id: Uuid) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn is_subscribed(
    pool: &DbPool,
    viewer: Option<Uuid>,
    author_id: Uuid,
) -> AppResult<bool> {
    let Some(viewer) = viewer else {
        return Ok(false);
    };
    let exists: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM follows WHERE user_id = $1 AND following_id = $2)",
    )
    .bind(viewer)
    .bind(author_id)
    .fetch_one(pool)
    .await?;
    Ok(exists.0)
}

async fn subscription_entry(
    pool: &DbPool,
    author: &User,
    recipes_limit: Option<i64>,
) -> AppResult<SubscriptionDto> {
    let limit = recipes_limit.unwrap_or(i64::MAX).max(0);
    let recipes = sqlx::query_as::<_, RecipeShort>(
        r#"
        SELECT id, name, image, cooking_time
        FROM recipes
        WHERE author_id = $1
        ORDER BY created_at DESC
        LIMIT $2
        "#,
    )
    .bind(author.id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
        .bind(author.id)
        .fetch_one(pool)
        .await?;

    Ok(SubscriptionDto {
        user: UserDto::from_user(author, true),
        recipes,
        recipes_count: total.0,
    })
}
