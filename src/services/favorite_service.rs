use uuid::Uuid;

use crate::{
    audit,
    db::DbPool,
    dto::recipes::RecipeShort,
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    response::ApiResponse,
};

pub async fn add_favorite(
    pool: &DbPool,
    user: &AuthUser,
    recipe_id: Uuid,
) -> AppResult<ApiResponse<RecipeShort>> {
    let recipe: Option<RecipeShort> =
        sqlx::query_as("SELECT id, name, image, cooking_time FROM recipes WHERE id = $1")
            .bind(recipe_id)
            .fetch_optional(pool)
            .await?;

    let Some(recipe) = recipe else {
        return Err(AppError::BadRequest("Recipe does not exist".into()));
    };

    // Insert races resolve at the unique index, not at a prior check.
    let result = sqlx::query(
        r#"
        INSERT INTO favorites (id, user_id, recipe_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, recipe_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(recipe_id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::Duplicate(
            "Recipe is already in favorites".to_string(),
        ));
    }

    if let Err(err) = audit::record(
        pool,
        Some(user.user_id),
        "favorite_add",
        Some("favorites"),
        Some(serde_json::json!({ "recipe_id": recipe_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit record failed");
    }

    Ok(ApiResponse::success("Added to favorites", recipe, None))
}

pub async fn remove_favorite(pool: &DbPool, user: &AuthUser, recipe_id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND recipe_id = $2")
        .bind(user.user_id)
        .bind(recipe_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = audit::record(
        pool,
        Some(user.user_id),
        "favorite_remove",
        Some("favorites"),
        Some(serde_json::json!({ "recipe_id": recipe_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit record failed");
    }

    Ok(())
}
