use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit,
    db::DbPool,
    dto::recipes::RecipeShort,
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::User,
    response::ApiResponse,
};

#[derive(Debug, FromRow)]
pub struct ShoppingListRow {
    pub name: String,
    pub measurement_unit: String,
    pub total: i64,
}

pub async fn add_to_cart(
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
        INSERT INTO shopping_cart (id, user_id, recipe_id)
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
            "Recipe is already in the shopping cart".to_string(),
        ));
    }

    if let Err(err) = audit::record(
        pool,
        Some(user.user_id),
        "cart_add",
        Some("shopping_cart"),
        Some(serde_json::json!({ "recipe_id": recipe_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit record failed");
    }

    Ok(ApiResponse::success("Added to shopping cart", recipe, None))
}

pub async fn remove_from_cart(pool: &DbPool, user: &AuthUser, recipe_id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM shopping_cart WHERE user_id = $1 AND recipe_id = $2")
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
        "cart_remove",
        Some("shopping_cart"),
        Some(serde_json::json!({ "recipe_id": recipe_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit record failed");
    }

    Ok(())
}

/// Aggregate every ingredient of every recipe in the user's cart, summed
/// per (name, unit) and rendered as a plain-text attachment body.
pub async fn download_shopping_cart(
    pool: &DbPool,
    user: &AuthUser,
) -> AppResult<(String, String)> {
    let account: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user.user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)?;

    let cart_size: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shopping_cart WHERE user_id = $1")
        .bind(user.user_id)
        .fetch_one(pool)
        .await?;
    if cart_size.0 == 0 {
        return Err(AppError::EmptyCart);
    }

    let rows = sqlx::query_as::<_, ShoppingListRow>(
        r#"
        SELECT i.name, i.measurement_unit, SUM(ri.amount)::bigint AS total
        FROM shopping_cart sc
        JOIN recipe_ingredients ri ON ri.recipe_id = sc.recipe_id
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE sc.user_id = $1
        GROUP BY i.name, i.measurement_unit
        ORDER BY i.name
        "#,
    )
    .bind(user.user_id)
    .fetch_all(pool)
    .await?;

    let filename = format!("{}_shopping_list.txt", account.username);
    Ok((filename, render_shopping_list(&account.full_name(), &rows)))
}

pub fn render_shopping_list(full_name: &str, rows: &[ShoppingListRow]) -> String {
    let mut out = format!("Shopping list for: {full_name}\n\n");
    out.push_str(
        &rows
            .iter()
            .map(|row| format!("- {} ({}) - {}", row.name, row.measurement_unit, row.total))
            .collect::<Vec<_>>()
            .join("\n"),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(name: &str, unit: &str, total: i64) -> ShoppingListRow {
        ShoppingListRow {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
            total,
        }
    }

    #[test]
    fn renders_header_and_one_line_per_group() {
        let rows = vec![row("Salt", "g", 15), row("Sugar", "g", 20)];
        let text = render_shopping_list("Ada Lovelace", &rows);
        assert_eq!(
            text,
            "Shopping list for: Ada Lovelace\n\n- Salt (g) - 15\n- Sugar (g) - 20"
        );
        assert_eq!(text.matches("Salt").count(), 1);
    }

    #[test]
    fn renders_empty_body_for_no_rows() {
        let text = render_shopping_list("Ada Lovelace", &[]);
        assert_eq!(text, "Shopping list for: Ada Lovelace\n\n");
    }
}
