use std::collections::HashSet;

use uuid::Uuid;

use crate::{
    audit,
    db::DbPool,
    dto::{
        recipes::{
            CreateRecipeRequest, IngredientAmount, RecipeDto, RecipeIngredientDto, RecipeList,
            UpdateRecipeRequest,
        },
        users::UserDto,
    },
    error::{AppError, AppResult},
    media,
    middleware::auth::{AuthUser, ensure_author_or_admin},
    models::{Recipe, Tag, User},
    response::{ApiResponse, Meta},
    routes::params::RecipeListQuery,
    services::user_service,
};

// Shared by the page and count queries. $1 author, $2 tag slugs, $3 viewer,
// $4/$5 favorited / in-cart flags. A flag outside {0,1} or an anonymous
// viewer leaves the corresponding predicate inert.
const RECIPE_FILTER: &str = r#"
    ($1::uuid IS NULL OR r.author_id = $1)
    AND ($2::text[] IS NULL OR EXISTS (
        SELECT 1
        FROM recipe_tags rt
        JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = r.id AND t.slug = ANY($2)
    ))
    AND ($3::uuid IS NULL OR $4::smallint IS NULL OR $4 NOT IN (0, 1)
        OR ($4 = 1) = EXISTS (
            SELECT 1 FROM favorites f
            WHERE f.recipe_id = r.id AND f.user_id = $3
        ))
    AND ($3::uuid IS NULL OR $5::smallint IS NULL OR $5 NOT IN (0, 1)
        OR ($5 = 1) = EXISTS (
            SELECT 1 FROM shopping_cart sc
            WHERE sc.recipe_id = r.id AND sc.user_id = $3
        ))
"#;

pub async fn list_recipes(
    pool: &DbPool,
    viewer: Option<Uuid>,
    query: RecipeListQuery,
) -> AppResult<ApiResponse<RecipeList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let slugs = query.tag_slugs();

    let sql = format!(
        "SELECT r.* FROM recipes r WHERE {RECIPE_FILTER} \
         ORDER BY r.created_at DESC LIMIT $6 OFFSET $7"
    );
    let recipes = sqlx::query_as::<_, Recipe>(&sql)
        .bind(query.author)
        .bind(slugs.clone())
        .bind(viewer)
        .bind(query.is_favorited)
        .bind(query.is_in_shopping_cart)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    let count_sql = format!("SELECT COUNT(*) FROM recipes r WHERE {RECIPE_FILTER}");
    let total: (i64,) = sqlx::query_as(&count_sql)
        .bind(query.author)
        .bind(slugs)
        .bind(viewer)
        .bind(query.is_favorited)
        .bind(query.is_in_shopping_cart)
        .fetch_one(pool)
        .await?;

    let mut items = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        items.push(build_recipe_dto(pool, viewer, recipe).await?);
    }

    let meta = Meta::new(page, limit, total.0);
    Ok(ApiResponse::success("OK", RecipeList { items }, Some(meta)))
}

pub async fn get_recipe(
    pool: &DbPool,
    viewer: Option<Uuid>,
    recipe_id: Uuid,
) -> AppResult<ApiResponse<RecipeDto>> {
    let recipe = fetch_recipe(pool, recipe_id).await?;
    let dto = build_recipe_dto(pool, viewer, recipe).await?;
    Ok(ApiResponse::success("OK", dto, None))
}

pub async fn create_recipe(
    pool: &DbPool,
    user: &AuthUser,
    payload: CreateRecipeRequest,
) -> AppResult<ApiResponse<RecipeDto>> {
    let (Some(tags), Some(ingredients), Some(image)) =
        (payload.tags, payload.ingredients, payload.image)
    else {
        return Err(AppError::Validation(
            "Not enough data to create a recipe".into(),
        ));
    };
    if tags.is_empty() || ingredients.is_empty() || image.is_empty() {
        return Err(AppError::Validation(
            "Not enough data to create a recipe".into(),
        ));
    }
    if payload.cooking_time < 1 {
        return Err(AppError::Validation(
            "Cooking time must be at least 1".into(),
        ));
    }
    validate_tag_set(pool, &tags).await?;
    validate_ingredient_set(pool, &ingredients).await?;

    let image_path = media::store_recipe_image(&image).await?;

    let mut txn = pool.begin().await?;
    let recipe: Recipe = sqlx::query_as(
        r#"
        INSERT INTO recipes (id, author_id, name, text, cooking_time, image)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.user_id)
    .bind(capitalize(&payload.name))
    .bind(&payload.text)
    .bind(payload.cooking_time)
    .bind(&image_path)
    .fetch_one(&mut *txn)
    .await?;
    set_recipe_tags(&mut txn, recipe.id, &tags).await?;
    set_recipe_ingredients(&mut txn, recipe.id, &ingredients).await?;
    txn.commit().await?;

    if let Err(err) = audit::record(
        pool,
        Some(user.user_id),
        "recipe_create",
        Some("recipes"),
        Some(serde_json::json!({ "recipe_id": recipe.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit record failed");
    }

    let dto = build_recipe_dto(pool, Some(user.user_id), recipe).await?;
    Ok(ApiResponse::success("Recipe created", dto, None))
}

pub async fn update_recipe(
    pool: &DbPool,
    user: &AuthUser,
    recipe_id: Uuid,
    payload: UpdateRecipeRequest,
) -> AppResult<ApiResponse<RecipeDto>> {
    let existing = fetch_recipe(pool, recipe_id).await?;
    ensure_author_or_admin(user, existing.author_id)?;

    // Both association sets are replaced wholesale on every update.
    let tags = payload
        .tags
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Validation("Tags are required to update a recipe".into()))?;
    let ingredients = payload.ingredients.filter(|i| !i.is_empty()).ok_or_else(|| {
        AppError::Validation("Ingredients are required to update a recipe".into())
    })?;
    validate_tag_set(pool, &tags).await?;
    validate_ingredient_set(pool, &ingredients).await?;

    let name = match payload.name {
        Some(name) => capitalize(&name),
        None => existing.name.clone(),
    };
    let text = payload.text.unwrap_or_else(|| existing.text.clone());
    let cooking_time = payload.cooking_time.unwrap_or(existing.cooking_time);
    if cooking_time < 1 {
        return Err(AppError::Validation(
            "Cooking time must be at least 1".into(),
        ));
    }

    let new_image = match payload.image {
        Some(data_uri) => Some(media::store_recipe_image(&data_uri).await?),
        None => None,
    };
    let image_path = new_image.clone().unwrap_or_else(|| existing.image.clone());

    let mut txn = pool.begin().await?;
    let recipe: Recipe = sqlx::query_as(
        r#"
        UPDATE recipes
        SET name = $2, text = $3, cooking_time = $4, image = $5
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(recipe_id)
    .bind(&name)
    .bind(&text)
    .bind(cooking_time)
    .bind(&image_path)
    .fetch_one(&mut *txn)
    .await?;
    set_recipe_tags(&mut txn, recipe.id, &tags).await?;
    set_recipe_ingredients(&mut txn, recipe.id, &ingredients).await?;
    txn.commit().await?;

    if new_image.is_some() && existing.image != image_path {
        media::remove_image(&existing.image).await;
    }

    if let Err(err) = audit::record(
        pool,
        Some(user.user_id),
        "recipe_update",
        Some("recipes"),
        Some(serde_json::json!({ "recipe_id": recipe_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit record failed");
    }

    let dto = build_recipe_dto(pool, Some(user.user_id), recipe).await?;
    Ok(ApiResponse::success("Recipe updated", dto, None))
}

pub async fn delete_recipe(pool: &DbPool, user: &AuthUser, recipe_id: Uuid) -> AppResult<()> {
    let existing = fetch_recipe(pool, recipe_id).await?;
    ensure_author_or_admin(user, existing.author_id)?;

    sqlx::query("DELETE FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .execute(pool)
        .await?;

    media::remove_image(&existing.image).await;

    if let Err(err) = audit::record(
        pool,
        Some(user.user_id),
        "recipe_delete",
        Some("recipes"),
        Some(serde_json::json!({ "recipe_id": recipe_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit record failed");
    }

    Ok(())
}

/// Replace a recipe's ingredient set inside the caller's transaction, so a
/// reader never observes a cleared-but-not-refilled state.
pub async fn set_recipe_ingredients(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    recipe_id: Uuid,
    items: &[IngredientAmount],
) -> AppResult<()> {
    sqlx::query("DELETE FROM recipe_ingredients WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **txn)
        .await?;

    for item in items {
        sqlx::query(
            r#"
            INSERT INTO recipe_ingredients (id, recipe_id, ingredient_id, amount)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(recipe_id)
        .bind(item.id)
        .bind(item.amount)
        .execute(&mut **txn)
        .await?;
    }

    Ok(())
}

/// Same replace-all semantics for the tag set.
pub async fn set_recipe_tags(
    txn: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    recipe_id: Uuid,
    tags: &[Uuid],
) -> AppResult<()> {
    sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut **txn)
        .await?;

    for tag_id in tags {
        sqlx::query("INSERT INTO recipe_tags (recipe_id, tag_id) VALUES ($1, $2)")
            .bind(recipe_id)
            .bind(tag_id)
            .execute(&mut **txn)
            .await?;
    }

    Ok(())
}

async fn fetch_recipe(pool: &DbPool, recipe_id: Uuid) -> AppResult<Recipe> {
    sqlx::query_as::<_, Recipe>("SELECT * FROM recipes WHERE id = $1")
        .bind(recipe_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound)
}

async fn validate_ingredient_set(pool: &DbPool, items: &[IngredientAmount]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for item in items {
        if !seen.insert(item.id) {
            return Err(AppError::Validation("Ingredients must not repeat".into()));
        }
        if item.amount < 1 {
            return Err(AppError::Validation(
                "Ingredient amount must be at least 1".into(),
            ));
        }
    }

    let ids: Vec<Uuid> = items.iter().map(|i| i.id).collect();
    let known: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM ingredients WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_one(pool)
        .await?;
    if known.0 != ids.len() as i64 {
        return Err(AppError::Validation("Unknown ingredient".into()));
    }

    Ok(())
}

async fn validate_tag_set(pool: &DbPool, tags: &[Uuid]) -> AppResult<()> {
    let unique: HashSet<_> = tags.iter().collect();
    if unique.len() != tags.len() {
        return Err(AppError::Validation("Tags must not repeat".into()));
    }

    let known: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tags WHERE id = ANY($1)")
        .bind(tags)
        .fetch_one(pool)
        .await?;
    if known.0 != tags.len() as i64 {
        return Err(AppError::Validation("Unknown tag".into()));
    }

    Ok(())
}

pub async fn build_recipe_dto(
    pool: &DbPool,
    viewer: Option<Uuid>,
    recipe: Recipe,
) -> AppResult<RecipeDto> {
    let tags = sqlx::query_as::<_, Tag>(
        r#"
        SELECT t.*
        FROM recipe_tags rt
        JOIN tags t ON t.id = rt.tag_id
        WHERE rt.recipe_id = $1
        ORDER BY t.name
        "#,
    )
    .bind(recipe.id)
    .fetch_all(pool)
    .await?;

    let ingredients = sqlx::query_as::<_, RecipeIngredientDto>(
        r#"
        SELECT i.id, i.name, i.measurement_unit, ri.amount
        FROM recipe_ingredients ri
        JOIN ingredients i ON i.id = ri.ingredient_id
        WHERE ri.recipe_id = $1
        ORDER BY i.name
        "#,
    )
    .bind(recipe.id)
    .fetch_all(pool)
    .await?;

    let author = match recipe.author_id {
        Some(author_id) => {
            let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
                .bind(author_id)
                .fetch_optional(pool)
                .await?;
            match row {
                Some(user) => {
                    let subscribed = user_service::is_subscribed(pool, viewer, user.id).await?;
                    Some(UserDto::from_user(&user, subscribed))
                }
                None => None,
            }
        }
        None => None,
    };

    let is_favorited = member_of(pool, "favorites", viewer, recipe.id).await?;
    let is_in_shopping_cart = member_of(pool, "shopping_cart", viewer, recipe.id).await?;

    Ok(RecipeDto {
        id: recipe.id,
        tags,
        author,
        ingredients,
        is_favorited,
        is_in_shopping_cart,
        name: recipe.name,
        image: recipe.image,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
    })
}

async fn member_of(
    pool: &DbPool,
    table: &str,
    viewer: Option<Uuid>,
    recipe_id: Uuid,
) -> AppResult<bool> {
    let Some(viewer) = viewer else {
        return Ok(false);
    };
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {table} WHERE user_id = $1 AND recipe_id = $2)"
    );
    let exists: (bool,) = sqlx::query_as(&sql)
        .bind(viewer)
        .bind(recipe_id)
        .fetch_one(pool)
        .await?;
    Ok(exists.0)
}

/// Recipe names are normalized the way the original data entry did it:
/// leading capital, rest lowered.
fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::capitalize;

    #[test]
    fn capitalizes_first_letter_only() {
        assert_eq!(capitalize("borscht soup"), "Borscht soup");
        assert_eq!(capitalize("ALL CAPS"), "All caps");
        assert_eq!(capitalize(""), "");
    }
}
