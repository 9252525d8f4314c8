use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    db::DbPool,
    dto::recipes::IngredientList,
    error::{AppError, AppResult},
    models::Ingredient,
    response::ApiResponse,
    routes::params::IngredientQuery,
};

pub fn router() -> Router<DbPool> {
    Router::new()
        .route("/", get(list_ingredients))
        .route("/{id}", get(get_ingredient))
}

#[utoipa::path(
    get,
    path = "/api/ingredients",
    params(
        ("name" = Option<String>, Query, description = "Name prefix filter")
    ),
    responses(
        (status = 200, description = "List ingredients", body = ApiResponse<IngredientList>)
    ),
    tag = "Ingredients"
)]
pub async fn list_ingredients(
    State(pool): State<DbPool>,
    Query(query): Query<IngredientQuery>,
) -> AppResult<Json<ApiResponse<IngredientList>>> {
    let items = sqlx::query_as::<_, Ingredient>(
        r#"
        SELECT * FROM ingredients
        WHERE $1::text IS NULL OR name LIKE $1 || '%'
        ORDER BY name
        "#,
    )
    .bind(query.name)
    .fetch_all(&pool)
    .await?;

    Ok(Json(ApiResponse::success(
        "OK",
        IngredientList { items },
        None,
    )))
}

#[utoipa::path(
    get,
    path = "/api/ingredients/{id}",
    params(
        ("id" = Uuid, Path, description = "Ingredient ID")
    ),
    responses(
        (status = 200, description = "Get ingredient", body = ApiResponse<Ingredient>),
        (status = 404, description = "Ingredient not found")
    ),
    tag = "Ingredients"
)]
pub async fn get_ingredient(
    State(pool): State<DbPool>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApiResponse<Ingredient>>> {
    let ingredient = sqlx::query_as::<_, Ingredient>("SELECT * FROM ingredients WHERE id = $1")
        .bind(id)
        .fetch_optional(&pool)
        .await?;
    let ingredient = match ingredient {
        Some(i) => i,
        None => return Err(AppError::NotFound),
    };
    Ok(Json(ApiResponse::success("OK", ingredient, None)))
}
