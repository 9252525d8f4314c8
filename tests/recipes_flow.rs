use axum_recipes_api::{
    db::{DbPool, create_pool},
    dto::recipes::{CreateRecipeRequest, IngredientAmount, UpdateRecipeRequest},
    error::AppError,
    middleware::auth::AuthUser,
    routes::params::{Pagination, RecipeListQuery, SubscriptionsQuery},
    services::{cart_service, favorite_service, recipe_service, user_service},
};
use uuid::Uuid;

const IMAGE: &str = "data:image/png;base64,aGk=";

// Integration flow: author publishes recipes -> user favorites, fills the
// cart, downloads the aggregated shopping list, follows the author and
// replaces a recipe's ingredient set.
#[tokio::test]
async fn favorites_cart_and_follow_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url = match std::env::var("TEST_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
    {
        Ok(url) => url,
        Err(_) => {
            eprintln!(
                "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
            );
            return Ok(());
        }
    };

    let pool = setup_pool(&database_url).await?;

    let author_id = create_user(&pool, "author@example.com", "author", "Alice", "Author").await?;
    let eater_id = create_user(&pool, "eater@example.com", "eater", "Eve", "Eater").await?;
    let author = AuthUser {
        user_id: author_id,
        role: "user".into(),
    };
    let eater = AuthUser {
        user_id: eater_id,
        role: "user".into(),
    };

    let salt = create_ingredient(&pool, "Salt", "g").await?;
    let sugar = create_ingredient(&pool, "Sugar", "g").await?;
    let breakfast = create_tag(&pool, "Breakfast", "breakfast").await?;
    let dinner = create_tag(&pool, "Dinner", "dinner").await?;

    // Create two recipes sharing an ingredient.
    let pancakes = recipe_service::create_recipe(
        &pool,
        &author,
        recipe_request("pancakes", vec![breakfast], vec![amount(salt, 10)]),
    )
    .await?
    .data
    .unwrap();
    assert_eq!(pancakes.name, "Pancakes");
    assert_eq!(pancakes.tags.len(), 1);

    let cake = recipe_service::create_recipe(
        &pool,
        &author,
        recipe_request("cake", vec![dinner], vec![amount(salt, 5), amount(sugar, 20)]),
    )
    .await?
    .data
    .unwrap();

    // Missing ingredients is a validation failure, not a crash.
    let invalid = recipe_service::create_recipe(
        &pool,
        &author,
        CreateRecipeRequest {
            tags: Some(vec![breakfast]),
            ingredients: None,
            name: "broken".into(),
            text: "no ingredients".into(),
            cooking_time: 5,
            image: Some(IMAGE.into()),
        },
    )
    .await;
    assert!(matches!(invalid, Err(AppError::Validation(_))));

    // Favorite twice: second call is a duplicate and the set is unchanged.
    favorite_service::add_favorite(&pool, &eater, pancakes.id).await?;
    let dup = favorite_service::add_favorite(&pool, &eater, pancakes.id).await;
    assert!(matches!(dup, Err(AppError::Duplicate(_))));
    let favorites: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM favorites WHERE user_id = $1")
        .bind(eater_id)
        .fetch_one(&pool)
        .await?;
    assert_eq!(favorites.0, 1);

    // Removing a favorite that was never added.
    let missing = favorite_service::remove_favorite(&pool, &eater, cake.id).await;
    assert!(matches!(missing, Err(AppError::NotFound)));

    // Fill the cart and aggregate the shopping list.
    cart_service::add_to_cart(&pool, &eater, pancakes.id).await?;
    cart_service::add_to_cart(&pool, &eater, cake.id).await?;
    let dup_cart = cart_service::add_to_cart(&pool, &eater, cake.id).await;
    assert!(matches!(dup_cart, Err(AppError::Duplicate(_))));

    let (filename, body) = cart_service::download_shopping_cart(&pool, &eater).await?;
    assert_eq!(filename, "eater_shopping_list.txt");
    assert!(body.starts_with("Shopping list for: Eve Eater\n\n"));
    assert_eq!(body.matches("- Salt (g) - 15").count(), 1);
    assert_eq!(body.matches("- Sugar (g) - 20").count(), 1);

    // Filtered listings.
    let all = recipe_service::list_recipes(&pool, None, query(None, Some(1), None)).await?;
    assert_eq!(all.data.unwrap().items.len(), 2, "anonymous ignores is_favorited");

    let only_fav =
        recipe_service::list_recipes(&pool, Some(eater_id), query(None, Some(1), None)).await?;
    let items = only_fav.data.unwrap().items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, pancakes.id);
    assert!(items[0].is_favorited);

    let excluded =
        recipe_service::list_recipes(&pool, Some(eater_id), query(None, Some(0), None)).await?;
    let items = excluded.data.unwrap().items;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, cake.id);

    let by_tag =
        recipe_service::list_recipes(&pool, None, query(Some("breakfast".into()), None, None))
            .await?;
    assert_eq!(by_tag.data.unwrap().items.len(), 1);

    let by_author =
        recipe_service::list_recipes(&pool, None, query(None, None, Some(author_id))).await?;
    assert_eq!(by_author.data.unwrap().items.len(), 2);

    // Follow lifecycle: subscribe, duplicate, self, listing, double unfollow.
    user_service::subscribe(&pool, &eater, author_id).await?;
    let dup_follow = user_service::subscribe(&pool, &eater, author_id).await;
    assert!(matches!(dup_follow, Err(AppError::Duplicate(_))));
    let self_follow = user_service::subscribe(&pool, &eater, eater_id).await;
    assert!(matches!(self_follow, Err(AppError::SelfReference)));

    let subs = user_service::subscriptions(
        &pool,
        &eater,
        SubscriptionsQuery {
            pagination: Pagination {
                page: None,
                per_page: None,
            },
            recipes_limit: Some(1),
        },
    )
    .await?;
    let entries = subs.data.unwrap().items;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].recipes_count, 2);
    assert_eq!(entries[0].recipes.len(), 1);

    user_service::unsubscribe(&pool, &eater, author_id).await?;
    let gone = user_service::unsubscribe(&pool, &eater, author_id).await;
    assert!(matches!(gone, Err(AppError::NotFound)));

    // Only the author (or staff) may touch a recipe.
    let forbidden = recipe_service::update_recipe(
        &pool,
        &eater,
        pancakes.id,
        update_request(vec![breakfast], vec![amount(sugar, 7)]),
    )
    .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    // Ingredient replacement round-trips exactly.
    recipe_service::update_recipe(
        &pool,
        &author,
        pancakes.id,
        update_request(vec![breakfast], vec![amount(sugar, 7)]),
    )
    .await?;
    let reread = recipe_service::get_recipe(&pool, None, pancakes.id)
        .await?
        .data
        .unwrap();
    assert_eq!(reread.ingredients.len(), 1);
    assert_eq!(reread.ingredients[0].name, "Sugar");
    assert_eq!(reread.ingredients[0].amount, 7);

    // Empty cart refuses the aggregate.
    cart_service::remove_from_cart(&pool, &eater, pancakes.id).await?;
    cart_service::remove_from_cart(&pool, &eater, cake.id).await?;
    let empty = cart_service::download_shopping_cart(&pool, &eater).await;
    assert!(matches!(empty, Err(AppError::EmptyCart)));

    // Author deletion is survived by the recipe, authorless.
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(author_id)
        .execute(&pool)
        .await?;
    let orphan = recipe_service::get_recipe(&pool, None, cake.id)
        .await?
        .data
        .unwrap();
    assert!(orphan.author.is_none());

    Ok(())
}

async fn setup_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let pool = create_pool(database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Clean tables between runs.
    sqlx::query(
        "TRUNCATE TABLE recipe_ingredients, recipe_tags, follows, favorites, shopping_cart, \
         audit_logs, recipes, tags, ingredients, users RESTART IDENTITY CASCADE",
    )
    .execute(&pool)
    .await?;

    Ok(pool)
}

async fn create_user(
    pool: &DbPool,
    email: &str,
    username: &str,
    first_name: &str,
    last_name: &str,
) -> anyhow::Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, email, username, first_name, last_name, password_hash)
        VALUES ($1, $2, $3, $4, $5, 'dummy')
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(email)
    .bind(username)
    .bind(first_name)
    .bind(last_name)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

async fn create_ingredient(pool: &DbPool, name: &str, unit: &str) -> anyhow::Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO ingredients (id, name, measurement_unit) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(unit)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

async fn create_tag(pool: &DbPool, name: &str, slug: &str) -> anyhow::Result<Uuid> {
    let row: (Uuid,) = sqlx::query_as(
        "INSERT INTO tags (id, name, color, slug) VALUES ($1, $2, '#49B64E', $3) RETURNING id",
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(slug)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

fn amount(id: Uuid, amount: i32) -> IngredientAmount {
    IngredientAmount { id, amount }
}

fn recipe_request(
    name: &str,
    tags: Vec<Uuid>,
    ingredients: Vec<IngredientAmount>,
) -> CreateRecipeRequest {
    CreateRecipeRequest {
        tags: Some(tags),
        ingredients: Some(ingredients),
        name: name.into(),
        text: format!("how to cook {name}"),
        cooking_time: 30,
        image: Some(IMAGE.into()),
    }
}

fn update_request(tags: Vec<Uuid>, ingredients: Vec<IngredientAmount>) -> UpdateRecipeRequest {
    UpdateRecipeRequest {
        tags: Some(tags),
        ingredients: Some(ingredients),
        name: None,
        text: None,
        cooking_time: None,
        image: None,
    }
}

fn query(
    tags: Option<String>,
    is_favorited: Option<i16>,
    author: Option<Uuid>,
) -> RecipeListQuery {
    RecipeListQuery {
        pagination: Pagination {
            page: None,
            per_page: None,
        },
        tags,
        author,
        is_favorited,
        is_in_shopping_cart: None,
    }
}
