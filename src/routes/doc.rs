use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        recipes::{
            CreateRecipeRequest, IngredientAmount, IngredientList, RecipeDto, RecipeIngredientDto,
            RecipeList, RecipeShort, TagList, UpdateRecipeRequest,
        },
        users::{SubscriptionDto, SubscriptionList, UserDto, UserList},
    },
    models::{Ingredient, Tag, User},
    response::{ApiResponse, Meta},
    routes::{auth, health, ingredients, params, recipes, tags, users},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        auth::register,
        auth::login,
        users::list_users,
        users::me,
        users::subscriptions,
        users::get_user,
        users::subscribe,
        users::unsubscribe,
        ingredients::list_ingredients,
        ingredients::get_ingredient,
        tags::list_tags,
        tags::get_tag,
        recipes::list_recipes,
        recipes::create_recipe,
        recipes::get_recipe,
        recipes::update_recipe,
        recipes::delete_recipe,
        recipes::download_shopping_cart,
        recipes::add_favorite,
        recipes::remove_favorite,
        recipes::add_to_cart,
        recipes::remove_from_cart
    ),
    components(
        schemas(
            User,
            Ingredient,
            Tag,
            UserDto,
            UserList,
            SubscriptionDto,
            SubscriptionList,
            RegisterRequest,
            LoginRequest,
            LoginResponse,
            CreateRecipeRequest,
            UpdateRecipeRequest,
            IngredientAmount,
            RecipeDto,
            RecipeIngredientDto,
            RecipeShort,
            RecipeList,
            IngredientList,
            TagList,
            params::Pagination,
            params::RecipeListQuery,
            params::IngredientQuery,
            params::SubscriptionsQuery,
            Meta,
            ApiResponse<RecipeDto>,
            ApiResponse<RecipeList>,
            ApiResponse<UserDto>,
            ApiResponse<SubscriptionList>
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Users", description = "User and subscription endpoints"),
        (name = "Ingredients", description = "Ingredient reference data"),
        (name = "Tags", description = "Tag reference data"),
        (name = "Recipes", description = "Recipe endpoints"),
        (name = "Favorites", description = "Favorite endpoints"),
        (name = "Cart", description = "Shopping cart endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
