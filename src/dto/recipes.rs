use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{dto::users::UserDto, models::Tag};

#[derive(Debug, Clone, Copy, Deserialize, Serialize, ToSchema)]
pub struct IngredientAmount {
    pub id: Uuid,
    pub amount: i32,
}

/// Tags, ingredients and image are optional at the serde layer so a
/// missing field surfaces as a validation failure, not a decode error.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRecipeRequest {
    pub tags: Option<Vec<Uuid>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRecipeRequest {
    pub tags: Option<Vec<Uuid>>,
    pub ingredients: Option<Vec<IngredientAmount>>,
    pub name: Option<String>,
    pub text: Option<String>,
    pub cooking_time: Option<i32>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RecipeIngredientDto {
    pub id: Uuid,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecipeDto {
    pub id: Uuid,
    pub tags: Vec<Tag>,
    pub author: Option<UserDto>,
    pub ingredients: Vec<RecipeIngredientDto>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

/// Compact projection returned from favorite/cart adds and embedded in
/// subscription entries.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct RecipeShort {
    pub id: Uuid,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RecipeList {
    pub items: Vec<RecipeDto>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IngredientList {
    pub items: Vec<crate::models::Ingredient>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TagList {
    pub items: Vec<Tag>,
}
