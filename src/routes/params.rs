use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, ToSchema)]
pub struct Pagination {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl Pagination {
    pub fn normalize(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let per_page = self.per_page.unwrap_or(20).clamp(1, 100);
        let offset = (page - 1) * per_page;
        (page, per_page, offset)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecipeListQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    /// Comma-separated tag slugs; a recipe matches when it carries any of them.
    pub tags: Option<String>,
    pub author: Option<Uuid>,
    /// 1 keeps only favorited recipes, 0 excludes them. Ignored for
    /// anonymous callers.
    pub is_favorited: Option<i16>,
    pub is_in_shopping_cart: Option<i16>,
}

impl RecipeListQuery {
    pub fn tag_slugs(&self) -> Option<Vec<String>> {
        let slugs: Vec<String> = self
            .tags
            .as_deref()?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if slugs.is_empty() { None } else { Some(slugs) }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct IngredientQuery {
    /// Name prefix filter.
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscriptionsQuery {
    #[serde(flatten)]
    pub pagination: Pagination,
    /// Cap on how many recipes each followed author carries in the response.
    pub recipes_limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_normalizes_defaults_and_bounds() {
        let p = Pagination {
            page: None,
            per_page: None,
        };
        assert_eq!(p.normalize(), (1, 20, 0));

        let p = Pagination {
            page: Some(3),
            per_page: Some(500),
        };
        assert_eq!(p.normalize(), (3, 100, 200));
    }

    #[test]
    fn tag_slugs_splits_and_drops_blanks() {
        let q = RecipeListQuery {
            pagination: Pagination {
                page: None,
                per_page: None,
            },
            tags: Some("breakfast, ,dinner".into()),
            author: None,
            is_favorited: None,
            is_in_shopping_cart: None,
        };
        assert_eq!(
            q.tag_slugs(),
            Some(vec!["breakfast".to_string(), "dinner".to_string()])
        );
    }
}
