use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::double_option;

/// Core product entity. Equality is by value so edits can be diffed field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub category: String,
    pub colors: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn description_line(&self) -> String {
        if self.category.is_empty() {
            format!("Product {}", self.name)
        } else {
            format!("Product {} [{}]", self.name, self.category)
        }
    }
}

/// A size variant of a product (e.g. "M", "42").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductSize {
    pub id: Uuid,
    pub product_id: Uuid,
    pub label: String,
}

/// Product joined with its sizes for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct ProductWithSizes {
    #[serde(flatten)]
    pub product: Product,
    pub sizes: Vec<ProductSize>,
}

// ── Request payloads ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub sizes: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub category: Option<String>,
    pub colors: Option<Vec<String>>,
}

// ── Query parameters ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ProductFilters {
    pub category: Option<String>,
    /// Case-insensitive match on the product name.
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make(name: &str, category: &str) -> Product {
        Product {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            category: category.to_string(),
            colors: vec!["Red".to_string(), "Navy".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn description_includes_category_when_present() {
        assert_eq!(make("Polo", "Shirts").description_line(), "Product Polo [Shirts]");
        assert_eq!(make("Polo", "").description_line(), "Product Polo");
    }

    #[test]
    fn update_distinguishes_null_from_absent() {
        let absent: UpdateProduct = serde_json::from_str(r#"{"name":"X"}"#).unwrap();
        assert_eq!(absent.description, None);

        let cleared: UpdateProduct = serde_json::from_str(r#"{"description":null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));

        let set: UpdateProduct = serde_json::from_str(r#"{"description":"cotton"}"#).unwrap();
        assert_eq!(set.description, Some(Some("cotton".to_string())));
    }
}
