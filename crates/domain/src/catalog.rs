//! Product and category catalog.

use common::{CategoryId, Money, ProductId};
use serde::{Deserialize, Serialize};
use store::{
    AuditAction, CatalogStore, Category, NewProduct, Product, ProductChanges, ProductQuery,
};

use crate::audit::{self, entity};
use crate::error::{DomainError, Result};
use crate::page::Page;
use crate::validation::ValidationErrors;

const CATEGORY_NAME_MAX: usize = 100;
const PRODUCT_NAME_MAX: usize = 255;

/// Input for creating or renaming a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryInput {
    pub name: String,
}

impl CategoryInput {
    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.text("name", &self.name, CATEGORY_NAME_MAX);
        errors.into_result()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProduct {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    pub stock: i64,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
}

impl CreateProduct {
    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.text("name", &self.name, PRODUCT_NAME_MAX);
        errors.non_negative("price", self.price);
        errors.non_negative_count("stock", self.stock);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProduct {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<i64>,
}

impl UpdateProduct {
    pub fn validate(&self) -> std::result::Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(ref name) = self.name {
            errors.text("name", name, PRODUCT_NAME_MAX);
        }
        if let Some(price) = self.price {
            errors.non_negative("price", price);
        }
        if let Some(stock) = self.stock {
            errors.non_negative_count("stock", stock);
        }
        errors.into_result()
    }
}

/// Replacement category set for a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductCategories {
    pub category_ids: Vec<CategoryId>,
}

/// Service for products and categories.
pub struct CatalogService<S: CatalogStore> {
    store: S,
}

impl<S: CatalogStore> CatalogService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_category(
        &self,
        input: CategoryInput,
        actor: Option<&str>,
    ) -> Result<Category> {
        input.validate()?;
        let changes = serde_json::to_value(&input)?;
        let audit = audit::entry(entity::CATEGORY, AuditAction::Create, changes, actor);
        let category = self.store.insert_category(input.name, audit).await?;
        audit::recorded(entity::CATEGORY);
        Ok(category)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_categories(&self) -> Result<Vec<Category>> {
        Ok(self.store.list_categories().await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_category(&self, id: CategoryId) -> Result<Category> {
        self.store
            .find_category(id)
            .await?
            .ok_or_else(|| DomainError::not_found(entity::CATEGORY, id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_category(
        &self,
        id: CategoryId,
        input: CategoryInput,
        actor: Option<&str>,
    ) -> Result<Category> {
        input.validate()?;
        let changes = serde_json::to_value(&input)?;
        let audit = audit::entry(entity::CATEGORY, AuditAction::Update, changes, actor);
        let category = self.store.rename_category(id, input.name, audit).await?;
        audit::recorded(entity::CATEGORY);
        Ok(category)
    }

    /// Deletes a category and unlinks it from every product.
    #[tracing::instrument(skip(self))]
    pub async fn delete_category(&self, id: CategoryId, actor: Option<&str>) -> Result<()> {
        let existing = self.get_category(id).await?;
        let changes = serde_json::to_value(&existing)?;
        let audit = audit::entry(entity::CATEGORY, AuditAction::Delete, changes, actor);
        self.store.delete_category(id, audit).await?;
        audit::recorded(entity::CATEGORY);
        Ok(())
    }

    /// Creates a product. Every category id must exist.
    #[tracing::instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProduct,
        actor: Option<&str>,
    ) -> Result<Product> {
        input.validate()?;
        let changes = serde_json::to_value(&input)?;
        let product = NewProduct {
            name: input.name,
            description: input.description,
            price: input.price,
            stock: input.stock,
            category_ids: input.category_ids,
        };
        let audit = audit::entry(entity::PRODUCT, AuditAction::Create, changes, actor);
        let created = self.store.insert_product(product, audit).await?;
        audit::recorded(entity::PRODUCT);
        Ok(created)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_products(&self, query: &ProductQuery) -> Result<Page<Product>> {
        let (data, total) = self.store.list_products(query).await?;
        Ok(Page::new(data, total, query.page))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product> {
        self.store
            .find_product(id)
            .await?
            .ok_or_else(|| DomainError::not_found(entity::PRODUCT, id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_product(
        &self,
        id: ProductId,
        patch: UpdateProduct,
        actor: Option<&str>,
    ) -> Result<Product> {
        patch.validate()?;
        let changes = serde_json::to_value(&patch)?;
        let product_changes = ProductChanges {
            name: patch.name,
            description: patch.description,
            price: patch.price,
            stock: patch.stock,
        };
        let audit = audit::entry(entity::PRODUCT, AuditAction::Update, changes, actor);
        let updated = self.store.update_product(id, product_changes, audit).await?;
        audit::recorded(entity::PRODUCT);
        Ok(updated)
    }

    /// Replaces the product's category set.
    #[tracing::instrument(skip(self))]
    pub async fn update_product_categories(
        &self,
        id: ProductId,
        input: UpdateProductCategories,
        actor: Option<&str>,
    ) -> Result<Product> {
        let changes = serde_json::to_value(&input)?;
        let audit = audit::entry(
            entity::PRODUCT,
            AuditAction::UpdateCategories,
            changes,
            actor,
        );
        let updated = self
            .store
            .set_product_categories(id, input.category_ids, audit)
            .await?;
        audit::recorded(entity::PRODUCT);
        Ok(updated)
    }

    /// Deletes a product. Fails with `Conflict` while order lines reference it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId, actor: Option<&str>) -> Result<()> {
        let existing = self.get_product(id).await?;
        let changes = serde_json::to_value(&existing)?;
        let audit = audit::entry(entity::PRODUCT, AuditAction::Delete, changes, actor);
        self.store.delete_product(id, audit).await.map_err(|e| match e {
            store::StoreError::Conflict(_) => DomainError::Conflict(format!(
                "Product with id {id} is referenced by order items"
            )),
            other => other.into(),
        })?;
        audit::recorded(entity::PRODUCT);
        Ok(())
    }
}
