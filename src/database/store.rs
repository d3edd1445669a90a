use async_trait::async_trait;

use crate::{
    error::Error,
    pagination::{Listing, PageRequest},
    schema::{
        Entity, Id, Ingredient, Recipe, RecipeDraft, RecipeIngredient, RelationKind,
        ShoppingListEntry, Tag, User,
    },
};

/// Retrieve, list and create capability shared by every stored entity.
///
/// A `None` page lists every matching row.
#[async_trait]
pub trait Catalog<E: Entity>: Send + Sync {
    async fn get(&self, id: Id) -> Result<Option<E>, Error>;

    async fn list(&self, filter: &E::Filter, page: Option<PageRequest>)
        -> Result<Listing<E>, Error>;

    async fn create(&self, draft: E::Draft) -> Result<E, Error>;
}

#[async_trait]
pub trait RecipeStore: Catalog<Recipe> {
    /// Updates the scalar fields and swaps the whole association set in one
    /// transaction. Returns `None` when the recipe does not exist.
    async fn replace_recipe(&self, id: Id, draft: &RecipeDraft) -> Result<Option<Recipe>, Error>;

    async fn delete_recipe(&self, id: Id) -> Result<bool, Error>;

    async fn recipe_ingredients(&self, recipe_id: Id) -> Result<Vec<RecipeIngredient>, Error>;

    async fn recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, Error>;

    /// Ids from `ids` with no ingredient row behind them.
    async fn missing_ingredients(&self, ids: &[Id]) -> Result<Vec<Id>, Error>;

    async fn missing_tags(&self, ids: &[Id]) -> Result<Vec<Id>, Error>;

    /// Ingredient amounts over every recipe in the user's cart, summed per
    /// (name, unit). Order is unspecified.
    async fn cart_totals(&self, user_id: Id) -> Result<Vec<ShoppingListEntry>, Error>;
}

#[async_trait]
pub trait UserStore: Catalog<User> {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error>;

    async fn set_password(&self, user_id: Id, password_hash: &str) -> Result<(), Error>;

    async fn revoke_token(&self, jti: &str, expires_at: i64) -> Result<(), Error>;

    async fn is_token_revoked(&self, jti: &str) -> Result<bool, Error>;

    async fn subscribed_authors(
        &self,
        user_id: Id,
        page: Option<PageRequest>,
    ) -> Result<Listing<User>, Error>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Returns `false` when the pair already exists.
    async fn insert_membership(
        &self,
        kind: RelationKind,
        user_id: Id,
        object_id: Id,
    ) -> Result<bool, Error>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_membership(
        &self,
        kind: RelationKind,
        user_id: Id,
        object_id: Id,
    ) -> Result<bool, Error>;

    async fn has_membership(
        &self,
        kind: RelationKind,
        user_id: Id,
        object_id: Id,
    ) -> Result<bool, Error>;
}

pub trait Store:
    Catalog<Ingredient> + Catalog<Tag> + RecipeStore + UserStore + MembershipStore
{
}

impl<T> Store for T where
    T: Catalog<Ingredient> + Catalog<Tag> + RecipeStore + UserStore + MembershipStore
{
}
