use serde::{Deserialize, Serialize};

pub type Id = i32;

#[derive(
    Clone, Copy, Debug, PartialEq, PartialOrd, sqlx::Type, Serialize, Eq, Ord, Hash, Deserialize,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Admin,
}

/// Anything listed and retrieved through a [`Catalog`](crate::store::Catalog).
pub trait Entity: Send + Sync + Sized + 'static {
    const NAME: &'static str;

    type Filter: Send + Sync;
    type Draft: Send + Sync;
}

#[derive(sqlx::FromRow, Debug, Clone, Serialize)]
pub struct User {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub role: UserRole,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: UserRole,
}

impl Entity for User {
    const NAME: &'static str = "User";
    type Filter = ();
    type Draft = NewUser;
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

#[derive(Debug, Clone, Default)]
pub struct IngredientFilter {
    /// Case-insensitive prefix of the ingredient name.
    pub name: Option<String>,
}

impl Entity for Ingredient {
    const NAME: &'static str = "Ingredient";
    type Filter = IngredientFilter;
    type Draft = NewIngredient;
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Id,
    pub name: String,
    pub color: String,
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTag {
    pub name: String,
    pub color: String,
    pub slug: String,
}

impl Entity for Tag {
    const NAME: &'static str = "Tag";
    type Filter = ();
    type Draft = NewTag;
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Serialize)]
pub struct Recipe {
    pub id: Id,
    pub author_id: Id,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IngredientEntry {
    pub id: Id,
    pub amount: i32,
}

/// Scalar fields plus the association set of a recipe submission.
#[derive(Debug, Clone)]
pub struct RecipeDraft {
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    /// Stored media path; `None` keeps the current image on update.
    pub image: Option<String>,
    pub ingredients: Vec<IngredientEntry>,
    pub tags: Vec<Id>,
}

/// A validated recipe ready to be inserted together with its associations.
#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub author_id: Id,
    pub name: String,
    pub text: String,
    pub cooking_time: i32,
    pub image: String,
    pub ingredients: Vec<IngredientEntry>,
    pub tags: Vec<Id>,
}

#[derive(Debug, Clone, Default)]
pub struct RecipeFilter {
    pub author: Option<Id>,
    /// Tag slugs; a recipe matches when it carries any of them.
    pub tags: Vec<String>,
    pub favorited_by: Option<Id>,
    pub in_cart_of: Option<Id>,
}

impl Entity for Recipe {
    const NAME: &'static str = "Recipe";
    type Filter = RecipeFilter;
    type Draft = NewRecipe;
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeIngredient {
    pub id: Id,
    pub name: String,
    pub measurement_unit: String,
    pub amount: i32,
}

#[derive(sqlx::FromRow, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShoppingListEntry {
    pub name: String,
    pub measurement_unit: String,
    pub amount: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Favorite,
    Cart,
    Subscription,
}

impl RelationKind {
    pub fn table(&self) -> &'static str {
        match self {
            RelationKind::Favorite => "favorites",
            RelationKind::Cart => "carts",
            RelationKind::Subscription => "subscriptions",
        }
    }

    /// Column referencing the member; the subject is always `user_id`.
    pub fn object_column(&self) -> &'static str {
        match self {
            RelationKind::Favorite | RelationKind::Cart => "recipe_id",
            RelationKind::Subscription => "author_id",
        }
    }

    pub fn targets_recipes(&self) -> bool {
        !matches!(self, RelationKind::Subscription)
    }

    pub fn duplicate_message(&self) -> &'static str {
        match self {
            RelationKind::Favorite => "Recipe is already in favorites",
            RelationKind::Cart => "Recipe is already in the shopping cart",
            RelationKind::Subscription => "You are already subscribed to this author",
        }
    }

    pub fn missing_message(&self) -> &'static str {
        match self {
            RelationKind::Favorite => "Recipe is not in favorites",
            RelationKind::Cart => "Recipe is not in the shopping cart",
            RelationKind::Subscription => "You are not subscribed to this author",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Membership {
    pub kind: RelationKind,
    pub user_id: Id,
    pub object_id: Id,
}

// Views

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub id: Id,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserProfile {
    pub fn new(user: User, is_subscribed: bool) -> Self {
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            is_subscribed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeShort {
    pub id: Id,
    pub name: String,
    pub image: String,
    pub cooking_time: i32,
}

impl From<Recipe> for RecipeShort {
    fn from(recipe: Recipe) -> Self {
        Self {
            id: recipe.id,
            name: recipe.name,
            image: recipe.image,
            cooking_time: recipe.cooking_time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecipeDetails {
    pub id: Id,
    pub tags: Vec<Tag>,
    pub author: UserProfile,
    pub ingredients: Vec<RecipeIngredient>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
    pub name: String,
    pub image: String,
    pub text: String,
    pub cooking_time: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionView {
    #[serde(flatten)]
    pub author: UserProfile,
    pub recipes: Vec<RecipeShort>,
    pub recipes_count: i64,
}
