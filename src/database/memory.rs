use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::Error,
    pagination::{Listing, PageRequest},
    schema::{
        Id, Ingredient, IngredientEntry, IngredientFilter, Membership, NewIngredient, NewRecipe,
        NewTag, NewUser, Recipe, RecipeDraft, RecipeFilter, RecipeIngredient, RelationKind,
        ShoppingListEntry, Tag, User,
    },
    store::{Catalog, MembershipStore, RecipeStore, UserStore},
};

/// In-process entity store with the same constraints, cascades and
/// all-or-nothing writes as the Postgres schema.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

#[derive(Default)]
struct Tables {
    sequences: HashMap<&'static str, Id>,
    users: BTreeMap<Id, User>,
    ingredients: BTreeMap<Id, Ingredient>,
    tags: BTreeMap<Id, Tag>,
    recipes: BTreeMap<Id, Recipe>,
    ingredient_recipes: Vec<(Id, IngredientEntry)>,
    tag_recipes: Vec<(Id, Id)>,
    memberships: Vec<Membership>,
    revoked_tokens: HashMap<String, i64>,
}

impl Tables {
    fn next_id(&mut self, table: &'static str) -> Id {
        let id = self.sequences.entry(table).or_insert(0);
        *id += 1;
        *id
    }

    /// Mirrors the foreign key and unique constraints on the join tables.
    fn check_associations(&self, ingredients: &[IngredientEntry], tags: &[Id]) -> Result<(), Error> {
        for (i, entry) in ingredients.iter().enumerate() {
            if !self.ingredients.contains_key(&entry.id) {
                return Err(Error::not_found("Ingredient or tag doesn't exist"));
            }
            if ingredients[..i].iter().any(|other| other.id == entry.id) {
                return Err(Error::validation(
                    "Ingredients can't be duplicated within a recipe",
                ));
            }
        }
        if tags.iter().any(|tag_id| !self.tags.contains_key(tag_id)) {
            return Err(Error::not_found("Ingredient or tag doesn't exist"));
        }

        Ok(())
    }

    fn insert_associations(&mut self, recipe_id: Id, ingredients: &[IngredientEntry], tags: &[Id]) {
        self.ingredient_recipes
            .extend(ingredients.iter().map(|entry| (recipe_id, *entry)));
        for tag_id in tags {
            if !self.tag_recipes.contains(&(recipe_id, *tag_id)) {
                self.tag_recipes.push((recipe_id, *tag_id));
            }
        }
    }

    fn clear_associations(&mut self, recipe_id: Id) {
        self.ingredient_recipes.retain(|(id, _)| *id != recipe_id);
        self.tag_recipes.retain(|(id, _)| *id != recipe_id);
    }

    fn object_exists(&self, kind: RelationKind, object_id: Id) -> bool {
        if kind.targets_recipes() {
            self.recipes.contains_key(&object_id)
        } else {
            self.users.contains_key(&object_id)
        }
    }
}

fn paginate<T>(rows: Vec<T>, page: Option<PageRequest>) -> Listing<T> {
    let total_rows = rows.len() as i64;
    let rows = match page {
        Some(page) => rows
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect(),
        None => rows,
    };

    Listing::new(rows, total_rows)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Catalog<User> for MemoryStore {
    async fn get(&self, id: Id) -> Result<Option<User>, Error> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn list(&self, _filter: &(), page: Option<PageRequest>) -> Result<Listing<User>, Error> {
        let tables = self.tables.lock().await;
        Ok(paginate(tables.users.values().cloned().collect(), page))
    }

    async fn create(&self, draft: NewUser) -> Result<User, Error> {
        let mut tables = self.tables.lock().await;

        let taken = tables.users.values().any(|user| {
            user.email.eq_ignore_ascii_case(&draft.email) || user.username == draft.username
        });
        if taken {
            return Err(Error::Conflict(String::from(
                "A user with that email or username already exists",
            )));
        }

        let user = User {
            id: tables.next_id("users"),
            email: draft.email,
            username: draft.username,
            first_name: draft.first_name,
            last_name: draft.last_name,
            password: draft.password_hash,
            role: draft.role,
        };
        tables.users.insert(user.id, user.clone());

        Ok(user)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn set_password(&self, user_id: Id, password_hash: &str) -> Result<(), Error> {
        if let Some(user) = self.tables.lock().await.users.get_mut(&user_id) {
            user.password = password_hash.to_owned();
        }
        Ok(())
    }

    async fn revoke_token(&self, jti: &str, expires_at: i64) -> Result<(), Error> {
        let now = chrono::Utc::now().timestamp();
        let mut tables = self.tables.lock().await;
        tables.revoked_tokens.retain(|_, exp| *exp >= now);
        tables.revoked_tokens.insert(jti.to_owned(), expires_at);
        Ok(())
    }

    async fn is_token_revoked(&self, jti: &str) -> Result<bool, Error> {
        Ok(self.tables.lock().await.revoked_tokens.contains_key(jti))
    }

    async fn subscribed_authors(
        &self,
        user_id: Id,
        page: Option<PageRequest>,
    ) -> Result<Listing<User>, Error> {
        let tables = self.tables.lock().await;
        let authors = tables
            .memberships
            .iter()
            .filter(|m| m.kind == RelationKind::Subscription && m.user_id == user_id)
            .filter_map(|m| tables.users.get(&m.object_id).cloned())
            .collect();

        Ok(paginate(authors, page))
    }
}

#[async_trait]
impl Catalog<Ingredient> for MemoryStore {
    async fn get(&self, id: Id) -> Result<Option<Ingredient>, Error> {
        Ok(self.tables.lock().await.ingredients.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &IngredientFilter,
        page: Option<PageRequest>,
    ) -> Result<Listing<Ingredient>, Error> {
        let prefix = filter.name.as_deref().unwrap_or("").to_lowercase();
        let tables = self.tables.lock().await;

        let mut rows: Vec<Ingredient> = tables
            .ingredients
            .values()
            .filter(|i| i.name.to_lowercase().starts_with(&prefix))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

        Ok(paginate(rows, page))
    }

    async fn create(&self, draft: NewIngredient) -> Result<Ingredient, Error> {
        let mut tables = self.tables.lock().await;
        let ingredient = Ingredient {
            id: tables.next_id("ingredients"),
            name: draft.name,
            measurement_unit: draft.measurement_unit,
        };
        tables.ingredients.insert(ingredient.id, ingredient.clone());

        Ok(ingredient)
    }
}

#[async_trait]
impl Catalog<Tag> for MemoryStore {
    async fn get(&self, id: Id) -> Result<Option<Tag>, Error> {
        Ok(self.tables.lock().await.tags.get(&id).cloned())
    }

    async fn list(&self, _filter: &(), page: Option<PageRequest>) -> Result<Listing<Tag>, Error> {
        let tables = self.tables.lock().await;
        Ok(paginate(tables.tags.values().cloned().collect(), page))
    }

    async fn create(&self, draft: NewTag) -> Result<Tag, Error> {
        let mut tables = self.tables.lock().await;

        let taken = tables.tags.values().any(|tag| {
            tag.name == draft.name || tag.color == draft.color || tag.slug == draft.slug
        });
        if taken {
            return Err(Error::Conflict(String::from(
                "A tag with that name, color or slug already exists",
            )));
        }

        let tag = Tag {
            id: tables.next_id("tags"),
            name: draft.name,
            color: draft.color,
            slug: draft.slug,
        };
        tables.tags.insert(tag.id, tag.clone());

        Ok(tag)
    }
}

#[async_trait]
impl Catalog<Recipe> for MemoryStore {
    async fn get(&self, id: Id) -> Result<Option<Recipe>, Error> {
        Ok(self.tables.lock().await.recipes.get(&id).cloned())
    }

    async fn list(
        &self,
        filter: &RecipeFilter,
        page: Option<PageRequest>,
    ) -> Result<Listing<Recipe>, Error> {
        let tables = self.tables.lock().await;
        let has_member = |kind: RelationKind, user_id: Id, recipe_id: Id| {
            tables
                .memberships
                .iter()
                .any(|m| m.kind == kind && m.user_id == user_id && m.object_id == recipe_id)
        };

        let rows = tables
            .recipes
            .values()
            .rev()
            .filter(|r| filter.author.map_or(true, |author| r.author_id == author))
            .filter(|r| {
                filter.tags.is_empty()
                    || tables.tag_recipes.iter().any(|(recipe_id, tag_id)| {
                        *recipe_id == r.id
                            && tables
                                .tags
                                .get(tag_id)
                                .is_some_and(|tag| filter.tags.contains(&tag.slug))
                    })
            })
            .filter(|r| {
                filter
                    .favorited_by
                    .map_or(true, |user| has_member(RelationKind::Favorite, user, r.id))
            })
            .filter(|r| {
                filter
                    .in_cart_of
                    .map_or(true, |user| has_member(RelationKind::Cart, user, r.id))
            })
            .cloned()
            .collect();

        Ok(paginate(rows, page))
    }

    async fn create(&self, draft: NewRecipe) -> Result<Recipe, Error> {
        let mut tables = self.tables.lock().await;

        if !tables.users.contains_key(&draft.author_id) {
            return Err(Error::not_found("Author doesn't exist"));
        }
        tables.check_associations(&draft.ingredients, &draft.tags)?;

        let recipe = Recipe {
            id: tables.next_id("recipes"),
            author_id: draft.author_id,
            name: draft.name,
            image: draft.image,
            text: draft.text,
            cooking_time: draft.cooking_time,
        };
        tables.recipes.insert(recipe.id, recipe.clone());
        tables.insert_associations(recipe.id, &draft.ingredients, &draft.tags);

        Ok(recipe)
    }
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn replace_recipe(&self, id: Id, draft: &RecipeDraft) -> Result<Option<Recipe>, Error> {
        let mut tables = self.tables.lock().await;

        if !tables.recipes.contains_key(&id) {
            return Ok(None);
        }
        tables.check_associations(&draft.ingredients, &draft.tags)?;

        let Some(recipe) = tables.recipes.get_mut(&id) else {
            return Ok(None);
        };
        recipe.name = draft.name.clone();
        recipe.text = draft.text.clone();
        recipe.cooking_time = draft.cooking_time;
        if let Some(image) = &draft.image {
            recipe.image = image.clone();
        }
        let recipe = recipe.clone();

        tables.clear_associations(id);
        tables.insert_associations(id, &draft.ingredients, &draft.tags);

        Ok(Some(recipe))
    }

    async fn delete_recipe(&self, id: Id) -> Result<bool, Error> {
        let mut tables = self.tables.lock().await;

        if tables.recipes.remove(&id).is_none() {
            return Ok(false);
        }
        tables.clear_associations(id);
        tables
            .memberships
            .retain(|m| !(m.kind.targets_recipes() && m.object_id == id));

        Ok(true)
    }

    async fn recipe_ingredients(&self, recipe_id: Id) -> Result<Vec<RecipeIngredient>, Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .ingredient_recipes
            .iter()
            .filter(|(id, _)| *id == recipe_id)
            .filter_map(|(_, entry)| {
                tables.ingredients.get(&entry.id).map(|i| RecipeIngredient {
                    id: i.id,
                    name: i.name.clone(),
                    measurement_unit: i.measurement_unit.clone(),
                    amount: entry.amount,
                })
            })
            .collect())
    }

    async fn recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, Error> {
        let tables = self.tables.lock().await;
        let mut tags: Vec<Tag> = tables
            .tag_recipes
            .iter()
            .filter(|(id, _)| *id == recipe_id)
            .filter_map(|(_, tag_id)| tables.tags.get(tag_id).cloned())
            .collect();
        tags.sort_by_key(|tag| tag.id);

        Ok(tags)
    }

    async fn missing_ingredients(&self, ids: &[Id]) -> Result<Vec<Id>, Error> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter(|id| !tables.ingredients.contains_key(id))
            .copied()
            .collect())
    }

    async fn missing_tags(&self, ids: &[Id]) -> Result<Vec<Id>, Error> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .filter(|id| !tables.tags.contains_key(id))
            .copied()
            .collect())
    }

    async fn cart_totals(&self, user_id: Id) -> Result<Vec<ShoppingListEntry>, Error> {
        let tables = self.tables.lock().await;
        let mut totals: BTreeMap<(String, String), i64> = BTreeMap::new();

        let cart = tables
            .memberships
            .iter()
            .filter(|m| m.kind == RelationKind::Cart && m.user_id == user_id);
        for membership in cart {
            let parts = tables
                .ingredient_recipes
                .iter()
                .filter(|(recipe_id, _)| *recipe_id == membership.object_id);
            for (_, entry) in parts {
                if let Some(ingredient) = tables.ingredients.get(&entry.id) {
                    *totals
                        .entry((ingredient.name.clone(), ingredient.measurement_unit.clone()))
                        .or_insert(0) += i64::from(entry.amount);
                }
            }
        }

        Ok(totals
            .into_iter()
            .map(|((name, measurement_unit), amount)| ShoppingListEntry {
                name,
                measurement_unit,
                amount,
            })
            .collect())
    }
}

#[async_trait]
impl MembershipStore for MemoryStore {
    async fn insert_membership(
        &self,
        kind: RelationKind,
        user_id: Id,
        object_id: Id,
    ) -> Result<bool, Error> {
        let mut tables = self.tables.lock().await;

        if !tables.users.contains_key(&user_id) || !tables.object_exists(kind, object_id) {
            return Err(Error::not_found("Referenced user or recipe doesn't exist"));
        }

        let membership = Membership {
            kind,
            user_id,
            object_id,
        };
        if tables.memberships.contains(&membership) {
            return Ok(false);
        }
        tables.memberships.push(membership);

        Ok(true)
    }

    async fn delete_membership(
        &self,
        kind: RelationKind,
        user_id: Id,
        object_id: Id,
    ) -> Result<bool, Error> {
        let mut tables = self.tables.lock().await;
        let before = tables.memberships.len();
        tables
            .memberships
            .retain(|m| !(m.kind == kind && m.user_id == user_id && m.object_id == object_id));

        Ok(tables.memberships.len() < before)
    }

    async fn has_membership(
        &self,
        kind: RelationKind,
        user_id: Id,
        object_id: Id,
    ) -> Result<bool, Error> {
        let membership = Membership {
            kind,
            user_id,
            object_id,
        };
        Ok(self.tables.lock().await.memberships.contains(&membership))
    }
}
