use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    constants::{MINIMAL_AMOUNT, MINIMAL_COOKING_TIME, NAME_MAX_LENGTH},
    error::Error,
    form::RecipeSubmission,
    media::MediaRoot,
    pagination::{PageContext, PageRequest},
    schema::{
        Id, NewRecipe, Recipe, RecipeDetails, RecipeDraft, RecipeFilter, RelationKind, User,
        UserProfile,
    },
    store::{Catalog, Store},
};

use super::{check_length, find, is_subscribed};

/// Listing filters; the membership flags only narrow results for a
/// signed-in viewer.
#[derive(Debug, Clone, Default)]
pub struct RecipeQuery {
    pub author: Option<Id>,
    pub tags: Vec<String>,
    pub is_favorited: bool,
    pub is_in_shopping_cart: bool,
}

/// Field checks that need no store access. Tag ids are deduplicated in place.
fn validate_draft(draft: &mut RecipeDraft) -> Result<(), Error> {
    draft.name = draft.name.trim().to_string();
    check_length("name", &draft.name, NAME_MAX_LENGTH)?;
    if draft.text.trim().is_empty() {
        return Err(Error::validation("text: This field may not be blank"));
    }
    if draft.cooking_time < MINIMAL_COOKING_TIME {
        return Err(Error::validation(format!(
            "cooking_time: Must be at least {MINIMAL_COOKING_TIME}"
        )));
    }

    let mut seen = Vec::with_capacity(draft.ingredients.len());
    for entry in &draft.ingredients {
        if entry.amount < MINIMAL_AMOUNT {
            return Err(Error::validation(format!(
                "ingredients: Amount must be at least {MINIMAL_AMOUNT}"
            )));
        }
        if seen.contains(&entry.id) {
            return Err(Error::validation(
                "ingredients: Ingredients can't be duplicated within a recipe",
            ));
        }
        seen.push(entry.id);
    }

    let mut tags = Vec::with_capacity(draft.tags.len());
    for tag in &draft.tags {
        if !tags.contains(tag) {
            tags.push(*tag);
        }
    }
    draft.tags = tags;

    Ok(())
}

async fn check_references<S: Store>(store: &S, draft: &RecipeDraft) -> Result<(), Error> {
    let ids: Vec<Id> = draft.ingredients.iter().map(|entry| entry.id).collect();

    let missing = store.missing_ingredients(&ids).await?;
    if let Some(id) = missing.first() {
        return Err(Error::not_found(format!("Ingredient {id} doesn't exist")));
    }
    let missing = store.missing_tags(&draft.tags).await?;
    if let Some(id) = missing.first() {
        return Err(Error::not_found(format!("Tag {id} doesn't exist")));
    }

    Ok(())
}

/// Authors manage their own recipes, admins manage all of them.
fn check_owner(session: &SessionData, recipe: &Recipe) -> Result<(), Error> {
    session.authenticate(ActionType::ManageOwnRecipes)?;
    if recipe.author_id != session.user_id {
        session.authenticate(ActionType::ManageAllRecipes)?;
    }
    Ok(())
}

/// Everything a write checks before touching the store. New recipes need an
/// image, updates need the author or an admin.
async fn check_write<S: Store>(
    store: &S,
    session: &SessionData,
    recipe_id: Option<Id>,
    draft: &mut RecipeDraft,
    has_image: bool,
) -> Result<(), Error> {
    match recipe_id {
        Some(id) => check_owner(session, &find::<Recipe, _>(store, id).await?)?,
        None => session.authenticate(ActionType::ManageOwnRecipes)?,
    }

    validate_draft(draft)?;
    if recipe_id.is_none() && !has_image {
        return Err(Error::validation("image: This field is required"));
    }
    check_references(store, draft).await
}

/// Creates a recipe when `recipe_id` is `None`, otherwise replaces the
/// scalar fields and the whole association set of the existing one.
pub async fn write_recipe<S: Store>(
    store: &S,
    session: &SessionData,
    recipe_id: Option<Id>,
    draft: RecipeDraft,
) -> Result<Recipe, Error> {
    match recipe_id {
        Some(id) => update_recipe(store, session, id, draft).await,
        None => create_recipe(store, session, draft).await,
    }
}

pub async fn create_recipe<S: Store>(
    store: &S,
    session: &SessionData,
    mut draft: RecipeDraft,
) -> Result<Recipe, Error> {
    let has_image = draft.image.is_some();
    check_write(store, session, None, &mut draft, has_image).await?;
    let Some(image) = draft.image.take() else {
        return Err(Error::validation("image: This field is required"));
    };

    let recipe = Catalog::<Recipe>::create(
        store,
        NewRecipe {
            author_id: session.user_id,
            name: draft.name,
            text: draft.text,
            cooking_time: draft.cooking_time,
            image,
            ingredients: draft.ingredients,
            tags: draft.tags,
        },
    )
    .await?;

    log::info!("User {} created recipe {}", session.user_id, recipe.id);
    Ok(recipe)
}

pub async fn update_recipe<S: Store>(
    store: &S,
    session: &SessionData,
    id: Id,
    mut draft: RecipeDraft,
) -> Result<Recipe, Error> {
    let has_image = draft.image.is_some();
    check_write(store, session, Some(id), &mut draft, has_image).await?;

    let recipe = store
        .replace_recipe(id, &draft)
        .await?
        .ok_or_else(|| Error::not_found("Recipe not found"))?;

    log::info!("User {} updated recipe {}", session.user_id, recipe.id);
    Ok(recipe)
}

/// Writes a parsed submission. The upload is stored only once the write is
/// known to be valid, and removed again if the store rejects it.
pub async fn write_submission<S: Store>(
    store: &S,
    session: &SessionData,
    media: &MediaRoot,
    recipe_id: Option<Id>,
    submission: RecipeSubmission,
) -> Result<Recipe, Error> {
    let (mut draft, upload) = submission.into_parts();
    check_write(store, session, recipe_id, &mut draft, upload.is_some()).await?;

    let Some(upload) = upload else {
        return write_recipe(store, session, recipe_id, draft).await;
    };
    let image = media.save(&upload).await?;
    draft.image = Some(image.clone());

    let result = write_recipe(store, session, recipe_id, draft).await;
    if result.is_err() {
        media.remove(&image).await;
    }
    result
}

pub async fn delete_recipe<S: Store>(store: &S, session: &SessionData, id: Id) -> Result<(), Error> {
    let recipe = find::<Recipe, _>(store, id).await?;
    check_owner(session, &recipe)?;

    if !store.delete_recipe(id).await? {
        return Err(Error::not_found("Recipe not found"));
    }

    log::info!("User {} deleted recipe {}", session.user_id, id);
    Ok(())
}

pub(crate) async fn recipe_details<S: Store>(
    store: &S,
    viewer: Option<&SessionData>,
    recipe: Recipe,
) -> Result<RecipeDetails, Error> {
    let author: User = find(store, recipe.author_id).await?;
    let subscribed = is_subscribed(store, viewer, author.id).await?;

    let (is_favorited, is_in_shopping_cart) = match viewer {
        Some(session) => (
            store
                .has_membership(RelationKind::Favorite, session.user_id, recipe.id)
                .await?,
            store
                .has_membership(RelationKind::Cart, session.user_id, recipe.id)
                .await?,
        ),
        None => (false, false),
    };

    Ok(RecipeDetails {
        id: recipe.id,
        tags: store.recipe_tags(recipe.id).await?,
        author: UserProfile::new(author, subscribed),
        ingredients: store.recipe_ingredients(recipe.id).await?,
        is_favorited,
        is_in_shopping_cart,
        name: recipe.name,
        image: recipe.image,
        text: recipe.text,
        cooking_time: recipe.cooking_time,
    })
}

pub async fn get_recipe<S: Store>(
    store: &S,
    viewer: Option<&SessionData>,
    id: Id,
) -> Result<RecipeDetails, Error> {
    let recipe = find::<Recipe, _>(store, id).await?;
    recipe_details(store, viewer, recipe).await
}

/// Newest first.
pub async fn fetch_recipes<S: Store>(
    store: &S,
    viewer: Option<&SessionData>,
    query: RecipeQuery,
    page: PageRequest,
) -> Result<PageContext<RecipeDetails>, Error> {
    let viewer_id = viewer.map(|session| session.user_id);
    let filter = RecipeFilter {
        author: query.author,
        tags: query.tags,
        favorited_by: viewer_id.filter(|_| query.is_favorited),
        in_cart_of: viewer_id.filter(|_| query.is_in_shopping_cart),
    };

    let listing = Catalog::<Recipe>::list(store, &filter, Some(page)).await?;

    let mut rows = Vec::with_capacity(listing.rows.len());
    for recipe in listing.rows {
        rows.push(recipe_details(store, viewer, recipe).await?);
    }

    Ok(PageContext::from_rows(rows, listing.total_rows, page))
}
