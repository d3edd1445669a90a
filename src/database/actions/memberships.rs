use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    error::Error,
    schema::{Id, Membership, Recipe, RecipeShort, RelationKind, SubscriptionView, User},
    store::Store,
};

use super::{find, users::subscription_view};

/// Fails with `NotFound` when the membership target does not exist.
async fn check_target<S: Store>(store: &S, kind: RelationKind, object_id: Id) -> Result<(), Error> {
    if kind.targets_recipes() {
        find::<Recipe, _>(store, object_id).await?;
    } else {
        find::<User, _>(store, object_id).await?;
    }
    Ok(())
}

/// Adds `object_id` to the session user's `kind` set.
pub async fn add_membership<S: Store>(
    store: &S,
    session: &SessionData,
    kind: RelationKind,
    object_id: Id,
) -> Result<Membership, Error> {
    session.authenticate(ActionType::ManageMemberships)?;
    if kind == RelationKind::Subscription && object_id == session.user_id {
        return Err(Error::SelfSubscription);
    }
    check_target(store, kind, object_id).await?;

    if !store
        .insert_membership(kind, session.user_id, object_id)
        .await?
    {
        return Err(Error::DuplicateMembership(kind));
    }

    log::info!("User {} added {object_id} to {}", session.user_id, kind.table());
    Ok(Membership {
        kind,
        user_id: session.user_id,
        object_id,
    })
}

pub async fn remove_membership<S: Store>(
    store: &S,
    session: &SessionData,
    kind: RelationKind,
    object_id: Id,
) -> Result<(), Error> {
    session.authenticate(ActionType::ManageMemberships)?;
    check_target(store, kind, object_id).await?;

    if !store
        .delete_membership(kind, session.user_id, object_id)
        .await?
    {
        return Err(Error::NoSuchMembership(kind));
    }

    log::info!("User {} removed {object_id} from {}", session.user_id, kind.table());
    Ok(())
}

pub async fn membership_exists<S: Store>(
    store: &S,
    user_id: Id,
    kind: RelationKind,
    object_id: Id,
) -> Result<bool, Error> {
    store.has_membership(kind, user_id, object_id).await
}

async fn add_recipe<S: Store>(
    store: &S,
    session: &SessionData,
    kind: RelationKind,
    recipe_id: Id,
) -> Result<RecipeShort, Error> {
    add_membership(store, session, kind, recipe_id).await?;
    Ok(find::<Recipe, _>(store, recipe_id).await?.into())
}

pub async fn add_favorite<S: Store>(
    store: &S,
    session: &SessionData,
    recipe_id: Id,
) -> Result<RecipeShort, Error> {
    add_recipe(store, session, RelationKind::Favorite, recipe_id).await
}

pub async fn remove_favorite<S: Store>(
    store: &S,
    session: &SessionData,
    recipe_id: Id,
) -> Result<(), Error> {
    remove_membership(store, session, RelationKind::Favorite, recipe_id).await
}

pub async fn add_to_cart<S: Store>(
    store: &S,
    session: &SessionData,
    recipe_id: Id,
) -> Result<RecipeShort, Error> {
    add_recipe(store, session, RelationKind::Cart, recipe_id).await
}

pub async fn remove_from_cart<S: Store>(
    store: &S,
    session: &SessionData,
    recipe_id: Id,
) -> Result<(), Error> {
    remove_membership(store, session, RelationKind::Cart, recipe_id).await
}

/// Returns the author view with at most `recipes_limit` of their recipes.
pub async fn subscribe<S: Store>(
    store: &S,
    session: &SessionData,
    author_id: Id,
    recipes_limit: Option<i64>,
) -> Result<SubscriptionView, Error> {
    add_membership(store, session, RelationKind::Subscription, author_id).await?;
    let author: User = find(store, author_id).await?;

    subscription_view(store, author, recipes_limit).await
}

pub async fn unsubscribe<S: Store>(
    store: &S,
    session: &SessionData,
    author_id: Id,
) -> Result<(), Error> {
    remove_membership(store, session, RelationKind::Subscription, author_id).await
}
