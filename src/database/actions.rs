pub mod ingredients;
pub mod memberships;
pub mod recipes;
pub mod shopping_list;
pub mod tags;
pub mod users;

use crate::{
    error::Error,
    jwt::SessionData,
    schema::{Entity, Id, RelationKind},
    store::{Catalog, Store},
};

/// Retrieves one entity of any kind, `NotFound` when absent.
pub async fn find<E, S>(store: &S, id: Id) -> Result<E, Error>
where
    E: Entity,
    S: Catalog<E> + ?Sized,
{
    store
        .get(id)
        .await?
        .ok_or_else(|| Error::not_found(format!("{} not found", E::NAME)))
}

/// Whether `viewer` follows `author`; anonymous viewers follow nobody.
pub(crate) async fn is_subscribed<S: Store>(
    store: &S,
    viewer: Option<&SessionData>,
    author: Id,
) -> Result<bool, Error> {
    match viewer {
        Some(session) => {
            store
                .has_membership(RelationKind::Subscription, session.user_id, author)
                .await
        }
        None => Ok(false),
    }
}

pub(crate) fn check_length(field: &str, value: &str, max: usize) -> Result<(), Error> {
    if value.is_empty() {
        return Err(Error::validation(format!("{field}: This field may not be blank")));
    }
    if value.chars().count() > max {
        return Err(Error::validation(format!(
            "{field}: Ensure this field has no more than {max} characters"
        )));
    }
    Ok(())
}
