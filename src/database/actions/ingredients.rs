use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    constants::NAME_MAX_LENGTH,
    error::Error,
    schema::{Id, Ingredient, IngredientFilter, NewIngredient},
    store::{Catalog, Store},
};

use super::{check_length, find};

/// Every ingredient whose name starts with `name` (any case), ordered by name.
pub async fn list_ingredients<S: Store>(
    store: &S,
    name: Option<String>,
) -> Result<Vec<Ingredient>, Error> {
    let filter = IngredientFilter {
        name: name.filter(|prefix| !prefix.is_empty()),
    };
    Ok(Catalog::<Ingredient>::list(store, &filter, None).await?.rows)
}

pub async fn get_ingredient<S: Store>(store: &S, id: Id) -> Result<Ingredient, Error> {
    find(store, id).await
}

pub async fn create_ingredient<S: Store>(
    store: &S,
    session: &SessionData,
    mut draft: NewIngredient,
) -> Result<Ingredient, Error> {
    session.authenticate(ActionType::ManageReferenceData)?;

    draft.name = draft.name.trim().to_string();
    draft.measurement_unit = draft.measurement_unit.trim().to_string();
    check_length("name", &draft.name, NAME_MAX_LENGTH)?;
    check_length("measurement_unit", &draft.measurement_unit, NAME_MAX_LENGTH)?;

    let ingredient = Catalog::<Ingredient>::create(store, draft).await?;
    log::info!("Created ingredient {} ({})", ingredient.name, ingredient.id);
    Ok(ingredient)
}
