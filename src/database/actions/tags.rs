use crate::{
    authentication::{jwt::SessionData, permissions::ActionType},
    constants::{COLOR_LENGTH, NAME_MAX_LENGTH},
    error::Error,
    schema::{Id, NewTag, Tag},
    store::{Catalog, Store},
};

use super::{check_length, find};

fn validate_tag(tag: &NewTag) -> Result<(), Error> {
    check_length("name", &tag.name, NAME_MAX_LENGTH)?;
    check_length("slug", &tag.slug, NAME_MAX_LENGTH)?;

    let color_ok = tag.color.len() == COLOR_LENGTH
        && tag.color.starts_with('#')
        && tag.color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !color_ok {
        return Err(Error::validation("color: Expected a #RRGGBB hex color"));
    }

    let slug_ok = tag
        .slug
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !slug_ok {
        return Err(Error::validation(
            "slug: Letters, digits, hyphens and underscores only",
        ));
    }

    Ok(())
}

pub async fn list_tags<S: Store>(store: &S) -> Result<Vec<Tag>, Error> {
    Ok(Catalog::<Tag>::list(store, &(), None).await?.rows)
}

pub async fn get_tag<S: Store>(store: &S, id: Id) -> Result<Tag, Error> {
    find(store, id).await
}

pub async fn create_tag<S: Store>(
    store: &S,
    session: &SessionData,
    draft: NewTag,
) -> Result<Tag, Error> {
    session.authenticate(ActionType::ManageReferenceData)?;
    validate_tag(&draft)?;

    let tag = Catalog::<Tag>::create(store, draft).await?;
    log::info!("Created tag {} ({})", tag.slug, tag.id);
    Ok(tag)
}
