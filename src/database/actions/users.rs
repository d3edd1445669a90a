use serde::Deserialize;

use crate::{
    authentication::{
        cryptography::{hash_password, verify_password},
        jwt::{generate_jwt_session, verify_jwt_session, SessionData, SessionKeys},
    },
    constants::{EMAIL_MAX_LENGTH, PASSWORD_MAX_LENGTH, USER_FIELD_MAX_LENGTH},
    error::Error,
    pagination::{PageContext, PageRequest},
    schema::{
        Id, NewUser, Recipe, RecipeFilter, RecipeShort, SubscriptionView, User, UserProfile,
        UserRole,
    },
    store::{Catalog, Store},
};

use super::{check_length, find, is_subscribed};

#[derive(Debug, Clone, Deserialize)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

fn validate_registration(form: &Registration) -> Result<(), Error> {
    check_length("email", &form.email, EMAIL_MAX_LENGTH)?;
    match form.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(Error::validation("email: Enter a valid email address")),
    }

    check_length("username", &form.username, USER_FIELD_MAX_LENGTH)?;
    let allowed = |c: char| c.is_alphanumeric() || "@.+-_".contains(c);
    if !form.username.chars().all(allowed) {
        return Err(Error::validation(
            "username: Letters, digits and @/./+/-/_ only",
        ));
    }
    if form.username == "me" {
        return Err(Error::validation("username: This username is reserved"));
    }

    check_length("first_name", &form.first_name, USER_FIELD_MAX_LENGTH)?;
    check_length("last_name", &form.last_name, USER_FIELD_MAX_LENGTH)?;
    check_length("password", &form.password, PASSWORD_MAX_LENGTH)?;

    Ok(())
}

/// Creates a regular user; the password is stored as an argon2 hash.
pub async fn register_user<S: Store>(store: &S, form: Registration) -> Result<UserProfile, Error> {
    validate_registration(&form)?;

    let user = Catalog::<User>::create(
        store,
        NewUser {
            email: form.email,
            username: form.username,
            first_name: form.first_name,
            last_name: form.last_name,
            password_hash: hash_password(&form.password)?,
            role: UserRole::User,
        },
    )
    .await?;

    log::info!("Registered user {} ({})", user.username, user.id);
    Ok(UserProfile::new(user, false))
}

pub async fn login_user<S: Store>(
    store: &S,
    keys: &SessionKeys,
    email: &str,
    password: &str,
) -> Result<String, Error> {
    let Some(user) = store.get_user_by_email(email).await? else {
        return Err(Error::not_found("No user with this email"));
    };

    if !verify_password(password, &user.password) {
        return Err(Error::validation("Invalid password"));
    }

    log::trace!("> User {} logged in", user.id);
    generate_jwt_session(keys, &user)
}

/// Revokes the session token until it would have expired anyway.
pub async fn logout_user<S: Store>(store: &S, session: &SessionData) -> Result<(), Error> {
    store.revoke_token(&session.jti, session.exp).await?;
    log::info!("User {} logged out", session.user_id);
    Ok(())
}

pub async fn authenticate<S: Store>(
    store: &S,
    keys: &SessionKeys,
    token: &str,
) -> Result<SessionData, Error> {
    let session: SessionData = verify_jwt_session(keys, token)?.into();

    if store.is_token_revoked(&session.jti).await? {
        return Err(Error::Unauthorized(String::from(
            "Invalid session; Token revoked",
        )));
    }
    if Catalog::<User>::get(store, session.user_id).await?.is_none() {
        return Err(Error::Unauthorized(String::from(
            "Invalid session; User no longer exists",
        )));
    }

    Ok(session)
}

pub async fn set_password<S: Store>(
    store: &S,
    session: &SessionData,
    current_password: &str,
    new_password: &str,
) -> Result<(), Error> {
    let user = find::<User, _>(store, session.user_id).await?;

    if !verify_password(current_password, &user.password) {
        return Err(Error::validation("current_password: Invalid password"));
    }
    check_length("new_password", new_password, PASSWORD_MAX_LENGTH)?;

    store
        .set_password(user.id, &hash_password(new_password)?)
        .await?;

    log::info!("User {} changed password", user.id);
    Ok(())
}

pub async fn current_user<S: Store>(store: &S, session: &SessionData) -> Result<UserProfile, Error> {
    Ok(UserProfile::new(find::<User, _>(store, session.user_id).await?, false))
}

pub async fn get_user<S: Store>(
    store: &S,
    viewer: Option<&SessionData>,
    id: Id,
) -> Result<UserProfile, Error> {
    let user = find::<User, _>(store, id).await?;
    let subscribed = is_subscribed(store, viewer, user.id).await?;

    Ok(UserProfile::new(user, subscribed))
}

pub async fn fetch_users<S: Store>(
    store: &S,
    viewer: Option<&SessionData>,
    page: PageRequest,
) -> Result<PageContext<UserProfile>, Error> {
    let listing = Catalog::<User>::list(store, &(), Some(page)).await?;

    let mut rows = Vec::with_capacity(listing.rows.len());
    for user in listing.rows {
        let subscribed = is_subscribed(store, viewer, user.id).await?;
        rows.push(UserProfile::new(user, subscribed));
    }

    Ok(PageContext::from_rows(rows, listing.total_rows, page))
}

/// `author` with their newest recipes, at most `recipes_limit` of them.
pub(crate) async fn subscription_view<S: Store>(
    store: &S,
    author: User,
    recipes_limit: Option<i64>,
) -> Result<SubscriptionView, Error> {
    let page = match recipes_limit {
        Some(limit) if limit < 0 => {
            return Err(Error::validation("recipes_limit: Must not be negative"))
        }
        Some(limit) => Some(PageRequest { page: 1, limit }),
        None => None,
    };

    let filter = RecipeFilter {
        author: Some(author.id),
        ..Default::default()
    };
    let recipes = Catalog::<Recipe>::list(store, &filter, page).await?;

    Ok(SubscriptionView {
        author: UserProfile::new(author, true),
        recipes: recipes.rows.into_iter().map(RecipeShort::from).collect(),
        recipes_count: recipes.total_rows,
    })
}

pub async fn fetch_subscriptions<S: Store>(
    store: &S,
    session: &SessionData,
    page: PageRequest,
    recipes_limit: Option<i64>,
) -> Result<PageContext<SubscriptionView>, Error> {
    let authors = store.subscribed_authors(session.user_id, Some(page)).await?;

    let mut rows = Vec::with_capacity(authors.rows.len());
    for author in authors.rows {
        rows.push(subscription_view(store, author, recipes_limit).await?);
    }

    Ok(PageContext::from_rows(rows, authors.total_rows, page))
}
