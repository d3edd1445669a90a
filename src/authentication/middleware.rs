use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use crate::{actions::users::authenticate, error::Error, store::Store};

use super::jwt::{SessionData, SessionKeys};

/// Token from an `Authorization: Token <jwt>` or `Bearer <jwt>` header.
fn token_from_header(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer"))
        .then_some(token)
        .filter(|token| !token.is_empty())
}

async fn resolve_session<S: Store>(
    store: &S,
    keys: &SessionKeys,
    header: &str,
) -> Result<SessionData, Rejection> {
    let token = token_from_header(header).ok_or_else(|| {
        warp::reject::custom(Error::Unauthorized(String::from(
            "Invalid session; Malformed authorization header",
        )))
    })?;

    authenticate(store, keys, token)
        .await
        .map_err(warp::reject::custom)
}

pub fn with_session<S: Store + 'static>(
    store: Arc<S>,
    keys: Arc<SessionKeys>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::<String>("authorization").and_then(move |header: String| {
        let store = store.clone();
        let keys = keys.clone();
        async move { resolve_session(&*store, &keys, &header).await }
    })
}

/// Anonymous requests pass with `None`; a present but invalid token is rejected.
pub fn with_possible_session<S: Store + 'static>(
    store: Arc<S>,
    keys: Arc<SessionKeys>,
) -> impl Filter<Extract = (Option<SessionData>,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(
        move |header: Option<String>| {
            let store = store.clone();
            let keys = keys.clone();
            async move {
                match header {
                    Some(header) => resolve_session(&*store, &keys, &header).await.map(Some),
                    None => Ok(None),
                }
            }
        },
    )
}
