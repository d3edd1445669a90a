mod common;

use foodgram_sdk::{
    actions::{
        ingredients::{create_ingredient, get_ingredient, list_ingredients},
        tags::{create_tag, list_tags},
        users::{
            authenticate, current_user, fetch_users, login_user, logout_user, register_user,
            set_password, Registration,
        },
    },
    error::{Error, ErrorKind},
    jwt::SessionKeys,
    memory::MemoryStore,
    pagination::PageRequest,
    schema::{NewIngredient, NewTag, User},
    store::Catalog,
};

use common::{admin, ingredient, user};

fn registration(username: &str) -> Registration {
    Registration {
        email: format!("{username}@example.com"),
        username: username.to_string(),
        first_name: String::from("Ada"),
        last_name: String::from("Cook"),
        password: String::from("password123"),
    }
}

#[tokio::test]
async fn register_login_logout() {
    let store = MemoryStore::new();
    let keys = SessionKeys::new(b"secret", 1).unwrap();

    let profile = register_user(&store, registration("ada")).await.unwrap();
    assert!(!profile.is_subscribed);

    let stored = Catalog::<User>::get(&store, profile.id).await.unwrap().unwrap();
    assert_ne!(stored.password, "password123");

    let token = login_user(&store, &keys, "ada@example.com", "password123")
        .await
        .unwrap();
    let session = authenticate(&store, &keys, &token).await.unwrap();
    assert_eq!(session.user_id, profile.id);
    assert_eq!(current_user(&store, &session).await.unwrap().username, "ada");

    logout_user(&store, &session).await.unwrap();
    let err = authenticate(&store, &keys, &token).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[tokio::test]
async fn bad_credentials_are_rejected() {
    let store = MemoryStore::new();
    let keys = SessionKeys::new(b"secret", 1).unwrap();
    register_user(&store, registration("ada")).await.unwrap();

    let err = login_user(&store, &keys, "ada@example.com", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let err = login_user(&store, &keys, "nobody@example.com", "password123")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn duplicate_email_or_username_conflicts() {
    let store = MemoryStore::new();
    register_user(&store, registration("ada")).await.unwrap();

    let mut same_email = registration("grace");
    same_email.email = String::from("ADA@example.com");
    let err = register_user(&store, same_email).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let mut same_name = registration("ada");
    same_name.email = String::from("other@example.com");
    let err = register_user(&store, same_name).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn password_change_checks_current_hash() {
    let store = MemoryStore::new();
    let keys = SessionKeys::new(b"secret", 1).unwrap();
    let session = user(&store, "ada").await;

    let err = set_password(&store, &session, "wrong", "fresh-password")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    set_password(&store, &session, "password123", "fresh-password")
        .await
        .unwrap();
    assert!(login_user(&store, &keys, "ada@example.com", "password123")
        .await
        .is_err());
    login_user(&store, &keys, "ada@example.com", "fresh-password")
        .await
        .unwrap();
}

#[tokio::test]
async fn users_are_paginated() {
    let store = MemoryStore::new();
    let viewer = user(&store, "viewer").await;
    for name in ["a1", "a2", "a3"] {
        user(&store, name).await;
    }

    let page = fetch_users(&store, Some(&viewer), PageRequest::new(Some(1), Some(3)).unwrap())
        .await
        .unwrap();
    assert_eq!(page.rows.len(), 3);
    assert_eq!(page.total_rows, 4);
    assert_eq!(page.next_page, Some(2));
}

#[tokio::test]
async fn reference_data_is_admin_only() {
    let store = MemoryStore::new();
    let cook = user(&store, "cook").await;
    let root = admin(cook.user_id);

    let flour = NewIngredient {
        name: String::from("Flour"),
        measurement_unit: String::from("g"),
    };
    let err = create_ingredient(&store, &cook, flour.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    let flour = create_ingredient(&store, &root, flour).await.unwrap();
    assert_eq!(get_ingredient(&store, flour.id).await.unwrap().name, "Flour");

    let breakfast = NewTag {
        name: String::from("Breakfast"),
        color: String::from("#E26C2D"),
        slug: String::from("breakfast"),
    };
    let err = create_tag(&store, &cook, breakfast.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    create_tag(&store, &root, breakfast.clone()).await.unwrap();
    let err = create_tag(&store, &root, breakfast).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(list_tags(&store).await.unwrap().len(), 1);
}

#[tokio::test]
async fn ingredient_search_is_case_insensitive_prefix() {
    let store = MemoryStore::new();
    ingredient(&store, "Salt", "g").await;
    ingredient(&store, "salmon", "g").await;
    ingredient(&store, "Basil", "g").await;

    let names: Vec<String> = list_ingredients(&store, Some(String::from("SAL")))
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.name)
        .collect();
    assert_eq!(names, vec!["Salt", "salmon"]);

    assert_eq!(list_ingredients(&store, None).await.unwrap().len(), 3);
    assert!(matches!(
        get_ingredient(&store, 99).await,
        Err(Error::NotFound(_))
    ));
}
