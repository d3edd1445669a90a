#![allow(dead_code)]

use foodgram_sdk::{
    actions::users::{register_user, Registration},
    jwt::SessionData,
    schema::{Id, Ingredient, IngredientEntry, NewIngredient, NewTag, RecipeDraft, Tag, UserRole},
    store::{Catalog, Store},
};

pub fn session(user_id: Id) -> SessionData {
    SessionData {
        user_id,
        role: UserRole::User,
        jti: format!("test-{user_id}"),
        exp: i64::MAX,
        is_admin: false,
    }
}

pub fn admin(user_id: Id) -> SessionData {
    SessionData {
        role: UserRole::Admin,
        is_admin: true,
        ..session(user_id)
    }
}

pub async fn user<S: Store>(store: &S, username: &str) -> SessionData {
    let profile = register_user(
        store,
        Registration {
            email: format!("{username}@example.com"),
            username: username.to_string(),
            first_name: String::from("Test"),
            last_name: String::from("User"),
            password: String::from("password123"),
        },
    )
    .await
    .unwrap();

    session(profile.id)
}

pub async fn ingredient<S: Store>(store: &S, name: &str, unit: &str) -> Ingredient {
    Catalog::<Ingredient>::create(
        store,
        NewIngredient {
            name: name.to_string(),
            measurement_unit: unit.to_string(),
        },
    )
    .await
    .unwrap()
}

pub async fn tag<S: Store>(store: &S, slug: &str, color: &str) -> Tag {
    Catalog::<Tag>::create(
        store,
        NewTag {
            name: slug.to_uppercase(),
            color: color.to_string(),
            slug: slug.to_string(),
        },
    )
    .await
    .unwrap()
}

pub fn draft(ingredients: &[(Id, i32)], tags: &[Id]) -> RecipeDraft {
    RecipeDraft {
        name: String::from("Soup"),
        text: String::from("Boil everything"),
        cooking_time: 30,
        image: Some(String::from("recipes/soup.png")),
        ingredients: ingredients
            .iter()
            .map(|&(id, amount)| IngredientEntry { id, amount })
            .collect(),
        tags: tags.to_vec(),
    }
}
