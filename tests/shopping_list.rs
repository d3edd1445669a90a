mod common;

use foodgram_sdk::{
    actions::{
        memberships::{add_to_cart, remove_from_cart},
        recipes::{create_recipe, update_recipe},
        shopping_list::{render_shopping_list, shopping_list},
    },
    memory::MemoryStore,
    schema::ShoppingListEntry,
    SHOPPING_LIST_CLOSING, SHOPPING_LIST_TITLE,
};

use common::{draft, ingredient, user};

fn numbered(text: &str) -> Vec<&str> {
    text.lines()
        .filter(|line| line.split_once(". ").is_some_and(|(n, _)| n.parse::<usize>().is_ok()))
        .collect()
}

#[tokio::test]
async fn empty_cart_has_no_ingredient_lines() {
    let store = MemoryStore::new();
    let buyer = user(&store, "buyer").await;

    let text = render_shopping_list(&store, buyer.user_id).await.unwrap();

    assert!(numbered(&text).is_empty());
    assert_eq!(text.lines().next(), Some(SHOPPING_LIST_TITLE));
    assert_eq!(text.lines().last(), Some(SHOPPING_LIST_CLOSING));
}

#[tokio::test]
async fn same_ingredient_is_summed_across_recipes() {
    let store = MemoryStore::new();
    let author = user(&store, "author").await;
    let salt = ingredient(&store, "Salt", "g").await;
    let water = ingredient(&store, "Water", "ml").await;

    let broth = create_recipe(&store, &author, draft(&[(salt.id, 5), (water.id, 300)], &[]))
        .await
        .unwrap();
    let brine = create_recipe(&store, &author, draft(&[(salt.id, 10)], &[]))
        .await
        .unwrap();
    add_to_cart(&store, &author, broth.id).await.unwrap();
    add_to_cart(&store, &author, brine.id).await.unwrap();

    let text = render_shopping_list(&store, author.user_id).await.unwrap();
    assert_eq!(numbered(&text), vec!["1. Salt (g) - 15", "2. Water (ml) - 300"]);
}

#[tokio::test]
async fn groups_by_name_and_unit() {
    let store = MemoryStore::new();
    let author = user(&store, "author").await;
    let sugar_g = ingredient(&store, "Sugar", "g").await;
    let sugar_cup = ingredient(&store, "Sugar", "cup").await;
    let apple = ingredient(&store, "Apple", "pcs").await;

    let pie = create_recipe(
        &store,
        &author,
        draft(&[(sugar_g.id, 100), (apple.id, 3)], &[]),
    )
    .await
    .unwrap();
    let jam = create_recipe(
        &store,
        &author,
        draft(&[(sugar_cup.id, 2), (apple.id, 5)], &[]),
    )
    .await
    .unwrap();
    add_to_cart(&store, &author, pie.id).await.unwrap();
    add_to_cart(&store, &author, jam.id).await.unwrap();

    let list = shopping_list(&store, author.user_id).await.unwrap();
    let entry = |name: &str, unit: &str, amount| ShoppingListEntry {
        name: name.to_string(),
        measurement_unit: unit.to_string(),
        amount,
    };
    assert_eq!(
        list.entries(),
        &[
            entry("Apple", "pcs", 8),
            entry("Sugar", "cup", 2),
            entry("Sugar", "g", 100),
        ]
    );
}

#[tokio::test]
async fn only_the_users_cart_counts() {
    let store = MemoryStore::new();
    let author = user(&store, "author").await;
    let other = user(&store, "other").await;
    let salt = ingredient(&store, "Salt", "g").await;

    let recipe = create_recipe(&store, &author, draft(&[(salt.id, 5)], &[]))
        .await
        .unwrap();
    add_to_cart(&store, &other, recipe.id).await.unwrap();

    assert!(shopping_list(&store, author.user_id).await.unwrap().is_empty());
    assert_eq!(
        shopping_list(&store, other.user_id).await.unwrap().entries().len(),
        1
    );

    remove_from_cart(&store, &other, recipe.id).await.unwrap();
    assert!(shopping_list(&store, other.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn reflects_recipe_updates() {
    let store = MemoryStore::new();
    let author = user(&store, "author").await;
    let salt = ingredient(&store, "Salt", "g").await;

    let recipe = create_recipe(&store, &author, draft(&[(salt.id, 5)], &[]))
        .await
        .unwrap();
    add_to_cart(&store, &author, recipe.id).await.unwrap();
    update_recipe(&store, &author, recipe.id, draft(&[(salt.id, 7)], &[]))
        .await
        .unwrap();

    let text = render_shopping_list(&store, author.user_id).await.unwrap();
    assert_eq!(numbered(&text), vec!["1. Salt (g) - 7"]);
}
