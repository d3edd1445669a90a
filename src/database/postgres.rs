use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    FromRow, Pool, Postgres, QueryBuilder, Row, Transaction,
};

use crate::{
    config::Config,
    error::{Error, QueryError},
    pagination::{Listing, PageRequest},
    schema::{
        Id, Ingredient, IngredientEntry, IngredientFilter, NewIngredient, NewRecipe, NewTag,
        NewUser, Recipe, RecipeDraft, RecipeFilter, RecipeIngredient, RelationKind,
        ShoppingListEntry, Tag, User,
    },
    store::{Catalog, MembershipStore, RecipeStore, UserStore},
};

/// Opens the pool and applies pending migrations.
pub async fn connect(config: &Config) -> Result<PgStore, Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(QueryError::from)?;

    sqlx::migrate!().run(&pool).await.map_err(QueryError::from)?;
    log::info!("Database migrations applied");

    Ok(PgStore::new(pool))
}

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

/// A row carrying `COUNT(*) OVER() AS total_rows` next to the entity columns.
struct Counted<T> {
    row: T,
    total_rows: i64,
}

impl<'r, T: FromRow<'r, PgRow>> FromRow<'r, PgRow> for Counted<T> {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            row: T::from_row(row)?,
            total_rows: row.try_get("total_rows")?,
        })
    }
}

fn into_listing<T>(rows: Vec<Counted<T>>) -> Listing<T> {
    let total_rows = rows.first().map(|r| r.total_rows).unwrap_or(0);
    Listing::new(rows.into_iter().map(|r| r.row).collect(), total_rows)
}

/// `COUNT(*) OVER()` only arrives with a row, so an empty page (past the end,
/// or `LIMIT 0`) has to be counted separately.
fn needs_count<T>(listing: &Listing<T>, page: Option<PageRequest>) -> bool {
    listing.rows.is_empty() && page.is_some()
}

fn push_recipe_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &RecipeFilter) {
    if let Some(author) = filter.author {
        query.push(" AND r.author_id = ").push_bind(author);
    }
    if !filter.tags.is_empty() {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM tag_recipes tr INNER JOIN tags t ON t.id = tr.tag_id \
                 WHERE tr.recipe_id = r.id AND t.slug = ANY(",
            )
            .push_bind(filter.tags.clone())
            .push("))");
    }
    if let Some(user_id) = filter.favorited_by {
        query
            .push(" AND EXISTS (SELECT 1 FROM favorites f WHERE f.recipe_id = r.id AND f.user_id = ")
            .push_bind(user_id)
            .push(")");
    }
    if let Some(user_id) = filter.in_cart_of {
        query
            .push(" AND EXISTS (SELECT 1 FROM carts c WHERE c.recipe_id = r.id AND c.user_id = ")
            .push_bind(user_id)
            .push(")");
    }
}

/// `LIMIT NULL` lists everything.
fn limits(page: Option<PageRequest>) -> (Option<i64>, i64) {
    page.map(|p| (Some(p.limit), p.offset())).unwrap_or((None, 0))
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn association_error(e: sqlx::Error) -> Error {
    if is_foreign_key_violation(&e) {
        Error::not_found("Ingredient or tag doesn't exist")
    } else if is_unique_violation(&e) {
        Error::validation("Ingredients can't be duplicated within a recipe")
    } else {
        QueryError::from(e).into()
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

async fn insert_associations(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: Id,
    ingredients: &[IngredientEntry],
    tags: &[Id],
) -> Result<(), Error> {
    if !ingredients.is_empty() {
        let mut query =
            QueryBuilder::<Postgres>::new("INSERT INTO ingredient_recipes (recipe_id, ingredient_id, amount) ");
        query.push_values(ingredients, |mut row, entry| {
            row.push_bind(recipe_id)
                .push_bind(entry.id)
                .push_bind(entry.amount);
        });
        query
            .build()
            .execute(&mut **tx)
            .await
            .map_err(association_error)?;
    }

    if !tags.is_empty() {
        let mut query = QueryBuilder::<Postgres>::new("INSERT INTO tag_recipes (recipe_id, tag_id) ");
        query.push_values(tags, |mut row, tag_id| {
            row.push_bind(recipe_id).push_bind(*tag_id);
        });
        query
            .build()
            .execute(&mut **tx)
            .await
            .map_err(association_error)?;
    }

    Ok(())
}

async fn missing_ids(table: &str, ids: &[Id], pool: &Pool<Postgres>) -> Result<Vec<Id>, Error> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let rows: Vec<(Id,)> = sqlx::query_as(&format!(
        "
        SELECT u.id FROM UNNEST($1::INT4[]) AS u(id)
        WHERE NOT EXISTS (SELECT 1 FROM {table} t WHERE t.id = u.id)
    "
    ))
    .bind(ids.to_vec())
    .fetch_all(pool)
    .await
    .map_err(QueryError::from)?;

    Ok(rows.into_iter().map(|r| r.0).collect())
}

#[async_trait]
impl Catalog<User> for PgStore {
    async fn get(&self, id: Id) -> Result<Option<User>, Error> {
        let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn list(&self, _filter: &(), page: Option<PageRequest>) -> Result<Listing<User>, Error> {
        let (limit, offset) = limits(page);
        let rows: Vec<Counted<User>> = sqlx::query_as(
            "SELECT u.*, COUNT(*) OVER() AS total_rows FROM users u ORDER BY u.id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        let mut listing = into_listing(rows);
        if needs_count(&listing, page) {
            listing.total_rows = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool)
                .await
                .map_err(QueryError::from)?;
        }

        Ok(listing)
    }

    async fn create(&self, draft: NewUser) -> Result<User, Error> {
        let result: Result<User, sqlx::Error> = sqlx::query_as(
            "
            INSERT INTO users (email, username, first_name, last_name, password, role)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        ",
        )
        .bind(draft.email)
        .bind(draft.username)
        .bind(draft.first_name)
        .bind(draft.last_name)
        .bind(draft.password_hash)
        .bind(draft.role)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(user) => Ok(user),
            Err(e) if is_unique_violation(&e) => Err(Error::Conflict(String::from(
                "A user with that email or username already exists",
            ))),
            Err(e) => Err(QueryError::from(e).into()),
        }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, Error> {
        let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn set_password(&self, user_id: Id, password_hash: &str) -> Result<(), Error> {
        sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(())
    }

    async fn revoke_token(&self, jti: &str, expires_at: i64) -> Result<(), Error> {
        sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < $1")
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(QueryError::from)?;

        sqlx::query(
            "INSERT INTO revoked_tokens (jti, expires_at) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(jti)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(())
    }

    async fn is_token_revoked(&self, jti: &str) -> Result<bool, Error> {
        let row: Option<(String,)> = sqlx::query_as("SELECT jti FROM revoked_tokens WHERE jti = $1")
            .bind(jti)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row.is_some())
    }

    async fn subscribed_authors(
        &self,
        user_id: Id,
        page: Option<PageRequest>,
    ) -> Result<Listing<User>, Error> {
        let (limit, offset) = limits(page);
        let rows: Vec<Counted<User>> = sqlx::query_as(
            "
            SELECT u.*, COUNT(*) OVER() AS total_rows
            FROM subscriptions s
            INNER JOIN users u ON u.id = s.author_id
            WHERE s.user_id = $1
            ORDER BY s.id
            LIMIT $2 OFFSET $3
        ",
        )
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        let mut listing = into_listing(rows);
        if needs_count(&listing, page) {
            listing.total_rows =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM subscriptions WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(QueryError::from)?;
        }

        Ok(listing)
    }
}

#[async_trait]
impl Catalog<Ingredient> for PgStore {
    async fn get(&self, id: Id) -> Result<Option<Ingredient>, Error> {
        let row: Option<Ingredient> = sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn list(
        &self,
        filter: &IngredientFilter,
        page: Option<PageRequest>,
    ) -> Result<Listing<Ingredient>, Error> {
        let (limit, offset) = limits(page);
        let prefix = format!("{}%", escape_like(filter.name.as_deref().unwrap_or("")));

        let rows: Vec<Counted<Ingredient>> = sqlx::query_as(
            "
            SELECT i.*, COUNT(*) OVER() AS total_rows FROM ingredients i
            WHERE i.name ILIKE $1
            ORDER BY i.name, i.id
            LIMIT $2 OFFSET $3
        ",
        )
        .bind(&prefix)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        let mut listing = into_listing(rows);
        if needs_count(&listing, page) {
            listing.total_rows =
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM ingredients WHERE name ILIKE $1")
                    .bind(&prefix)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(QueryError::from)?;
        }

        Ok(listing)
    }

    async fn create(&self, draft: NewIngredient) -> Result<Ingredient, Error> {
        let row: Ingredient = sqlx::query_as(
            "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) RETURNING *",
        )
        .bind(draft.name)
        .bind(draft.measurement_unit)
        .fetch_one(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row)
    }
}

#[async_trait]
impl Catalog<Tag> for PgStore {
    async fn get(&self, id: Id) -> Result<Option<Tag>, Error> {
        let row: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn list(&self, _filter: &(), page: Option<PageRequest>) -> Result<Listing<Tag>, Error> {
        let (limit, offset) = limits(page);
        let rows: Vec<Counted<Tag>> = sqlx::query_as(
            "SELECT t.*, COUNT(*) OVER() AS total_rows FROM tags t ORDER BY t.id LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        let mut listing = into_listing(rows);
        if needs_count(&listing, page) {
            listing.total_rows = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM tags")
                .fetch_one(&self.pool)
                .await
                .map_err(QueryError::from)?;
        }

        Ok(listing)
    }

    async fn create(&self, draft: NewTag) -> Result<Tag, Error> {
        let result: Result<Tag, sqlx::Error> = sqlx::query_as(
            "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(draft.name)
        .bind(draft.color)
        .bind(draft.slug)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(tag) => Ok(tag),
            Err(e) if is_unique_violation(&e) => Err(Error::Conflict(String::from(
                "A tag with that name, color or slug already exists",
            ))),
            Err(e) => Err(QueryError::from(e).into()),
        }
    }
}

#[async_trait]
impl Catalog<Recipe> for PgStore {
    async fn get(&self, id: Id) -> Result<Option<Recipe>, Error> {
        let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn list(
        &self,
        filter: &RecipeFilter,
        page: Option<PageRequest>,
    ) -> Result<Listing<Recipe>, Error> {
        let (limit, offset) = limits(page);
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT r.*, COUNT(*) OVER() AS total_rows FROM recipes r WHERE TRUE",
        );

        push_recipe_filter(&mut query, filter);
        query
            .push(" ORDER BY r.id DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        let rows: Vec<Counted<Recipe>> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(QueryError::from)?;

        let mut listing = into_listing(rows);
        if needs_count(&listing, page) {
            let mut count =
                QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM recipes r WHERE TRUE");
            push_recipe_filter(&mut count, filter);
            listing.total_rows = count
                .build_query_scalar::<i64>()
                .fetch_one(&self.pool)
                .await
                .map_err(QueryError::from)?;
        }

        Ok(listing)
    }

    async fn create(&self, draft: NewRecipe) -> Result<Recipe, Error> {
        let mut tx = self.pool.begin().await.map_err(QueryError::from)?;

        let recipe: Recipe = sqlx::query_as(
            "
            INSERT INTO recipes (author_id, name, image, text, cooking_time)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
        ",
        )
        .bind(draft.author_id)
        .bind(&draft.name)
        .bind(&draft.image)
        .bind(&draft.text)
        .bind(draft.cooking_time)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                Error::not_found("Author doesn't exist")
            } else {
                QueryError::from(e).into()
            }
        })?;

        insert_associations(&mut tx, recipe.id, &draft.ingredients, &draft.tags).await?;
        tx.commit().await.map_err(QueryError::from)?;

        Ok(recipe)
    }
}

#[async_trait]
impl RecipeStore for PgStore {
    async fn replace_recipe(&self, id: Id, draft: &RecipeDraft) -> Result<Option<Recipe>, Error> {
        let mut tx = self.pool.begin().await.map_err(QueryError::from)?;

        let recipe: Option<Recipe> = sqlx::query_as(
            "
            UPDATE recipes
            SET name = $1, text = $2, cooking_time = $3, image = COALESCE($4, image)
            WHERE id = $5
            RETURNING *
        ",
        )
        .bind(&draft.name)
        .bind(&draft.text)
        .bind(draft.cooking_time)
        .bind(&draft.image)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(QueryError::from)?;

        let Some(recipe) = recipe else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM ingredient_recipes WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(QueryError::from)?;
        sqlx::query("DELETE FROM tag_recipes WHERE recipe_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(QueryError::from)?;

        insert_associations(&mut tx, id, &draft.ingredients, &draft.tags).await?;
        tx.commit().await.map_err(QueryError::from)?;

        Ok(Some(recipe))
    }

    async fn delete_recipe(&self, id: Id) -> Result<bool, Error> {
        let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn recipe_ingredients(&self, recipe_id: Id) -> Result<Vec<RecipeIngredient>, Error> {
        let rows: Vec<RecipeIngredient> = sqlx::query_as(
            "
            SELECT i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ir.amount AS amount
            FROM ingredient_recipes ir
            INNER JOIN ingredients i ON i.id = ir.ingredient_id
            WHERE ir.recipe_id = $1
            ORDER BY ir.id
        ",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, Error> {
        let rows: Vec<Tag> = sqlx::query_as(
            "
            SELECT t.* FROM tag_recipes tr
            INNER JOIN tags t ON t.id = tr.tag_id
            WHERE tr.recipe_id = $1
            ORDER BY t.id
        ",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn missing_ingredients(&self, ids: &[Id]) -> Result<Vec<Id>, Error> {
        missing_ids("ingredients", ids, &self.pool).await
    }

    async fn missing_tags(&self, ids: &[Id]) -> Result<Vec<Id>, Error> {
        missing_ids("tags", ids, &self.pool).await
    }

    async fn cart_totals(&self, user_id: Id) -> Result<Vec<ShoppingListEntry>, Error> {
        let rows: Vec<ShoppingListEntry> = sqlx::query_as(
            "
            SELECT i.name AS name, i.measurement_unit AS measurement_unit, SUM(ir.amount)::BIGINT AS amount
            FROM carts c
            INNER JOIN ingredient_recipes ir ON ir.recipe_id = c.recipe_id
            INNER JOIN ingredients i ON i.id = ir.ingredient_id
            WHERE c.user_id = $1
            GROUP BY i.name, i.measurement_unit
        ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }
}

#[async_trait]
impl MembershipStore for PgStore {
    async fn insert_membership(
        &self,
        kind: RelationKind,
        user_id: Id,
        object_id: Id,
    ) -> Result<bool, Error> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (user_id, {}) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            kind.table(),
            kind.object_column()
        ))
        .bind(user_id)
        .bind(object_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) => Ok(result.rows_affected() > 0),
            Err(e) if is_foreign_key_violation(&e) => {
                Err(Error::not_found("Referenced user or recipe doesn't exist"))
            }
            Err(e) => Err(QueryError::from(e).into()),
        }
    }

    async fn delete_membership(
        &self,
        kind: RelationKind,
        user_id: Id,
        object_id: Id,
    ) -> Result<bool, Error> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND {} = $2",
            kind.table(),
            kind.object_column()
        ))
        .bind(user_id)
        .bind(object_id)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn has_membership(
        &self,
        kind: RelationKind,
        user_id: Id,
        object_id: Id,
    ) -> Result<bool, Error> {
        let row: (bool,) = sqlx::query_as(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND {} = $2)",
            kind.table(),
            kind.object_column()
        ))
        .bind(user_id)
        .bind(object_id)
        .fetch_one(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_patterns_are_escaped() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn only_empty_pages_are_recounted() {
        let page = PageRequest::new(Some(2), Some(5)).unwrap();
        let empty: Listing<i32> = Listing::new(vec![], 0);

        assert!(needs_count(&empty, Some(page)));
        assert!(!needs_count(&empty, None));
        assert!(!needs_count(&Listing::new(vec![1], 6), Some(page)));
    }

    #[test]
    fn missing_page_lists_everything() {
        assert_eq!(limits(None), (None, 0));
        let page = PageRequest::new(Some(3), Some(5)).unwrap();
        assert_eq!(limits(Some(page)), (Some(5), 10));
    }
}
