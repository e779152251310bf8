use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use sqlx::{
    QueryBuilder, Sqlite, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use time::OffsetDateTime;

use crate::{
    config::DatabaseConfig,
    error::StoreError,
    models::{Product, ProductDraft, ProductFilter},
};

/// Storage collaborator used by the reconciler and the read endpoint.
///
/// Name uniqueness is not assumed; callers go through `find_by_name` first.
#[async_trait]
pub trait ProductStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, StoreError>;

    /// Inserts a new row, stamping `created_at` with the current UTC time.
    async fn create(&self, draft: &ProductDraft) -> Result<Product, StoreError>;

    /// Overwrites the mutable fields of `existing`; `created_at` is left alone.
    async fn update(&self, existing: &Product, draft: &ProductDraft)
    -> Result<Product, StoreError>;

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError>;
}

const COLUMNS: &str =
    "id, name, price_minor, discount_price_minor, rating, feedback_count, created_at";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i64,
    name: String,
    price_minor: i64,
    discount_price_minor: i64,
    rating: f64,
    feedback_count: i64,
    created_at: OffsetDateTime,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            price: Decimal::new(row.price_minor, 2),
            discount_price: Decimal::new(row.discount_price_minor, 2),
            rating: row.rating,
            feedback_count: row.feedback_count,
            created_at: row.created_at,
        }
    }
}

fn to_minor(amount: Decimal) -> Result<i64, StoreError> {
    let scaled = amount * Decimal::ONE_HUNDRED;
    if !scaled.fract().is_zero() {
        return Err(StoreError::InvalidValue(format!(
            "{amount} has more than two fractional digits"
        )));
    }
    scaled
        .to_i64()
        .ok_or_else(|| StoreError::InvalidValue(format!("{amount} is out of range")))
}

#[derive(Clone)]
pub struct SqliteProductStore {
    pool: SqlitePool,
}

impl SqliteProductStore {
    /// Opens (creating if missing) the database and applies migrations.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::info!(
            url = %config.url,
            max_connections = config.max_connections,
            "product store ready"
        );
        Ok(store)
    }

    /// Private in-memory database. A single pinned connection keeps it alive.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ProductStore for SqliteProductStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {COLUMNS} FROM products WHERE name = ? ORDER BY id LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn create(&self, draft: &ProductDraft) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products
             (name, price_minor, discount_price_minor, rating, feedback_count, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING {COLUMNS}"
        ))
        .bind(&draft.name)
        .bind(to_minor(draft.price)?)
        .bind(to_minor(draft.discount_price)?)
        .bind(draft.rating)
        .bind(draft.feedback_count)
        .bind(OffsetDateTime::now_utc())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update(
        &self,
        existing: &Product,
        draft: &ProductDraft,
    ) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products
             SET price_minor = ?, discount_price_minor = ?, rating = ?, feedback_count = ?
             WHERE id = ?
             RETURNING {COLUMNS}"
        ))
        .bind(to_minor(draft.price)?)
        .bind(to_minor(draft.discount_price)?)
        .bind(draft.rating)
        .bind(draft.feedback_count)
        .bind(existing.id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM products WHERE 1=1"));

        if let Some(min_price) = filter.min_price {
            // inclusive bound, rounded up to the next whole kopeck
            let min_minor = (min_price * Decimal::ONE_HUNDRED)
                .ceil()
                .to_i64()
                .unwrap_or(if min_price.is_sign_negative() { i64::MIN } else { i64::MAX });
            query.push(" AND price_minor >= ");
            query.push_bind(min_minor);
        }

        if let Some(min_rating) = filter.min_rating {
            query.push(" AND rating >= ");
            query.push_bind(min_rating);
        }

        if let Some(min_feedbacks) = filter.min_feedbacks {
            query.push(" AND feedback_count >= ");
            query.push_bind(min_feedbacks);
        }

        query.push(" ORDER BY id");

        let rows = query
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }
}
