#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use time::OffsetDateTime;
use wb_ingest::{
    FetchError, Product, ProductDraft, ProductFilter, ProductSource, ProductStore, RawProduct,
    StoreError,
};

/// Replays a fixed sequence of page results; once drained every page is empty.
pub struct ScriptedSource {
    pages: Mutex<VecDeque<Result<Vec<RawProduct>, FetchError>>>,
    calls: AtomicUsize,
    requested: Mutex<Vec<(String, u32)>>,
}

impl ScriptedSource {
    pub fn new(pages: Vec<Result<Vec<RawProduct>, FetchError>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested_pages(&self) -> Vec<u32> {
        self.requested.lock().unwrap().iter().map(|(_, p)| *p).collect()
    }

    pub fn requested_queries(&self) -> Vec<String> {
        self.requested.lock().unwrap().iter().map(|(q, _)| q.clone()).collect()
    }
}

#[async_trait]
impl ProductSource for ScriptedSource {
    async fn fetch_page(&self, query: &str, page: u32) -> Result<Vec<RawProduct>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push((query.to_string(), page));
        self.pages.lock().unwrap().pop_front().unwrap_or(Ok(Vec::new()))
    }
}

pub fn item(name: &str, price_u: i64) -> RawProduct {
    RawProduct {
        name: Some(name.to_string()),
        price_u: Some(price_u),
        sale_price_u: Some(price_u / 2),
        rating: Some(4.5),
        feedbacks: Some(10),
    }
}

/// `count` distinct items named `{prefix}-{i}`.
pub fn page(prefix: &str, count: usize) -> Vec<RawProduct> {
    (0..count)
        .map(|i| item(&format!("{prefix}-{i}"), 10_000 + i as i64))
        .collect()
}

/// Vec-backed store for tests that must not touch SQLite (e.g. paused clock).
#[derive(Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Product>>,
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.rows.lock().unwrap().iter().find(|p| p.name == name).cloned())
    }

    async fn create(&self, draft: &ProductDraft) -> Result<Product, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let product = Product {
            id: rows.len() as i64 + 1,
            name: draft.name.clone(),
            price: draft.price,
            discount_price: draft.discount_price,
            rating: draft.rating,
            feedback_count: draft.feedback_count,
            created_at: OffsetDateTime::now_utc(),
        };
        rows.push(product.clone());
        Ok(product)
    }

    async fn update(&self, existing: &Product, draft: &ProductDraft) -> Result<Product, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .iter_mut()
            .find(|p| p.id == existing.id)
            .ok_or_else(|| StoreError::InvalidValue(format!("no row {}", existing.id)))?;
        row.price = draft.price;
        row.discount_price = draft.discount_price;
        row.rating = draft.rating;
        row.feedback_count = draft.feedback_count;
        Ok(row.clone())
    }

    async fn list(&self, filter: &ProductFilter) -> Result<Vec<Product>, StoreError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|p| passes(filter, p))
            .cloned()
            .collect())
    }
}

/// Same inclusive semantics as the SQL `list` query.
pub fn passes(filter: &ProductFilter, product: &Product) -> bool {
    filter.min_price.is_none_or(|p| product.price >= p)
        && filter.min_rating.is_none_or(|r| product.rating >= r)
        && filter.min_feedbacks.is_none_or(|f| product.feedback_count >= f)
}
