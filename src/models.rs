use std::{fmt::Display, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

/// Canonical stored product. `name` is the upsert key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub discount_price: Decimal,
    pub rating: f64,
    pub feedback_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Normalized candidate produced from one upstream item.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDraft {
    pub name: String,
    pub price: Decimal,
    pub discount_price: Decimal,
    pub rating: f64,
    pub feedback_count: i64,
}

/// Inclusive lower bounds for the read side. Unset or blank bounds do not filter,
/// so `?min_price=` behaves like leaving the parameter out.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFilter {
    #[serde(default, deserialize_with = "empty_as_none")]
    pub min_price: Option<Decimal>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub min_rating: Option<f64>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub min_feedbacks: Option<i64>,
}

fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|e| serde::de::Error::custom(format!("invalid value {raw:?}: {e}")))
}
