//! Adapter over the Wildberries public search endpoint.
//!
//! Everything that depends on the upstream contract (query parameters, the
//! `data.products` envelope, field names) lives here. The rest of the crate only
//! sees [`RawProduct`] lists through [`ProductSource`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde_json::Value;
use url::Url;

use crate::{error::FetchError, identity::IdentityPool};

pub const PAGE_SIZE: u32 = 100;

/// Fixed locale/currency/geo parameters sent with every search.
const FIXED_PARAMS: &[(&str, &str)] = &[
    ("appType", "1"),
    ("couponsGeo", "12,3,18"),
    ("curr", "rub"),
    ("dest", "-1029256,-102269,-2162198,-1257786"),
    ("emp", "0"),
    ("lang", "ru"),
    ("locale", "ru"),
    ("pricemarginCoeff", "1.0"),
];

/// One upstream item with every field optional. Wrong-shaped values are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawProduct {
    pub name: Option<String>,
    pub price_u: Option<i64>,
    pub sale_price_u: Option<i64>,
    pub rating: Option<f64>,
    pub feedbacks: Option<i64>,
}

impl RawProduct {
    pub fn from_value(item: &Value) -> Self {
        Self {
            name: item.get("name").and_then(Value::as_str).map(str::to_string),
            price_u: item.get("priceU").and_then(as_whole_number),
            sale_price_u: item.get("salePriceU").and_then(as_whole_number),
            rating: item.get("rating").and_then(Value::as_f64),
            feedbacks: item.get("feedbacks").and_then(as_whole_number),
        }
    }
}

fn as_whole_number(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| {
        v.as_f64()
            .filter(|f| f.is_finite() && f.abs() < i64::MAX as f64)
            .map(|f| f.round() as i64)
    })
}

/// Source of search result pages. Page numbers start at 1.
#[async_trait]
pub trait ProductSource: Send + Sync {
    async fn fetch_page(&self, query: &str, page: u32) -> Result<Vec<RawProduct>, FetchError>;
}

pub fn search_url(base: &str, query: &str, page: u32) -> Result<Url, url::ParseError> {
    let page = page.to_string();
    let limit = PAGE_SIZE.to_string();
    let mut params: Vec<(&str, &str)> = FIXED_PARAMS.to_vec();
    params.extend([
        ("query", query),
        ("sort", "popular"),
        ("resultset", "catalog"),
        ("page", page.as_str()),
        ("limit", limit.as_str()),
    ]);
    Url::parse_with_params(base, &params)
}

/// Items at `data.products`; absent or non-array yields an empty list.
pub fn extract_products(body: &Value) -> Vec<RawProduct> {
    body.pointer("/data/products")
        .and_then(Value::as_array)
        .map(|items| items.iter().map(RawProduct::from_value).collect())
        .unwrap_or_default()
}

pub struct WbSearchClient {
    client: reqwest::Client,
    base_url: String,
    identities: IdentityPool,
}

impl WbSearchClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        identities: IdentityPool,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(FetchError::Transport)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            identities,
        })
    }
}

#[async_trait]
impl ProductSource for WbSearchClient {
    async fn fetch_page(&self, query: &str, page: u32) -> Result<Vec<RawProduct>, FetchError> {
        let url = search_url(&self.base_url, query, page)?;
        let ua = self.identities.pick();

        tracing::debug!(page, %url, user_agent = ua, "GET search page");
        let rsp = self
            .client
            .get(url)
            .header(USER_AGENT, ua)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = rsp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = rsp.bytes().await?;
        let json: Value =
            serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        let items = extract_products(&json);
        tracing::debug!(page, items = items.len(), bytes = body.len(), "search page decoded");
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn url_carries_fixed_and_paging_params() {
        let url = search_url(crate::config::DEFAULT_SEARCH_URL, "кроссовки nike", 3).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let get = |key: &str| {
            pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(url.host_str(), Some("search.wb.ru"));
        assert_eq!(get("query"), Some("кроссовки nike"));
        assert_eq!(get("page"), Some("3"));
        assert_eq!(get("limit"), Some("100"));
        assert_eq!(get("sort"), Some("popular"));
        assert_eq!(get("resultset"), Some("catalog"));
        assert_eq!(get("curr"), Some("rub"));
        assert_eq!(get("dest"), Some("-1029256,-102269,-2162198,-1257786"));
        assert_eq!(pairs.len(), FIXED_PARAMS.len() + 5);
    }

    #[tokio::test]
    async fn unparsable_base_url_fails_before_sending() {
        let client = WbSearchClient::new(
            "search.wb.ru/no-scheme",
            Duration::from_secs(1),
            IdentityPool::single("wb-ingest-test/1.0"),
        )
        .unwrap();
        let err = client.fetch_page("кеды", 1).await.unwrap_err();
        assert!(matches!(err, FetchError::Url(url::ParseError::RelativeUrlWithoutBase)));
    }

    #[test]
    fn products_come_from_nested_path() {
        let body = json!({
            "data": { "products": [
                { "name": "Футболка", "priceU": 99900, "salePriceU": 59900, "rating": 4.7, "feedbacks": 12 },
                { "name": "Носки" }
            ]}
        });
        let items = extract_products(&body);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].price_u, Some(99900));
        assert_eq!(items[0].sale_price_u, Some(59900));
        assert_eq!(items[0].feedbacks, Some(12));
        assert_eq!(items[1], RawProduct { name: Some("Носки".into()), ..Default::default() });
    }

    #[test]
    fn missing_envelope_is_empty() {
        assert!(extract_products(&json!({})).is_empty());
        assert!(extract_products(&json!({ "data": {} })).is_empty());
        assert!(extract_products(&json!({ "data": { "products": "nope" } })).is_empty());
    }

    #[test]
    fn wrong_shaped_fields_become_none() {
        let raw = RawProduct::from_value(&json!({
            "name": 42,
            "priceU": "100",
            "salePriceU": 1999.6,
            "rating": "five",
            "feedbacks": null
        }));
        assert_eq!(raw.name, None);
        assert_eq!(raw.price_u, None);
        assert_eq!(raw.sale_price_u, Some(2000));
        assert_eq!(raw.rating, None);
        assert_eq!(raw.feedbacks, None);
    }
}
