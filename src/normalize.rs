use rust_decimal::Decimal;

use crate::{models::ProductDraft, upstream::RawProduct};

/// Maps a raw upstream item to the canonical shape. Never fails; missing or
/// malformed fields fall back to their defaults.
pub fn normalize(raw: &RawProduct) -> ProductDraft {
    let price = minor_to_money(raw.price_u).unwrap_or(Decimal::new(0, 2));
    // missing sale price falls back to the list price, not to zero
    let discount_price = minor_to_money(raw.sale_price_u).unwrap_or(price);

    ProductDraft {
        name: raw.name.clone().unwrap_or_default(),
        price,
        discount_price,
        rating: raw.rating.filter(|r| r.is_finite()).unwrap_or(0.0),
        feedback_count: raw.feedbacks.filter(|n| *n >= 0).unwrap_or(0),
    }
}

/// Minor units (kopecks) to a two-digit decimal. Negative amounts are treated as absent.
fn minor_to_money(minor: Option<i64>) -> Option<Decimal> {
    minor.filter(|m| *m >= 0).map(|m| Decimal::new(m, 2))
}
