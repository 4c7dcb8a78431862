use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A catalog record as the backend hands it out. Older endpoints send `_id` instead of `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
}

/// One distinct book in the cart. `quantity` is at least 1 for as long as the item is present.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "price", default)]
    pub unit_price: f64,
    /// Negative quantities from the wire decode as 0 so the item can be dropped instead of failing the whole snapshot.
    #[serde(deserialize_with = "deserialize_quantity")]
    pub quantity: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl LineItem {
    pub fn from_book(book: &Book, quantity: u32) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            unit_price: normalize_price(book.price),
            quantity: quantity.max(1),
            cover_image_url: book.cover_image_url.clone(),
            category: book.category.clone(),
        }
    }

    pub fn line_total(&self) -> f64 {
        self.unit_price * f64::from(self.quantity)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistItem {
    #[serde(alias = "_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "price", default)]
    pub unit_price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    #[serde(default = "Utc::now")]
    pub date_added: DateTime<Utc>,
}

impl WishlistItem {
    pub fn from_book(book: &Book, date_added: DateTime<Utc>) -> Self {
        Self {
            id: book.id.clone(),
            title: book.title.clone(),
            author: book.author.clone(),
            unit_price: normalize_price(book.price),
            cover_image_url: book.cover_image_url.clone(),
            category: book.category.clone(),
            average_rating: book.average_rating,
            review_count: book.review_count,
            date_added,
        }
    }
}

impl From<&WishlistItem> for Book {
    fn from(item: &WishlistItem) -> Self {
        Book {
            id: item.id.clone(),
            title: item.title.clone(),
            author: item.author.clone(),
            price: item.unit_price,
            cover_image_url: item.cover_image_url.clone(),
            category: item.category.clone(),
            average_rating: item.average_rating,
            review_count: item.review_count,
        }
    }
}

fn deserialize_quantity<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let quantity = i64::deserialize(deserializer)?;
    Ok(u32::try_from(quantity.max(0)).unwrap_or(u32::MAX))
}

/// Prices that are negative or not finite are treated as free rather than rejected.
pub(crate) fn normalize_price(price: f64) -> f64 {
    if price.is_finite() && price > 0.0 {
        price
    } else {
        0.0
    }
}
