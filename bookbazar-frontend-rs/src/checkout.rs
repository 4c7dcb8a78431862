//! Checkout only simulates payment: it turns the cart into an order record and reports success.

use chrono::{DateTime, Utc};

use crate::cart::CartStore;

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("cannot check out an empty cart")]
    EmptyCart,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub book_id: String,
    pub title: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderStatus {
    Pending,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub items: Vec<OrderLine>,
    pub subtotal: f64,
    pub discount: f64,
    pub total: f64,
    pub coupon_code: Option<String>,
    pub order_date: DateTime<Utc>,
    pub status: OrderStatus,
}

impl OrderDraft {
    pub fn from_cart(cart: &CartStore, order_date: DateTime<Utc>) -> Result<Self, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        Ok(Self {
            items: cart
                .items()
                .map(|item| OrderLine {
                    book_id: item.id.clone(),
                    title: item.title.clone(),
                    price: item.unit_price,
                    quantity: item.quantity,
                })
                .collect(),
            subtotal: cart.subtotal(),
            discount: cart.discount().unwrap_or(0.0),
            total: cart.total(),
            coupon_code: cart.coupon_code().map(str::to_string),
            order_date,
            status: OrderStatus::Pending,
        })
    }
}
