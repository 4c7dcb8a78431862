//! The Book Bazar client core: a cart and a wishlist that work offline-first and sync with the bookstore backend.
//!
//! Presentation code owns one [`SyncCoordinator`], calls its operations, reads state through
//! [`SyncCoordinator::with_cart`] / [`SyncCoordinator::with_wishlist`], and shows whatever
//! [`SyncCoordinator::drain_notices`] hands back.

pub mod api;
pub mod book;
pub mod cart;
pub mod checkout;
pub mod config;
pub mod coupons;
pub mod notifications;
pub mod sync;
pub mod wishlist;

use std::sync::LazyLock;

pub use api::{ApiError, BookstoreApi, CartMutation, HttpBookstoreApi, Session, WishlistMutation};
pub use book::{Book, LineItem, WishlistItem};
pub use cart::{AppliedCoupon, CartOutcome, CartSnapshot, CartStore};
pub use checkout::{CheckoutError, OrderDraft};
pub use config::{BackendConfig, ConfigError};
pub use coupons::{Coupon, CouponTable};
pub use notifications::{Notice, NoticeKind};
pub use satchel::data_model::{ListenerKey, SyncPhase, SyncState};
pub use sync::{StoreKind, SyncCoordinator};
pub use wishlist::{WishlistOutcome, WishlistSnapshot, WishlistStore};

// putting this inside LOGGER prevents us from accidentally initializing the logger more than once
static LOGGER: LazyLock<()> = LazyLock::new(|| {
    if let Err(e) = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("bookbazar_frontend_rs=info,satchel=info"),
    )
    .try_init()
    {
        eprintln!("Logger already installed: {e}");
    }
});

/// Install the logger. Safe to call any number of times.
pub fn init_logging() {
    LazyLock::force(&LOGGER);
}
