use indexmap::IndexMap;
use satchel::SnapshotStore;
use serde::{Deserialize, Serialize};

use crate::book::{Book, LineItem, normalize_price};
use crate::coupons::{CouponTable, normalize_code};

/// The cart as it travels over the wire and into the local cache.
/// `subtotal` and `finalTotal` are informational; the store recomputes both.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSnapshot {
    #[serde(default)]
    pub items: Vec<LineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_total: Option<f64>,
    #[serde(default, alias = "total", skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<f64>,
}

/// Code and amount always travel together, so one can never be set without the other.
#[derive(Clone, Debug, PartialEq)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount: f64,
}

/// What a cart operation did. Only some outcomes change state; see [`CartOutcome::changed_state`].
#[derive(Clone, Debug, PartialEq)]
pub enum CartOutcome {
    Added { title: String },
    QuantityIncreased { title: String, quantity: u32 },
    QuantitySet { title: String, quantity: u32 },
    Removed { title: String },
    NotInCart { id: String },
    Cleared,
    CouponApplied { code: String, percent: u32, saved: f64 },
    InvalidCoupon { code: String },
    CouponAlreadyActive { active: String },
    NothingToDiscount,
    CouponRemoved,
    NoCouponActive,
}

impl CartOutcome {
    pub fn changed_state(&self) -> bool {
        match self {
            CartOutcome::Added { .. }
            | CartOutcome::QuantityIncreased { .. }
            | CartOutcome::QuantitySet { .. }
            | CartOutcome::Removed { .. }
            | CartOutcome::Cleared
            | CartOutcome::CouponApplied { .. }
            | CartOutcome::CouponRemoved => true,
            CartOutcome::NotInCart { .. }
            | CartOutcome::InvalidCoupon { .. }
            | CartOutcome::CouponAlreadyActive { .. }
            | CartOutcome::NothingToDiscount
            | CartOutcome::NoCouponActive => false,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct CartStore {
    items: IndexMap<String, LineItem>,
    coupon: Option<AppliedCoupon>,
    subtotal: f64,
    coupons: CouponTable,
}

impl CartStore {
    pub fn new(coupons: CouponTable) -> Self {
        Self {
            coupons,
            ..Self::default()
        }
    }

    // =======
    // queries
    // =======

    /// Items in the order they were first added.
    pub fn items(&self) -> impl Iterator<Item = &LineItem> {
        self.items.values()
    }

    pub fn item(&self, id: &str) -> Option<&LineItem> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Total number of copies across all line items.
    pub fn item_count(&self) -> u32 {
        self.items.values().map(|item| item.quantity).sum()
    }

    pub fn subtotal(&self) -> f64 {
        self.subtotal
    }

    pub fn coupon(&self) -> Option<&AppliedCoupon> {
        self.coupon.as_ref()
    }

    pub fn coupon_code(&self) -> Option<&str> {
        self.coupon.as_ref().map(|coupon| coupon.code.as_str())
    }

    pub fn discount(&self) -> Option<f64> {
        self.coupon.as_ref().map(|coupon| coupon.discount)
    }

    /// Only advertised while a coupon is active. The discount is frozen at apply time,
    /// so after further edits this is the new subtotal minus the old discount (never below zero).
    pub fn final_total(&self) -> Option<f64> {
        self.discount()
            .map(|discount| (self.subtotal - discount).max(0.0))
    }

    /// What the customer pays: the final total if a coupon is active, else the subtotal.
    pub fn total(&self) -> f64 {
        self.final_total().unwrap_or(self.subtotal)
    }

    pub fn coupons(&self) -> &CouponTable {
        &self.coupons
    }

    // =======
    // mutations
    // =======

    /// Add `quantity` copies of `book`. A quantity of zero is treated as one.
    pub fn add_item(&mut self, book: &Book, quantity: u32) -> CartOutcome {
        let quantity = quantity.max(1);
        let outcome = match self.items.get_mut(&book.id) {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(quantity);
                CartOutcome::QuantityIncreased {
                    title: existing.title.clone(),
                    quantity: existing.quantity,
                }
            }
            None => {
                let item = LineItem::from_book(book, quantity);
                let title = item.title.clone();
                self.items.insert(item.id.clone(), item);
                CartOutcome::Added { title }
            }
        };
        self.recompute_subtotal();
        outcome
    }

    pub fn remove_item(&mut self, id: &str) -> CartOutcome {
        match self.items.shift_remove(id) {
            Some(item) => {
                self.recompute_subtotal();
                CartOutcome::Removed { title: item.title }
            }
            None => CartOutcome::NotInCart { id: id.to_string() },
        }
    }

    /// Zero or a negative quantity removes the item; a stored quantity is never below one.
    pub fn set_quantity(&mut self, id: &str, quantity: i64) -> CartOutcome {
        if quantity <= 0 {
            return self.remove_item(id);
        }
        let Some(item) = self.items.get_mut(id) else {
            return CartOutcome::NotInCart { id: id.to_string() };
        };
        item.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        let outcome = CartOutcome::QuantitySet {
            title: item.title.clone(),
            quantity: item.quantity,
        };
        self.recompute_subtotal();
        outcome
    }

    pub fn clear(&mut self) -> CartOutcome {
        self.items.clear();
        self.coupon = None;
        self.recompute_subtotal();
        CartOutcome::Cleared
    }

    /// Only one coupon at a time; the active one has to be removed first.
    pub fn apply_coupon(&mut self, code: &str) -> CartOutcome {
        if let Some(active) = &self.coupon {
            return CartOutcome::CouponAlreadyActive {
                active: active.code.clone(),
            };
        }
        let Some(coupon) = self.coupons.lookup(code) else {
            return CartOutcome::InvalidCoupon {
                code: normalize_code(code),
            };
        };
        if self.subtotal <= 0.0 {
            return CartOutcome::NothingToDiscount;
        }
        let discount = self.subtotal * f64::from(coupon.percent) / 100.0;
        self.coupon = Some(AppliedCoupon {
            code: coupon.code.clone(),
            discount,
        });
        CartOutcome::CouponApplied {
            code: coupon.code,
            percent: coupon.percent,
            saved: discount,
        }
    }

    pub fn remove_coupon(&mut self) -> CartOutcome {
        match self.coupon.take() {
            Some(_) => CartOutcome::CouponRemoved,
            None => CartOutcome::NoCouponActive,
        }
    }

    fn recompute_subtotal(&mut self) {
        self.subtotal = self.items.values().map(LineItem::line_total).sum();
    }
}

impl SnapshotStore for CartStore {
    type Snapshot = CartSnapshot;

    fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            items: self.items.values().cloned().collect(),
            discount: self.discount(),
            coupon_code: self.coupon_code().map(str::to_string),
            final_total: self.final_total(),
            subtotal: Some(self.subtotal),
        }
    }

    /// Server totals are not trusted: the subtotal is recomputed from the items and the final total is derived.
    fn replace_from_snapshot(&mut self, snapshot: CartSnapshot) {
        self.items.clear();
        for mut item in snapshot.items {
            if item.quantity == 0 {
                log::warn!("Dropping zero-quantity item {} from cart snapshot", item.id);
                continue;
            }
            item.unit_price = normalize_price(item.unit_price);
            match self.items.get_mut(&item.id) {
                Some(existing) => {
                    log::warn!("Merging duplicate item {} in cart snapshot", item.id);
                    existing.quantity = existing.quantity.saturating_add(item.quantity);
                }
                None => {
                    self.items.insert(item.id.clone(), item);
                }
            }
        }
        self.recompute_subtotal();

        self.coupon = match (snapshot.coupon_code, snapshot.discount) {
            (Some(code), Some(discount)) if discount.is_finite() && discount >= 0.0 => {
                Some(AppliedCoupon { code, discount })
            }
            (None, None) => None,
            (code, discount) => {
                log::warn!(
                    "Cart snapshot has an incomplete coupon (code {code:?}, discount {discount:?}), dropping it"
                );
                None
            }
        };

        if let Some(server) = snapshot.subtotal
            && (server - self.subtotal).abs() > 0.005
        {
            log::warn!(
                "Server subtotal {server} disagrees with recomputed subtotal {}",
                self.subtotal
            );
        }
    }

    fn reset(&mut self) {
        self.items.clear();
        self.coupon = None;
        self.subtotal = 0.0;
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty() && self.coupon.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: &str, price: f64) -> Book {
        Book {
            id: id.to_string(),
            title: format!("Title {id}"),
            author: "Author".to_string(),
            price,
            cover_image_url: None,
            category: None,
            average_rating: None,
            review_count: None,
        }
    }

    fn expected_subtotal(cart: &CartStore) -> f64 {
        cart.items()
            .map(|item| item.unit_price * f64::from(item.quantity))
            .sum()
    }

    #[test]
    fn test_add_new_item() {
        let mut cart = CartStore::default();
        let outcome = cart.add_item(&book("b1", 10.0), 2);
        assert_eq!(
            outcome,
            CartOutcome::Added {
                title: "Title b1".to_string()
            }
        );
        let items: Vec<_> = cart.items().collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, "b1");
        assert_eq!(items[0].quantity, 2);
        assert_eq!(cart.subtotal(), 20.0);
    }

    #[test]
    fn test_add_existing_item_increments() {
        let mut cart = CartStore::default();
        cart.add_item(&book("b1", 10.0), 2);
        let outcome = cart.add_item(&book("b1", 10.0), 1);
        assert!(matches!(
            outcome,
            CartOutcome::QuantityIncreased { quantity: 3, .. }
        ));
        assert_eq!(cart.item("b1").unwrap().quantity, 3);
        assert_eq!(cart.subtotal(), 30.0);
        assert_eq!(cart.len(), 1);
    }

    #[test]
    fn test_insertion_order_survives_removal() {
        let mut cart = CartStore::default();
        for id in ["a", "b", "c"] {
            cart.add_item(&book(id, 1.0), 1);
        }
        cart.remove_item("b");
        cart.add_item(&book("a", 1.0), 1);
        let ids: Vec<_> = cart.items().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_set_quantity_zero_removes() {
        let mut cart = CartStore::default();
        cart.add_item(&book("b1", 10.0), 2);
        cart.add_item(&book("b2", 5.0), 1);

        let outcome = cart.set_quantity("b1", 0);
        assert!(matches!(outcome, CartOutcome::Removed { .. }));
        assert!(!cart.contains("b1"));
        assert_eq!(cart.subtotal(), 5.0);

        cart.set_quantity("b2", -3);
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), 0.0);
    }

    #[test]
    fn test_set_quantity_on_missing_item_is_noop() {
        let mut cart = CartStore::default();
        let outcome = cart.set_quantity("ghost", 4);
        assert_eq!(
            outcome,
            CartOutcome::NotInCart {
                id: "ghost".to_string()
            }
        );
        assert!(!outcome.changed_state());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut cart = CartStore::default();
        cart.add_item(&book("b1", 10.0), 1);
        cart.add_item(&book("b2", 3.0), 2);

        cart.remove_item("b1");
        let once = cart.snapshot();
        let outcome = cart.remove_item("b1");
        assert!(!outcome.changed_state());
        assert_eq!(cart.snapshot(), once);
    }

    #[test]
    fn test_subtotal_holds_after_every_operation() {
        let mut cart = CartStore::default();
        let prices = [4.25, 10.0, 0.99, 13.5];
        for step in 0..40usize {
            let id = format!("b{}", step % 4);
            match step % 5 {
                0 | 1 => {
                    cart.add_item(&book(&id, prices[step % 4]), (step % 3) as u32);
                }
                2 => {
                    cart.set_quantity(&id, (step % 7) as i64 - 2);
                }
                3 => {
                    cart.remove_item(&id);
                }
                _ => {
                    cart.set_quantity(&id, 6);
                }
            }
            assert!((cart.subtotal() - expected_subtotal(&cart)).abs() < 1e-9);
            assert!(cart.items().all(|item| item.quantity >= 1));
        }
    }

    #[test]
    fn test_apply_coupon() {
        let mut cart = CartStore::default();
        cart.add_item(&book("b1", 50.0), 2);

        let outcome = cart.apply_coupon("nafiu");
        assert_eq!(
            outcome,
            CartOutcome::CouponApplied {
                code: "NAFIU".to_string(),
                percent: 20,
                saved: 20.0
            }
        );
        assert_eq!(cart.discount(), Some(20.0));
        assert_eq!(cart.final_total(), Some(80.0));
        assert_eq!(cart.coupon_code(), Some("NAFIU"));

        let outcome = cart.apply_coupon("bogus");
        assert!(!outcome.changed_state());
        assert_eq!(cart.discount(), Some(20.0));
    }

    #[test]
    fn test_invalid_coupon_leaves_state_unchanged() {
        let mut cart = CartStore::default();
        cart.add_item(&book("b1", 100.0), 1);
        let outcome = cart.apply_coupon("bogus");
        assert_eq!(
            outcome,
            CartOutcome::InvalidCoupon {
                code: "BOGUS".to_string()
            }
        );
        assert_eq!(cart.discount(), None);
        assert_eq!(cart.coupon_code(), None);
        assert_eq!(cart.final_total(), None);
        assert_eq!(cart.total(), 100.0);
    }

    #[test]
    fn test_second_coupon_requires_removal() {
        let mut cart = CartStore::default();
        cart.add_item(&book("b1", 100.0), 1);
        cart.apply_coupon("SAVE15");

        let outcome = cart.apply_coupon("BOOKBAZAR");
        assert_eq!(
            outcome,
            CartOutcome::CouponAlreadyActive {
                active: "SAVE15".to_string()
            }
        );
        assert_eq!(cart.discount(), Some(15.0));

        assert_eq!(cart.remove_coupon(), CartOutcome::CouponRemoved);
        assert_eq!(cart.apply_coupon("BOOKBAZAR"), CartOutcome::CouponApplied {
            code: "BOOKBAZAR".to_string(),
            percent: 25,
            saved: 25.0
        });
    }

    #[test]
    fn test_coupon_needs_a_subtotal() {
        let mut cart = CartStore::default();
        assert_eq!(cart.apply_coupon("NAFIU"), CartOutcome::NothingToDiscount);
        assert_eq!(cart.coupon(), None);
    }

    #[test]
    fn test_discount_is_frozen_until_reapplied() {
        let mut cart = CartStore::default();
        cart.add_item(&book("b1", 100.0), 1);
        cart.apply_coupon("WELCOME10");
        cart.add_item(&book("b2", 50.0), 1);

        assert_eq!(cart.subtotal(), 150.0);
        assert_eq!(cart.discount(), Some(10.0));
        assert_eq!(cart.final_total(), Some(140.0));

        cart.remove_item("b1");
        cart.remove_item("b2");
        assert_eq!(cart.final_total(), Some(0.0));
    }

    #[test]
    fn test_coupon_code_and_discount_are_paired() {
        let mut cart = CartStore::default();
        cart.add_item(&book("b1", 20.0), 1);
        let check = |cart: &CartStore| {
            assert_eq!(cart.discount().is_some(), cart.coupon_code().is_some());
            assert_eq!(cart.discount().is_some(), cart.final_total().is_some());
        };
        check(&cart);
        cart.apply_coupon("SAVE15");
        check(&cart);
        cart.remove_coupon();
        check(&cart);
        cart.apply_coupon("SAVE15");
        cart.clear();
        check(&cart);
        assert_eq!(cart.remove_coupon(), CartOutcome::NoCouponActive);
    }

    #[test]
    fn test_clear_drops_items_and_coupon() {
        let mut cart = CartStore::default();
        cart.add_item(&book("b1", 20.0), 3);
        cart.apply_coupon("NAFIU");
        assert_eq!(cart.clear(), CartOutcome::Cleared);
        assert!(cart.is_empty());
        assert_eq!(cart.subtotal(), 0.0);
        assert_eq!(cart.coupon(), None);
    }

    #[test]
    fn test_replace_from_snapshot_recomputes_subtotal() {
        let snapshot: CartSnapshot = serde_json::from_str(
            r#"{
                "items": [
                    {"id": "b2", "title": "Emma", "author": "Austen", "price": 4.5, "quantity": 2},
                    {"id": "b1", "title": "Dune", "author": "Herbert", "price": 10, "quantity": 1}
                ],
                "discount": 2,
                "couponCode": "WELCOME10",
                "finalTotal": 1000,
                "total": 999
            }"#,
        )
        .unwrap();

        let mut cart = CartStore::default();
        cart.add_item(&book("old", 1.0), 1);
        cart.replace_from_snapshot(snapshot.clone());

        let ids: Vec<_> = cart.items().map(|item| item.id.clone()).collect();
        assert_eq!(ids, vec!["b2", "b1"]);
        assert_eq!(cart.items().cloned().collect::<Vec<_>>(), snapshot.items);
        assert_eq!(cart.subtotal(), 19.0);
        assert_eq!(cart.discount(), Some(2.0));
        assert_eq!(cart.final_total(), Some(17.0));
    }

    #[test]
    fn test_replace_from_snapshot_cleans_up_bad_data() {
        let snapshot: CartSnapshot = serde_json::from_str(
            r#"{
                "items": [
                    {"id": "b1", "title": "Dune", "price": 10, "quantity": 1},
                    {"id": "b2", "title": "Zero", "price": 3, "quantity": 0},
                    {"id": "b1", "title": "Dune", "price": 10, "quantity": 2}
                ],
                "discount": 5
            }"#,
        )
        .unwrap();

        let mut cart = CartStore::default();
        cart.replace_from_snapshot(snapshot);
        assert_eq!(cart.len(), 1);
        assert_eq!(cart.item("b1").unwrap().quantity, 3);
        assert_eq!(cart.subtotal(), 30.0);
        assert_eq!(cart.coupon(), None);
    }

    #[test]
    fn test_negative_quantity_does_not_spoil_the_snapshot() {
        let snapshot: CartSnapshot = serde_json::from_str(
            r#"{"items": [
                {"id": "b1", "title": "Dune", "price": 10, "quantity": 1},
                {"id": "b2", "title": "Owed", "price": 4, "quantity": -1}
            ]}"#,
        )
        .unwrap();
        assert_eq!(snapshot.items[1].quantity, 0);

        let mut cart = CartStore::default();
        cart.replace_from_snapshot(snapshot);
        assert!(cart.contains("b1"));
        assert!(!cart.contains("b2"));
        assert_eq!(cart.subtotal(), 10.0);
    }

    #[test]
    fn test_snapshot_carries_totals() {
        let mut cart = CartStore::default();
        cart.add_item(&book("b1", 25.0), 4);
        cart.apply_coupon("BOOKBAZAR");
        let snapshot = cart.snapshot();
        assert_eq!(snapshot.subtotal, Some(100.0));
        assert_eq!(snapshot.discount, Some(25.0));
        assert_eq!(snapshot.final_total, Some(75.0));
        assert_eq!(snapshot.coupon_code.as_deref(), Some("BOOKBAZAR"));

        let mut copy = CartStore::default();
        copy.replace_from_snapshot(snapshot.clone());
        assert_eq!(copy.snapshot(), snapshot);
    }
}
