use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use satchel::SnapshotStore;
use serde::{Deserialize, Serialize};

use crate::book::{Book, WishlistItem, normalize_price};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistSnapshot {
    #[serde(default)]
    pub items: Vec<WishlistItem>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WishlistOutcome {
    Added { title: String },
    AlreadySaved { title: String },
    Removed { title: String },
    NotSaved { id: String },
    Cleared,
}

impl WishlistOutcome {
    pub fn changed_state(&self) -> bool {
        matches!(
            self,
            WishlistOutcome::Added { .. } | WishlistOutcome::Removed { .. } | WishlistOutcome::Cleared
        )
    }
}

/// Saved-for-later books. Membership only, no quantities.
#[derive(Clone, Debug, Default)]
pub struct WishlistStore {
    items: IndexMap<String, WishlistItem>,
}

impl WishlistStore {
    pub fn items(&self) -> impl Iterator<Item = &WishlistItem> {
        self.items.values()
    }

    pub fn item(&self, id: &str) -> Option<&WishlistItem> {
        self.items.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn add_item(&mut self, book: &Book) -> WishlistOutcome {
        self.add_item_at(book, Utc::now())
    }

    pub fn add_item_at(&mut self, book: &Book, now: DateTime<Utc>) -> WishlistOutcome {
        if let Some(existing) = self.items.get(&book.id) {
            return WishlistOutcome::AlreadySaved {
                title: existing.title.clone(),
            };
        }
        let item = WishlistItem::from_book(book, now);
        let title = item.title.clone();
        self.items.insert(item.id.clone(), item);
        WishlistOutcome::Added { title }
    }

    pub fn remove_item(&mut self, id: &str) -> WishlistOutcome {
        match self.items.shift_remove(id) {
            Some(item) => WishlistOutcome::Removed { title: item.title },
            None => WishlistOutcome::NotSaved { id: id.to_string() },
        }
    }

    pub fn clear(&mut self) -> WishlistOutcome {
        self.items.clear();
        WishlistOutcome::Cleared
    }
}

impl SnapshotStore for WishlistStore {
    type Snapshot = WishlistSnapshot;

    fn snapshot(&self) -> WishlistSnapshot {
        WishlistSnapshot {
            items: self.items.values().cloned().collect(),
        }
    }

    fn replace_from_snapshot(&mut self, snapshot: WishlistSnapshot) {
        self.items.clear();
        for mut item in snapshot.items {
            if self.items.contains_key(&item.id) {
                log::warn!("Dropping duplicate item {} from wishlist snapshot", item.id);
                continue;
            }
            item.unit_price = normalize_price(item.unit_price);
            self.items.insert(item.id.clone(), item);
        }
    }

    fn reset(&mut self) {
        self.items.clear();
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(id: &str) -> Book {
        Book {
            id: id.to_string(),
            title: format!("Title {id}"),
            author: "Author".to_string(),
            price: 12.0,
            cover_image_url: None,
            category: Some("Fiction".to_string()),
            average_rating: Some(4.5),
            review_count: Some(12),
        }
    }

    #[test]
    fn test_add_sets_date_added() {
        let mut wishlist = WishlistStore::default();
        let now = Utc::now();
        let outcome = wishlist.add_item_at(&book("b2"), now);
        assert!(outcome.changed_state());
        let item = wishlist.item("b2").unwrap();
        assert_eq!(item.date_added, now);
        assert_eq!(item.average_rating, Some(4.5));
    }

    #[test]
    fn test_duplicate_add_is_informational() {
        let mut wishlist = WishlistStore::default();
        wishlist.add_item(&book("b2"));
        let first_added = wishlist.item("b2").unwrap().date_added;

        let outcome = wishlist.add_item(&book("b2"));
        assert_eq!(
            outcome,
            WishlistOutcome::AlreadySaved {
                title: "Title b2".to_string()
            }
        );
        assert!(!outcome.changed_state());
        assert_eq!(wishlist.count(), 1);
        assert_eq!(wishlist.item("b2").unwrap().date_added, first_added);
    }

    #[test]
    fn test_remove_and_contains() {
        let mut wishlist = WishlistStore::default();
        wishlist.add_item(&book("a"));
        wishlist.add_item(&book("b"));
        assert!(wishlist.contains("a"));

        assert!(wishlist.remove_item("a").changed_state());
        assert!(!wishlist.contains("a"));
        assert_eq!(
            wishlist.remove_item("a"),
            WishlistOutcome::NotSaved { id: "a".to_string() }
        );
        assert_eq!(wishlist.count(), 1);
    }

    #[test]
    fn test_clear() {
        let mut wishlist = WishlistStore::default();
        wishlist.add_item(&book("a"));
        assert_eq!(wishlist.clear(), WishlistOutcome::Cleared);
        assert!(wishlist.is_empty());
    }

    #[test]
    fn test_replace_from_snapshot_keeps_order() {
        let now = Utc::now();
        let snapshot = WishlistSnapshot {
            items: vec![
                WishlistItem::from_book(&book("z"), now),
                WishlistItem::from_book(&book("a"), now),
                WishlistItem::from_book(&book("z"), now),
            ],
        };
        let mut wishlist = WishlistStore::default();
        wishlist.add_item(&book("old"));
        wishlist.replace_from_snapshot(snapshot);

        let ids: Vec<_> = wishlist.items().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a"]);
        assert!(!wishlist.contains("old"));
    }

    #[test]
    fn test_replace_from_snapshot_normalizes_prices() {
        let snapshot: WishlistSnapshot = serde_json::from_str(
            r#"{"items": [
                {"id": "a", "title": "Refund", "price": -5},
                {"id": "b", "title": "Fine", "price": 7.5}
            ]}"#,
        )
        .unwrap();
        let mut wishlist = WishlistStore::default();
        wishlist.replace_from_snapshot(snapshot);
        assert_eq!(wishlist.item("a").unwrap().unit_price, 0.0);
        assert_eq!(wishlist.item("b").unwrap().unit_price, 7.5);
    }
}
