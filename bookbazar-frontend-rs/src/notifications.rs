use crate::cart::CartOutcome;
use crate::wishlist::WishlistOutcome;

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    Success,
    Info,
    Error,
}

/// A transient toast. Nothing in this crate ever raises a blocking dialog.
#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }

    pub(crate) fn sync_failed() -> Self {
        Self::error("Failed to sync with server")
    }

    pub(crate) fn order_placed() -> Self {
        Self::success("Order placed successfully!")
    }
}

impl CartOutcome {
    pub fn notice(&self) -> Option<Notice> {
        match self {
            CartOutcome::Added { title } => Some(Notice::success(format!("{title} added to cart"))),
            CartOutcome::QuantityIncreased { title, .. } => {
                Some(Notice::success(format!("Updated {title} quantity in cart")))
            }
            CartOutcome::QuantitySet { title, .. } => {
                Some(Notice::success(format!("Updated {title} quantity")))
            }
            CartOutcome::Removed { title } => {
                Some(Notice::success(format!("{title} removed from cart")))
            }
            CartOutcome::NotInCart { .. } => None,
            CartOutcome::Cleared => Some(Notice::success("Cart cleared")),
            CartOutcome::CouponApplied { code, saved, .. } => Some(Notice::success(format!(
                "Coupon {code} applied! Saved ${saved:.2}"
            ))),
            CartOutcome::InvalidCoupon { .. } => Some(Notice::error("Invalid coupon code")),
            CartOutcome::CouponAlreadyActive { active } => Some(Notice::info(format!(
                "Remove coupon {active} before applying another"
            ))),
            CartOutcome::NothingToDiscount => {
                Some(Notice::info("Add something to your cart before applying a coupon"))
            }
            CartOutcome::CouponRemoved => Some(Notice::info("Coupon removed")),
            CartOutcome::NoCouponActive => None,
        }
    }
}

impl WishlistOutcome {
    pub fn notice(&self) -> Option<Notice> {
        match self {
            WishlistOutcome::Added { title } => {
                Some(Notice::success(format!("{title} added to wishlist ❤️")))
            }
            WishlistOutcome::AlreadySaved { title } => {
                Some(Notice::info(format!("{title} is already in your wishlist")))
            }
            WishlistOutcome::Removed { title } => {
                Some(Notice::success(format!("{title} removed from wishlist")))
            }
            WishlistOutcome::NotSaved { .. } => None,
            WishlistOutcome::Cleared => Some(Notice::success("Wishlist cleared")),
        }
    }
}
