//! Coupon code → percentage table.
//!
//! Note: the discount is computed on the client from this table. The order service should stay
//! the authority on what a coupon is worth; treat client-side amounts as a display estimate.

use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(from = "BTreeMap<String, u32>", into = "BTreeMap<String, u32>")]
pub struct CouponTable {
    percents: BTreeMap<String, u32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Coupon {
    pub code: String,
    pub percent: u32,
}

impl CouponTable {
    pub fn new(entries: impl IntoIterator<Item = (String, u32)>) -> Self {
        Self {
            percents: entries
                .into_iter()
                .map(|(code, percent)| (normalize_code(&code), percent.min(100)))
                .filter(|(code, _)| !code.is_empty())
                .collect(),
        }
    }

    /// Case-insensitive lookup; surrounding whitespace is ignored.
    pub fn lookup(&self, code: &str) -> Option<Coupon> {
        let code = normalize_code(code);
        self.percents.get(&code).map(|&percent| Coupon { code, percent })
    }

    pub fn len(&self) -> usize {
        self.percents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.percents.is_empty()
    }
}

impl Default for CouponTable {
    fn default() -> Self {
        Self::new([
            ("NAFIU".to_string(), 20),
            ("WELCOME10".to_string(), 10),
            ("SAVE15".to_string(), 15),
            ("BOOKBAZAR".to_string(), 25),
        ])
    }
}

impl From<BTreeMap<String, u32>> for CouponTable {
    fn from(percents: BTreeMap<String, u32>) -> Self {
        Self::new(percents)
    }
}

impl From<CouponTable> for BTreeMap<String, u32> {
    fn from(table: CouponTable) -> Self {
        table.percents
    }
}

pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}
