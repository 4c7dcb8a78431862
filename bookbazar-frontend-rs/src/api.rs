//! The remote persistence service, seen from the client.
//! Any transport failure or non-2xx response is a sync failure; the status code is only kept for logging.

use reqwest::Method;
use serde_json::json;

use crate::book::{LineItem, WishlistItem};
use crate::cart::CartSnapshot;
use crate::config::BackendConfig;
use crate::wishlist::WishlistSnapshot;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    /// Bearer credential from the identity provider, when it handed one out.
    pub access_token: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            access_token,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CartMutation {
    /// `item.quantity` is the number of copies being added, not the new total.
    AddItem(LineItem),
    UpdateItem { item_id: String, quantity: u32 },
    RemoveItem { item_id: String },
    Clear,
    ApplyCoupon { code: String },
    RemoveCoupon,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WishlistMutation {
    AddItem(WishlistItem),
    RemoveItem { item_id: String },
    Clear,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API Error: {status} {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("request timed out")]
    Timeout,
}

#[allow(async_fn_in_trait)]
pub trait BookstoreApi {
    async fn fetch_cart(&self, session: &Session) -> Result<CartSnapshot, ApiError>;

    async fn push_cart(&self, session: &Session, mutation: &CartMutation) -> Result<(), ApiError>;

    async fn fetch_wishlist(&self, session: &Session) -> Result<WishlistSnapshot, ApiError>;

    async fn push_wishlist(
        &self,
        session: &Session,
        mutation: &WishlistMutation,
    ) -> Result<(), ApiError>;
}

/// A request, before it is bound to a transport.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl Route {
    fn new(method: Method, path: String, body: Option<serde_json::Value>) -> Self {
        Self { method, path, body }
    }
}

pub fn cart_route(user_id: &str, mutation: &CartMutation) -> Route {
    match mutation {
        CartMutation::AddItem(item) => Route::new(
            Method::POST,
            format!("/cart/{user_id}/add"),
            Some(json!({ "item": item })),
        ),
        CartMutation::UpdateItem { item_id, quantity } => Route::new(
            Method::PUT,
            format!("/cart/{user_id}/update"),
            Some(json!({ "itemId": item_id, "quantity": quantity })),
        ),
        CartMutation::RemoveItem { item_id } => Route::new(
            Method::DELETE,
            format!("/cart/{user_id}/remove"),
            Some(json!({ "itemId": item_id })),
        ),
        CartMutation::Clear => Route::new(Method::DELETE, format!("/cart/{user_id}/clear"), None),
        CartMutation::ApplyCoupon { code } => Route::new(
            Method::POST,
            format!("/cart/{user_id}/coupon"),
            Some(json!({ "couponCode": code })),
        ),
        CartMutation::RemoveCoupon => {
            Route::new(Method::DELETE, format!("/cart/{user_id}/coupon"), None)
        }
    }
}

pub fn wishlist_route(user_id: &str, mutation: &WishlistMutation) -> Route {
    match mutation {
        WishlistMutation::AddItem(item) => Route::new(
            Method::POST,
            format!("/wishlist/{user_id}/add"),
            Some(json!({ "item": item })),
        ),
        WishlistMutation::RemoveItem { item_id } => Route::new(
            Method::DELETE,
            format!("/wishlist/{user_id}/remove"),
            Some(json!({ "itemId": item_id })),
        ),
        WishlistMutation::Clear => {
            Route::new(Method::DELETE, format!("/wishlist/{user_id}/clear"), None)
        }
    }
}

/// The REST backend under `<apiBaseUrl>/cart/...` and `<apiBaseUrl>/wishlist/...`.
#[derive(Clone, Debug)]
pub struct HttpBookstoreApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBookstoreApi {
    pub fn new(config: &BackendConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, session: &Session, route: Route) -> Result<String, ApiError> {
        let url = format!("{}{}", self.base_url, route.path);
        let mut request = self.client.request(route.method.clone(), &url);
        if let Some(token) = &session.access_token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        if let Some(body) = &route.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ApiError::Timeout
            } else {
                ApiError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            log::error!("{} {url} failed: {status} - {body}", route.method);
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.text().await?)
    }
}

impl BookstoreApi for HttpBookstoreApi {
    async fn fetch_cart(&self, session: &Session) -> Result<CartSnapshot, ApiError> {
        let route = Route::new(Method::GET, format!("/cart/{}", session.user_id), None);
        let body = self.send(session, route).await?;
        serde_json::from_str(&body).map_err(|e| {
            log::error!("Failed to parse cart response: {e}. Body: {body}");
            e.into()
        })
    }

    async fn push_cart(&self, session: &Session, mutation: &CartMutation) -> Result<(), ApiError> {
        self.send(session, cart_route(&session.user_id, mutation))
            .await
            .map(|_| ())
    }

    async fn fetch_wishlist(&self, session: &Session) -> Result<WishlistSnapshot, ApiError> {
        let route = Route::new(Method::GET, format!("/wishlist/{}", session.user_id), None);
        let body = self.send(session, route).await?;
        serde_json::from_str(&body).map_err(|e| {
            log::error!("Failed to parse wishlist response: {e}. Body: {body}");
            e.into()
        })
    }

    async fn push_wishlist(
        &self,
        session: &Session,
        mutation: &WishlistMutation,
    ) -> Result<(), ApiError> {
        self.send(session, wishlist_route(&session.user_id, mutation))
            .await
            .map(|_| ())
    }
}
