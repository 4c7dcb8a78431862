//! The session-scoped service that owns the cart and wishlist and keeps them in step with the backend.
//!
//! Every mutation is applied to the local store first, then pushed, then the canonical snapshot is pulled back.
//! We never hold a `RefCell` borrow across an `.await`; listeners are only called once all borrows are released.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use chrono::Utc;
use satchel::SnapshotStore;
use satchel::cache::SnapshotCache;
use satchel::data_model::{Lane, ListenerKey, Listeners, SyncKind, SyncState, Ticket};
use satchel::retry::with_retry;

use crate::api::{ApiError, BookstoreApi, CartMutation, HttpBookstoreApi, Session, WishlistMutation};
use crate::book::{Book, LineItem};
use crate::cart::{CartOutcome, CartStore};
use crate::checkout::{CheckoutError, OrderDraft};
use crate::config::BackendConfig;
use crate::notifications::Notice;
use crate::wishlist::{WishlistOutcome, WishlistStore};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreKind {
    Cart,
    Wishlist,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Cart => "cart",
            StoreKind::Wishlist => "wishlist",
        }
    }

    /// e.g. `cart:user_123`
    pub fn cache_key(&self, user_id: &str) -> String {
        format!("{}:{user_id}", self.as_str())
    }
}

/// Glue between a store and the matching half of the backend API.
trait SyncedStore: SnapshotStore {
    type Mutation;
    const KIND: StoreKind;

    async fn fetch<A: BookstoreApi>(api: &A, session: &Session)
    -> Result<Self::Snapshot, ApiError>;

    async fn push<A: BookstoreApi>(
        api: &A,
        session: &Session,
        mutation: &Self::Mutation,
    ) -> Result<(), ApiError>;
}

impl SyncedStore for CartStore {
    type Mutation = CartMutation;
    const KIND: StoreKind = StoreKind::Cart;

    async fn fetch<A: BookstoreApi>(
        api: &A,
        session: &Session,
    ) -> Result<Self::Snapshot, ApiError> {
        api.fetch_cart(session).await
    }

    async fn push<A: BookstoreApi>(
        api: &A,
        session: &Session,
        mutation: &CartMutation,
    ) -> Result<(), ApiError> {
        api.push_cart(session, mutation).await
    }
}

impl SyncedStore for WishlistStore {
    type Mutation = WishlistMutation;
    const KIND: StoreKind = StoreKind::Wishlist;

    async fn fetch<A: BookstoreApi>(
        api: &A,
        session: &Session,
    ) -> Result<Self::Snapshot, ApiError> {
        api.fetch_wishlist(session).await
    }

    async fn push<A: BookstoreApi>(
        api: &A,
        session: &Session,
        mutation: &WishlistMutation,
    ) -> Result<(), ApiError> {
        api.push_wishlist(session, mutation).await
    }
}

struct Synced<S> {
    store: RefCell<S>,
    state: RefCell<SyncState>,
    lane: Lane,
}

impl<S> Synced<S> {
    fn new(store: S) -> Self {
        Self {
            store: RefCell::new(store),
            state: RefCell::new(SyncState::default()),
            lane: Lane::default(),
        }
    }
}

/// Whether a failed pull should be shown to the user.
#[derive(Clone, Copy, PartialEq, Eq)]
enum PullReason {
    /// The background load at sign-in. Failures are logged, never shown.
    InitialLoad,
    Refresh,
}

pub struct SyncCoordinator<A> {
    api: A,
    push_retries: usize,
    request_timeout: Duration,
    cache: Option<SnapshotCache>,

    session: RefCell<Option<Session>>,
    // bumped on every sign-in and sign-out so work from an old session can tell it is stale
    epoch: Cell<u64>,

    cart: Synced<CartStore>,
    wishlist: Synced<WishlistStore>,

    listeners: RefCell<Listeners<StoreKind>>,
    notices: RefCell<VecDeque<Notice>>,
}

impl SyncCoordinator<HttpBookstoreApi> {
    pub fn from_config(config: &BackendConfig) -> Result<Self, ApiError> {
        let api = HttpBookstoreApi::new(config)?;
        Ok(Self::new(api, config))
    }
}

impl<A> SyncCoordinator<A> {
    // =======
    // presentation hooks
    // =======

    pub fn register_listener(&self, listener: impl Fn(&StoreKind) + 'static) -> ListenerKey {
        self.listeners.borrow_mut().register_listener(listener)
    }

    pub fn unregister_listener(&self, key: ListenerKey) {
        self.listeners.borrow_mut().unregister_listener(key)
    }

    /// Take every pending toast, oldest first.
    pub fn drain_notices(&self) -> Vec<Notice> {
        self.notices.borrow_mut().drain(..).collect()
    }

    pub fn with_cart<R>(&self, f: impl FnOnce(&CartStore) -> R) -> R {
        f(&self.cart.store.borrow())
    }

    pub fn with_wishlist<R>(&self, f: impl FnOnce(&WishlistStore) -> R) -> R {
        f(&self.wishlist.store.borrow())
    }

    pub fn wishlist_contains(&self, id: &str) -> bool {
        self.wishlist.store.borrow().contains(id)
    }

    pub fn wishlist_count(&self) -> usize {
        self.wishlist.store.borrow().count()
    }

    pub fn sync_state(&self, kind: StoreKind) -> SyncState {
        match kind {
            StoreKind::Cart => self.cart.state.borrow().clone(),
            StoreKind::Wishlist => self.wishlist.state.borrow().clone(),
        }
    }

    pub fn session(&self) -> Option<Session> {
        self.session.borrow().clone()
    }

    /// Flush pending listener notifications without holding any borrow while the callbacks run,
    /// since callbacks commonly call back into the coordinator.
    fn flush_notifications(&self) {
        let notifications = self.listeners.borrow_mut().drain_due_notifications();
        for notification in notifications {
            notification();
        }
    }

    fn raise(&self, notice: Notice) {
        log::debug!("Notice: {notice:?}");
        self.notices.borrow_mut().push_back(notice);
    }
}

impl<A: BookstoreApi> SyncCoordinator<A> {
    pub fn new(api: A, config: &BackendConfig) -> Self {
        let cache = config.cache_dir.as_ref().and_then(|dir| {
            SnapshotCache::open(dir)
                .inspect_err(|e| log::error!("Snapshot cache disabled: {e}"))
                .ok()
        });
        Self {
            api,
            push_retries: config.push_retries,
            request_timeout: config.request_timeout(),
            cache,
            session: RefCell::new(None),
            epoch: Cell::new(0),
            cart: Synced::new(CartStore::new(config.coupons.clone())),
            wishlist: Synced::new(WishlistStore::default()),
            listeners: RefCell::new(Listeners::default()),
            notices: RefCell::new(VecDeque::new()),
        }
    }

    // =======
    // session lifecycle
    // =======

    /// A user session became available: show any cached copy, then replace both stores with the server's.
    pub async fn sign_in(&self, session: Session) {
        let _flusher = FlushLater::new(self);

        if self
            .session
            .borrow()
            .as_ref()
            .is_some_and(|current| current.user_id != session.user_id)
        {
            self.sign_out();
        }

        log::info!("Session started for {}", session.user_id);
        self.epoch.set(self.epoch.get() + 1);
        // anything still in flight belongs to the old epoch and will never report back
        self.restart_sync(&self.cart);
        self.restart_sync(&self.wishlist);
        *self.session.borrow_mut() = Some(session.clone());

        self.restore_from_cache(&self.cart, &session);
        self.restore_from_cache(&self.wishlist, &session);
        self.flush_notifications();

        futures::join!(
            self.pull(&self.cart, &session, PullReason::InitialLoad),
            self.pull(&self.wishlist, &session, PullReason::InitialLoad),
        );
    }

    /// Both stores are emptied locally, along with their cached copies. Nothing is sent to the server.
    pub fn sign_out(&self) {
        let _flusher = FlushLater::new(self);

        let ended = self.session.borrow_mut().take();
        if let Some(session) = ended {
            log::info!("Session ended for {}", session.user_id);
            self.forget_cached(StoreKind::Cart, &session);
            self.forget_cached(StoreKind::Wishlist, &session);
        }
        self.epoch.set(self.epoch.get() + 1);
        self.reset_slot(&self.cart);
        self.reset_slot(&self.wishlist);
    }

    /// Pull both stores again. Failures are reported to the user.
    pub async fn refresh(&self) {
        let _flusher = FlushLater::new(self);
        let Some(session) = self.session() else {
            return;
        };
        futures::join!(
            self.pull(&self.cart, &session, PullReason::Refresh),
            self.pull(&self.wishlist, &session, PullReason::Refresh),
        );
    }

    // =======
    // cart
    // =======

    pub async fn add_to_cart(&self, book: &Book, quantity: u32) -> CartOutcome {
        let outcome = self.cart.store.borrow_mut().add_item(book, quantity);
        let mutation = CartMutation::AddItem(LineItem::from_book(book, quantity));
        self.after_local_mutation(&self.cart, outcome.changed_state().then_some(mutation), outcome.notice())
            .await;
        outcome
    }

    pub async fn remove_from_cart(&self, id: &str) -> CartOutcome {
        let outcome = self.cart.store.borrow_mut().remove_item(id);
        let mutation = CartMutation::RemoveItem {
            item_id: id.to_string(),
        };
        self.after_local_mutation(&self.cart, outcome.changed_state().then_some(mutation), outcome.notice())
            .await;
        outcome
    }

    pub async fn set_cart_quantity(&self, id: &str, quantity: i64) -> CartOutcome {
        let outcome = self.cart.store.borrow_mut().set_quantity(id, quantity);
        let mutation = match &outcome {
            CartOutcome::QuantitySet { quantity, .. } => Some(CartMutation::UpdateItem {
                item_id: id.to_string(),
                quantity: *quantity,
            }),
            CartOutcome::Removed { .. } => Some(CartMutation::RemoveItem {
                item_id: id.to_string(),
            }),
            _ => None,
        };
        self.after_local_mutation(&self.cart, mutation, outcome.notice())
            .await;
        outcome
    }

    pub async fn clear_cart(&self) -> CartOutcome {
        let outcome = self.cart.store.borrow_mut().clear();
        self.after_local_mutation(&self.cart, Some(CartMutation::Clear), outcome.notice())
            .await;
        outcome
    }

    pub async fn apply_coupon(&self, code: &str) -> CartOutcome {
        let outcome = self.cart.store.borrow_mut().apply_coupon(code);
        let mutation = match &outcome {
            CartOutcome::CouponApplied { code, .. } => {
                Some(CartMutation::ApplyCoupon { code: code.clone() })
            }
            _ => None,
        };
        self.after_local_mutation(&self.cart, mutation, outcome.notice())
            .await;
        outcome
    }

    pub async fn remove_coupon(&self) -> CartOutcome {
        let outcome = self.cart.store.borrow_mut().remove_coupon();
        let mutation = outcome
            .changed_state()
            .then_some(CartMutation::RemoveCoupon);
        self.after_local_mutation(&self.cart, mutation, outcome.notice())
            .await;
        outcome
    }

    /// Simulated payment: the order is recorded locally, the cart is cleared through the normal path.
    pub async fn checkout(&self) -> Result<OrderDraft, CheckoutError> {
        let draft = OrderDraft::from_cart(&self.cart.store.borrow(), Utc::now())?;
        log::info!(
            "Order submitted: {} line(s), total {:.2}",
            draft.items.len(),
            draft.total
        );
        self.clear_cart().await;
        self.raise(Notice::order_placed());
        Ok(draft)
    }

    // =======
    // wishlist
    // =======

    pub async fn add_to_wishlist(&self, book: &Book) -> WishlistOutcome {
        let (outcome, item) = {
            let mut wishlist = self.wishlist.store.borrow_mut();
            let outcome = wishlist.add_item(book);
            (outcome, wishlist.item(&book.id).cloned())
        };
        let mutation = item
            .filter(|_| outcome.changed_state())
            .map(WishlistMutation::AddItem);
        self.after_local_mutation(&self.wishlist, mutation, outcome.notice())
            .await;
        outcome
    }

    pub async fn remove_from_wishlist(&self, id: &str) -> WishlistOutcome {
        let outcome = self.wishlist.store.borrow_mut().remove_item(id);
        let mutation = WishlistMutation::RemoveItem {
            item_id: id.to_string(),
        };
        self.after_local_mutation(
            &self.wishlist,
            outcome.changed_state().then_some(mutation),
            outcome.notice(),
        )
        .await;
        outcome
    }

    pub async fn clear_wishlist(&self) -> WishlistOutcome {
        let outcome = self.wishlist.store.borrow_mut().clear();
        self.after_local_mutation(&self.wishlist, Some(WishlistMutation::Clear), outcome.notice())
            .await;
        outcome
    }

    // =======
    // across stores
    // =======

    /// Add one copy to the cart, then drop it from the wishlist. Two independent operations.
    pub async fn move_to_cart(&self, id: &str) -> bool {
        let book = {
            let wishlist = self.wishlist.store.borrow();
            wishlist.item(id).map(Book::from)
        };
        let Some(book) = book else {
            return false;
        };
        self.add_to_cart(&book, 1).await;
        self.remove_from_wishlist(id).await;
        true
    }

    /// Add one copy of every saved book to the cart, then clear the wishlist.
    /// Not atomic: a failure partway leaves both stores partially updated.
    pub async fn move_all_to_cart(&self) -> usize {
        let books: Vec<Book> = {
            let wishlist = self.wishlist.store.borrow();
            wishlist.items().map(Book::from).collect()
        };
        for book in &books {
            self.add_to_cart(book, 1).await;
        }
        if !books.is_empty() {
            self.clear_wishlist().await;
        }
        books.len()
    }

    // =======
    // reconciliation
    // =======

    /// The local mutation has already been applied. `mutation` is `None` when nothing changed.
    async fn after_local_mutation<S: SyncedStore>(
        &self,
        slot: &Synced<S>,
        mutation: Option<S::Mutation>,
        notice: Option<Notice>,
    ) {
        let _flusher = FlushLater::new(self);

        if let Some(notice) = notice {
            self.raise(notice);
        }
        let Some(mutation) = mutation else {
            return;
        };
        self.listeners.borrow_mut().notify(S::KIND);

        let Some(session) = self.session() else {
            // local-only
            return;
        };
        self.mirror_to_cache(slot, &session);

        let ticket = slot.lane.ticket();
        slot.state.borrow_mut().mark_sync_started(SyncKind::Push);
        // let the UI see the optimistic value before we wait on the network
        self.flush_notifications();

        self.reconcile(slot, &session, ticket, mutation).await;
    }

    async fn reconcile<S: SyncedStore>(
        &self,
        slot: &Synced<S>,
        session: &Session,
        ticket: Ticket,
        mutation: S::Mutation,
    ) {
        let epoch = self.epoch.get();
        let _turn = slot.lane.enter().await;
        if self.epoch.get() != epoch {
            return;
        }

        let pushed = with_retry(self.push_retries, self.request_timeout, || {
            S::push(&self.api, session, &mutation)
        })
        .await;
        if self.epoch.get() != epoch {
            return;
        }
        if let Err(e) = pushed {
            // keep the optimistic value; the next successful pull reconciles it
            log::error!("Failed to sync {}: {e}", S::KIND.as_str());
            slot.state.borrow_mut().mark_sync_finished(Some(e.to_string()));
            self.raise(Notice::sync_failed());
            return;
        }

        let pulled = with_retry(0, self.request_timeout, || S::fetch(&self.api, session)).await;
        if self.epoch.get() != epoch {
            return;
        }
        match pulled {
            Ok(snapshot) => {
                self.apply_snapshot(slot, session, ticket, snapshot);
                slot.state.borrow_mut().mark_sync_finished(None);
            }
            Err(e) => {
                log::error!("Failed to reload {} after sync: {e}", S::KIND.as_str());
                slot.state.borrow_mut().mark_sync_finished(Some(e.to_string()));
                self.raise(Notice::sync_failed());
            }
        }
    }

    async fn pull<S: SyncedStore>(&self, slot: &Synced<S>, session: &Session, reason: PullReason) {
        let epoch = self.epoch.get();
        let ticket = slot.lane.ticket();
        slot.state.borrow_mut().mark_sync_started(SyncKind::Pull);

        let _turn = slot.lane.enter().await;
        if self.epoch.get() != epoch {
            return;
        }
        let pulled = with_retry(0, self.request_timeout, || S::fetch(&self.api, session)).await;
        if self.epoch.get() != epoch {
            return;
        }

        match pulled {
            Ok(snapshot) => {
                self.apply_snapshot(slot, session, ticket, snapshot);
                slot.state.borrow_mut().mark_sync_finished(None);
            }
            Err(e) => {
                log::error!("Failed to load {} from backend: {e}", S::KIND.as_str());
                slot.state.borrow_mut().mark_sync_finished(Some(e.to_string()));
                if reason == PullReason::Refresh {
                    self.raise(Notice::sync_failed());
                }
            }
        }
    }

    /// Replace local state with a pulled snapshot unless something newer was issued since `ticket`.
    fn apply_snapshot<S: SyncedStore>(
        &self,
        slot: &Synced<S>,
        session: &Session,
        ticket: Ticket,
        snapshot: S::Snapshot,
    ) -> bool {
        if !slot.lane.commit(ticket) {
            return false;
        }
        slot.store.borrow_mut().replace_from_snapshot(snapshot);
        self.listeners.borrow_mut().notify(S::KIND);
        self.mirror_to_cache(slot, session);
        true
    }

    fn restart_sync<S: SyncedStore>(&self, slot: &Synced<S>) {
        slot.state.borrow_mut().reset();
        slot.lane.invalidate();
    }

    fn reset_slot<S: SyncedStore>(&self, slot: &Synced<S>) {
        slot.store.borrow_mut().reset();
        slot.state.borrow_mut().reset();
        slot.lane.invalidate();
        self.listeners.borrow_mut().notify(S::KIND);
    }

    // =======
    // local cache
    // =======

    fn mirror_to_cache<S: SyncedStore>(&self, slot: &Synced<S>, session: &Session) {
        let Some(cache) = &self.cache else {
            return;
        };
        let snapshot = slot.store.borrow().snapshot();
        let key = S::KIND.cache_key(&session.user_id);
        if let Err(e) = cache.store(&key, &snapshot) {
            log::warn!("Failed to cache {key}: {e}");
        }
    }

    fn forget_cached(&self, kind: StoreKind, session: &Session) {
        let Some(cache) = &self.cache else {
            return;
        };
        let key = kind.cache_key(&session.user_id);
        if let Err(e) = cache.remove(&key) {
            log::warn!("Failed to remove cached {key}: {e}");
        }
    }

    /// Only fills an empty store, so a cart built before signing in is not thrown away
    /// before the server has answered.
    fn restore_from_cache<S: SyncedStore>(&self, slot: &Synced<S>, session: &Session) {
        let Some(cache) = &self.cache else {
            return;
        };
        let key = S::KIND.cache_key(&session.user_id);
        let cached = match cache.load::<S::Snapshot>(&key) {
            Ok(Some(cached)) => cached,
            Ok(None) => return,
            Err(e) => {
                log::warn!("Ignoring unreadable cache entry {key}: {e}");
                return;
            }
        };
        let mut store = slot.store.borrow_mut();
        if SnapshotStore::is_empty(&*store) {
            log::info!("Restored {key} from cache saved at {}", cached.saved_at);
            store.replace_from_snapshot(cached.snapshot);
            drop(store);
            self.listeners.borrow_mut().notify(S::KIND);
        }
    }
}

/// Flushes listeners when dropped, whichever path the function took.
struct FlushLater<'a, A> {
    coordinator: &'a SyncCoordinator<A>,
}

impl<'a, A> FlushLater<'a, A> {
    fn new(coordinator: &'a SyncCoordinator<A>) -> Self {
        Self { coordinator }
    }
}

impl<A> Drop for FlushLater<'_, A> {
    fn drop(&mut self) {
        self.coordinator.flush_notifications();
    }
}
