//! # Listeners
//! Presentation code subscribes to changes of a topic (usually "which store changed").
//! Notifications are queued while state is being mutated and only delivered by [`Listeners::drain_due_notifications`],
//! so callbacks never run while the owner still holds a `RefCell` borrow.

use std::rc::Rc;

use slotmap::SlotMap;

slotmap::new_key_type! {
    pub struct ListenerKey;
}

type Callback<T> = Rc<dyn Fn(&T)>;

pub struct Listeners<T> {
    listeners: SlotMap<ListenerKey, Callback<T>>,
    pending: Vec<T>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            listeners: SlotMap::with_key(),
            pending: Vec::new(),
        }
    }
}

impl<T: Clone + PartialEq + 'static> Listeners<T> {
    pub fn register_listener(&mut self, listener: impl Fn(&T) + 'static) -> ListenerKey {
        self.listeners.insert(Rc::new(listener))
    }

    pub fn unregister_listener(&mut self, key: ListenerKey) {
        self.listeners.remove(key);
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Queue a notification. Repeated topics collapse into one delivery.
    pub fn notify(&mut self, topic: T) {
        if !self.pending.contains(&topic) {
            self.pending.push(topic);
        }
    }

    /// Take every queued notification as a closure that can be run once all borrows are released.
    pub fn drain_due_notifications(&mut self) -> Vec<Box<dyn FnOnce()>> {
        let topics = std::mem::take(&mut self.pending);
        let mut calls: Vec<Box<dyn FnOnce()>> = Vec::new();
        for topic in topics {
            for listener in self.listeners.values() {
                let listener = Rc::clone(listener);
                let topic = topic.clone();
                calls.push(Box::new(move || listener(&topic)));
            }
        }
        calls
    }
}
