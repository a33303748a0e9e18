//! Subscriber registry and synchronous fan-out.
//!
//! Subscribers are called in registration order with every event; there is
//! no filtering, buffering or replay. A subscriber registered after an event
//! was dispatched never sees it.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::events::SyncEvent;

pub type SubscriberId = u64;

type Callback = Rc<RefCell<Box<dyn FnMut(&SyncEvent)>>>;

struct Entry {
    id: SubscriberId,
    active: Rc<Cell<bool>>,
    callback: Callback,
}

/// A subscriber captured for one delivery round.
///
/// Delivery happens outside any borrow of the registry, so a callback may
/// subscribe or unsubscribe while it runs. A target unregistered mid-round
/// is skipped.
#[derive(Clone)]
pub struct Target {
    id: SubscriberId,
    active: Rc<Cell<bool>>,
    callback: Callback,
}

impl Target {
    pub fn deliver(&self, event: &SyncEvent) {
        if !self.active.get() {
            return;
        }
        match self.callback.try_borrow_mut() {
            Ok(mut callback) => (*callback)(event),
            Err(_) => tracing::warn!(
                subscriber = self.id,
                kind = event.kind(),
                "re-entrant delivery skipped"
            ),
        }
    }
}

#[derive(Default)]
pub struct Dispatcher {
    entries: Vec<Entry>,
    next_id: SubscriberId,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, callback: F) -> SubscriberId
    where
        F: FnMut(&SyncEvent) + 'static,
    {
        self.next_id += 1;
        let id = self.next_id;
        self.entries.push(Entry {
            id,
            active: Rc::new(Cell::new(true)),
            callback: Rc::new(RefCell::new(Box::new(callback))),
        });
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        let Some(pos) = self.entries.iter().position(|entry| entry.id == id) else {
            return false;
        };
        let entry = self.entries.remove(pos);
        entry.active.set(false);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn targets(&self) -> Vec<Target> {
        self.entries
            .iter()
            .map(|entry| Target {
                id: entry.id,
                active: Rc::clone(&entry.active),
                callback: Rc::clone(&entry.callback),
            })
            .collect()
    }

    pub fn notify(&self, event: &SyncEvent) {
        deliver(&self.targets(), event);
    }
}

pub fn deliver(targets: &[Target], event: &SyncEvent) {
    for target in targets {
        target.deliver(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ProjectToken, SyncEvent};

    fn token(text: &str) -> SyncEvent {
        SyncEvent::ProjectToken(ProjectToken { token: text.into() })
    }

    #[test]
    fn every_subscriber_sees_every_event_in_order() {
        let mut dispatcher = Dispatcher::new();
        let logs: Vec<Rc<RefCell<Vec<String>>>> =
            (0..3).map(|_| Rc::new(RefCell::new(Vec::new()))).collect();
        for log in &logs {
            let log = Rc::clone(log);
            dispatcher.register(move |event| {
                if let SyncEvent::ProjectToken(t) = event {
                    log.borrow_mut().push(t.token.clone());
                }
            });
        }
        for text in ["a", "b", "c", "d"] {
            dispatcher.notify(&token(text));
        }
        for log in &logs {
            assert_eq!(*log.borrow(), vec!["a", "b", "c", "d"]);
        }
    }

    #[test]
    fn registration_order_is_call_order() {
        let mut dispatcher = Dispatcher::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for n in 1..=3 {
            let order = Rc::clone(&order);
            dispatcher.register(move |_| order.borrow_mut().push(n));
        }
        dispatcher.notify(&token("x"));
        assert_eq!(*order.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn late_subscriber_misses_earlier_events() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.notify(&token("early"));
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        dispatcher.register(move |_| counter.set(counter.get() + 1));
        dispatcher.notify(&token("late"));
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn unregistered_target_is_skipped_within_a_round() {
        let mut dispatcher = Dispatcher::new();
        let hits = Rc::new(Cell::new(0));
        let first = dispatcher.register(|_| {});
        let counter = Rc::clone(&hits);
        let second = dispatcher.register(move |_| counter.set(counter.get() + 1));
        let targets = dispatcher.targets();
        assert!(dispatcher.unregister(second));
        deliver(&targets, &token("x"));
        assert_eq!(hits.get(), 0);
        assert!(dispatcher.unregister(first));
        assert!(!dispatcher.unregister(first));
        assert!(dispatcher.is_empty());
    }
}
