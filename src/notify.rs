// 📣 Change Notifier - best-effort "something changed, re-fetch" fan-out
//
// Carries no payload beyond the topic. Subscribers must treat a signal
// purely as a cue to re-read authoritative state, never as a delta to
// apply locally: there is no delivery or ordering guarantee. Display
// clients keep a fixed-interval pull (POLL_FALLBACK) running regardless,
// so staleness stays bounded even if this channel goes silent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// Mandatory pull interval for display clients.
pub const POLL_FALLBACK: Duration = Duration::from_secs(10);

/// Which slice of state changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeTopic {
    Ledger,
    Costumes,
    Votes,
    Settings,
}

type Callback = Box<dyn Fn(ChangeTopic) + Send + 'static>;
type Registry = Mutex<HashMap<u64, Callback>>;

/// Fan-out hub. Clone freely; clones share the subscriber registry.
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    registry: Arc<Registry>,
    next_id: Arc<Mutex<u64>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Dropping the returned handle (or calling
    /// `unsubscribe`) removes it.
    pub fn subscribe<F>(&self, on_change: F) -> Subscription
    where
        F: Fn(ChangeTopic) + Send + 'static,
    {
        let id = {
            let mut counter = self.next_id.lock().unwrap();
            *counter += 1;
            *counter
        };
        self.registry
            .lock()
            .unwrap()
            .insert(id, Box::new(on_change));

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Fire every current subscriber. Best effort: a subscriber that was
    /// just dropped simply isn't called.
    pub fn notify(&self, topic: ChangeTopic) {
        let registry = self.registry.lock().unwrap();
        for callback in registry.values() {
            callback(topic);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().unwrap().len()
    }
}

/// Unsubscribe handle; removes the callback on drop.
pub struct Subscription {
    id: u64,
    registry: Weak<Registry>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut map) = registry.lock() {
                map.remove(&self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_notify_reaches_every_subscriber() {
        let notifier = ChangeNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let a = {
            let hits = hits.clone();
            notifier.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        let b = {
            let hits = hits.clone();
            notifier.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };

        notifier.notify(ChangeTopic::Ledger);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        drop(a);
        drop(b);
    }

    #[test]
    fn test_dropped_subscription_stops_delivery() {
        let notifier = ChangeNotifier::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let sub = {
            let hits = hits.clone();
            notifier.subscribe(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            })
        };
        assert_eq!(notifier.subscriber_count(), 1);

        sub.unsubscribe();
        assert_eq!(notifier.subscriber_count(), 0);

        notifier.notify(ChangeTopic::Votes);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_topic_is_delivered_as_sent() {
        let notifier = ChangeNotifier::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let _sub = {
            let seen = seen.clone();
            notifier.subscribe(move |topic| {
                seen.lock().unwrap().push(topic);
            })
        };

        notifier.notify(ChangeTopic::Settings);
        notifier.notify(ChangeTopic::Costumes);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![ChangeTopic::Settings, ChangeTopic::Costumes]
        );
    }

    #[test]
    fn test_notify_with_no_subscribers_is_fine() {
        let notifier = ChangeNotifier::new();
        notifier.notify(ChangeTopic::Ledger);
        assert_eq!(notifier.subscriber_count(), 0);
    }
}
