//! Subscriber-list event publisher (§9): subscribers receive an owned
//! value-snapshot over a channel, never a reference into live state, so a
//! publish can happen after every lock the publisher held has been
//! released.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

pub struct Subscribers<T> {
    senders: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone> Subscribers<T> {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Registers a new subscriber, returning the receiving end. Dropping the
    /// receiver is enough to unsubscribe: the next `publish` call prunes
    /// dead senders.
    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = unbounded();
        self.senders.lock().push(tx);
        rx
    }

    /// Sends `value` to every live subscriber, pruning any whose receiver
    /// has been dropped.
    pub fn publish(&self, value: T) {
        self.senders.lock().retain(|tx| tx.send(value.clone()).is_ok());
    }
}

impl<T: Clone> Default for Subscribers<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reaches_every_live_subscriber() {
        let subs = Subscribers::new();
        let rx1 = subs.subscribe();
        let rx2 = subs.subscribe();
        subs.publish(42);
        assert_eq!(rx1.try_recv().unwrap(), 42);
        assert_eq!(rx2.try_recv().unwrap(), 42);
    }

    #[test]
    fn dropped_subscriber_is_pruned_on_next_publish() {
        let subs = Subscribers::new();
        {
            let _rx = subs.subscribe();
        }
        assert_eq!(subs.senders.lock().len(), 1);
        subs.publish(1);
        assert_eq!(subs.senders.lock().len(), 0);
    }
}
