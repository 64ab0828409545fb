//! The `PollTask` abstraction (§9): `spawn(interval, body)` plus a stop
//! channel, used by every background poller in this module.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

/// What a poll body reports back after each tick: keep going, or stop the
/// loop (used when the body's `Weak` upgrade fails, i.e. the owning
/// `AppContext` has been dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Continue,
    StopPolling,
}

/// A running poller: dropping this without calling `stop` leaves the
/// background thread running (it only exits on an explicit stop signal or
/// when its own body reports `StopPolling`), matching the spec's own note
/// that pollers are otherwise independent of any particular handle's
/// lifetime.
pub struct PollHandle {
    stop_tx: Sender<()>,
    join: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Signals the poller to stop and waits for its thread to exit.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

/// Runs `body` every `interval` until it reports [`Tick::StopPolling`] or
/// the returned [`PollHandle`] is stopped.
pub fn spawn<F>(interval: Duration, mut body: F) -> PollHandle
where
    F: FnMut() -> Tick + Send + 'static,
{
    let (stop_tx, stop_rx): (Sender<()>, Receiver<()>) = bounded(1);

    let join = std::thread::Builder::new()
        .name("hac-poll-task".to_string())
        .spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Ok(()) => break,
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if body() == Tick::StopPolling {
                        break;
                    }
                }
            }
        })
        .expect("failed to spawn poll task thread");

    PollHandle {
        stop_tx,
        join: Some(join),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn stop_halts_further_ticks() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let handle = spawn(Duration::from_millis(10), move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
            Tick::Continue
        });

        std::thread::sleep(Duration::from_millis(55));
        handle.stop();
        let observed = count.load(Ordering::SeqCst);
        assert!(observed >= 1);

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), observed);
    }

    #[test]
    fn stop_polling_tick_exits_loop_on_its_own() {
        let count = Arc::new(AtomicU32::new(0));
        let count_clone = count.clone();
        let handle = spawn(Duration::from_millis(5), move || {
            count_clone.fetch_add(1, Ordering::SeqCst);
            Tick::StopPolling
        });
        handle.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
