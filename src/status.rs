//! Shared state between the hunt loop and the command listener.
//!
//! Exactly two things cross the thread boundary: the latest encounter status
//! (iteration plus diagnostic JPEG, consumed at most once) and the control
//! flags the listener flips. Nothing else is shared; no I/O ever happens
//! under the hub's lock.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// The most recent iteration's classification snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub iteration: u64,
    /// JPEG-encoded classification frame.
    pub image: Vec<u8>,
}

/// Mutually exclusive cache of the latest unread [`StatusUpdate`].
///
/// `publish` overwrites — only the latest status matters, there is no queue.
/// `take_if_present` returns-and-clears atomically, so each published status
/// is delivered at most once.
#[derive(Default)]
pub struct StatusHub {
    inner: Mutex<Option<StatusUpdate>>,
}

impl StatusHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, iteration: u64, image: Vec<u8>) {
        let mut slot = self.inner.lock().expect("status hub lock poisoned");
        *slot = Some(StatusUpdate { iteration, image });
    }

    pub fn take_if_present(&self) -> Option<StatusUpdate> {
        self.inner.lock().expect("status hub lock poisoned").take()
    }
}

/// Cooperative control flags: written only by the command listener, read
/// only by the hunt loop at iteration boundaries.
#[derive(Default)]
pub struct ControlFlags {
    stop_requested: AtomicBool,
    report_every_iteration: AtomicBool,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    pub fn set_report_every_iteration(&self, enabled: bool) {
        self.report_every_iteration.store(enabled, Ordering::SeqCst);
    }

    pub fn report_every_iteration(&self) -> bool {
        self.report_every_iteration.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn publish_then_take_returns_value_once() {
        let hub = StatusHub::new();
        hub.publish(7, vec![1, 2, 3]);

        let status = hub.take_if_present().unwrap();
        assert_eq!(status.iteration, 7);
        assert_eq!(status.image, vec![1, 2, 3]);

        // Single-consumption: the slot is now empty.
        assert!(hub.take_if_present().is_none());
    }

    #[test]
    fn take_on_empty_hub_is_none() {
        let hub = StatusHub::new();
        assert!(hub.take_if_present().is_none());
    }

    #[test]
    fn publish_overwrites_unread_status() {
        let hub = StatusHub::new();
        hub.publish(1, vec![1]);
        hub.publish(2, vec![2]);

        let status = hub.take_if_present().unwrap();
        assert_eq!(status.iteration, 2);
        assert_eq!(status.image, vec![2]);
        assert!(hub.take_if_present().is_none());
    }

    #[test]
    fn concurrent_publishes_never_interleave_fields() {
        let hub = Arc::new(StatusHub::new());
        let a = {
            let hub = Arc::clone(&hub);
            thread::spawn(move || {
                for _ in 0..500 {
                    hub.publish(1, vec![1; 8]);
                }
            })
        };
        let b = {
            let hub = Arc::clone(&hub);
            thread::spawn(move || {
                for _ in 0..500 {
                    hub.publish(2, vec![2; 8]);
                }
            })
        };
        a.join().unwrap();
        b.join().unwrap();

        // Exactly one of the two published pairs survives, never a mix.
        let status = hub.take_if_present().unwrap();
        assert_eq!(status.image, vec![status.iteration as u8; 8]);
    }

    #[test]
    fn flags_default_off_and_toggle() {
        let flags = ControlFlags::new();
        assert!(!flags.stop_requested());
        assert!(!flags.report_every_iteration());

        flags.request_stop();
        flags.set_report_every_iteration(true);
        assert!(flags.stop_requested());
        assert!(flags.report_every_iteration());

        flags.set_report_every_iteration(false);
        assert!(!flags.report_every_iteration());
    }
}
