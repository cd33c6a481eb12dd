//! The dial primitive consumed by reconnection.
//!
//! Dialing is fire-and-forget: whether a dial worked is only ever observed
//! through the address book, when the server shows up as a connected peer.

use std::sync::Arc;

use corelib::PeerAddress;
use parking_lot::Mutex;

/// Transport capable of starting a connection attempt.
///
/// # Thread Safety
///
/// Shared by every retrier task, so implementations must be `Send + Sync`.
pub trait Dialer: Send + Sync + 'static {
    /// Begin connecting to `address`. Must not block.
    fn join(&self, address: &PeerAddress);
}

impl<D: Dialer + ?Sized> Dialer for Arc<D> {
    fn join(&self, address: &PeerAddress) {
        (**self).join(address)
    }
}

type DialHook = Box<dyn Fn(&PeerAddress) + Send + Sync>;

/// Dialer that remembers every address it was asked to join.
///
/// Used by tests and the `simulate` command; an optional hook lets callers
/// emulate the transport answering a dial.
#[derive(Default)]
pub struct RecordingDialer {
    attempts: Mutex<Vec<PeerAddress>>,
    hook: Option<DialHook>,
}

impl RecordingDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `hook` after recording each dial.
    pub fn with_hook(hook: impl Fn(&PeerAddress) + Send + Sync + 'static) -> Self {
        Self {
            attempts: Mutex::new(Vec::new()),
            hook: Some(Box::new(hook)),
        }
    }

    /// Addresses dialed so far, oldest first.
    pub fn attempts(&self) -> Vec<PeerAddress> {
        self.attempts.lock().clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

impl Dialer for RecordingDialer {
    fn join(&self, address: &PeerAddress) {
        self.attempts.lock().push(address.clone());
        tracing::trace!(%address, "dial");
        if let Some(hook) = &self.hook {
            hook(address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_recording_dialer_records_in_order() {
        let dialer = RecordingDialer::new();
        let a = PeerAddress::new("127.0.0.1:1".parse().unwrap());
        let b = PeerAddress::new("127.0.0.1:2".parse().unwrap());
        dialer.join(&a);
        dialer.join(&b);
        assert_eq!(dialer.attempts(), vec![a, b]);
    }

    #[test]
    fn test_hook_runs_per_dial() {
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let dialer = Arc::new(RecordingDialer::with_hook(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let addr = PeerAddress::new("127.0.0.1:1".parse().unwrap());
        dialer.join(&addr);
        Dialer::join(&dialer, &addr);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(dialer.attempt_count(), 2);
    }
}
