//! Matches a request sent to one secondary session with the response that
//! eventually comes back on the same session.
//!
//! The original implementation kept at most one outstanding promise per
//! session but silently overwrote it if a second request landed before the
//! first resolved. This implementation rejects the second request instead,
//! per the specification's recommendation — a caller that cannot tell
//! whether its in-flight request was dropped cannot safely retry it.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::oneshot;

use crate::buffer::BufferView;

#[derive(Debug)]
pub enum CorrelatorError {
    /// Another request is already outstanding on this session.
    AlreadyPending,
    /// The session closed (or the correlator was dropped) before a response
    /// arrived.
    SessionClosed,
}

/// Tracks at most one outstanding request per session id.
pub struct Correlator {
    pending: Mutex<HashMap<u32, oneshot::Sender<BufferView>>>,
}

impl Correlator {
    pub fn new() -> Correlator {
        Correlator {
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new outstanding request for `session_id`. Returns a
    /// future that resolves once [`Correlator::resolve`] is called for the
    /// same session, or an error if a request is already pending.
    pub fn begin(&self, session_id: u32) -> Result<oneshot::Receiver<BufferView>, CorrelatorError> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().unwrap();
        if pending.contains_key(&session_id) {
            return Err(CorrelatorError::AlreadyPending);
        }
        pending.insert(session_id, tx);
        Ok(rx)
    }

    /// Delivers a response for `session_id`. Returns `true` if a pending
    /// request was found and fulfilled; `false` means the data arrived
    /// without anyone waiting on it (a session may legitimately send data
    /// the primary did not explicitly request), which is not an error.
    pub fn resolve(&self, session_id: u32, payload: BufferView) -> bool {
        let tx = self.pending.lock().unwrap().remove(&session_id);
        match tx {
            Some(tx) => tx.send(payload).is_ok(),
            None => false,
        }
    }

    /// Cancels any outstanding request for `session_id`, dropping the sender
    /// so the waiter observes a closed channel. Called when a session
    /// disconnects with a request still in flight.
    pub fn cancel(&self, session_id: u32) {
        self.pending.lock().unwrap().remove(&session_id);
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Correlator::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_delivers_to_waiter() {
        let correlator = Correlator::new();
        let rx = correlator.begin(1).unwrap();
        assert!(correlator.resolve(1, BufferView::from(vec![1, 2, 3])));
        let payload = rx.await.unwrap();
        assert_eq!(payload.as_slice(), &[1, 2, 3]);
    }

    #[tokio::test]
    async fn second_begin_before_resolve_is_rejected() {
        let correlator = Correlator::new();
        let _rx = correlator.begin(1).unwrap();
        assert!(matches!(
            correlator.begin(1),
            Err(CorrelatorError::AlreadyPending)
        ));
    }

    #[tokio::test]
    async fn resolve_without_pending_request_is_not_an_error() {
        let correlator = Correlator::new();
        assert!(!correlator.resolve(99, BufferView::from(vec![])));
    }

    #[tokio::test]
    async fn cancel_causes_waiter_to_see_closed_channel() {
        let correlator = Correlator::new();
        let rx = correlator.begin(1).unwrap();
        correlator.cancel(1);
        assert!(rx.await.is_err());
    }
}
