use super::ConnectionStatus;
use crate::id::UserId;
use parking_lot::RwLock;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    time::Duration,
};
use tracing::error;

/// Observer of a voice connection's lifecycle.
///
/// Callbacks are made from transport threads, and must not block for long.
pub trait ConnectionListener: Send + Sync {
    /// Fired on each heartbeat acknowledgement from the voice server.
    fn on_ping(&self, _ping: Duration) {}

    /// Fired whenever the connection moves to a new [`ConnectionStatus`].
    fn on_status_change(&self, status: ConnectionStatus);

    /// Fired when a user starts or stops transmitting audio.
    fn on_user_speaking(&self, _user: UserId, _speaking: bool) {}
}

/// A stable [`ConnectionListener`] which forwards to a swappable inner listener.
///
/// Transports hold onto the proxy rather than the user's listener, so that
/// users may rebind or clear their listener at any time without the
/// transport noticing. A panicking inner listener is logged, and never
/// unwinds into the transport.
#[derive(Default)]
pub struct ListenerProxy {
    listener: RwLock<Option<Arc<dyn ConnectionListener>>>,
}

impl ListenerProxy {
    /// Creates a proxy with no inner listener.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the inner listener, returning the previous one.
    pub fn set_listener(
        &self,
        listener: Option<Arc<dyn ConnectionListener>>,
    ) -> Option<Arc<dyn ConnectionListener>> {
        std::mem::replace(&mut *self.listener.write(), listener)
    }

    /// Returns the current inner listener.
    #[must_use]
    pub fn listener(&self) -> Option<Arc<dyn ConnectionListener>> {
        self.listener.read().clone()
    }

    fn deliver<F>(&self, event: &str, f: F)
    where
        F: FnOnce(&dyn ConnectionListener),
    {
        // Clone out so that a slow callback never holds up a rebind.
        let listener = self.listener();

        if let Some(listener) = listener {
            let res = panic::catch_unwind(AssertUnwindSafe(|| f(&*listener)));

            if res.is_err() {
                error!("Connection listener panicked while handling {}.", event);
            }
        }
    }
}

impl ConnectionListener for ListenerProxy {
    fn on_ping(&self, ping: Duration) {
        self.deliver("ping", |l| l.on_ping(ping));
    }

    fn on_status_change(&self, status: ConnectionStatus) {
        self.deliver("status change", |l| l.on_status_change(status));
    }

    fn on_user_speaking(&self, user: UserId, speaking: bool) {
        self.deliver("speaking update", |l| l.on_user_speaking(user, speaking));
    }
}

impl std::fmt::Debug for ListenerProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerProxy")
            .field("has_listener", &self.listener.read().is_some())
            .finish()
    }
}
