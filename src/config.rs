use crate::constants::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_QUEUE_TIMEOUT};
use std::time::Duration;

/// Configuration for audio managers.
///
/// Each [`AudioManager`] takes a copy of its configuration at creation;
/// later changes are made through the manager's own setters.
///
/// [`AudioManager`]: crate::AudioManager
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct Config {
    /// Amount of time a newly adopted connection is given to become ready.
    ///
    /// Defaults to 10 seconds.
    pub connect_timeout: Duration,

    /// Amount of time a connection waits on its outbound packet queue.
    ///
    /// Defaults to 100 milliseconds.
    pub queue_timeout: Duration,

    /// Whether connections should reconnect by themselves after a
    /// recoverable transport failure.
    ///
    /// Defaults to `true`.
    pub auto_reconnect: bool,

    /// Initial self-mute state of new managers.
    ///
    /// Defaults to `false`.
    pub self_mute: bool,

    /// Initial self-deafen state of new managers.
    ///
    /// Defaults to `false`.
    pub self_deaf: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            queue_timeout: DEFAULT_QUEUE_TIMEOUT,
            auto_reconnect: true,
            self_mute: false,
            self_deaf: false,
        }
    }
}

impl Config {
    /// Sets this `Config`'s timeout for a connection to become ready.
    #[must_use]
    pub fn connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Sets this `Config`'s outbound queue timeout.
    #[must_use]
    pub fn queue_timeout(mut self, queue_timeout: Duration) -> Self {
        self.queue_timeout = queue_timeout;
        self
    }

    /// Sets whether connections made under this `Config` reconnect by themselves.
    #[must_use]
    pub fn auto_reconnect(mut self, auto_reconnect: bool) -> Self {
        self.auto_reconnect = auto_reconnect;
        self
    }

    /// Sets this `Config`'s initial self-mute state.
    #[must_use]
    pub fn self_mute(mut self, self_mute: bool) -> Self {
        self.self_mute = self_mute;
        self
    }

    /// Sets this `Config`'s initial self-deafen state.
    #[must_use]
    pub fn self_deaf(mut self, self_deaf: bool) -> Self {
        self.self_deaf = self_deaf;
        self
    }
}
