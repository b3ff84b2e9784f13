use crate::{
    connection::{
        AudioConnection,
        AudioReceiveHandler,
        AudioSendHandler,
        ConnectionListener,
        ConnectionStatus,
        ListenerProxy,
    },
    error::JoinResult,
    id::GuildId,
    model::{VoiceChannel, VoiceStateUpdate},
    policy::{GuildContext, GuildPolicy, Headless, VoicePolicy},
    shards::Shard,
    Config,
};
use derivative::Derivative;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tracing::{debug, instrument, warn};

/// Snapshot of an [`AudioManager`]'s connection state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CallState {
    /// Neither connected nor waiting on a connection.
    Idle,
    /// A connection to this channel has been requested over the gateway,
    /// and is awaiting a voice server.
    Queued(VoiceChannel),
    /// An audio connection is live in this channel.
    Connected(VoiceChannel),
}

#[derive(Derivative)]
#[derivative(Debug)]
struct Inner {
    #[derivative(Debug = "ignore")]
    connection: Option<Arc<dyn AudioConnection>>,
    queued: Option<VoiceChannel>,
    #[derivative(Debug = "ignore")]
    send_handler: Option<Arc<dyn AudioSendHandler>>,
    #[derivative(Debug = "ignore")]
    receive_handler: Option<Arc<dyn AudioReceiveHandler>>,
    self_mute: bool,
    self_deaf: bool,
    auto_reconnect: bool,
    queue_timeout: Duration,
    connect_timeout: Duration,
}

impl Inner {
    fn new(config: &Config) -> Self {
        Self {
            connection: None,
            queued: None,
            send_handler: None,
            receive_handler: None,
            self_mute: config.self_mute,
            self_deaf: config.self_deaf,
            auto_reconnect: config.auto_reconnect,
            queue_timeout: config.queue_timeout,
            connect_timeout: config.connect_timeout,
        }
    }

    // Live channel takes precedence over a queued one.
    fn target_channel(&self) -> Option<VoiceChannel> {
        self.connection
            .as_ref()
            .map(|conn| conn.channel())
            .or_else(|| self.queued.clone())
    }
}

/// The audio manager is responsible for a single guild's voice session,
/// mediating between requests to join, move, or leave, the gateway, and
/// the audio connection eventually provided by a voice transport.
///
/// At most one [`AudioConnection`] is held at a time, and every connection
/// is closed once it is replaced or forgotten. All state changes happen
/// under a single lock per manager, and no operation waits on the gateway.
/// Connections are closed after that lock is released.
///
/// Gateway messages are fire-and-forget: a connection request is sent, and
/// the transport later calls [`adopt`] with the resulting connection.
///
/// [`adopt`]: AudioManager::adopt
#[derive(Derivative)]
#[derivative(Debug)]
pub struct AudioManager {
    guild_id: Option<GuildId>,
    inner: Mutex<Inner>,
    listener: Arc<ListenerProxy>,
    #[derivative(Debug = "ignore")]
    policy: Box<dyn VoicePolicy>,
}

impl AudioManager {
    /// Creates a new manager for `guild`, which will send gateway messages
    /// via the given shard.
    #[inline]
    pub fn new(guild: Arc<dyn GuildContext>, shard: Shard) -> Self {
        Self::from_config(guild, shard, Config::default())
    }

    /// Creates a new manager for `guild`, configured as specified.
    #[inline]
    pub fn from_config(guild: Arc<dyn GuildContext>, shard: Shard, config: Config) -> Self {
        Self::with_policy(GuildPolicy::new(guild, shard), config)
    }

    /// Creates a new manager which belongs to no guild, and does not
    /// communicate over the gateway.
    ///
    /// No permission checks are made when joining channels, and voice state
    /// updates are discarded. Voice server details must reach the transport
    /// through some other method.
    ///
    /// For most use cases you do not want this.
    #[inline]
    #[must_use]
    pub fn headless() -> Self {
        Self::headless_from_config(Config::default())
    }

    /// Creates a new headless manager from the given configuration.
    #[inline]
    #[must_use]
    pub fn headless_from_config(config: Config) -> Self {
        Self::with_policy(Headless, config)
    }

    /// Creates a new manager following a custom [`VoicePolicy`].
    pub fn with_policy<P>(policy: P, config: Config) -> Self
    where
        P: VoicePolicy + 'static,
    {
        Self {
            guild_id: policy.guild_id(),
            inner: Mutex::new(Inner::new(&config)),
            listener: Arc::new(ListenerProxy::new()),
            policy: Box::new(policy),
        }
    }

    /// Returns the ID of the guild owning this manager, if any.
    #[must_use]
    pub fn guild_id(&self) -> Option<GuildId> {
        self.guild_id
    }

    /// Connects to `channel`, or moves an existing connection to it.
    ///
    /// If no connection is live, the channel is queued and a connection
    /// request is sent over the gateway. If a connection is live in another
    /// channel, it is moved. Opening the channel a live connection is
    /// already in does nothing.
    ///
    /// This never waits for the connection to complete: completion is
    /// reported to the [connection listener].
    ///
    /// # Errors
    ///
    /// Fails if the local member may not join `channel`; see
    /// [`JoinError::is_precondition`]. State is unchanged on failure.
    ///
    /// [connection listener]: AudioManager::set_connection_listener
    /// [`JoinError::is_precondition`]: crate::error::JoinError::is_precondition
    #[instrument(skip(self))]
    pub fn open(&self, channel: VoiceChannel) -> JoinResult<()> {
        self.policy.preflight(&channel)?;

        let mut inner = self.inner.lock();
        let update = VoiceStateUpdate::connect(
            channel.guild_id,
            channel.id,
            inner.self_mute,
            inner.self_deaf,
        );

        if let Some(conn) = &inner.connection {
            if conn.channel().id == channel.id {
                debug!("Already connected to channel {}.", channel.id);
                return Ok(());
            }

            debug!("Moving connection to channel {}.", channel.id);
            self.policy.send_voice_state(&update);
            conn.set_channel(channel);
        } else {
            debug!("Requesting connection to channel {}.", channel.id);
            self.policy.send_voice_state(&update);
            inner.queued = Some(channel);
        }

        Ok(())
    }

    /// Leaves the current voice channel, or cancels a pending connection.
    ///
    /// Equivalent to [`close_with`] with [`ConnectionStatus::NotConnected`].
    ///
    /// [`close_with`]: AudioManager::close_with
    #[inline]
    pub fn close(&self) {
        self.close_with(ConnectionStatus::NotConnected);
    }

    /// Closes any live connection with the given reason, and cancels any
    /// pending connection attempt.
    ///
    /// Unless `reason` is [`ConnectionStatus::AudioRegionChange`], the
    /// gateway is told that this session is leaving voice. Closing an idle
    /// manager does nothing.
    ///
    /// The connection is detached under the manager's lock, but closed
    /// after the lock is released, so a transport may report the teardown
    /// to the [connection listener] synchronously.
    ///
    /// [connection listener]: AudioManager::set_connection_listener
    #[instrument(skip(self))]
    pub fn close_with(&self, reason: ConnectionStatus) {
        let connection = {
            let mut inner = self.inner.lock();
            let queued = inner.queued.take();
            let connection = inner.connection.take();

            if let Some(guild_id) = self
                .guild_id
                .or_else(|| queued.as_ref().map(|channel| channel.guild_id))
            {
                self.policy.cancel_pending(guild_id);
            }

            let left = match connection.as_ref().map(|conn| conn.channel()).or(queued) {
                Some(channel) => channel,
                None => {
                    debug!("Nothing to close.");
                    return;
                },
            };

            if reason == ConnectionStatus::AudioRegionChange {
                debug!("Closing for region change; staying in channel {}.", left.id);
            } else {
                let guild_id = self.guild_id.unwrap_or(left.guild_id);
                self.policy.send_voice_state(&VoiceStateUpdate::disconnect(
                    guild_id,
                    inner.self_mute,
                    inner.self_deaf,
                ));
            }

            connection
        };

        if let Some(conn) = connection {
            conn.close(reason);
        }
    }

    /// Tears down the live connection after the gateway has announced a new
    /// voice server, and queues its channel to be rejoined.
    ///
    /// No new connection request is sent: the gateway delivers the new
    /// server by itself, after which the transport calls [`adopt`].
    ///
    /// [`adopt`]: AudioManager::adopt
    #[instrument(skip(self))]
    pub fn prepare_for_region_change(&self) {
        let connection = {
            let mut inner = self.inner.lock();
            let connection = inner.connection.take();

            if let Some(conn) = &connection {
                let channel = conn.channel();
                debug!("Awaiting new voice server for channel {}.", channel.id);
                inner.queued = Some(channel);
            } else {
                debug!("No live connection to move between regions.");
            }

            connection
        };

        if let Some(conn) = connection {
            conn.close(ConnectionStatus::AudioRegionChange);
        }
    }

    /// Takes ownership of a connection built by the voice transport.
    ///
    /// The pending connection attempt is cleared, and the manager's audio
    /// handlers, queue timeout, and reconnect policy are applied to the new
    /// connection. The call then waits, without holding the manager's lock,
    /// for up to the [connect timeout] while the connection readies itself.
    ///
    /// Callers must [`close`] any earlier connection before adopting
    /// another. If they do not, the earlier connection is closed with
    /// [`ConnectionStatus::ShuttingDown`].
    ///
    /// [connect timeout]: AudioManager::set_connect_timeout
    /// [`close`]: AudioManager::close
    #[instrument(skip(self, connection))]
    pub fn adopt(&self, connection: Arc<dyn AudioConnection>) {
        let (previous, connect_timeout) = {
            let mut inner = self.inner.lock();
            let previous = inner.connection.take();
            inner.queued = None;

            connection.set_sending_handler(inner.send_handler.clone());
            connection.set_receiving_handler(inner.receive_handler.clone());
            connection.set_queue_timeout(inner.queue_timeout);
            connection.set_auto_reconnect(inner.auto_reconnect);

            inner.connection = Some(connection.clone());
            (previous, inner.connect_timeout)
        };

        if let Some(previous) = previous {
            warn!("Adopted a connection while another was live; closing the old one.");
            previous.close(ConnectionStatus::ShuttingDown);
        }

        connection.ready(connect_timeout);
    }

    /// Updates the channel of the live connection, following a move made
    /// elsewhere (e.g., by a moderator).
    ///
    /// No gateway message is sent.
    #[instrument(skip(self))]
    pub fn set_connected_channel(&self, channel: VoiceChannel) {
        let inner = self.inner.lock();

        if let Some(conn) = &inner.connection {
            conn.set_channel(channel);
        } else {
            debug!("Moved while not connected: ignoring.");
        }
    }

    /// Replaces the pending connection target without contacting the gateway.
    #[instrument(skip(self))]
    pub fn set_queued_channel(&self, channel: Option<VoiceChannel>) {
        self.inner.lock().queued = channel;
    }

    /// Returns a consistent snapshot of the connection state.
    #[must_use]
    pub fn state(&self) -> CallState {
        let inner = self.inner.lock();

        if let Some(conn) = &inner.connection {
            CallState::Connected(conn.channel())
        } else if let Some(channel) = &inner.queued {
            CallState::Queued(channel.clone())
        } else {
            CallState::Idle
        }
    }

    /// Returns whether an audio connection is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.lock().connection.is_some()
    }

    /// Returns whether a connection has been requested but not yet adopted.
    #[must_use]
    pub fn is_attempting_to_connect(&self) -> bool {
        self.inner.lock().queued.is_some()
    }

    /// Returns the channel of the live connection.
    #[must_use]
    pub fn connected_channel(&self) -> Option<VoiceChannel> {
        self.inner
            .lock()
            .connection
            .as_ref()
            .map(|conn| conn.channel())
    }

    /// Returns the channel a connection has been requested for.
    #[must_use]
    pub fn queued_channel(&self) -> Option<VoiceChannel> {
        self.inner.lock().queued.clone()
    }

    /// Returns the live connection's status, or
    /// [`ConnectionStatus::NotConnected`] if there is none.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner
            .lock()
            .connection
            .as_ref()
            .map_or(ConnectionStatus::NotConnected, |conn| conn.status())
    }

    /// Sets whether the local member is self-muted.
    ///
    /// Changes are announced over the gateway if a channel is live or queued.
    #[instrument(skip(self))]
    pub fn set_self_mute(&self, mute: bool) {
        let mut inner = self.inner.lock();

        if inner.self_mute != mute {
            inner.self_mute = mute;
            self.announce(&inner);
        }
    }

    /// Returns whether the local member is self-muted.
    #[must_use]
    pub fn is_self_muted(&self) -> bool {
        self.inner.lock().self_mute
    }

    /// Sets whether the local member is self-deafened.
    ///
    /// Changes are announced over the gateway if a channel is live or queued.
    #[instrument(skip(self))]
    pub fn set_self_deafened(&self, deaf: bool) {
        let mut inner = self.inner.lock();

        if inner.self_deaf != deaf {
            inner.self_deaf = deaf;
            self.announce(&inner);
        }
    }

    /// Returns whether the local member is self-deafened.
    #[must_use]
    pub fn is_self_deafened(&self) -> bool {
        self.inner.lock().self_deaf
    }

    fn announce(&self, inner: &Inner) {
        if let Some(channel) = inner.target_channel() {
            self.policy.send_voice_state(&VoiceStateUpdate::connect(
                channel.guild_id,
                channel.id,
                inner.self_mute,
                inner.self_deaf,
            ));
        }
    }

    /// Sets whether connections reconnect by themselves after a recoverable
    /// failure, applying to the live connection and any later ones.
    #[instrument(skip(self))]
    pub fn set_auto_reconnect(&self, auto_reconnect: bool) {
        let mut inner = self.inner.lock();
        inner.auto_reconnect = auto_reconnect;

        if let Some(conn) = &inner.connection {
            conn.set_auto_reconnect(auto_reconnect);
        }
    }

    /// Returns whether connections reconnect by themselves.
    #[must_use]
    pub fn is_auto_reconnect(&self) -> bool {
        self.inner.lock().auto_reconnect
    }

    /// Sets how long newly adopted connections are given to become ready.
    pub fn set_connect_timeout(&self, timeout: Duration) {
        self.inner.lock().connect_timeout = timeout;
    }

    /// Returns how long newly adopted connections are given to become ready.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.inner.lock().connect_timeout
    }

    /// Sets how long connections wait on their outbound packet queue.
    pub fn set_queue_timeout(&self, timeout: Duration) {
        let mut inner = self.inner.lock();
        inner.queue_timeout = timeout;

        if let Some(conn) = &inner.connection {
            conn.set_queue_timeout(timeout);
        }
    }

    /// Returns how long connections wait on their outbound packet queue.
    #[must_use]
    pub fn queue_timeout(&self) -> Duration {
        self.inner.lock().queue_timeout
    }

    /// Installs (or clears) the source of outbound audio.
    ///
    /// The handler is kept across reconnects.
    #[instrument(skip(self, handler))]
    pub fn set_sending_handler(&self, handler: Option<Arc<dyn AudioSendHandler>>) {
        let mut inner = self.inner.lock();
        inner.send_handler = handler;

        if let Some(conn) = &inner.connection {
            conn.set_sending_handler(inner.send_handler.clone());
        }
    }

    /// Returns the source of outbound audio.
    #[must_use]
    pub fn sending_handler(&self) -> Option<Arc<dyn AudioSendHandler>> {
        self.inner.lock().send_handler.clone()
    }

    /// Installs (or clears) the sink for inbound audio.
    ///
    /// The handler is kept across reconnects.
    #[instrument(skip(self, handler))]
    pub fn set_receiving_handler(&self, handler: Option<Arc<dyn AudioReceiveHandler>>) {
        let mut inner = self.inner.lock();
        inner.receive_handler = handler;

        if let Some(conn) = &inner.connection {
            conn.set_receiving_handler(inner.receive_handler.clone());
        }
    }

    /// Returns the sink for inbound audio.
    #[must_use]
    pub fn receiving_handler(&self) -> Option<Arc<dyn AudioReceiveHandler>> {
        self.inner.lock().receive_handler.clone()
    }

    /// Sets (or clears) the observer of connection events.
    ///
    /// This may be changed at any time, including mid-connection.
    pub fn set_connection_listener(&self, listener: Option<Arc<dyn ConnectionListener>>) {
        self.listener.set_listener(listener);
    }

    /// Returns the observer of connection events.
    #[must_use]
    pub fn connection_listener(&self) -> Option<Arc<dyn ConnectionListener>> {
        self.listener.listener()
    }

    /// Returns the stable listener through which a transport should report
    /// connection events.
    #[must_use]
    pub fn listener_proxy(&self) -> Arc<ListenerProxy> {
        self.listener.clone()
    }
}
