#![allow(missing_docs)]

use crate::{
    codec::{CodecBootstrap, CodecError, LoadedCodec, NativeLoader, Platform},
    connection::{
        AudioConnection,
        AudioReceiveHandler,
        AudioSendHandler,
        ConnectionListener,
        ConnectionStatus,
    },
    error::JoinResult,
    id::{ChannelId, GuildId},
    model::{Permission, VoiceChannel, VoiceStateUpdate},
    policy::GuildContext,
    shards::VoiceUpdate,
};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

#[derive(Default)]
pub struct RecordingListener {
    statuses: Mutex<Vec<ConnectionStatus>>,
}

impl RecordingListener {
    pub fn statuses(&self) -> Vec<ConnectionStatus> {
        self.statuses.lock().clone()
    }
}

impl ConnectionListener for RecordingListener {
    fn on_status_change(&self, status: ConnectionStatus) {
        self.statuses.lock().push(status);
    }
}

#[derive(Clone)]
enum LoaderBehaviour {
    Succeed,
    Fail(fn() -> CodecError),
    Panic,
}

#[derive(Clone)]
pub struct CountingLoader {
    behaviour: LoaderBehaviour,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl CountingLoader {
    fn with_behaviour(behaviour: LoaderBehaviour) -> Self {
        Self {
            behaviour,
            delay: Duration::default(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_behaviour(LoaderBehaviour::Succeed)
    }

    pub fn failing_with(make_error: fn() -> CodecError) -> Self {
        Self::with_behaviour(LoaderBehaviour::Fail(make_error))
    }

    pub fn panicking() -> Self {
        Self::with_behaviour(LoaderBehaviour::Panic)
    }

    pub fn with_delay_ms(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl NativeLoader for CountingLoader {
    fn load(&self, resource: &str) -> Result<LoadedCodec, CodecError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }

        match &self.behaviour {
            LoaderBehaviour::Succeed => Ok(LoadedCodec::at(resource)),
            LoaderBehaviour::Fail(make_error) => Err(make_error()),
            LoaderBehaviour::Panic => panic!("loader exploded"),
        }
    }
}

static SUPPORTED: Lazy<CodecBootstrap> = Lazy::new(|| {
    CodecBootstrap::new(
        Platform::from_prefix("linux-x86-64"),
        CountingLoader::succeeding(),
    )
});

static UNSUPPORTED: Lazy<CodecBootstrap> = Lazy::new(|| {
    CodecBootstrap::new(Platform::from_prefix("plan9-386"), CountingLoader::succeeding())
});

pub fn supported_codec() -> &'static CodecBootstrap {
    &SUPPORTED
}

pub fn unsupported_codec() -> &'static CodecBootstrap {
    &UNSUPPORTED
}

pub struct MockGuild {
    id: GuildId,
    available: bool,
    permissions: HashSet<Permission>,
}

impl MockGuild {
    pub fn new(id: u64) -> Self {
        Self {
            id: GuildId(id),
            available: true,
            permissions: [Permission::VoiceConnect, Permission::ManageChannel]
                .iter()
                .copied()
                .collect(),
        }
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn without(mut self, permission: Permission) -> Self {
        self.permissions.remove(&permission);
        self
    }
}

impl GuildContext for MockGuild {
    fn id(&self) -> GuildId {
        self.id
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn self_has_permission(&self, _channel: &VoiceChannel, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

#[derive(Default)]
struct Recorded {
    updates: Vec<VoiceStateUpdate>,
    cancels: Vec<GuildId>,
}

#[derive(Clone, Default)]
pub struct RecordingUpdater {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingUpdater {
    pub fn updates(&self) -> Vec<VoiceStateUpdate> {
        self.inner.lock().updates.clone()
    }

    pub fn cancels(&self) -> Vec<GuildId> {
        self.inner.lock().cancels.clone()
    }
}

impl VoiceUpdate for RecordingUpdater {
    fn update_voice_state(&self, update: &VoiceStateUpdate) -> JoinResult<()> {
        self.inner.lock().updates.push(*update);
        Ok(())
    }

    fn cancel_pending(&self, guild_id: GuildId) {
        self.inner.lock().cancels.push(guild_id);
    }
}

#[derive(Default)]
struct ConnectionState {
    channel: Option<VoiceChannel>,
    retargets: Vec<VoiceChannel>,
    send_handler: Option<Arc<dyn AudioSendHandler>>,
    receive_handler: Option<Arc<dyn AudioReceiveHandler>>,
    queue_timeout: Option<Duration>,
    auto_reconnect: Option<bool>,
    ready_calls: Vec<Duration>,
    closes: Vec<ConnectionStatus>,
    status: ConnectionStatus,
}

pub struct MockConnection {
    state: Mutex<ConnectionState>,
}

impl MockConnection {
    pub fn new(channel: VoiceChannel) -> Arc<Self> {
        let state = ConnectionState {
            channel: Some(channel),
            status: ConnectionStatus::Connected,
            ..Default::default()
        };

        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn closes(&self) -> Vec<ConnectionStatus> {
        self.state.lock().closes.clone()
    }

    pub fn retargets(&self) -> Vec<VoiceChannel> {
        self.state.lock().retargets.clone()
    }

    pub fn has_send_handler(&self) -> bool {
        self.state.lock().send_handler.is_some()
    }

    pub fn has_receive_handler(&self) -> bool {
        self.state.lock().receive_handler.is_some()
    }

    pub fn queue_timeout(&self) -> Option<Duration> {
        self.state.lock().queue_timeout
    }

    pub fn auto_reconnect(&self) -> Option<bool> {
        self.state.lock().auto_reconnect
    }

    pub fn ready_calls(&self) -> Vec<Duration> {
        self.state.lock().ready_calls.clone()
    }
}

impl AudioConnection for MockConnection {
    fn channel(&self) -> VoiceChannel {
        let state = self.state.lock();
        state
            .channel
            .clone()
            .unwrap_or_else(|| VoiceChannel::new(ChannelId(0), GuildId(0)))
    }

    fn set_channel(&self, channel: VoiceChannel) {
        let mut state = self.state.lock();
        state.retargets.push(channel.clone());
        state.channel = Some(channel);
    }

    fn set_sending_handler(&self, handler: Option<Arc<dyn AudioSendHandler>>) {
        self.state.lock().send_handler = handler;
    }

    fn set_receiving_handler(&self, handler: Option<Arc<dyn AudioReceiveHandler>>) {
        self.state.lock().receive_handler = handler;
    }

    fn set_queue_timeout(&self, timeout: Duration) {
        self.state.lock().queue_timeout = Some(timeout);
    }

    fn set_auto_reconnect(&self, auto_reconnect: bool) {
        self.state.lock().auto_reconnect = Some(auto_reconnect);
    }

    fn ready(&self, timeout: Duration) {
        self.state.lock().ready_calls.push(timeout);
    }

    fn close(&self, reason: ConnectionStatus) {
        let mut state = self.state.lock();
        state.closes.push(reason);
        state.status = reason;
    }

    fn status(&self) -> ConnectionStatus {
        self.state.lock().status
    }
}

pub struct SilentSource;

impl AudioSendHandler for SilentSource {
    fn can_provide(&self) -> bool {
        true
    }

    fn provide_20ms_audio(&self) -> Option<Vec<u8>> {
        Some(vec![0; 3840])
    }
}

pub struct NullSink;

impl AudioReceiveHandler for NullSink {}
