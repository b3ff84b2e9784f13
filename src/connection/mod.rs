//! Interfaces between audio managers and the voice transport.
//!
//! Skylark never builds voice connections itself. A transport (websocket,
//! UDP, encryption and encoding) creates an [`AudioConnection`] once the
//! gateway has handed out a voice server, and passes it to
//! [`AudioManager::adopt`]. From then on the manager only retargets,
//! configures, and closes that handle.
//!
//! [`AudioManager::adopt`]: crate::AudioManager::adopt

mod listener;
mod ready;
mod status;

pub use self::{
    listener::{ConnectionListener, ListenerProxy},
    ready::{ReadyGate, ReadySignal},
    status::ConnectionStatus,
};

use crate::{id::UserId, model::VoiceChannel};
use std::{sync::Arc, time::Duration};

/// Source of outbound audio for a voice connection.
pub trait AudioSendHandler: Send + Sync {
    /// Returns whether a frame is available right now.
    fn can_provide(&self) -> bool;

    /// Produces the next 20ms of audio, either as 48kHz stereo 16-bit PCM
    /// or, if [`is_opus`] is set, as a single Opus packet.
    ///
    /// [`is_opus`]: AudioSendHandler::is_opus
    fn provide_20ms_audio(&self) -> Option<Vec<u8>>;

    /// Returns whether frames are already Opus-encoded.
    fn is_opus(&self) -> bool {
        false
    }
}

/// Sink for inbound audio from a voice connection.
pub trait AudioReceiveHandler: Send + Sync {
    /// Returns whether this handler wants audio mixed across all users.
    fn can_receive_combined(&self) -> bool {
        false
    }

    /// Returns whether this handler wants audio split out per user.
    fn can_receive_user(&self) -> bool {
        false
    }

    /// Handles 20ms of mixed 48kHz stereo PCM.
    fn handle_combined_audio(&self, _pcm: &[i16]) {}

    /// Handles 20ms of 48kHz stereo PCM from a single user.
    fn handle_user_audio(&self, _user: UserId, _pcm: &[i16]) {}
}

/// An established audio session with a voice server.
///
/// Implementations are provided by the voice transport, and must be safe to
/// call from any thread. Managers call into a handle while holding their own
/// lock, so no method except [`close`] may call back into the owning
/// [`AudioManager`]. `close` is called once the lock is released, and may
/// report the teardown to listeners synchronously.
///
/// [`close`]: AudioConnection::close
///
/// [`AudioManager`]: crate::AudioManager
pub trait AudioConnection: Send + Sync {
    /// Returns the channel this session is (or is moving to be) connected to.
    fn channel(&self) -> VoiceChannel;

    /// Moves this session to another channel in the same guild.
    fn set_channel(&self, channel: VoiceChannel);

    /// Installs (or clears) the source of outbound audio.
    fn set_sending_handler(&self, handler: Option<Arc<dyn AudioSendHandler>>);

    /// Installs (or clears) the sink for inbound audio.
    fn set_receiving_handler(&self, handler: Option<Arc<dyn AudioReceiveHandler>>);

    /// Sets how long the outbound packet queue may block.
    fn set_queue_timeout(&self, timeout: Duration);

    /// Sets whether this session reconnects by itself after a recoverable failure.
    fn set_auto_reconnect(&self, auto_reconnect: bool);

    /// Waits up to `timeout` for the session to finish its handshake.
    ///
    /// Failure is reported as a status change (e.g.,
    /// [`ConnectionStatus::ErrorConnectionTimeout`]), never as a panic.
    /// See [`ReadyGate`] for a ready-made implementation.
    fn ready(&self, timeout: Duration);

    /// Begins tearing down this session for the given reason.
    ///
    /// This returns once teardown has started.
    fn close(&self, reason: ConnectionStatus);

    /// Returns this session's current status.
    fn status(&self) -> ConnectionStatus;
}
