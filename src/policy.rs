//! Rules deciding whether an audio manager may join a channel, and where
//! its voice state updates go.

use crate::{
    codec::{self, CodecBootstrap},
    error::{JoinError, JoinResult},
    id::GuildId,
    model::{Permission, VoiceChannel, VoiceStateUpdate},
    shards::{Shard, VoiceUpdate},
};
use derivative::Derivative;
use std::sync::Arc;
use tracing::{debug, warn};

/// The guild an audio manager belongs to, as seen by the local member.
///
/// Implemented by the entity cache of whichever gateway library is in use.
pub trait GuildContext: Send + Sync {
    /// ID of this guild.
    fn id(&self) -> GuildId;

    /// Returns whether this guild is currently reachable.
    fn is_available(&self) -> bool;

    /// Returns whether the local member holds `permission` in `channel`.
    fn self_has_permission(&self, channel: &VoiceChannel, permission: Permission) -> bool;
}

/// Guild-specific behaviour of an [`AudioManager`].
///
/// Methods may be called while the manager holds its lock, and must not
/// call back into the manager.
///
/// [`AudioManager`]: crate::AudioManager
pub trait VoicePolicy: Send + Sync {
    /// Guild owning the manager, if any.
    fn guild_id(&self) -> Option<GuildId>;

    /// Checks that the local member may join `channel`.
    fn preflight(&self, channel: &VoiceChannel) -> JoinResult<()>;

    /// Announces a new voice state to the gateway.
    ///
    /// Failures are logged rather than returned: gateway messages are
    /// fire-and-forget.
    fn send_voice_state(&self, update: &VoiceStateUpdate);

    /// Withdraws any announcement for `guild_id` not yet sent to the gateway.
    fn cancel_pending(&self, guild_id: GuildId);
}

/// Policy for managers with no guild or gateway, e.g., when voice state is
/// negotiated entirely by a separate process.
///
/// Every channel may be joined, and nothing is ever sent.
#[derive(Clone, Copy, Debug, Default)]
pub struct Headless;

impl VoicePolicy for Headless {
    fn guild_id(&self) -> Option<GuildId> {
        None
    }

    fn preflight(&self, _channel: &VoiceChannel) -> JoinResult<()> {
        Ok(())
    }

    fn send_voice_state(&self, update: &VoiceStateUpdate) {
        debug!("Headless manager discarding voice state {:?}.", update);
    }

    fn cancel_pending(&self, _guild_id: GuildId) {}
}

/// Policy for managers owned by a guild, which check the local member's
/// permissions and send voice state updates over that guild's shard.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct GuildPolicy {
    #[derivative(Debug = "ignore")]
    guild: Arc<dyn GuildContext>,
    guild_id: GuildId,
    shard: Shard,
    codec: &'static CodecBootstrap,
}

impl GuildPolicy {
    /// Creates a policy for `guild`, whose updates are sent via `shard`.
    ///
    /// This triggers the process-wide codec bootstrap if it has not yet run.
    pub fn new(guild: Arc<dyn GuildContext>, shard: Shard) -> Self {
        let codec = codec::global();
        codec.ensure_initialised();

        Self::with_codec(guild, shard, codec)
    }

    /// Creates a policy consulting an explicit codec bootstrap.
    pub fn with_codec(
        guild: Arc<dyn GuildContext>,
        shard: Shard,
        codec: &'static CodecBootstrap,
    ) -> Self {
        let guild_id = guild.id();

        Self {
            guild,
            guild_id,
            shard,
            codec,
        }
    }

    /// Returns the guild this policy checks against.
    #[must_use]
    pub fn guild(&self) -> &Arc<dyn GuildContext> {
        &self.guild
    }

    /// Returns the shard this policy sends updates over.
    #[must_use]
    pub fn shard(&self) -> &Shard {
        &self.shard
    }
}

impl VoicePolicy for GuildPolicy {
    fn guild_id(&self) -> Option<GuildId> {
        Some(self.guild_id)
    }

    fn preflight(&self, channel: &VoiceChannel) -> JoinResult<()> {
        if !self.codec.ensure_initialised() {
            return Err(JoinError::AudioUnsupported);
        }

        if channel.guild_id != self.guild_id {
            return Err(JoinError::WrongGuild {
                expected: self.guild_id,
                found: channel.guild_id,
            });
        }

        if !self.guild.is_available() {
            return Err(JoinError::GuildUnavailable(self.guild_id));
        }

        if !self
            .guild
            .self_has_permission(channel, Permission::VoiceConnect)
        {
            return Err(JoinError::MissingPermission(Permission::VoiceConnect));
        }

        if channel.is_full()
            && !self
                .guild
                .self_has_permission(channel, Permission::ManageChannel)
        {
            return Err(JoinError::ChannelFull {
                channel: channel.id,
                limit: channel.user_limit,
            });
        }

        Ok(())
    }

    fn send_voice_state(&self, update: &VoiceStateUpdate) {
        if let Err(e) = self.shard.update_voice_state(update) {
            warn!(
                "Failed to send voice state for guild {}: {}",
                self.guild_id, e
            );
        }
    }

    fn cancel_pending(&self, guild_id: GuildId) {
        self.shard.cancel_pending(guild_id);
    }
}
