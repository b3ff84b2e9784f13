//! Guild-side entities consumed by the manager, and the gateway payloads it emits.

use crate::{
    constants::VOICE_STATE_UPDATE_OPCODE,
    id::{ChannelId, GuildId},
};
use serde::Serialize;
use std::fmt;

/// A snapshot of a joinable voice channel.
///
/// Two snapshots refer to the same channel when their [`id`]s match; the
/// remaining fields are only used by permission checks.
///
/// [`id`]: VoiceChannel::id
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub struct VoiceChannel {
    /// ID of this channel.
    pub id: ChannelId,
    /// ID of the guild owning this channel.
    pub guild_id: GuildId,
    /// Maximum number of connected members, or `0` if unlimited.
    pub user_limit: u32,
    /// Number of members currently connected.
    pub connected_members: usize,
}

impl VoiceChannel {
    /// Creates an unlimited, empty channel snapshot.
    pub fn new<C, G>(id: C, guild_id: G) -> Self
    where
        C: Into<ChannelId>,
        G: Into<GuildId>,
    {
        Self {
            id: id.into(),
            guild_id: guild_id.into(),
            user_limit: 0,
            connected_members: 0,
        }
    }

    /// Sets this channel's user limit.
    #[must_use]
    pub fn user_limit(mut self, user_limit: u32) -> Self {
        self.user_limit = user_limit;
        self
    }

    /// Sets the number of members currently in this channel.
    #[must_use]
    pub fn connected_members(mut self, connected_members: usize) -> Self {
        self.connected_members = connected_members;
        self
    }

    /// Returns whether a user limit is set and has been reached.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.user_limit > 0 && self.user_limit as usize <= self.connected_members
    }
}

/// Channel permissions relevant to joining voice.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Permission {
    /// Allows joining a voice channel.
    VoiceConnect,
    /// Allows managing a channel, which also bypasses its user limit.
    ManageChannel,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::VoiceConnect => write!(f, "VOICE_CONNECT"),
            Permission::ManageChannel => write!(f, "MANAGE_CHANNEL"),
        }
    }
}

/// Outbound voice state update, used to join, move between, and leave voice channels.
///
/// A `channel_id` of `None` asks the gateway to disconnect this guild's session.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
pub struct VoiceStateUpdate {
    /// Guild whose voice state is changing.
    pub guild_id: GuildId,
    /// Target channel, or `None` to disconnect.
    pub channel_id: Option<ChannelId>,
    /// Whether the local user is self-muted.
    pub self_mute: bool,
    /// Whether the local user is self-deafened.
    pub self_deaf: bool,
}

#[derive(Serialize)]
struct GatewayPayload<'a, T> {
    op: u8,
    d: &'a T,
}

impl VoiceStateUpdate {
    /// Creates an update requesting a connection to (or a move into) `channel_id`.
    #[must_use]
    pub fn connect(
        guild_id: GuildId,
        channel_id: ChannelId,
        self_mute: bool,
        self_deaf: bool,
    ) -> Self {
        Self {
            guild_id,
            channel_id: Some(channel_id),
            self_mute,
            self_deaf,
        }
    }

    /// Creates an update announcing that this guild's voice session should end.
    #[must_use]
    pub fn disconnect(guild_id: GuildId, self_mute: bool, self_deaf: bool) -> Self {
        Self {
            guild_id,
            channel_id: None,
            self_mute,
            self_deaf,
        }
    }

    /// Wraps this update in its gateway envelope.
    pub fn to_payload(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(GatewayPayload {
            op: VOICE_STATE_UPDATE_OPCODE,
            d: self,
        })
    }

    /// Wraps this update in its gateway envelope, as text ready for the socket.
    pub fn to_payload_string(&self) -> serde_json::Result<String> {
        serde_json::to_string(&GatewayPayload {
            op: VOICE_STATE_UPDATE_OPCODE,
            d: self,
        })
    }
}
