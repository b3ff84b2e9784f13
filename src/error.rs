//! Manager and gateway error handling.

use crate::{
    id::{ChannelId, GuildId},
    model::Permission,
};
use serde_json::Error as JsonError;
use std::{error::Error, fmt};

pub use crate::codec::CodecError;

#[derive(Debug)]
#[non_exhaustive]
/// Error returned when an audio manager refuses a connection request, or
/// is unable to send messages over the gateway.
pub enum JoinError {
    /// The native audio codec could not be loaded, so audio is disabled
    /// for the lifetime of this process.
    AudioUnsupported,
    /// The requested channel belongs to a different guild than the manager.
    WrongGuild {
        /// Guild owning the manager.
        expected: GuildId,
        /// Guild owning the requested channel.
        found: GuildId,
    },
    /// The manager's guild is currently unavailable (i.e., mid-outage).
    GuildUnavailable(GuildId),
    /// The local member lacks a permission required to join the channel.
    MissingPermission(Permission),
    /// The channel's user limit has been reached, and the local member
    /// cannot bypass it.
    ///
    /// Bypassing a user limit requires [`Permission::ManageChannel`].
    ChannelFull {
        /// The full channel.
        channel: ChannelId,
        /// The channel's user limit.
        limit: u32,
    },
    /// No available gateway connection was provided to send
    /// voice state update messages.
    NoSender,
    /// The gateway hung up the receiving end of its message channel.
    Dropped,
    /// Tried to act on a guild with no audio manager.
    NoCall,
    /// A voice state update could not be serialised.
    Json(JsonError),
}

impl JoinError {
    /// Indicates whether this is an open-time policy failure, which leaves
    /// manager state untouched and may succeed if retried after the
    /// guild or member state changes.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            JoinError::AudioUnsupported
                | JoinError::WrongGuild { .. }
                | JoinError::GuildUnavailable(_)
                | JoinError::MissingPermission(_)
                | JoinError::ChannelFull { .. }
        )
    }
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Failed to join voice channel: ")?;
        match self {
            JoinError::AudioUnsupported =>
                write!(f, "audio is disabled, as the native codec failed to load."),
            JoinError::WrongGuild { expected, found } => write!(
                f,
                "channel belongs to guild {}, not this manager's guild {}.",
                found, expected
            ),
            JoinError::GuildUnavailable(g) => write!(f, "guild {} is unavailable.", g),
            JoinError::MissingPermission(p) => write!(f, "missing permission {}.", p),
            JoinError::ChannelFull { channel, limit } => write!(
                f,
                "channel {} is at its user limit of {} (bypassing requires {}).",
                channel,
                limit,
                Permission::ManageChannel
            ),
            JoinError::NoSender => write!(f, "no gateway destination."),
            JoinError::Dropped => write!(f, "gateway message channel was closed."),
            JoinError::NoCall => write!(f, "no audio manager exists for this guild."),
            JoinError::Json(e) => write!(f, "could not serialise voice state ({}).", e),
        }
    }
}

impl Error for JoinError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            JoinError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<JsonError> for JoinError {
    fn from(e: JsonError) -> Self {
        JoinError::Json(e)
    }
}

/// Convenience type for voice connection error handling.
pub type JoinResult<T> = Result<T, JoinError>;
