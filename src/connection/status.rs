use std::fmt;

/// Status of a voice connection, as reported by its transport.
///
/// Managers forward these to their [`ConnectionListener`], and also pass
/// them to [`AudioConnection::close`] as the reason for a teardown.
///
/// [`ConnectionListener`]: super::ConnectionListener
/// [`AudioConnection::close`]: super::AudioConnection::close
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// No connection exists, nor is one being attempted.
    NotConnected,
    /// The connection is being torn down on request.
    ShuttingDown,
    /// Waiting on the gateway to hand out a voice server endpoint.
    ConnectingAwaitingEndpoint,
    /// Opening the websocket to the voice server.
    ConnectingAwaitingWebsocketConnect,
    /// Waiting on the voice server to accept our session.
    ConnectingAwaitingAuthentication,
    /// Waiting on the voice server's UDP discovery details.
    ConnectingAwaitingUdpDiscovery,
    /// Performing IP discovery over UDP.
    ConnectingAttemptingUdpDiscovery,
    /// Waiting on the voice server to confirm the session is ready.
    ConnectingAwaitingReady,
    /// Audio may be sent and received.
    Connected,
    /// The local member lost permission to remain in the channel.
    DisconnectedLostPermission,
    /// The channel was deleted.
    DisconnectedChannelDeleted,
    /// The local member was removed from the guild.
    DisconnectedRemovedFromGuild,
    /// The local member was kicked from the channel.
    DisconnectedKickedFromChannel,
    /// The local member was removed from the channel while reconnecting.
    DisconnectedRemovedDuringReconnect,
    /// The voice server rejected our session credentials.
    DisconnectedAuthenticationFailure,
    /// The voice server region changed; the session is being rebuilt.
    AudioRegionChange,
    /// The connection to the voice server was lost.
    ErrorLostConnection,
    /// A lost connection could not be resumed.
    ErrorCannotResume,
    /// The websocket to the voice server could not be opened.
    ErrorWebsocketUnableToConnect,
    /// The voice server offered no encryption mode we support.
    ErrorUnsupportedEncryptionModes,
    /// The UDP socket could not reach the voice server.
    ErrorUdpUnableToConnect,
    /// The connection did not become ready in time.
    ErrorConnectionTimeout,
    /// The connection attempt failed for another reason.
    ErrorConnectionFailed,
}

impl ConnectionStatus {
    /// Returns whether this status describes a transport failure.
    #[must_use]
    pub fn is_error(self) -> bool {
        use ConnectionStatus::*;

        matches!(
            self,
            ErrorLostConnection
                | ErrorCannotResume
                | ErrorWebsocketUnableToConnect
                | ErrorUnsupportedEncryptionModes
                | ErrorUdpUnableToConnect
                | ErrorConnectionTimeout
                | ErrorConnectionFailed
        )
    }

    /// Returns whether this status is one of the connection set-up phases.
    #[must_use]
    pub fn is_connecting(self) -> bool {
        use ConnectionStatus::*;

        matches!(
            self,
            ConnectingAwaitingEndpoint
                | ConnectingAwaitingWebsocketConnect
                | ConnectingAwaitingAuthentication
                | ConnectingAwaitingUdpDiscovery
                | ConnectingAttemptingUdpDiscovery
                | ConnectingAwaitingReady
        )
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        ConnectionStatus::NotConnected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConnectionStatus::*;

        let name = match self {
            NotConnected => "NOT_CONNECTED",
            ShuttingDown => "SHUTTING_DOWN",
            ConnectingAwaitingEndpoint => "CONNECTING_AWAITING_ENDPOINT",
            ConnectingAwaitingWebsocketConnect => "CONNECTING_AWAITING_WEBSOCKET_CONNECT",
            ConnectingAwaitingAuthentication => "CONNECTING_AWAITING_AUTHENTICATION",
            ConnectingAwaitingUdpDiscovery => "CONNECTING_AWAITING_UDP_DISCOVERY",
            ConnectingAttemptingUdpDiscovery => "CONNECTING_ATTEMPTING_UDP_DISCOVERY",
            ConnectingAwaitingReady => "CONNECTING_AWAITING_READY",
            Connected => "CONNECTED",
            DisconnectedLostPermission => "DISCONNECTED_LOST_PERMISSION",
            DisconnectedChannelDeleted => "DISCONNECTED_CHANNEL_DELETED",
            DisconnectedRemovedFromGuild => "DISCONNECTED_REMOVED_FROM_GUILD",
            DisconnectedKickedFromChannel => "DISCONNECTED_KICKED_FROM_CHANNEL",
            DisconnectedRemovedDuringReconnect => "DISCONNECTED_REMOVED_DURING_RECONNECT",
            DisconnectedAuthenticationFailure => "DISCONNECTED_AUTHENTICATION_FAILURE",
            AudioRegionChange => "AUDIO_REGION_CHANGE",
            ErrorLostConnection => "ERROR_LOST_CONNECTION",
            ErrorCannotResume => "ERROR_CANNOT_RESUME",
            ErrorWebsocketUnableToConnect => "ERROR_WEBSOCKET_UNABLE_TO_CONNECT",
            ErrorUnsupportedEncryptionModes => "ERROR_UNSUPPORTED_ENCRYPTION_MODES",
            ErrorUdpUnableToConnect => "ERROR_UDP_UNABLE_TO_CONNECT",
            ErrorConnectionTimeout => "ERROR_CONNECTION_TIMEOUT",
            ErrorConnectionFailed => "ERROR_CONNECTION_FAILED",
        };

        f.write_str(name)
    }
}
