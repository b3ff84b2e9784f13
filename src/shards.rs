//! Handlers for sending voice state updates over sharded gateway connections.

use crate::{
    error::{JoinError, JoinResult},
    id::GuildId,
    model::VoiceStateUpdate,
};
use derivative::Derivative;
use flume::Sender;
use parking_lot::{lock_api::RwLockWriteGuard, Mutex as PMutex, RwLock as PRwLock};
use std::sync::Arc;
use tracing::{debug, error};

/// Trait for a generic shard handle to send voice state updates to Discord.
///
/// This allows any gateway library to be integrated with Skylark. Only
/// voice state updates are ever sent.
///
/// Updates are sent while an [`AudioManager`] holds its internal lock:
/// implementations must not call back into that manager.
///
/// [`AudioManager`]: crate::AudioManager
pub trait VoiceUpdate {
    /// Send a voice update message to the inner shard handle.
    fn update_voice_state(&self, update: &VoiceStateUpdate) -> JoinResult<()>;

    /// Discard any update for `guild_id` which has not yet reached the gateway.
    fn cancel_pending(&self, _guild_id: GuildId) {}
}

/// Trait for a generic shard cluster or other handle source.
pub trait GenericSharder {
    /// Get access to a new shard
    fn get_shard(&self, shard_id: u64) -> Option<Arc<dyn VoiceUpdate + Send + Sync>>;
}

#[derive(Derivative, Clone)]
#[derivative(Debug)]
#[non_exhaustive]
/// Source of individual shard connection handles.
pub enum Sharder {
    /// A fixed set of buffering shard handles, indexed by shard id.
    Handles(Arc<[Arc<ShardHandle>]>),
    /// A generic shard handle source.
    Generic {
        /// Number of shards served by this source.
        shard_count: u64,
        /// The handle source.
        #[derivative(Debug = "ignore")]
        source: Arc<dyn GenericSharder + Send + Sync>,
    },
}

impl Sharder {
    /// Creates `shard_count` unregistered [`ShardHandle`]s.
    #[must_use]
    pub fn with_handles(shard_count: u64) -> Self {
        let handles: Vec<_> = (0..shard_count.max(1))
            .map(|_| Arc::new(ShardHandle::default()))
            .collect();

        Sharder::Handles(handles.into())
    }

    /// Total number of shards.
    #[must_use]
    pub fn shard_count(&self) -> u64 {
        match self {
            Sharder::Handles(h) => h.len() as u64,
            Sharder::Generic { shard_count, .. } => *shard_count,
        }
    }

    /// Returns a new handle to the required inner shard.
    #[must_use]
    pub fn get_shard(&self, shard_id: u64) -> Option<Shard> {
        match self {
            Sharder::Handles(h) => h.get(shard_id as usize).cloned().map(Shard::Handle),
            Sharder::Generic { source, .. } => source.get_shard(shard_id).map(Shard::Generic),
        }
    }

    /// Returns the buffering handle for `shard_id`, so that a gateway
    /// connection can be registered with it.
    #[must_use]
    pub fn handle(&self, shard_id: u64) -> Option<Arc<ShardHandle>> {
        match self {
            Sharder::Handles(h) => h.get(shard_id as usize).cloned(),
            Sharder::Generic { .. } => None,
        }
    }
}

#[derive(Derivative, Clone)]
#[derivative(Debug)]
#[non_exhaustive]
/// A reference to an individual websocket connection.
pub enum Shard {
    /// Handle to a buffering shard, fed into a gateway via a channel.
    Handle(Arc<ShardHandle>),
    /// Handle to a generic shard instance.
    Generic(#[derivative(Debug = "ignore")] Arc<dyn VoiceUpdate + Send + Sync>),
}

impl VoiceUpdate for Shard {
    fn update_voice_state(&self, update: &VoiceStateUpdate) -> JoinResult<()> {
        match self {
            Shard::Handle(handle) => handle.send(*update),
            Shard::Generic(g) => g.update_voice_state(update),
        }
    }

    fn cancel_pending(&self, guild_id: GuildId) {
        match self {
            Shard::Handle(handle) => handle.cancel(guild_id),
            Shard::Generic(g) => g.cancel_pending(guild_id),
        }
    }
}

/// Handle to an individual shard designed to buffer unsent messages while
/// a reconnect/rebalance is ongoing.
///
/// At most one update is buffered per guild: a newer update for the same
/// guild replaces the older one, and keeps its place in the queue.
#[derive(Debug, Default)]
pub struct ShardHandle {
    sender: PRwLock<Option<Sender<String>>>,
    queue: PMutex<Vec<VoiceStateUpdate>>,
}

impl ShardHandle {
    /// Attaches the gateway's outbound message channel, and flushes any
    /// buffered updates into it.
    ///
    /// Each message is a complete gateway payload, serialised as JSON.
    pub fn register(&self, sender: Sender<String>) {
        debug!("Adding shard handle send channel...");

        let mut sender_lock = self.sender.write();
        *sender_lock = Some(sender);

        debug!("Added shard handle send channel.");

        let sender_lock = RwLockWriteGuard::downgrade(sender_lock);
        let mut messages_lock = self.queue.lock();

        debug!("Clearing queued messages...");

        if let Some(sender) = &*sender_lock {
            let mut i = 0;
            for update in messages_lock.drain(..) {
                let msg = match update.to_payload_string() {
                    Ok(msg) => msg,
                    Err(e) => {
                        error!("Dropping unserialisable voice state {:?}: {:?}", update, e);
                        continue;
                    },
                };

                if let Err(e) = sender.send(msg) {
                    error!("Error while clearing gateway message queue: {:?}", e);
                    break;
                }

                i += 1;
            }

            if i > 0 {
                debug!("{} buffered messages sent to gateway.", i);
            }
        }

        debug!("Cleared queued messages.");
    }

    /// Detaches the gateway's outbound message channel; later updates are buffered.
    pub fn deregister(&self) {
        debug!("Removing shard handle send channel...");

        let mut sender_lock = self.sender.write();
        *sender_lock = None;

        debug!("Removed shard handle send channel.");
    }

    /// Returns whether a gateway channel is attached.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.sender.read().is_some()
    }

    /// Returns the number of buffered updates.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    fn send(&self, update: VoiceStateUpdate) -> JoinResult<()> {
        let sender_lock = self.sender.read();
        if let Some(sender) = &*sender_lock {
            let msg = update.to_payload_string()?;
            sender.send(msg).map_err(|_| JoinError::Dropped)
        } else {
            debug!("Shard temporarily disconnected: buffering message...");
            let mut messages_lock = self.queue.lock();

            if let Some(slot) = messages_lock
                .iter_mut()
                .find(|queued| queued.guild_id == update.guild_id)
            {
                *slot = update;
            } else {
                messages_lock.push(update);
            }

            debug!("Buffered message.");
            Ok(())
        }
    }

    fn cancel(&self, guild_id: GuildId) {
        let mut messages_lock = self.queue.lock();
        let before = messages_lock.len();
        messages_lock.retain(|queued| queued.guild_id != guild_id);

        if messages_lock.len() != before {
            debug!("Discarded buffered voice state for guild {}.", guild_id);
        }
    }
}

#[inline]
pub(crate) fn shard_id(guild_id: GuildId, shard_count: u64) -> u64 {
    (guild_id.get() >> crate::constants::SNOWFLAKE_SHARD_SHIFT) % shard_count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ChannelId;
    use serde_json::Value;

    fn join(guild: u64, channel: u64) -> VoiceStateUpdate {
        VoiceStateUpdate::connect(GuildId(guild), ChannelId(channel), false, false)
    }

    #[test]
    fn registered_handle_forwards_json() {
        let handle = ShardHandle::default();
        let (tx, rx) = flume::unbounded();
        handle.register(tx);

        handle.send(join(1, 2)).unwrap();

        let msg: Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(msg["op"], 4);
        assert_eq!(msg["d"]["channel_id"], "2");
    }

    #[test]
    fn buffered_updates_coalesce_per_guild() {
        let handle = ShardHandle::default();

        handle.send(join(1, 2)).unwrap();
        handle.send(join(3, 4)).unwrap();
        handle.send(join(1, 5)).unwrap();
        assert_eq!(handle.pending(), 2);

        let (tx, rx) = flume::unbounded();
        handle.register(tx);

        let sent: Vec<Value> = rx
            .drain()
            .map(|m| serde_json::from_str(&m).unwrap())
            .collect();

        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0]["d"]["guild_id"], "1");
        assert_eq!(sent[0]["d"]["channel_id"], "5");
        assert_eq!(sent[1]["d"]["guild_id"], "3");
        assert_eq!(handle.pending(), 0);
    }

    #[test]
    fn cancel_discards_only_that_guild() {
        let handle = ShardHandle::default();

        handle.send(join(1, 2)).unwrap();
        handle.send(join(3, 4)).unwrap();
        handle.cancel(GuildId(1));

        assert_eq!(handle.pending(), 1);
    }

    #[test]
    fn hung_up_gateway_is_reported() {
        let handle = ShardHandle::default();
        let (tx, rx) = flume::unbounded();
        handle.register(tx);
        drop(rx);

        assert!(matches!(handle.send(join(1, 2)), Err(JoinError::Dropped)));
    }

    #[test]
    fn deregistered_handle_buffers_again() {
        let handle = ShardHandle::default();
        let (tx, _rx) = flume::unbounded();
        handle.register(tx);
        handle.deregister();

        assert!(!handle.is_registered());
        handle.send(join(1, 2)).unwrap();
        assert_eq!(handle.pending(), 1);
    }

    #[tokio::test]
    async fn gateway_task_drains_asynchronously() {
        let sharder = Sharder::with_handles(2);
        let (tx, rx) = flume::unbounded();
        sharder.handle(1).unwrap().register(tx);

        let reader = tokio::spawn(async move { rx.recv_async().await.unwrap() });

        let shard = sharder.get_shard(1).unwrap();
        shard.update_voice_state(&join(9, 10)).unwrap();

        let msg: Value = serde_json::from_str(&reader.await.unwrap()).unwrap();
        assert_eq!(msg["d"]["guild_id"], "9");
    }

    #[test]
    fn guilds_route_by_snowflake_timestamp() {
        let guild = GuildId((7 << 22) | 12345);
        assert_eq!(shard_id(guild, 4), 3);
        assert_eq!(shard_id(guild, 1), 0);
    }
}
