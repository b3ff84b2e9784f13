use crate::{
    connection::{AudioConnection, ConnectionStatus},
    error::{JoinError, JoinResult},
    handler::AudioManager,
    id::GuildId,
    model::VoiceChannel,
    policy::{GuildContext, GuildPolicy},
    shards::{self, Sharder},
    Config,
};
use dashmap::DashMap;
use parking_lot::RwLock as PRwLock;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// A shard-aware struct responsible for managing [`AudioManager`]s.
///
/// This registry lazily creates one manager per guild, routes each guild's
/// voice state updates to the shard serving it, and forwards transport
/// callbacks (new connections, region changes) to the right manager.
///
/// [`AudioManager`]: AudioManager
#[derive(Debug)]
pub struct Skylark {
    managers: DashMap<GuildId, Arc<AudioManager>>,
    sharder: Sharder,
    config: PRwLock<Config>,
}

impl Skylark {
    /// Creates a registry sending gateway messages via `sharder`.
    #[must_use]
    pub fn new(sharder: Sharder) -> Self {
        Self::from_config(sharder, Config::default())
    }

    /// Creates a registry whose managers follow the given configuration.
    #[must_use]
    pub fn from_config(sharder: Sharder, config: Config) -> Self {
        Self {
            managers: DashMap::new(),
            sharder,
            config: PRwLock::new(config),
        }
    }

    /// Returns the source of shard handles used by this registry.
    #[must_use]
    pub fn sharder(&self) -> &Sharder {
        &self.sharder
    }

    /// Retrieves an [`AudioManager`] for the given guild, if one exists.
    ///
    /// [`AudioManager`]: AudioManager
    #[inline]
    pub fn get<G: Into<GuildId>>(&self, guild_id: G) -> Option<Arc<AudioManager>> {
        self.managers
            .get(&guild_id.into())
            .map(|manager| Arc::clone(manager.value()))
    }

    /// Retrieves the [`AudioManager`] for the given guild, creating one if
    /// none exists.
    ///
    /// This will not join any channels, or cause connection state to change.
    ///
    /// # Errors
    ///
    /// Fails with [`JoinError::NoSender`] if no shard serves this guild.
    ///
    /// [`AudioManager`]: AudioManager
    pub fn get_or_insert(&self, guild: Arc<dyn GuildContext>) -> JoinResult<Arc<AudioManager>> {
        let guild_id = guild.id();

        if let Some(manager) = self.get(guild_id) {
            return Ok(manager);
        }

        let shard_id = shards::shard_id(guild_id, self.sharder.shard_count());
        let shard = self.sharder.get_shard(shard_id).ok_or_else(|| {
            warn!(
                "No shard {} for guild {}: is the shard count correct?",
                shard_id, guild_id
            );
            JoinError::NoSender
        })?;

        // Runs the codec bootstrap, which may touch the filesystem: keep it
        // outside the map's shard lock.
        let policy = GuildPolicy::new(guild, shard);

        let manager = self
            .managers
            .entry(guild_id)
            .or_insert_with(|| {
                debug!("Creating audio manager for guild {}.", guild_id);
                let config = self.config.read().clone();

                Arc::new(AudioManager::with_policy(policy, config))
            })
            .clone();

        Ok(manager)
    }

    /// Creates an iterator for all [`AudioManager`]s currently managed.
    ///
    /// [`AudioManager`]: AudioManager
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            inner: self
                .managers
                .iter()
                .map(|x| (*x.key(), Arc::clone(x.value()))),
        }
    }

    /// Sets a shared configuration for all managers created from this
    /// registry.
    ///
    /// Changes made here will apply to new managers only.
    pub fn set_config(&self, new_config: Config) {
        let mut config = self.config.write();
        *config = new_config;
    }

    /// Connects to `channel` via its guild's [`AudioManager`], creating the
    /// manager if required.
    ///
    /// If the guild already has a live connection in another channel, the
    /// connection is moved.
    ///
    /// NOTE: an `Err(..)` value will still create an [`AudioManager`]
    /// accessible via [`get`].
    ///
    /// [`AudioManager`]: AudioManager
    /// [`get`]: Skylark::get
    #[instrument(skip(self, guild))]
    pub fn open(
        &self,
        guild: Arc<dyn GuildContext>,
        channel: VoiceChannel,
    ) -> JoinResult<Arc<AudioManager>> {
        let manager = self.get_or_insert(guild)?;
        manager.open(channel)?;

        Ok(manager)
    }

    /// Retrieves the [`AudioManager`] for the given guild and leaves its
    /// voice channel, if connected.
    ///
    /// The manager is kept, along with its settings.
    ///
    /// # Errors
    ///
    /// Fails with [`JoinError::NoCall`] if the guild has no manager.
    ///
    /// [`AudioManager`]: AudioManager
    #[inline]
    pub fn close<G: Into<GuildId>>(&self, guild_id: G) -> JoinResult<()> {
        self._close(guild_id.into())
    }

    #[instrument(skip(self))]
    fn _close(&self, guild_id: GuildId) -> JoinResult<()> {
        let manager = self.get(guild_id).ok_or(JoinError::NoCall)?;
        manager.close();

        Ok(())
    }

    /// Closes and drops the [`AudioManager`] for the given guild, e.g., once
    /// the local member has left the guild.
    ///
    /// # Errors
    ///
    /// Fails with [`JoinError::NoCall`] if the guild has no manager.
    ///
    /// [`AudioManager`]: AudioManager
    #[inline]
    pub fn remove<G: Into<GuildId>>(&self, guild_id: G) -> JoinResult<()> {
        self._remove(guild_id.into())
    }

    #[instrument(skip(self))]
    fn _remove(&self, guild_id: GuildId) -> JoinResult<()> {
        let (_, manager) = self.managers.remove(&guild_id).ok_or(JoinError::NoCall)?;
        manager.close_with(ConnectionStatus::DisconnectedRemovedFromGuild);

        Ok(())
    }

    /// Hands a connection built by the voice transport to its guild's
    /// [`AudioManager`].
    ///
    /// # Errors
    ///
    /// Fails with [`JoinError::NoCall`] if the guild has no manager, in which
    /// case the connection is closed immediately.
    ///
    /// [`AudioManager`]: AudioManager
    pub fn set_audio_connection<G: Into<GuildId>>(
        &self,
        guild_id: G,
        connection: Arc<dyn AudioConnection>,
    ) -> JoinResult<()> {
        self._set_audio_connection(guild_id.into(), connection)
    }

    #[instrument(skip(self, connection))]
    fn _set_audio_connection(
        &self,
        guild_id: GuildId,
        connection: Arc<dyn AudioConnection>,
    ) -> JoinResult<()> {
        if let Some(manager) = self.get(guild_id) {
            manager.adopt(connection);
            Ok(())
        } else {
            warn!("Received connection for unmanaged guild {}; closing it.", guild_id);
            connection.close(ConnectionStatus::DisconnectedRemovedFromGuild);
            Err(JoinError::NoCall)
        }
    }

    /// Prepares the given guild's connection for a move to a new voice server.
    ///
    /// # Errors
    ///
    /// Fails with [`JoinError::NoCall`] if the guild has no manager.
    #[inline]
    pub fn prepare_for_region_change<G: Into<GuildId>>(&self, guild_id: G) -> JoinResult<()> {
        let manager = self.get(guild_id).ok_or(JoinError::NoCall)?;
        manager.prepare_for_region_change();

        Ok(())
    }
}

impl<'a> IntoIterator for &'a Skylark {
    type Item = <Iter<'a> as Iterator>::Item;

    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

type DashMapIter<'a> = dashmap::iter::Iter<'a, GuildId, Arc<AudioManager>>;

type InnerIter<'a> = std::iter::Map<
    DashMapIter<'a>,
    fn(<DashMapIter<'a> as Iterator>::Item) -> (GuildId, Arc<AudioManager>),
>;

/// An iterator over all [`AudioManager`]s currently stored in the registry.
///
/// [`AudioManager`]: AudioManager
pub struct Iter<'a> {
    inner: InnerIter<'a>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (GuildId, Arc<AudioManager>);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }

    fn count(self) -> usize {
        self.inner.count()
    }

    fn fold<B, F>(self, init: B, f: F) -> B
    where
        Self: Sized,
        F: FnMut(B, Self::Item) -> B,
    {
        self.inner.fold(init, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        handler::CallState,
        id::ChannelId,
        shards::{GenericSharder, VoiceUpdate},
        test_utils::{MockConnection, MockGuild, RecordingUpdater},
    };
    use serde_json::Value;

    struct SingleShard(RecordingUpdater);

    impl GenericSharder for SingleShard {
        fn get_shard(&self, shard_id: u64) -> Option<Arc<dyn VoiceUpdate + Send + Sync>> {
            if shard_id == 0 {
                Some(Arc::new(self.0.clone()))
            } else {
                None
            }
        }
    }

    fn registry(shard_count: u64) -> (Skylark, RecordingUpdater) {
        let updater = RecordingUpdater::default();
        let sharder = Sharder::Generic {
            shard_count,
            source: Arc::new(SingleShard(updater.clone())),
        };

        (Skylark::new(sharder), updater)
    }

    // Construct managers directly, to avoid loading natives in tests.
    fn insert(registry: &Skylark, guild_id: u64, updater: &RecordingUpdater) -> Arc<AudioManager> {
        let policy = GuildPolicy::with_codec(
            Arc::new(MockGuild::new(guild_id)),
            crate::shards::Shard::Generic(Arc::new(updater.clone())),
            crate::test_utils::supported_codec(),
        );
        let manager = Arc::new(AudioManager::with_policy(
            policy,
            registry.config.read().clone(),
        ));
        registry.managers.insert(GuildId(guild_id), manager.clone());

        manager
    }

    fn channel(guild_id: u64, id: u64) -> VoiceChannel {
        VoiceChannel::new(ChannelId(id), GuildId(guild_id))
    }

    #[test]
    fn unknown_guilds_have_no_call() {
        let (registry, _) = registry(1);

        assert!(registry.get(GuildId(1)).is_none());
        assert!(matches!(registry.close(GuildId(1)), Err(JoinError::NoCall)));
        assert!(matches!(registry.remove(GuildId(1)), Err(JoinError::NoCall)));
        assert!(matches!(
            registry.prepare_for_region_change(GuildId(1)),
            Err(JoinError::NoCall)
        ));
    }

    #[test]
    fn connection_for_unknown_guild_is_closed() {
        let (registry, _) = registry(1);
        let conn = MockConnection::new(channel(1, 10));

        let res = registry.set_audio_connection(GuildId(1), conn.clone());

        assert!(matches!(res, Err(JoinError::NoCall)));
        assert_eq!(
            conn.closes(),
            vec![ConnectionStatus::DisconnectedRemovedFromGuild]
        );
    }

    #[test]
    fn callbacks_route_to_guild_manager() {
        let (registry, updater) = registry(1);
        let manager = insert(&registry, 1, &updater);
        let bystander = insert(&registry, 2, &updater);

        manager.open(channel(1, 10)).unwrap();
        let conn = MockConnection::new(channel(1, 10));
        registry.set_audio_connection(GuildId(1), conn.clone()).unwrap();

        assert_eq!(manager.state(), CallState::Connected(channel(1, 10)));
        assert_eq!(bystander.state(), CallState::Idle);

        registry.prepare_for_region_change(GuildId(1)).unwrap();
        assert_eq!(manager.state(), CallState::Queued(channel(1, 10)));
        assert_eq!(conn.closes(), vec![ConnectionStatus::AudioRegionChange]);
    }

    #[test]
    fn remove_closes_and_forgets() {
        let (registry, updater) = registry(1);
        let manager = insert(&registry, 1, &updater);
        let conn = MockConnection::new(channel(1, 10));
        manager.adopt(conn.clone());

        registry.remove(GuildId(1)).unwrap();

        assert!(registry.get(GuildId(1)).is_none());
        assert_eq!(
            conn.closes(),
            vec![ConnectionStatus::DisconnectedRemovedFromGuild]
        );
        assert!(updater
            .updates()
            .iter()
            .any(|update| update.channel_id.is_none()));
    }

    #[test]
    fn close_keeps_manager() {
        let (registry, updater) = registry(1);
        let manager = insert(&registry, 1, &updater);
        manager.open(channel(1, 10)).unwrap();

        registry.close(GuildId(1)).unwrap();

        assert_eq!(manager.state(), CallState::Idle);
        assert!(registry.get(GuildId(1)).is_some());
    }

    #[test]
    fn iter_visits_every_manager() {
        let (registry, updater) = registry(1);
        insert(&registry, 1, &updater);
        insert(&registry, 2, &updater);

        let mut ids: Vec<_> = registry.iter().map(|(id, _)| id).collect();
        ids.sort();

        assert_eq!(ids, vec![GuildId(1), GuildId(2)]);
        assert_eq!((&registry).into_iter().count(), 2);
    }

    #[test]
    fn config_applies_to_later_managers() {
        let (registry, updater) = registry(1);
        let before = insert(&registry, 1, &updater);

        registry.set_config(Config::default().self_deaf(true));
        let after = insert(&registry, 2, &updater);

        assert!(!before.is_self_deafened());
        assert!(after.is_self_deafened());
    }

    #[test]
    fn get_or_insert_creates_once() {
        let registry = Skylark::new(Sharder::with_handles(1));

        let first = registry.get_or_insert(Arc::new(MockGuild::new(1))).unwrap();
        let second = registry.get_or_insert(Arc::new(MockGuild::new(1))).unwrap();

        assert!(crate::codec::global().is_initialised());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.guild_id(), Some(GuildId(1)));
        assert_eq!(registry.iter().count(), 1);
    }

    #[test]
    fn missing_shard_is_no_sender() {
        let (registry, _) = registry(2);
        let guild = Arc::new(MockGuild::new(1 << 22));

        assert!(matches!(
            registry.get_or_insert(guild),
            Err(JoinError::NoSender)
        ));
        assert!(registry.get(GuildId(1 << 22)).is_none());
    }

    #[test]
    fn buffered_shards_flush_on_register() {
        let registry = Skylark::new(Sharder::with_handles(1));
        let manager = Arc::new(AudioManager::with_policy(
            GuildPolicy::with_codec(
                Arc::new(MockGuild::new(1)),
                registry.sharder().get_shard(0).unwrap(),
                crate::test_utils::supported_codec(),
            ),
            Config::default(),
        ));

        manager.open(channel(1, 10)).unwrap();
        manager.open(channel(1, 20)).unwrap();

        let handle = registry.sharder().handle(0).unwrap();
        assert_eq!(handle.pending(), 1);

        let (tx, rx) = flume::unbounded();
        handle.register(tx);

        let sent: Vec<Value> = rx
            .drain()
            .map(|m| serde_json::from_str(&m).unwrap())
            .collect();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["d"]["channel_id"], "20");
    }
}
