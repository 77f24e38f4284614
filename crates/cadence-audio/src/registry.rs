//! One playback engine per voice session.

use std::sync::Arc;

use cadence_core::{PlaybackQueue, PlayerConfig, SessionId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::decoder::DecoderCommand;
use crate::engine::{PlaybackEngine, PlaybackState};

/// Concurrent map from session to its engine.
pub struct PlayerRegistry {
    engines: DashMap<SessionId, Arc<PlaybackEngine>>,
    config: PlayerConfig,
    decoder: DecoderCommand,
}

impl PlayerRegistry {
    pub fn new(config: PlayerConfig) -> Self {
        let decoder = DecoderCommand::from_config(&config);
        Self::with_decoder(config, decoder)
    }

    pub fn with_decoder(config: PlayerConfig, decoder: DecoderCommand) -> Self {
        Self {
            engines: DashMap::new(),
            config,
            decoder,
        }
    }

    pub const fn config(&self) -> &PlayerConfig {
        &self.config
    }

    fn spawn_engine(&self, session: SessionId) -> Arc<PlaybackEngine> {
        info!("Creating player for session {session}");
        let queue = Arc::new(PlaybackQueue::with_max_size(self.config.max_queue_size));
        Arc::new(PlaybackEngine::with_decoder(
            queue,
            &self.config,
            self.decoder.clone(),
        ))
    }

    /// Engine for `session`, created on first use.
    ///
    /// A killed engine is replaced by a fresh one. Must be called within a
    /// Tokio runtime.
    pub fn get_or_create(&self, session: SessionId) -> Arc<PlaybackEngine> {
        match self.engines.entry(session) {
            Entry::Occupied(mut entry) => {
                if entry.get().state() == PlaybackState::Killed {
                    debug!("Replacing killed player for session {session}");
                    entry.insert(self.spawn_engine(session));
                }
                Arc::clone(entry.get())
            }
            Entry::Vacant(entry) => Arc::clone(entry.insert(self.spawn_engine(session)).value()),
        }
    }

    pub fn get(&self, session: SessionId) -> Option<Arc<PlaybackEngine>> {
        self.engines.get(&session).map(|entry| Arc::clone(entry.value()))
    }

    /// Kill and forget the engine for `session`.
    pub fn remove(&self, session: SessionId) -> Option<Arc<PlaybackEngine>> {
        let (_, engine) = self.engines.remove(&session)?;
        engine.kill();
        info!("Removed player for session {session}");
        Some(engine)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Sessions with an engine, in ascending order.
    pub fn sessions(&self) -> Vec<SessionId> {
        let mut sessions: Vec<_> = self.engines.iter().map(|entry| *entry.key()).collect();
        sessions.sort_unstable();
        sessions
    }

    /// Kill every engine and empty the registry.
    pub fn shutdown_all(&self) {
        let count = self.engines.len();
        self.engines.retain(|_, engine| {
            engine.kill();
            false
        });
        info!("Shut down {count} players");
    }
}
