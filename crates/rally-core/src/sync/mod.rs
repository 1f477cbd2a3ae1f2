//! Local-first synchronization
//!
//! Every device holds a full replica in SQLite and reconciles it against one
//! authoritative remote store. Reads and writes always hit the replica; the
//! [`SyncEngine`] runs push-then-pull cycles per entity type in the
//! background, resolving conflicts last-write-wins and tracking per-entity
//! pull watermarks so each cycle only fetches what changed.

mod adapter;
mod conflict;
mod connectivity;
mod engine;
mod remote;
#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{EntitySyncAdapter, SyncAdapter};
pub use conflict::{resolve, Resolution};
pub use connectivity::{Connectivity, ConnectivitySignal};
pub use engine::SyncEngine;
pub use remote::{HttpRemoteStore, RemoteStore};

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::db::{
    keys, Database, SqliteGameRepository, SqliteMatchRepository, SqliteMetadataStore,
    SqlitePlayerRepository,
};
use crate::error::Result;
use crate::identity::DeviceIdentity;
use crate::models::{GameResult, Match, Player};

/// Build an engine with the standard adapters, one per entity type, all
/// sharing the given database and remote store.
pub fn build_engine(
    db: &Arc<Database>,
    remote: Arc<dyn RemoteStore>,
    connectivity: Arc<dyn Connectivity>,
    config: &EngineConfig,
) -> Result<SyncEngine> {
    let meta = Arc::new(SqliteMetadataStore::new(db.clone()));
    let device = DeviceIdentity::load_or_create(meta.as_ref())?;

    let players: EntitySyncAdapter<Player> = EntitySyncAdapter::new(
        "players",
        keys::LAST_PLAYER_SYNC,
        Arc::new(SqlitePlayerRepository::new(db.clone())),
        remote.clone(),
        meta.clone(),
        device.clone(),
        config.page_size,
    );
    let matches: EntitySyncAdapter<Match> = EntitySyncAdapter::new(
        "matches",
        keys::LAST_MATCH_SYNC,
        Arc::new(SqliteMatchRepository::new(db.clone())),
        remote.clone(),
        meta.clone(),
        device.clone(),
        config.page_size,
    );
    let games: EntitySyncAdapter<GameResult> = EntitySyncAdapter::new(
        "games",
        keys::LAST_GAME_SYNC,
        Arc::new(SqliteGameRepository::new(db.clone())),
        remote,
        meta.clone(),
        device,
        config.page_size,
    );

    Ok(SyncEngine::new(
        vec![Arc::new(players), Arc::new(matches), Arc::new(games)],
        meta,
        connectivity,
    ))
}
