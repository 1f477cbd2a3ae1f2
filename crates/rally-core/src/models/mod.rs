//! Data models shared across the local store, sync engine, and interfaces

mod game;
mod matches;
mod player;

pub use game::{GameId, GameResult};
pub use matches::{Match, MatchId};
pub use player::{Player, PlayerId};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::identity::DeviceIdentity;

/// A record that participates in push/pull synchronization.
///
/// Every syncable record carries a stable cross-device `id`, a
/// `local_updated_at`-style mutation timestamp, and a `synced` flag that is
/// `true` only once the remote store has acknowledged the current local
/// version. The flag is replica-local state: it is skipped when the record is
/// serialized for the remote and defaults to `false` when a record is
/// deserialized from a remote payload.
pub trait Syncable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Stable identity, identical on every device.
    fn record_id(&self) -> String;

    /// Timestamp of the most recent mutation (local or remote).
    fn updated_at(&self) -> DateTime<Utc>;

    /// Whether the remote store has acknowledged the current version.
    fn is_synced(&self) -> bool;

    fn set_synced(&mut self, synced: bool);

    /// Whether this record may be pushed to the remote store.
    ///
    /// The default allows everything; profile-like records override this to
    /// keep local-only records device-resident.
    fn push_eligible(&self, device: &DeviceIdentity) -> bool {
        let _ = device;
        true
    }
}
