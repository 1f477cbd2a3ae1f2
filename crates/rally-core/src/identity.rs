//! Per-installation device identity

use std::fmt;

use uuid::Uuid;

use crate::db::{keys, MetadataStore};
use crate::error::Result;

/// A stable per-installation identifier.
///
/// Created once on first run, persisted in the sync metadata store under
/// `deviceId`, and never rotated. Records created on this device carry it so
/// local-only data can be told apart from linked, replicated data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity(String);

impl DeviceIdentity {
    /// Generate a fresh identity (does not persist it)
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Load the persisted identity, creating and persisting one on first run
    pub fn load_or_create(meta: &dyn MetadataStore) -> Result<Self> {
        if let Some(existing) = meta.get(keys::DEVICE_ID)? {
            return Ok(Self(existing));
        }

        let identity = Self::generate();
        meta.put(keys::DEVICE_ID, identity.as_str())?;
        tracing::info!(device_id = %identity, "Created device identity");
        Ok(identity)
    }

    /// The identifier as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteMetadataStore};
    use std::sync::Arc;

    #[test]
    fn test_generate_is_unique() {
        assert_ne!(DeviceIdentity::generate(), DeviceIdentity::generate());
    }

    #[test]
    fn test_load_or_create_is_stable() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let meta = SqliteMetadataStore::new(db);

        let first = DeviceIdentity::load_or_create(&meta).unwrap();
        let second = DeviceIdentity::load_or_create(&meta).unwrap();
        assert_eq!(first, second);
    }
}
