//! Per-entity sync adapter
//!
//! One adapter instance exists per entity type. A cycle runs push first, so
//! local edits are on the remote before the pull can fetch them back, then
//! pull. Push failures are isolated per record; a pull failure aborts that
//! entity's pull and leaves its watermark untouched.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::db::{MetadataStore, SyncStore};
use crate::error::Result;
use crate::identity::DeviceIdentity;
use crate::models::Syncable;
use crate::util;

use super::conflict::{self, Resolution};
use super::remote::RemoteStore;

/// The entity-agnostic surface the engine drives.
#[async_trait]
pub trait SyncAdapter: Send + Sync {
    /// Remote table name, used in logs
    fn entity(&self) -> &'static str;

    /// Run one push-then-pull cycle for this entity type
    async fn sync(&self) -> Result<()>;

    /// Number of local records awaiting remote acknowledgment
    fn pending(&self) -> Result<usize>;
}

/// Push/pull reconciliation for one entity type over its local store,
/// its remote table, and its pull watermark.
pub struct EntitySyncAdapter<T: Syncable> {
    entity: &'static str,
    watermark_key: &'static str,
    store: Arc<dyn SyncStore<T>>,
    remote: Arc<dyn RemoteStore>,
    meta: Arc<dyn MetadataStore>,
    device: DeviceIdentity,
    page_size: usize,
}

impl<T: Syncable> EntitySyncAdapter<T> {
    pub fn new(
        entity: &'static str,
        watermark_key: &'static str,
        store: Arc<dyn SyncStore<T>>,
        remote: Arc<dyn RemoteStore>,
        meta: Arc<dyn MetadataStore>,
        device: DeviceIdentity,
        page_size: usize,
    ) -> Self {
        Self {
            entity,
            watermark_key,
            store,
            remote,
            meta,
            device,
            page_size,
        }
    }

    /// Send unsynced local records to the remote, oldest mutation first.
    ///
    /// Each record is pushed on its own: a failure leaves that record
    /// unsynced for the next cycle and moves on to the rest. The
    /// acknowledgment write is version-guarded, so an edit that lands while
    /// the push is in flight stays pending.
    async fn push(&self) -> Result<usize> {
        let pending = self.store.unsynced()?;
        let mut confirmed = 0;

        for record in pending {
            if !record.push_eligible(&self.device) {
                continue;
            }
            let id = record.record_id();

            let payload = match serde_json::to_value(&record) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(entity = self.entity, id = %id, "Skipping unserializable record: {e}");
                    continue;
                }
            };

            match self.remote.upsert(self.entity, payload).await {
                Ok(()) => {
                    self.store.mark_synced(&id, record.updated_at())?;
                    confirmed += 1;
                }
                Err(e) => {
                    warn!(entity = self.entity, id = %id, "Push failed, will retry: {e}");
                }
            }
        }

        Ok(confirmed)
    }

    /// Fetch remote changes since the watermark and reconcile them into the
    /// local store.
    ///
    /// The watermark only advances after the whole page has been applied, so
    /// a failed pull is retried from the same point next cycle.
    async fn pull(&self) -> Result<usize> {
        let since = self.meta.watermark(self.watermark_key)?;
        let page = self
            .remote
            .changed_since(self.entity, since, self.page_size)
            .await?;

        let mut applied = 0;
        for value in page {
            let mut incoming: T = serde_json::from_value(value)?;
            incoming.set_synced(true);

            match self.store.get(&incoming.record_id())? {
                None => {
                    self.store.put(&incoming)?;
                    applied += 1;
                }
                Some(local) => match conflict::resolve(
                    local.is_synced(),
                    local.updated_at(),
                    incoming.updated_at(),
                ) {
                    Resolution::AcceptRemote => {
                        self.store.put(&incoming)?;
                        applied += 1;
                    }
                    Resolution::KeepLocal => {
                        debug!(
                            entity = self.entity,
                            id = %incoming.record_id(),
                            "Keeping local version"
                        );
                    }
                },
            }
        }

        self.meta.advance_watermark(self.watermark_key, util::now())?;
        Ok(applied)
    }
}

#[async_trait]
impl<T: Syncable> SyncAdapter for EntitySyncAdapter<T> {
    fn entity(&self) -> &'static str {
        self.entity
    }

    async fn sync(&self) -> Result<()> {
        let pushed = self.push().await?;
        let pulled = self.pull().await?;
        debug!(entity = self.entity, pushed, pulled, "Adapter cycle done");
        Ok(())
    }

    fn pending(&self) -> Result<usize> {
        self.store.count_unsynced()
    }
}
