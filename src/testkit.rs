//! An in-process [`Backend`] implementation over in-memory state.
//!
//! This is the crate's analogue of `original_source/storage/ceph/ceph.cc`'s
//! `CephBackend`: the same operation set and conditional-write/seal/
//! stale-epoch semantics, backed by `parking_lot`-guarded maps instead of a
//! RADOS cluster. It exists so the Striper can be built, run, and tested
//! without a real object store — production deployments supply their own
//! `Backend` impl.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::backend::Backend;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
enum SlotState {
    Written(Bytes),
    Filled,
    Trimmed,
}

#[derive(Debug, Default)]
struct ObjectState {
    seal_epoch: u64,
    slots: BTreeMap<u64, SlotState>,
}

/// In-memory [`Backend`]. Cheap to construct; `Send + Sync`, so a single
/// instance can be shared across a test's Stripers via `Arc`.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    heads: DashMap<String, String>,
    prefixes: DashMap<String, String>,
    views: DashMap<String, Mutex<BTreeMap<u64, Bytes>>>,
    objects: DashMap<String, Mutex<ObjectState>>,
    unique_ids: DashMap<String, AtomicU64>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for InMemoryBackend {
    async fn create_log(&self, name: &str, initial_view: Bytes) -> Result<(String, String)> {
        if self.heads.contains_key(name) {
            return Err(Error::NameConflict {
                name: name.to_string(),
            });
        }
        let hoid = format!("{}.head.{}", name, uuid::Uuid::new_v4());
        let prefix = name.to_string();
        self.heads.insert(name.to_string(), hoid.clone());
        self.prefixes.insert(hoid.clone(), prefix.clone());

        let mut epochs = BTreeMap::new();
        epochs.insert(1, initial_view);
        self.views.insert(hoid.clone(), Mutex::new(epochs));

        Ok((hoid, prefix))
    }

    async fn open_log(&self, name: &str) -> Result<(String, String)> {
        let hoid = self
            .heads
            .get(name)
            .map(|r| r.clone())
            .ok_or_else(|| Error::LogNotFound {
                name: name.to_string(),
            })?;
        let prefix = self
            .prefixes
            .get(&hoid)
            .map(|r| r.clone())
            .ok_or_else(|| Error::LogNotFound {
                name: name.to_string(),
            })?;
        Ok((hoid, prefix))
    }

    async fn read_views(&self, hoid: &str, from_epoch: u64) -> Result<BTreeMap<u64, Bytes>> {
        let views = self
            .views
            .get(hoid)
            .ok_or_else(|| Error::BackendError(format!("unknown head object {hoid}")))?;
        let guard = views.lock();
        Ok(guard.range(from_epoch..).map(|(e, b)| (*e, b.clone())).collect())
    }

    async fn propose_view(&self, hoid: &str, epoch: u64, bytes: Bytes) -> Result<()> {
        let views = self
            .views
            .get(hoid)
            .ok_or_else(|| Error::BackendError(format!("unknown head object {hoid}")))?;
        let mut guard = views.lock();
        if guard.contains_key(&epoch) {
            return Err(Error::Conflict { epoch });
        }
        guard.insert(epoch, bytes);
        Ok(())
    }

    async fn read(&self, oid: &str, epoch: u64, position: u64, _stride: u32) -> Result<Bytes> {
        let entry = self.objects.entry(oid.to_string()).or_default();
        let state = entry.lock();
        if epoch < state.seal_epoch {
            return Err(Error::StaleEpoch {
                object: oid.to_string(),
                epoch,
            });
        }
        match state.slots.get(&position) {
            Some(SlotState::Written(bytes)) => Ok(bytes.clone()),
            Some(SlotState::Filled) | Some(SlotState::Trimmed) => Err(Error::InvalidEntry {
                object: oid.to_string(),
                position,
            }),
            None => Err(Error::NotWritten {
                object: oid.to_string(),
                position,
            }),
        }
    }

    async fn write(
        &self,
        oid: &str,
        epoch: u64,
        position: u64,
        _stride: u32,
        bytes: Bytes,
    ) -> Result<()> {
        let entry = self.objects.entry(oid.to_string()).or_default();
        let mut state = entry.lock();
        if epoch < state.seal_epoch {
            return Err(Error::StaleEpoch {
                object: oid.to_string(),
                epoch,
            });
        }
        match state.slots.get(&position) {
            Some(SlotState::Written(_)) => Err(Error::AlreadyWritten {
                object: oid.to_string(),
                position,
            }),
            Some(SlotState::Filled) | Some(SlotState::Trimmed) => Err(Error::ReadOnlyEntry {
                object: oid.to_string(),
                epoch,
            }),
            None => {
                state.slots.insert(position, SlotState::Written(bytes));
                Ok(())
            }
        }
    }

    async fn fill(&self, oid: &str, epoch: u64, position: u64, _stride: u32) -> Result<()> {
        let entry = self.objects.entry(oid.to_string()).or_default();
        let mut state = entry.lock();
        if epoch < state.seal_epoch {
            return Err(Error::StaleEpoch {
                object: oid.to_string(),
                epoch,
            });
        }
        match state.slots.get(&position) {
            Some(SlotState::Written(_)) => Err(Error::AlreadyWritten {
                object: oid.to_string(),
                position,
            }),
            _ => {
                state.slots.insert(position, SlotState::Filled);
                Ok(())
            }
        }
    }

    async fn trim(&self, oid: &str, epoch: u64, position: u64, _stride: u32) -> Result<()> {
        let entry = self.objects.entry(oid.to_string()).or_default();
        let mut state = entry.lock();
        if epoch < state.seal_epoch {
            return Err(Error::StaleEpoch {
                object: oid.to_string(),
                epoch,
            });
        }
        state.slots.insert(position, SlotState::Trimmed);
        Ok(())
    }

    async fn seal(&self, oid: &str, epoch: u64) -> Result<()> {
        let entry = self.objects.entry(oid.to_string()).or_default();
        let mut state = entry.lock();
        state.seal_epoch = state.seal_epoch.max(epoch);
        Ok(())
    }

    async fn max_position(&self, oid: &str, epoch: u64) -> Result<(u64, bool)> {
        let entry = self.objects.entry(oid.to_string()).or_default();
        let state = entry.lock();
        if epoch < state.seal_epoch {
            return Err(Error::StaleEpoch {
                object: oid.to_string(),
                epoch,
            });
        }
        match state.slots.keys().max() {
            Some(max) => Ok((*max, false)),
            None => Ok((0, true)),
        }
    }

    async fn unique_id(&self, hoid: &str) -> Result<u64> {
        let counter = self.unique_ids.entry(hoid.to_string()).or_insert_with(|| AtomicU64::new(0));
        Ok(counter.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
