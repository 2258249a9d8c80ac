//! The abstract object-storage backend the core is built against.
//!
//! This module defines only the interface (§6 of the spec): log creation
//! and resolution, the view store, and per-object conditional I/O. The
//! storage backend itself — a real RADOS/Ceph cluster, an object-store
//! service, anything — is an external collaborator reached only through
//! this trait. See [`crate::testkit`] for an in-memory implementation used
//! by tests and the demo binary.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Abstract backend the Striper drives. Every method corresponds to one row
/// of the backend contract table; stale-epoch, conflict, and per-position
/// outcomes are represented as `Error` variants rather than out-of-band
/// codes (the idiomatic Rust analogue of the distinguished error kinds).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Create a uniquely-named head object, link `name -> hoid`, and
    /// install `initial_view` at epoch 1. Fails with `NameConflict` if
    /// `name` is already in use.
    async fn create_log(&self, name: &str, initial_view: Bytes) -> Result<(String, String)>;

    /// Resolve `name` to an existing head. Fails with `LogNotFound` if
    /// deleted or never created.
    async fn open_log(&self, name: &str) -> Result<(String, String)>;

    /// All stored views with epoch `>= from_epoch`, ascending by epoch.
    async fn read_views(&self, hoid: &str, from_epoch: u64) -> Result<BTreeMap<u64, Bytes>>;

    /// Conditional append: succeeds only if no view at `epoch` exists yet.
    /// Returns `Error::Conflict` (not fatal — see the view-transition
    /// protocol) if one was already proposed by a concurrent writer.
    async fn propose_view(&self, hoid: &str, epoch: u64, bytes: Bytes) -> Result<()>;

    /// Per-object conditional read at the stripe stride.
    async fn read(&self, oid: &str, epoch: u64, position: u64, stride: u32) -> Result<Bytes>;

    /// Per-object conditional write at the stripe stride.
    async fn write(
        &self,
        oid: &str,
        epoch: u64,
        position: u64,
        stride: u32,
        bytes: Bytes,
    ) -> Result<()>;

    /// Mark a slot invalid without ever having been written.
    async fn fill(&self, oid: &str, epoch: u64, position: u64, stride: u32) -> Result<()>;

    /// Mark a slot trimmed.
    async fn trim(&self, oid: &str, epoch: u64, position: u64, stride: u32) -> Result<()>;

    /// Idempotent, monotone: subsequent operations at an epoch below the
    /// current seal are rejected with `StaleEpoch`.
    async fn seal(&self, oid: &str, epoch: u64) -> Result<()>;

    /// `(position, empty)` for the object. Must be called at an epoch `>=`
    /// the seal epoch, or returns `StaleEpoch`.
    async fn max_position(&self, oid: &str, epoch: u64) -> Result<(u64, bool)>;

    /// Monotone per-head counter.
    async fn unique_id(&self, hoid: &str) -> Result<u64>;
}
