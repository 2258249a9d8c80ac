//! A minimal append/read/fill/trim facade over a [`Striper`].
//!
//! This is demonstration scaffolding, not a general log client: it exists
//! so the core has an end-to-end path to exercise from tests and the demo
//! binary, showing how a caller drives `Striper` and `Backend` together
//! (retry on `PositionUnmapped` via `try_expand_view`, retry on
//! `StaleEpoch` via `update_current_view`).

use std::sync::Arc;

use bytes::Bytes;
use tracing::{instrument, warn};

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::striper::Striper;

/// One attempt to resolve a `PositionUnmapped`/`StaleEpoch` signal before
/// giving up and surfacing the error to the caller.
const MAX_RETRIES: u32 = 3;

pub struct LogHandle<B: Backend> {
    striper: Arc<Striper<B>>,
}

impl<B: Backend + 'static> LogHandle<B> {
    pub fn new(striper: Arc<Striper<B>>) -> Self {
        Self { striper }
    }

    pub fn striper(&self) -> &Arc<Striper<B>> {
        &self.striper
    }

    /// Sequence and write `data`, returning the position it landed at.
    /// Requires the current view to name this instance as sequencer (see
    /// `Striper::propose_sequencer`).
    #[instrument(skip(self, data))]
    pub async fn append(&self, data: Bytes) -> Result<u64> {
        let position = {
            let view = self.striper.view();
            let seq = view
                .seq
                .as_ref()
                .ok_or_else(|| Error::Internal("this instance is not the sequencer".into()))?;
            seq.check_tail(true)
        };

        // The position is committed the moment check_tail hands it out: a
        // stale-epoch or unmapped-position failure below is retried against
        // this same position, never a freshly-sequenced one.
        for attempt in 0..=MAX_RETRIES {
            let view = self.striper.view();
            let stripe = match view.object_map.map_stripe(position) {
                Some(stripe) => stripe,
                None => {
                    self.striper.try_expand_view(position).await?;
                    continue;
                }
            };
            let oid = stripe.map(position).to_string();
            let stride = stripe.slots_per_object() as u32;
            let epoch = view.epoch();

            match self.backend().write(&oid, epoch, position, stride, data.clone()).await {
                Ok(()) => return Ok(position),
                Err(Error::StaleEpoch { .. }) => {
                    warn!(attempt, position, "append hit a stale epoch, refreshing");
                    self.striper.update_current_view(epoch).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::Internal("append exhausted its retry budget".into()))
    }

    /// Read the entry at `position`.
    #[instrument(skip(self))]
    pub async fn read(&self, position: u64) -> Result<Bytes> {
        for attempt in 0..=MAX_RETRIES {
            let (oid, _) = match self.striper.map(position) {
                Ok(resolved) => resolved,
                Err(e) => return Err(e),
            };
            let view = self.striper.view();
            let stride = view
                .object_map
                .map_stripe(position)
                .map(|s| s.slots_per_object() as u32)
                .ok_or(Error::PositionUnmapped { position })?;

            match self.backend().read(&oid, view.epoch(), position, stride).await {
                Ok(bytes) => return Ok(bytes),
                Err(Error::StaleEpoch { .. }) => {
                    warn!(attempt, position, "read hit a stale epoch, refreshing");
                    self.striper.update_current_view(view.epoch()).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::Internal("read exhausted its retry budget".into()))
    }

    /// Mark `position` invalid without ever writing it.
    #[instrument(skip(self))]
    pub async fn fill(&self, position: u64) -> Result<()> {
        let (oid, _) = self.striper.map(position)?;
        let view = self.striper.view();
        let stride = view
            .object_map
            .map_stripe(position)
            .map(|s| s.slots_per_object() as u32)
            .ok_or(Error::PositionUnmapped { position })?;
        self.backend().fill(&oid, view.epoch(), position, stride).await
    }

    /// Mark `position` trimmed and advance the log's `min_valid_position`
    /// to just past it.
    #[instrument(skip(self))]
    pub async fn trim(&self, position: u64) -> Result<()> {
        let (oid, _) = self.striper.map(position)?;
        let view = self.striper.view();
        let stride = view
            .object_map
            .map_stripe(position)
            .map(|s| s.slots_per_object() as u32)
            .ok_or(Error::PositionUnmapped { position })?;
        self.backend().trim(&oid, view.epoch(), position, stride).await?;
        self.striper.advance_min_valid_position(position + 1).await
    }

    fn backend(&self) -> &B {
        self.striper.backend()
    }
}
