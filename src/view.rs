//! Immutable configuration snapshot for a log instance at a given epoch.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::object_map::ObjectMap;
use crate::sequencer::{Sequencer, SequencerConfig};

/// The on-the-wire shape of a view: everything except `epoch`, which the
/// backend assigns and returns separately at proposal time so the same
/// bytes can be proposed idempotently at different epochs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewData {
    pub object_map: ObjectMap,
    pub seq_config: Option<SequencerConfig>,
    pub min_valid_position: u64,
}

impl ViewData {
    pub fn initial() -> Self {
        Self {
            object_map: ObjectMap::empty(),
            seq_config: None,
            min_valid_position: 0,
        }
    }
}

/// Immutable view of the log's configuration at `epoch`.
///
/// Views are published by swapping a shared reference; readers take a
/// snapshot (an `Arc<View>`) and operate against it lock-free. `epoch == 0`
/// is a placeholder value never installed as a Striper's current view.
#[derive(Debug, Clone)]
pub struct View {
    epoch: u64,
    pub object_map: ObjectMap,
    pub seq_config: Option<SequencerConfig>,
    pub min_valid_position: u64,
    /// Populated only when `seq_config.secret` matches this process's
    /// instance secret — i.e. only in the process currently sequencing.
    pub seq: Option<Arc<Sequencer>>,
}

impl View {
    /// Materialize an in-memory view from `(prefix, epoch, decoded)`. If
    /// `decoded.seq_config` names this instance (`secret` match), `seq` is
    /// populated as a fresh `Sequencer`; otherwise it is left `None` and
    /// reads may still proceed against the map.
    pub fn new(epoch: u64, decoded: ViewData, local_secret: &str) -> Self {
        let seq = decoded
            .seq_config
            .as_ref()
            .filter(|cfg| cfg.secret == local_secret)
            .map(|cfg| Arc::new(Sequencer::new(cfg.epoch, cfg.init_position)));

        Self {
            epoch,
            object_map: decoded.object_map,
            seq_config: decoded.seq_config,
            min_valid_position: decoded.min_valid_position,
            seq,
        }
    }

    /// The distinguished empty view used to bootstrap a new log: empty
    /// object map, no sequencer, `min_valid_position = 0`.
    pub fn create_initial() -> Bytes {
        serialize_data(&ViewData::initial())
    }

    /// Encode `(object_map, seq_config, min_valid_position)`. `epoch` is not
    /// part of the encoding.
    pub fn serialize(&self) -> Bytes {
        serialize_data(&ViewData {
            object_map: self.object_map.clone(),
            seq_config: self.seq_config.clone(),
            min_valid_position: self.min_valid_position,
        })
    }

    /// Decode previously-serialized view bytes into their semantic shape.
    /// Use [`View::new`] to materialize a full `View` (with `seq`
    /// populated) from the result.
    pub fn deserialize(bytes: &[u8]) -> Result<ViewData> {
        serde_json::from_slice(bytes).map_err(|e| Error::ViewDecode {
            epoch: 0,
            reason: e.to_string(),
        })
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

fn serialize_data(data: &ViewData) -> Bytes {
    Bytes::from(serde_json::to_vec(data).expect("ViewData serialization is infallible"))
}
