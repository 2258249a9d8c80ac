//! stripelog - Striping and view-management core for a distributed shared
//! log built over an abstract object-storage backend.
//!
//! A log is a sequence of positions; positions are mapped round-robin onto
//! backend objects by a growable [`ObjectMap`] of [`Stripe`]s, and the
//! current mapping plus sequencer assignment is published as an
//! epoch-tagged [`View`]. The [`Striper`] owns the current view for one log
//! and keeps it current against the backend:
//!
//! ```text
//!   clients --map/append--> Striper --propose/seal/activate--> Backend
//!                               ^
//!                   refresh / expander / stripe-init workers
//! ```
//!
//! # Modules
//!
//! - [`stripe`] - a single stripe: contiguous positions striped across a
//!   fixed set of backend objects
//! - [`object_map`] - the ordered, gap-free collection of stripes for one
//!   view
//! - [`sequencer`] - the atomic position counter vended to appenders
//! - [`view`] - the immutable, epoch-tagged configuration snapshot
//! - [`backend`] - the abstract object-storage interface the core is built
//!   against
//! - [`testkit`] - an in-memory `Backend` implementation for tests and the
//!   demo binary
//! - [`config`] - tunable knobs for a `Striper` instance
//! - [`striper`] - the engine: current-view ownership, background workers,
//!   and the view-transition protocol
//! - [`log_handle`] - a minimal append/read/fill/trim facade over a
//!   `Striper`, showing how the core is driven
//! - [`error`] - error types

pub mod backend;
pub mod config;
pub mod error;
pub mod log_handle;
pub mod object_map;
pub mod sequencer;
pub mod stripe;
pub mod striper;
pub mod testkit;
pub mod view;

pub use backend::Backend;
pub use config::StriperConfig;
pub use error::{Error, Result};
pub use log_handle::LogHandle;
pub use object_map::ObjectMap;
pub use sequencer::{Sequencer, SequencerConfig};
pub use stripe::Stripe;
pub use striper::Striper;
pub use view::{View, ViewData};
