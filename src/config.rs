//! Tunable knobs for the Striper and its background workers.

use std::time::Duration;

/// Configuration for a [`crate::striper::Striper`] instance.
///
/// `default_stripe_width`/`default_slots_per_object` only take effect when
/// [`crate::object_map::ObjectMap::expand_mapping`] creates the very first
/// stripe of a log; every later expansion inherits its shape from the
/// previous stripe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StriperConfig {
    /// Objects per stripe when the object map is still empty.
    pub default_stripe_width: u32,

    /// Positions per object, per stripe, when the object map is still
    /// empty.
    pub default_slots_per_object: u64,

    /// How often the refresh worker polls the backend for newer views when
    /// idle (no outstanding stale-epoch signal).
    pub refresh_poll_interval: Duration,

    /// Delay before the stripe-init worker retries a failed seal attempt.
    pub stripe_init_retry_interval: Duration,
}

impl Default for StriperConfig {
    fn default() -> Self {
        Self {
            default_stripe_width: 4,
            default_slots_per_object: 10,
            refresh_poll_interval: Duration::from_secs(5),
            stripe_init_retry_interval: Duration::from_millis(200),
        }
    }
}
