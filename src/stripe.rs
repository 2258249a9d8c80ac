//! A single stripe: a contiguous range of log positions mapped round-robin
//! across a fixed set of backend object names.

use serde::{Deserialize, Serialize};

/// Contiguous range of positions striped across `width` backend objects.
///
/// Immutable after construction. Object names are derived deterministically
/// from `(prefix, id, width)` so they never need to be stored on the wire —
/// see [`make_oids`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stripe {
    id: u64,
    width: u32,
    min_position: u64,
    max_position: u64,
    oids: Vec<String>,
}

impl Stripe {
    /// Construct a stripe covering `[min_position, max_position]` across
    /// `width` objects derived from `(prefix, id)`.
    ///
    /// # Panics
    ///
    /// Panics if `width == 0` or `max_position < min_position` — these are
    /// the invariants spec.md §3 requires of every `Stripe`.
    pub fn new(prefix: &str, id: u64, width: u32, min_position: u64, max_position: u64) -> Self {
        assert!(width > 0, "stripe width must be >= 1");
        assert!(
            max_position >= min_position,
            "stripe max_position must be >= min_position"
        );
        Self {
            id,
            width,
            min_position,
            max_position,
            oids: make_oids(prefix, id, width),
        }
    }

    /// Map `position` to its backend object name.
    ///
    /// Total within `[min_position, max_position]`; callers must check
    /// `contains` (or know the range by construction) before calling.
    pub fn map(&self, position: u64) -> &str {
        debug_assert!(self.contains(position));
        let index = (position % self.oids.len() as u64) as usize;
        &self.oids[index]
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.min_position && position <= self.max_position
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn min_position(&self) -> u64 {
        self.min_position
    }

    pub fn max_position(&self) -> u64 {
        self.max_position
    }

    pub fn oids(&self) -> &[String] {
        &self.oids
    }

    /// Number of log positions per backend object in this stripe.
    pub fn slots_per_object(&self) -> u64 {
        (self.max_position - self.min_position + 1) / self.width as u64
    }
}

/// Derive `width` distinct, reproducible backend object names from
/// `(prefix, id)`. Any collision-free scheme is acceptable as long as it is
/// byte-identical across processes; this crate uses `"<prefix>.<id>.<index>"`.
pub fn make_oids(prefix: &str, id: u64, width: u32) -> Vec<String> {
    (0..width).map(|index| format!("{prefix}.{id}.{index}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_is_round_robin_mod_width() {
        let stripe = Stripe::new("log", 0, 4, 0, 39);
        assert_eq!(stripe.map(0), "log.0.0");
        assert_eq!(stripe.map(1), "log.0.1");
        assert_eq!(stripe.map(4), "log.0.0");
        assert_eq!(stripe.map(39), "log.0.3");
    }

    #[test]
    fn oids_are_distinct_and_reproducible() {
        let a = make_oids("log", 7, 4);
        let b = make_oids("log", 7, 4);
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
        let unique: std::collections::HashSet<_> = a.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn different_ids_or_prefixes_derive_different_oids() {
        let a = make_oids("log", 0, 4);
        let b = make_oids("log", 1, 4);
        let c = make_oids("other", 0, 4);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn contains_respects_bounds() {
        let stripe = Stripe::new("log", 1, 4, 40, 79);
        assert!(!stripe.contains(39));
        assert!(stripe.contains(40));
        assert!(stripe.contains(79));
        assert!(!stripe.contains(80));
    }

    #[test]
    fn slots_per_object_matches_construction() {
        let stripe = Stripe::new("log", 0, 4, 0, 39);
        assert_eq!(stripe.slots_per_object(), 10);
    }

    #[test]
    #[should_panic(expected = "width must be >= 1")]
    fn zero_width_panics() {
        Stripe::new("log", 0, 0, 0, 9);
    }

    #[test]
    #[should_panic(expected = "max_position must be >= min_position")]
    fn inverted_range_panics() {
        Stripe::new("log", 0, 4, 10, 9);
    }
}
