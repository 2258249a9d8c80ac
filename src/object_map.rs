//! An ordered collection of stripes covering `[0, max_position]` — the
//! sole authority on position-to-object mapping for one view.

use serde::{Deserialize, Serialize};

use crate::stripe::Stripe;

/// Position-to-object function for one view.
///
/// Stripes are ordered by `min_position`, contiguous (no gaps, starting at
/// 0 when non-empty), and non-overlapping. Grown only by [`expand_mapping`],
/// which is pure: it returns a new `ObjectMap`, never mutating `self`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMap {
    next_stripe_id: u64,
    stripes: Vec<Stripe>,
}

impl Default for ObjectMap {
    fn default() -> Self {
        Self::empty()
    }
}

impl ObjectMap {
    /// An empty object map: no stripes, `next_stripe_id == 0`.
    pub fn empty() -> Self {
        Self {
            next_stripe_id: 0,
            stripes: Vec::new(),
        }
    }

    pub fn next_stripe_id(&self) -> u64 {
        self.next_stripe_id
    }

    pub fn stripes(&self) -> &[Stripe] {
        &self.stripes
    }

    pub fn is_empty(&self) -> bool {
        self.stripes.is_empty()
    }

    /// Largest mapped position, or `None` if the map is empty.
    pub fn max_position(&self) -> Option<u64> {
        self.stripes.last().map(Stripe::max_position)
    }

    /// Locate the stripe whose range contains `position`.
    pub fn map_stripe(&self, position: u64) -> Option<&Stripe> {
        // Stripes are contiguous and sorted by min_position, so a linear
        // scan from the tail (the common case for appends) or a binary
        // search both work; binary search scales better as stripes grow.
        self.stripes
            .binary_search_by(|s| {
                if position < s.min_position() {
                    std::cmp::Ordering::Greater
                } else if position > s.max_position() {
                    std::cmp::Ordering::Less
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .ok()
            .map(|idx| &self.stripes[idx])
    }

    /// `(oid, is_last_stripe)` for `position`, or `(None, false)` if
    /// unmapped.
    pub fn map(&self, position: u64) -> (Option<&str>, bool) {
        match self.map_stripe(position) {
            Some(stripe) => {
                let is_last = self.stripes.last().map(Stripe::id) == Some(stripe.id());
                (Some(stripe.map(position)), is_last)
            }
            None => (None, false),
        }
    }

    /// One `(oid, is_last)` entry per stripe from stripe 0 through the
    /// stripe containing `position`, used to enumerate every object that
    /// may hold entries in `[0, position]` (trim, scan). `None` if
    /// `position` itself is unmapped.
    pub fn map_to(&self, position: u64) -> Option<Vec<(String, bool)>> {
        let target_idx = self
            .stripes
            .iter()
            .position(|s| s.contains(position))?;

        Some(
            self.stripes[..=target_idx]
                .iter()
                .enumerate()
                .map(|(idx, stripe)| {
                    let clamped = position.min(stripe.max_position());
                    (stripe.map(clamped).to_string(), idx == target_idx)
                })
                .collect(),
        )
    }

    /// Return a new `ObjectMap` with stripes appended until `position` is
    /// mapped, plus whether anything changed. Width and slots-per-object
    /// are inherited from the last stripe when one exists; the caller's
    /// `default_width`/`default_slots` apply only to the very first stripe
    /// ever created in a map (see DESIGN.md for the Open Question this
    /// resolves).
    pub fn expand_mapping(
        &self,
        prefix: &str,
        position: u64,
        default_width: u32,
        default_slots: u64,
    ) -> (Self, bool) {
        if self.map_stripe(position).is_some() {
            return (self.clone(), false);
        }

        let mut next_stripe_id = self.next_stripe_id;
        let mut stripes = self.stripes.clone();

        loop {
            let (width, slots) = match stripes.last() {
                Some(last) => (last.width(), last.slots_per_object()),
                None => (default_width, default_slots),
            };
            let min_position = stripes.last().map(|s| s.max_position() + 1).unwrap_or(0);
            let span = width as u64 * slots;
            let max_position = min_position + span - 1;

            let stripe = Stripe::new(prefix, next_stripe_id, width, min_position, max_position);
            let covers_target = stripe.contains(position);
            stripes.push(stripe);
            next_stripe_id += 1;

            if covers_target {
                break;
            }
        }

        (
            Self {
                next_stripe_id,
                stripes,
            },
            true,
        )
    }
}
