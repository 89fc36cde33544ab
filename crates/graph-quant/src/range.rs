use std::collections::HashMap;

use derive_new::new;

use crate::error::QuantizerError;
use crate::ir::LayerId;

/// Dynamic range of the values flowing through one tensor.
///
/// Always `min <= max`. A degenerate range (`min == max`) is valid input for
/// the schemes, which floor the derived scale at a positive epsilon.
#[derive(new, Debug, Clone, Copy, PartialEq)]
pub struct MinMaxRange {
    /// Smallest value observed or assumed.
    pub min: f32,
    /// Largest value observed or assumed.
    pub max: f32,
}

impl MinMaxRange {
    /// Smallest range containing both `self` and `other`.
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Range clamped into `[lower, upper]`.
    pub fn clamp(&self, lower: f32, upper: f32) -> Self {
        Self {
            min: self.min.clamp(lower, upper),
            max: self.max.clamp(lower, upper),
        }
    }
}

/// Records the dynamic range of every layer output slot.
///
/// Keyed by `(layer, slot)`. Input overrides are written first; range
/// inference then fills every remaining slot without touching entries that
/// already exist, so overrides always win. The tracker lives for a single
/// quantization run.
#[derive(Debug, Default)]
pub struct RangeTracker {
    ranges: HashMap<(LayerId, usize), MinMaxRange>,
}

impl RangeTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the range of `(layer, slot)`, replacing any previous entry.
    pub fn set_range(&mut self, layer: LayerId, slot: usize, range: MinMaxRange) {
        self.ranges.insert((layer, slot), range);
    }

    /// Whether `(layer, slot)` already has a recorded range.
    pub fn has_range(&self, layer: LayerId, slot: usize) -> bool {
        self.ranges.contains_key(&(layer, slot))
    }

    /// Range recorded for `(layer, slot)`.
    pub fn get_range(&self, layer: LayerId, slot: usize) -> Result<MinMaxRange, QuantizerError> {
        self.ranges
            .get(&(layer, slot))
            .copied()
            .ok_or(QuantizerError::RangeNotFound { layer, slot })
    }

    /// Number of recorded ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether no range has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
