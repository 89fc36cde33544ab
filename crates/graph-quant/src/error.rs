use crate::ir::{DataType, LayerId};

/// Errors surfaced while quantizing a graph.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantizerError {
    /// The requested activation format is not a quantized data type.
    #[error("unsupported quantization target {0}")]
    UnsupportedTarget(DataType),

    /// A range was requested for a slot that was never recorded.
    #[error("no range recorded for layer {layer} output {slot}")]
    RangeNotFound {
        /// Producing layer.
        layer: LayerId,
        /// Output slot on that layer.
        slot: usize,
    },

    /// A layer reached the rewrite pass without a range for one of its
    /// outputs, meaning range inference did not cover the graph.
    #[error("layer {layer} ({kind}) output {slot} has no range")]
    MissingRange {
        /// Producing layer.
        layer: LayerId,
        /// Kind of the producing layer.
        kind: String,
        /// Output slot on that layer.
        slot: usize,
    },
}
