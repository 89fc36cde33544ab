#![warn(missing_docs)]

//! Post training quantization for compute graphs.
//!
//! Converts a float32 graph into a fixed point equivalent in two passes over
//! the same topological order: range inference tracks the dynamic range of
//! every tensor, then the rewrite pass rebuilds the graph with quantized
//! tensor metadata and requantized constant payloads. Input ranges can be
//! seeded ahead of inference when the deployment knows its data better than
//! the defaults do.
//!
//! ```rust
//! use graph_quant::{Activation, Graph, GraphQuantizer, QuantizerOptions, TensorRef};
//!
//! let mut graph = Graph::new();
//! let input = graph.add_input("input", 0, vec![1, 16]);
//! let relu = graph.add_activation("relu", Activation::Relu, TensorRef::new(input, 0));
//! graph.add_output("output", 0, TensorRef::new(relu, 0));
//!
//! let mut quantizer = GraphQuantizer::new(graph, QuantizerOptions::default());
//! quantizer.override_input_range(0, -1.0, 1.0);
//!
//! let quantized = quantizer.export_network().unwrap();
//! assert_eq!(quantized.len(), 3);
//! ```

/// Errors surfaced by the quantizer.
pub mod error;
/// The compute graph arena.
pub mod graph;
/// Layer kinds, tensor metadata and constant payloads.
pub mod ir;
/// The rewrite pass and the quantizer entry point.
pub mod quantize;
/// Dynamic range tracking.
pub mod range;
/// Static range inference and input overrides.
pub mod range_inference;
/// Quantization schemes and per-tensor strategies.
pub mod scheme;

pub use error::QuantizerError;
pub use graph::Graph;
pub use ir::{
    Activation, Data, DataType, Layer, LayerBindingId, LayerId, LayerKind, QuantizationParams,
    Shape, TensorInfo, TensorRef,
};
pub use quantize::{GraphQuantizer, QuantizerOptions, QuantizerVisitor};
pub use range::{MinMaxRange, RangeTracker};
pub use range_inference::{DEFAULT_RANGE, infer_ranges, override_input_range};
pub use scheme::{
    AffineQuantization, Quantization, QuantizationScheme, QuantizationStrategy,
    SymmetricQuantization,
};
