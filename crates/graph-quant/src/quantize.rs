use std::collections::HashMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::QuantizerError;
use crate::graph::Graph;
use crate::ir::{Data, DataType, Layer, LayerBindingId, LayerId, LayerKind, TensorInfo, TensorRef};
use crate::range::{MinMaxRange, RangeTracker};
use crate::range_inference::{infer_ranges, override_input_range};
use crate::scheme::QuantizationScheme;

/// Options controlling a quantization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizerOptions {
    /// Data type activations are quantized to.
    pub activation_format: DataType,
}

impl Default for QuantizerOptions {
    fn default() -> Self {
        Self {
            activation_format: DataType::QAsymmU8,
        }
    }
}

/// Rewrites a float graph into its quantized equivalent, one layer at a time.
///
/// Layers must be visited in topological order so that the id mapping already
/// covers the producers of every visited layer.
pub struct QuantizerVisitor<'a> {
    ranges: &'a RangeTracker,
    scheme: QuantizationScheme,
    quantized: Graph,
    /// Source layer id to rewritten layer id.
    mapping: HashMap<LayerId, LayerId>,
}

impl<'a> QuantizerVisitor<'a> {
    /// Create a visitor that rebuilds layers using the given ranges and scheme.
    pub fn new(ranges: &'a RangeTracker, scheme: QuantizationScheme) -> Self {
        Self {
            ranges,
            scheme,
            quantized: Graph::new(),
            mapping: HashMap::new(),
        }
    }

    /// Rewrite one layer into the quantized graph.
    pub fn visit(&mut self, id: LayerId, layer: &Layer) -> Result<(), QuantizerError> {
        debug!("Quantizing layer {id} ({})", layer.name);

        let kind = match &layer.kind {
            LayerKind::Constant { data } => self.constant_conversion(id, layer, data)?,
            // Every other kind keeps its structure; only tensor metadata and
            // payloads change under quantization.
            kind => kind.clone(),
        };

        let inputs = self.map_inputs(layer);
        let outputs = self.quantize_outputs(id, layer)?;

        let new_id = self.quantized.add_layer(Layer {
            name: layer.name.clone(),
            kind,
            inputs,
            outputs,
        });
        self.mapping.insert(id, new_id);

        Ok(())
    }

    /// Finished graph. Consuming the visitor makes extraction a one-time move.
    pub fn into_network(self) -> Graph {
        self.quantized
    }

    /// Requantize a constant payload into the scheme's code space.
    fn constant_conversion(
        &self,
        id: LayerId,
        layer: &Layer,
        data: &Data,
    ) -> Result<LayerKind, QuantizerError> {
        let range = self.output_range(id, layer, 0)?;
        let strategy = self.scheme.configure(&range);

        let data = match data {
            Data::Float32(values) => strategy.quantize(values),
            // Already quantized payloads keep their codes.
            data => data.clone(),
        };

        Ok(LayerKind::Constant { data })
    }

    fn quantize_outputs(
        &self,
        id: LayerId,
        layer: &Layer,
    ) -> Result<Vec<TensorInfo>, QuantizerError> {
        let mut outputs = Vec::with_capacity(layer.outputs.len());

        for (slot, info) in layer.outputs.iter().enumerate() {
            let range = self.output_range(id, layer, slot)?;
            let strategy = self.scheme.configure(&range);

            outputs.push(TensorInfo::quantized(
                info.shape.clone(),
                strategy.dtype(),
                strategy.params(),
            ));
        }

        Ok(outputs)
    }

    fn output_range(
        &self,
        id: LayerId,
        layer: &Layer,
        slot: usize,
    ) -> Result<MinMaxRange, QuantizerError> {
        self.ranges
            .get_range(id, slot)
            .map_err(|_| QuantizerError::MissingRange {
                layer: id,
                kind: layer.kind.to_string(),
                slot,
            })
    }

    /// Producers are rewritten before their consumers, so every input can be
    /// remapped through the id mapping.
    fn map_inputs(&self, layer: &Layer) -> Vec<TensorRef> {
        layer
            .inputs
            .iter()
            .map(|input| TensorRef::new(self.mapping[&input.layer], input.slot))
            .collect()
    }
}

/// Converts a float graph into a fixed point equivalent.
///
/// The conversion runs two passes over the same topological order: range
/// inference tracks the dynamic range of every tensor, then the rewrite pass
/// rebuilds the graph with quantized tensor metadata and constant payloads.
/// One quantizer owns one source graph; independent instances share nothing.
pub struct GraphQuantizer {
    network: Graph,
    options: QuantizerOptions,
    ranges: RangeTracker,
}

impl GraphQuantizer {
    /// Create a quantizer that will rewrite `network`.
    pub fn new(network: Graph, options: QuantizerOptions) -> Self {
        Self {
            network,
            options,
            ranges: RangeTracker::new(),
        }
    }

    /// Seed the dynamic range of the input bound to `binding`.
    ///
    /// Overridden ranges win over anything range inference would derive.
    /// A binding id that no input layer carries is ignored.
    pub fn override_input_range(&mut self, binding: LayerBindingId, min: f32, max: f32) {
        override_input_range(
            &self.network,
            &mut self.ranges,
            binding,
            MinMaxRange::new(min, max),
        );
    }

    /// Quantize the graph and return the rewritten copy.
    ///
    /// Fails with [`QuantizerError::UnsupportedTarget`] when the configured
    /// activation format is not a quantized data type.
    pub fn export_network(&mut self) -> Result<Graph, QuantizerError> {
        info!(
            "Quantizing graph with {} layers to {}",
            self.network.len(),
            self.options.activation_format
        );

        let order = self.network.topological_order();

        infer_ranges(&self.network, &mut self.ranges)?;

        let scheme = QuantizationScheme::from_data_type(self.options.activation_format)
            .ok_or(QuantizerError::UnsupportedTarget(self.options.activation_format))?;

        let mut visitor = QuantizerVisitor::new(&self.ranges, scheme);
        for id in order {
            visitor.visit(id, self.network.layer(id))?;
        }

        let network = visitor.into_network();
        info!("Quantized graph ready with {} layers", network.len());

        Ok(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_default_to_asymmetric_u8() {
        assert_eq!(
            QuantizerOptions::default().activation_format,
            DataType::QAsymmU8
        );
    }

    #[test]
    fn options_round_trip_through_serde() {
        let options = QuantizerOptions {
            activation_format: DataType::QSymmS16,
        };

        let json = serde_json::to_string(&options).unwrap();

        assert_eq!(
            serde_json::from_str::<QuantizerOptions>(&json).unwrap(),
            options
        );
    }

    #[test]
    fn missing_range_is_a_contract_violation() {
        let mut graph = Graph::new();
        let input = graph.add_input("input", 0, vec![1]);
        let ranges = RangeTracker::new();
        let mut visitor = QuantizerVisitor::new(&ranges, QuantizationScheme::QAsymmU8);

        let result = visitor.visit(input, graph.layer(input));

        assert_eq!(
            result,
            Err(QuantizerError::MissingRange {
                layer: 0,
                kind: "Input".into(),
                slot: 0
            })
        );
    }
}
