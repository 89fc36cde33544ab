use std::collections::VecDeque;

use crate::ir::{
    Activation, Data, Layer, LayerBindingId, LayerId, LayerKind, Shape, TensorInfo, TensorRef,
};

/// Compute graph stored as an arena of layers.
///
/// Layers are addressed by their insertion index and edges are plain index
/// lists, so ids stay valid for the life of the graph. Construction is append
/// only and a layer can only reference producers that already exist, which
/// rules out cycles by construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    layers: Vec<Layer>,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of layers in the arena.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether the graph holds no layers.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Layer stored under `id`.
    ///
    /// Panics when `id` does not name a layer of this graph.
    pub fn layer(&self, id: LayerId) -> &Layer {
        &self.layers[id]
    }

    /// All layers with their ids, in insertion order.
    pub fn layers(&self) -> impl Iterator<Item = (LayerId, &Layer)> {
        self.layers.iter().enumerate()
    }

    /// Metadata of the output slot named by `tensor`.
    ///
    /// Panics when `tensor` does not name an existing slot.
    pub fn output_info(&self, tensor: TensorRef) -> &TensorInfo {
        let layer = self.layers.get(tensor.layer).unwrap_or_else(|| {
            panic!("tensor reference names unknown producer layer {}", tensor.layer)
        });
        layer.outputs.get(tensor.slot).unwrap_or_else(|| {
            panic!(
                "layer {} ({}) has no output slot {}",
                tensor.layer, layer.name, tensor.slot
            )
        })
    }

    /// Append a layer and return its id.
    ///
    /// Every input must reference an output slot of a layer that is already
    /// in the arena; a dangling reference panics.
    pub fn add_layer(&mut self, layer: Layer) -> LayerId {
        for input in &layer.inputs {
            let producer = self.layers.get(input.layer).unwrap_or_else(|| {
                panic!(
                    "layer {} references unknown producer layer {}",
                    layer.name, input.layer
                )
            });
            if input.slot >= producer.outputs.len() {
                panic!(
                    "layer {} references missing output slot {} of layer {}",
                    layer.name, input.slot, producer.name
                );
            }
        }

        self.layers.push(layer);
        self.layers.len() - 1
    }

    /// Add a graph input exposed under `binding`.
    pub fn add_input(&mut self, name: &str, binding: LayerBindingId, shape: Shape) -> LayerId {
        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Input { binding },
            inputs: vec![],
            outputs: vec![TensorInfo::float(shape)],
        })
    }

    /// Add a graph output exposed under `binding`.
    pub fn add_output(&mut self, name: &str, binding: LayerBindingId, input: TensorRef) -> LayerId {
        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Output { binding },
            inputs: vec![input],
            outputs: vec![],
        })
    }

    /// Add a constant carrying `data`.
    pub fn add_constant(&mut self, name: &str, shape: Shape, data: Data) -> LayerId {
        let dtype = data.dtype();
        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Constant { data },
            inputs: vec![],
            outputs: vec![TensorInfo {
                shape,
                dtype,
                quantization: None,
            }],
        })
    }

    /// Add an elementwise activation layer.
    pub fn add_activation(
        &mut self,
        name: &str,
        function: Activation,
        input: TensorRef,
    ) -> LayerId {
        let shape = self.output_info(input).shape.clone();
        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Activation { function },
            inputs: vec![input],
            outputs: vec![TensorInfo::float(shape)],
        })
    }

    /// Add a reshape to `shape`.
    pub fn add_reshape(&mut self, name: &str, shape: Shape, input: TensorRef) -> LayerId {
        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Reshape,
            inputs: vec![input],
            outputs: vec![TensorInfo::float(shape)],
        })
    }

    /// Add a concatenation along `axis`.
    pub fn add_concat(&mut self, name: &str, axis: usize, inputs: Vec<TensorRef>) -> LayerId {
        // The merged extent along `axis` is not tracked; the first input's
        // shape stands in for the output, as the consumer passes only read
        // ranges and element types.
        let shape = inputs
            .first()
            .map(|input| self.output_info(*input).shape.clone())
            .unwrap_or_default();
        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Concat { axis },
            inputs,
            outputs: vec![TensorInfo::float(shape)],
        })
    }

    /// Add a split producing `views` output slots.
    pub fn add_split(&mut self, name: &str, views: usize, input: TensorRef) -> LayerId {
        let shape = self.output_info(input).shape.clone();
        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Split,
            inputs: vec![input],
            outputs: vec![TensorInfo::float(shape); views],
        })
    }

    /// Add an elementwise addition.
    pub fn add_add(&mut self, name: &str, lhs: TensorRef, rhs: TensorRef) -> LayerId {
        let shape = self.output_info(lhs).shape.clone();
        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Add,
            inputs: vec![lhs, rhs],
            outputs: vec![TensorInfo::float(shape)],
        })
    }

    /// Add an elementwise multiplication.
    pub fn add_mul(&mut self, name: &str, lhs: TensorRef, rhs: TensorRef) -> LayerId {
        let shape = self.output_info(lhs).shape.clone();
        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Mul,
            inputs: vec![lhs, rhs],
            outputs: vec![TensorInfo::float(shape)],
        })
    }

    /// Add a linear (fully connected) layer.
    ///
    /// `weight` has shape `[out_features, in_features]` and is expected to be
    /// produced by a constant layer, as is the optional `bias`.
    pub fn add_linear(
        &mut self,
        name: &str,
        input: TensorRef,
        weight: TensorRef,
        bias: Option<TensorRef>,
    ) -> LayerId {
        let mut shape = self.output_info(input).shape.clone();
        let out_features = self.output_info(weight).shape.first().copied().unwrap_or(0);
        if let Some(last) = shape.last_mut() {
            *last = out_features;
        }

        let mut inputs = vec![input, weight];
        inputs.extend(bias);

        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Linear,
            inputs,
            outputs: vec![TensorInfo::float(shape)],
        })
    }

    /// Add a softmax with exponent scaling `beta`.
    pub fn add_softmax(&mut self, name: &str, beta: f32, input: TensorRef) -> LayerId {
        let shape = self.output_info(input).shape.clone();
        self.add_layer(Layer {
            name: name.into(),
            kind: LayerKind::Softmax { beta },
            inputs: vec![input],
            outputs: vec![TensorInfo::float(shape)],
        })
    }

    /// Input layers with their binding ids, in ascending layer order.
    pub fn input_layers(&self) -> impl Iterator<Item = (LayerId, LayerBindingId)> + '_ {
        self.layers().filter_map(|(id, layer)| match layer.kind {
            LayerKind::Input { binding } => Some((id, binding)),
            _ => None,
        })
    }

    /// Output layers with their binding ids, in ascending layer order.
    pub fn output_layers(&self) -> impl Iterator<Item = (LayerId, LayerBindingId)> + '_ {
        self.layers().filter_map(|(id, layer)| match layer.kind {
            LayerKind::Output { binding } => Some((id, binding)),
            _ => None,
        })
    }

    /// Layer ids ordered so that every producer precedes its consumers.
    ///
    /// Kahn's algorithm over the arena. Ready layers are queued in ascending
    /// id order, so the same graph always yields the same order.
    pub fn topological_order(&self) -> Vec<LayerId> {
        let mut dependencies = vec![0usize; self.layers.len()];
        let mut consumers: Vec<Vec<LayerId>> = vec![Vec::new(); self.layers.len()];

        for (id, layer) in self.layers() {
            // A producer feeding several inputs of the same layer counts once.
            let mut producers: Vec<LayerId> =
                layer.inputs.iter().map(|input| input.layer).collect();
            producers.sort_unstable();
            producers.dedup();

            dependencies[id] = producers.len();
            for producer in producers {
                consumers[producer].push(id);
            }
        }

        let mut ready: VecDeque<LayerId> = (0..self.layers.len())
            .filter(|id| dependencies[*id] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.layers.len());

        while let Some(id) = ready.pop_front() {
            order.push(id);
            for consumer in &consumers[id] {
                dependencies[*consumer] -= 1;
                if dependencies[*consumer] == 0 {
                    ready.push_back(*consumer);
                }
            }
        }

        debug_assert_eq!(order.len(), self.layers.len());
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DataType;
    use pretty_assertions::assert_eq;

    fn diamond() -> Graph {
        let mut graph = Graph::new();
        let input = graph.add_input("input", 0, vec![2, 4]);
        let relu = graph.add_activation("relu", Activation::Relu, TensorRef::new(input, 0));
        let tanh = graph.add_activation("tanh", Activation::Tanh, TensorRef::new(input, 0));
        let add = graph.add_add("add", TensorRef::new(relu, 0), TensorRef::new(tanh, 0));
        graph.add_output("output", 0, TensorRef::new(add, 0));
        graph
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let graph = diamond();

        let order = graph.topological_order();

        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn topological_order_is_deterministic() {
        let graph = diamond();

        assert_eq!(graph.topological_order(), graph.clone().topological_order());
    }

    #[test]
    fn constants_are_ready_from_the_start() {
        let mut graph = Graph::new();
        let input = graph.add_input("input", 0, vec![3]);
        let constant = graph.add_constant("bias", vec![3], Data::Float32(vec![1.0, 2.0, 3.0]));
        graph.add_add("add", TensorRef::new(input, 0), TensorRef::new(constant, 0));

        let order = graph.topological_order();

        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn linear_output_takes_weight_rows() {
        let mut graph = Graph::new();
        let input = graph.add_input("input", 0, vec![2, 8]);
        let weight = graph.add_constant("weight", vec![4, 8], Data::Float32(vec![0.0; 32]));
        let linear = graph.add_linear(
            "linear",
            TensorRef::new(input, 0),
            TensorRef::new(weight, 0),
            None,
        );

        assert_eq!(graph.output_info(TensorRef::new(linear, 0)).shape, vec![2, 4]);
    }

    #[test]
    fn split_creates_one_slot_per_view() {
        let mut graph = Graph::new();
        let input = graph.add_input("input", 0, vec![4, 4]);
        let split = graph.add_split("split", 3, TensorRef::new(input, 0));

        assert_eq!(graph.layer(split).outputs.len(), 3);
        assert_eq!(graph.layer(split).outputs[2].dtype, DataType::Float32);
    }

    #[test]
    fn input_layers_report_bindings() {
        let mut graph = Graph::new();
        graph.add_input("a", 3, vec![1]);
        graph.add_constant("c", vec![1], Data::Float32(vec![0.5]));
        graph.add_input("b", 7, vec![1]);

        let inputs: Vec<_> = graph.input_layers().collect();

        assert_eq!(inputs, vec![(0, 3), (2, 7)]);
    }

    #[test]
    #[should_panic = "unknown producer layer"]
    fn dangling_producer_is_rejected() {
        let mut graph = Graph::new();
        graph.add_activation("relu", Activation::Relu, TensorRef::new(9, 0));
    }

    #[test]
    #[should_panic = "references missing output slot"]
    fn dangling_slot_is_rejected() {
        let mut graph = Graph::new();
        let input = graph.add_input("input", 0, vec![1]);
        graph.add_layer(Layer {
            name: "relu".into(),
            kind: LayerKind::Activation {
                function: Activation::Relu,
            },
            inputs: vec![TensorRef::new(input, 4)],
            outputs: vec![TensorInfo::float(vec![1])],
        });
    }
}
