use log::{debug, warn};

use crate::error::QuantizerError;
use crate::graph::Graph;
use crate::ir::{Activation, Data, Layer, LayerBindingId, LayerId, LayerKind};
use crate::range::{MinMaxRange, RangeTracker};

/// Range assumed for layers whose output dynamics cannot be derived
/// statically: graph inputs without an override and weighted layers.
pub const DEFAULT_RANGE: MinMaxRange = MinMaxRange {
    min: -15.0,
    max: 15.0,
};

/// Infer the dynamic range of every layer output and record it in `ranges`.
///
/// Layers are walked in topological order, so producer ranges always exist by
/// the time a consumer asks for them. Slots that already carry a range, such
/// as overridden inputs, are left untouched.
pub fn infer_ranges(graph: &Graph, ranges: &mut RangeTracker) -> Result<(), QuantizerError> {
    for id in graph.topological_order() {
        let layer = graph.layer(id);
        debug!("Inferring range for layer {id} ({})", layer.name);

        match &layer.kind {
            LayerKind::Input { .. } => default_range(id, layer, ranges),
            // Output layers have no output slots, so there is nothing to record.
            LayerKind::Output { .. } => {}
            LayerKind::Constant { data } => constant_range(id, data, ranges),
            LayerKind::Activation { function } => activation_range(id, layer, *function, ranges)?,
            LayerKind::Reshape => same_as_input(id, layer, ranges)?,
            LayerKind::Split => same_as_input(id, layer, ranges)?,
            LayerKind::Concat { .. } => union_of_inputs(id, layer, ranges)?,
            LayerKind::Add => union_of_inputs(id, layer, ranges)?,
            LayerKind::Mul => union_of_inputs(id, layer, ranges)?,
            LayerKind::Linear => default_range(id, layer, ranges),
            LayerKind::Softmax { .. } => fixed_range(id, layer, MinMaxRange::new(0.0, 1.0), ranges),
        }
    }

    Ok(())
}

/// Seed the range of one graph input ahead of range inference.
///
/// Only input layers are considered. When no input layer carries `binding`
/// the tracker is left untouched, so a batch of overrides can be applied
/// without knowing which inputs a particular graph actually has.
pub fn override_input_range(
    graph: &Graph,
    ranges: &mut RangeTracker,
    binding: LayerBindingId,
    range: MinMaxRange,
) {
    let mut matched = false;

    for (id, candidate) in graph.input_layers() {
        if candidate == binding {
            debug!("Overriding range of input {binding} (layer {id})");
            ranges.set_range(id, 0, range);
            matched = true;
        }
    }

    if !matched {
        warn!("No input layer carries binding {binding}; override ignored");
    }
}

/// Record a range unless the slot already has one, so overrides win.
fn set_if_absent(ranges: &mut RangeTracker, layer: LayerId, slot: usize, range: MinMaxRange) {
    if !ranges.has_range(layer, slot) {
        ranges.set_range(layer, slot, range);
    }
}

/// Range of the producer slot feeding `layer`'s input `index`.
fn input_range(
    layer: &Layer,
    index: usize,
    ranges: &RangeTracker,
) -> Result<MinMaxRange, QuantizerError> {
    let tensor = layer.inputs[index];
    ranges.get_range(tensor.layer, tensor.slot)
}

fn default_range(id: LayerId, layer: &Layer, ranges: &mut RangeTracker) {
    for slot in 0..layer.outputs.len() {
        set_if_absent(ranges, id, slot, DEFAULT_RANGE);
    }
}

fn fixed_range(id: LayerId, layer: &Layer, range: MinMaxRange, ranges: &mut RangeTracker) {
    for slot in 0..layer.outputs.len() {
        set_if_absent(ranges, id, slot, range);
    }
}

fn constant_range(id: LayerId, data: &Data, ranges: &mut RangeTracker) {
    let range = match data {
        Data::Float32(values) => min_max(values),
        // The source of a quantization run is a float graph; a payload that
        // is already quantized keeps its codes and needs no observed range.
        Data::QAsymmU8(_) | Data::QSymmS16(_) => MinMaxRange::new(0.0, 0.0),
    };
    set_if_absent(ranges, id, 0, range);
}

fn activation_range(
    id: LayerId,
    layer: &Layer,
    function: Activation,
    ranges: &mut RangeTracker,
) -> Result<(), QuantizerError> {
    let input = input_range(layer, 0, ranges)?;

    let range = match function {
        Activation::Relu => MinMaxRange::new(input.min.max(0.0), input.max.max(0.0)),
        Activation::BoundedRelu { lower, upper } => input.clamp(lower, upper),
        // Monotonic for non-negative alpha, so mapping the endpoints is exact.
        Activation::LeakyRelu { alpha } => {
            MinMaxRange::new(leaky(input.min, alpha), leaky(input.max, alpha))
        }
        Activation::Tanh => MinMaxRange::new(-1.0, 1.0),
        Activation::Sigmoid => MinMaxRange::new(0.0, 1.0),
    };

    set_if_absent(ranges, id, 0, range);
    Ok(())
}

fn leaky(value: f32, alpha: f32) -> f32 {
    if value < 0.0 { alpha * value } else { value }
}

fn same_as_input(
    id: LayerId,
    layer: &Layer,
    ranges: &mut RangeTracker,
) -> Result<(), QuantizerError> {
    let range = input_range(layer, 0, ranges)?;
    for slot in 0..layer.outputs.len() {
        set_if_absent(ranges, id, slot, range);
    }
    Ok(())
}

fn union_of_inputs(
    id: LayerId,
    layer: &Layer,
    ranges: &mut RangeTracker,
) -> Result<(), QuantizerError> {
    let mut union: Option<MinMaxRange> = None;
    for index in 0..layer.inputs.len() {
        let input = input_range(layer, index, ranges)?;
        union = Some(match union {
            Some(current) => current.union(&input),
            None => input,
        });
    }

    set_if_absent(ranges, id, 0, union.unwrap_or(MinMaxRange::new(0.0, 0.0)));
    Ok(())
}

/// Exact `[min, max]` of a payload; empty payloads collapse to `[0, 0]`.
fn min_max(values: &[f32]) -> MinMaxRange {
    let mut range = MinMaxRange::new(0.0, 0.0);
    let mut values = values.iter();

    if let Some(first) = values.next() {
        range = MinMaxRange::new(*first, *first);
        for value in values {
            range.min = range.min.min(*value);
            range.max = range.max.max(*value);
        }
    }

    range
}
