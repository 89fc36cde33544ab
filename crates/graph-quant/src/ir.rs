use core::fmt;
use std::fmt::Formatter;

use derive_new::new;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Stable index of a layer inside its graph arena.
pub type LayerId = usize;

/// Identifier binding a graph input or output to the outside world.
pub type LayerBindingId = i32;

/// Tensor shape as a list of dimension sizes.
pub type Shape = Vec<usize>;

/// Reference to one output slot of a producer layer.
#[derive(new, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TensorRef {
    /// Producer layer.
    pub layer: LayerId,
    /// Output slot on the producer.
    pub slot: usize,
}

/// Element type of a tensor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum DataType {
    /// 32-bit floating point.
    Float32,
    /// Asymmetric 8-bit quantized, codes in `[0, 255]` with a zero point.
    QAsymmU8,
    /// Symmetric 16-bit quantized, codes in `[-32767, 32767]`, zero point 0.
    QSymmS16,
}

impl DataType {
    /// Whether values of this type carry quantization parameters.
    pub fn is_quantized(&self) -> bool {
        !matches!(self, DataType::Float32)
    }
}

/// Scale and zero point attached to a quantized tensor.
///
/// `scale` is always strictly positive and `offset` is the code that
/// represents the real value 0.0.
#[derive(new, Debug, Clone, Copy, PartialEq)]
pub struct QuantizationParams {
    /// Size of one quantization step in real space.
    pub scale: f32,
    /// Code representing the real value 0.0.
    pub offset: i32,
}

/// Metadata of one layer output slot.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorInfo {
    /// Dimension sizes.
    pub shape: Shape,
    /// Element type.
    pub dtype: DataType,
    /// Present exactly when `dtype` is a quantized type.
    pub quantization: Option<QuantizationParams>,
}

impl TensorInfo {
    /// Float tensor metadata, without quantization parameters.
    pub fn float(shape: Shape) -> Self {
        Self {
            shape,
            dtype: DataType::Float32,
            quantization: None,
        }
    }

    /// Quantized tensor metadata carrying its scale and offset.
    pub fn quantized(shape: Shape, dtype: DataType, params: QuantizationParams) -> Self {
        Self {
            shape,
            dtype,
            quantization: Some(params),
        }
    }
}

/// Constant tensor payload.
#[derive(Clone, PartialEq)]
pub enum Data {
    /// Float values, the payload type of source graphs.
    Float32(Vec<f32>),
    /// Asymmetric 8-bit codes.
    QAsymmU8(Vec<u8>),
    /// Symmetric 16-bit codes.
    QSymmS16(Vec<i16>),
}

impl Data {
    /// Number of elements in the payload.
    pub fn len(&self) -> usize {
        match self {
            Data::Float32(values) => values.len(),
            Data::QAsymmU8(values) => values.len(),
            Data::QSymmS16(values) => values.len(),
        }
    }

    /// Whether the payload holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element type of the payload.
    pub fn dtype(&self) -> DataType {
        match self {
            Data::Float32(_) => DataType::Float32,
            Data::QAsymmU8(_) => DataType::QAsymmU8,
            Data::QSymmS16(_) => DataType::QSymmS16,
        }
    }
}

/// Truncate the vector display for debug display
fn trunc<T: fmt::Display>(v: &[T]) -> String {
    const BEGIN_INDEX: usize = 0;
    const MAX_LEN: usize = 5;
    let mut s = String::new();
    s.push('[');
    for (i, item) in v.iter().enumerate() {
        if i > BEGIN_INDEX {
            s.push_str(", ");
        }
        s.push_str(&format!("{item}"));
        if i > MAX_LEN {
            s.push_str(", ...");
            break;
        }
    }
    s.push(']');
    s
}

/// Shorten the payload for debug display
impl fmt::Debug for Data {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Data::Float32(v) => write!(f, "Float32({})", trunc(v)),
            Data::QAsymmU8(v) => write!(f, "QAsymmU8({})", trunc(v)),
            Data::QSymmS16(v) => write!(f, "QSymmS16({})", trunc(v)),
        }
    }
}

/// Activation function applied by an activation layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    /// `max(0, x)`.
    Relu,
    /// Clamps values into `[lower, upper]`.
    BoundedRelu {
        /// Lower clamp bound.
        lower: f32,
        /// Upper clamp bound.
        upper: f32,
    },
    /// Scales negative values by `alpha`.
    LeakyRelu {
        /// Slope applied to negative values.
        alpha: f32,
    },
    /// Hyperbolic tangent, saturating in `[-1, 1]`.
    Tanh,
    /// Logistic function, saturating in `[0, 1]`.
    Sigmoid,
}

/// Supported layer kinds.
///
/// The set is closed on purpose: both quantization passes dispatch on it
/// exhaustively, so adding a kind forces a rule in each pass.
#[derive(Debug, Clone, PartialEq, Display)]
pub enum LayerKind {
    /// Graph entry point.
    Input {
        /// Binding id the outside world feeds this input through.
        binding: LayerBindingId,
    },
    /// Graph exit point.
    Output {
        /// Binding id the outside world reads this output through.
        binding: LayerBindingId,
    },
    /// Embedded tensor payload.
    Constant {
        /// The payload.
        data: Data,
    },
    /// Elementwise activation.
    Activation {
        /// The function applied.
        function: Activation,
    },
    /// Shape change without touching values.
    Reshape,
    /// Concatenation of all inputs.
    Concat {
        /// Axis the inputs are concatenated along.
        axis: usize,
    },
    /// Splits its input into one view per output slot.
    Split,
    /// Elementwise addition.
    Add,
    /// Elementwise multiplication.
    Mul,
    /// Fully connected layer. Inputs are `[input, weight]` or
    /// `[input, weight, bias]`, with weight and bias produced by constant
    /// layers.
    Linear,
    /// Normalized exponential over the last axis.
    Softmax {
        /// Exponent scaling applied before normalization.
        beta: f32,
    },
}

/// A layer of the arena, with explicit producer references for each input.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    /// Human readable name.
    pub name: String,
    /// What the layer computes.
    pub kind: LayerKind,
    /// Producer slot feeding each input, in positional order.
    pub inputs: Vec<TensorRef>,
    /// Metadata of each output slot.
    pub outputs: Vec<TensorInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn data_debug_is_truncated() {
        let data = Data::Float32(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);

        assert_eq!(format!("{data:?}"), "Float32([0, 1, 2, 3, 4, 5, 6, ...])");
    }

    #[test]
    fn data_debug_short_payload_is_complete() {
        let data = Data::QAsymmU8(vec![0, 128, 255]);

        assert_eq!(format!("{data:?}"), "QAsymmU8([0, 128, 255])");
    }

    #[test]
    fn data_type_round_trips_through_strings() {
        assert_eq!(DataType::QAsymmU8.to_string(), "QAsymmU8");
        assert_eq!(
            DataType::from_str("QSymmS16").unwrap(),
            DataType::QSymmS16
        );
    }

    #[test]
    fn quantized_data_types_are_flagged() {
        assert!(!DataType::Float32.is_quantized());
        assert!(DataType::QAsymmU8.is_quantized());
        assert!(DataType::QSymmS16.is_quantized());
    }
}
