use core::marker::PhantomData;

use num_traits::{Float, PrimInt};
use serde::{Deserialize, Serialize};

use crate::ir::{Data, DataType, QuantizationParams};
use crate::range::MinMaxRange;

/// Converts elements of a higher precision data type `E` to a lower precision
/// data type `Q` and vice-versa.
pub trait Quantization<E: Float, Q: PrimInt> {
    /// Create a new quantization scheme for an input range `[alpha, beta]`.
    fn new(alpha: E, beta: E) -> Self;
    /// Convert the values to a lower precision data type.
    fn quantize(&self, values: &[E]) -> Vec<Q>;
    /// Convert a single value to a lower precision data type.
    fn quantize_one(&self, value: E) -> Q;
    /// Convert the values back to a higher precision data type.
    fn dequantize(&self, values: &[Q]) -> Vec<E>;
    /// Convert a single value back to a higher precision data type.
    fn dequantize_one(&self, value: Q) -> E;
}

fn valid_scale<E: Float>(mut scale: E) -> E {
    // A range that collapses to zero width would give a zero scale, which
    // breaks the division in quantize. Floor it at machine epsilon.
    if scale <= E::epsilon() {
        scale = E::epsilon();
    }
    scale
}

/// Affine quantization scheme.
///
/// Maps `[alpha, beta]` onto the full code range of `Q` with a zero-point
/// offset. The interval is widened to contain 0 first, so the real value 0.0
/// always dequantizes exactly.
///
/// Note that the accumulation type `A` should have a bigger range than `Q`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineQuantization<E: Float, Q: PrimInt, A: PrimInt> {
    /// The scaling factor.
    pub scale: E,
    /// The zero-point offset.
    pub offset: Q,
    /// Accumulation type used when offsetting codes.
    _a: PhantomData<A>,
}

impl<E: Float, Q: PrimInt, A: PrimInt> AffineQuantization<E, Q, A> {
    /// Initialize an affine quantization scheme with the given parameters.
    pub fn init(scale: E, offset: Q) -> Self {
        Self {
            scale: valid_scale(scale),
            offset,
            _a: PhantomData,
        }
    }
}

impl<E: Float, Q: PrimInt, A: PrimInt> Quantization<E, Q> for AffineQuantization<E, Q, A> {
    fn new(alpha: E, beta: E) -> Self {
        // Q range `[a, b]`
        let a = Q::min_value().to_f64().unwrap();
        let b = Q::max_value().to_f64().unwrap();

        // We extend the `[alpha, beta]` interval to ensure that it contains 0.
        // Otherwise, we would not meet the requirement that 0 be an exactly
        // representable value (zero-point).
        let alpha = alpha.to_f64().unwrap().min(0.0);
        let beta = beta.to_f64().unwrap().max(0.0);

        // Parameters are derived at double precision so that borderline
        // offsets (for example 127.5) round to the same code for every `E`.
        let scale = valid_scale((beta - alpha) / (b - a));
        let offset = (a - alpha / scale).round().clamp(a, b);

        Self::init(E::from(scale).unwrap(), Q::from(offset).unwrap())
    }

    fn quantize(&self, values: &[E]) -> Vec<Q> {
        values.iter().map(|x| self.quantize_one(*x)).collect()
    }

    fn quantize_one(&self, value: E) -> Q {
        let a = E::from(Q::min_value()).unwrap();
        let b = E::from(Q::max_value()).unwrap();
        let z = E::from(self.offset).unwrap();

        // x_q = clamp(round(x / scale) + z, a, b)
        Q::from(value.div(self.scale).round().add(z).clamp(a, b)).unwrap()
    }

    fn dequantize(&self, values: &[Q]) -> Vec<E> {
        values.iter().map(|x_q| self.dequantize_one(*x_q)).collect()
    }

    fn dequantize_one(&self, value: Q) -> E {
        // x = scale * (x_q - z)
        let centered = A::from(value).unwrap() - A::from(self.offset).unwrap();
        self.scale * E::from(centered).unwrap()
    }
}

/// Symmetric quantization scheme.
///
/// Maps `[-alpha, alpha]` onto `[-MAX, MAX]` of `Q` with no offset. The
/// lowest signed code is excluded so the code range stays symmetric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SymmetricQuantization<E: Float, Q: PrimInt> {
    /// The scaling factor.
    pub scale: E,
    /// The quantized type.
    _q: PhantomData<Q>,
}

impl<E: Float, Q: PrimInt> SymmetricQuantization<E, Q> {
    /// Initialize a symmetric quantization scheme with the given parameters.
    pub fn init(scale: E) -> Self {
        Self {
            scale: valid_scale(scale),
            _q: PhantomData,
        }
    }

    /// The quantized range `[-b, b]`.
    fn range() -> (E, E) {
        let b = E::from(Q::max_value()).unwrap();
        (b.neg(), b)
    }
}

impl<E: Float, Q: PrimInt> Quantization<E, Q> for SymmetricQuantization<E, Q> {
    fn new(alpha: E, beta: E) -> Self {
        let b = Q::max_value().to_f64().unwrap();

        // Compute scale to convert a floating point value in range
        // `[-alpha, alpha]` to the quantized range.
        let alpha = alpha.to_f64().unwrap().abs().max(beta.to_f64().unwrap().abs());
        Self::init(E::from(valid_scale(alpha / b)).unwrap())
    }

    fn quantize(&self, values: &[E]) -> Vec<Q> {
        values.iter().map(|x| self.quantize_one(*x)).collect()
    }

    fn quantize_one(&self, value: E) -> Q {
        let (a, b) = Self::range();

        // x_q = clamp(round(x / scale), a, b)
        Q::from(value.div(self.scale).round().clamp(a, b)).unwrap()
    }

    fn dequantize(&self, values: &[Q]) -> Vec<E> {
        values.iter().map(|x_q| self.dequantize_one(*x_q)).collect()
    }

    fn dequantize_one(&self, value: Q) -> E {
        // x = scale * x_q
        self.scale * E::from(value).unwrap()
    }
}

/// Per-tensor quantization parameters realized for one concrete range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantizationStrategy {
    /// Asymmetric `u8` quantization.
    PerTensorAffineU8(AffineQuantization<f32, u8, i32>),
    /// Symmetric `i16` quantization.
    PerTensorSymmetricI16(SymmetricQuantization<f32, i16>),
}

impl QuantizationStrategy {
    /// Data type of the codes this strategy produces.
    pub fn dtype(&self) -> DataType {
        match self {
            QuantizationStrategy::PerTensorAffineU8(_) => DataType::QAsymmU8,
            QuantizationStrategy::PerTensorSymmetricI16(_) => DataType::QSymmS16,
        }
    }

    /// Scale and zero point as stored on tensor metadata.
    pub fn params(&self) -> QuantizationParams {
        match self {
            QuantizationStrategy::PerTensorAffineU8(strategy) => {
                QuantizationParams::new(strategy.scale, i32::from(strategy.offset))
            }
            QuantizationStrategy::PerTensorSymmetricI16(strategy) => {
                QuantizationParams::new(strategy.scale, 0)
            }
        }
    }

    /// Quantize float values into this strategy's code space.
    pub fn quantize(&self, values: &[f32]) -> Data {
        match self {
            QuantizationStrategy::PerTensorAffineU8(strategy) => {
                Data::QAsymmU8(strategy.quantize(values))
            }
            QuantizationStrategy::PerTensorSymmetricI16(strategy) => {
                Data::QSymmS16(strategy.quantize(values))
            }
        }
    }
}

/// Quantization scheme driving the rewrite of a whole graph.
///
/// The scheme is the descriptor; [`QuantizationScheme::configure`] realizes
/// it into a [`QuantizationStrategy`] for one concrete dynamic range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantizationScheme {
    /// Asymmetric 8-bit quantization.
    QAsymmU8,
    /// Symmetric 16-bit quantization.
    QSymmS16,
}

impl QuantizationScheme {
    /// Scheme quantizing to `dtype`, if that type is a quantized one.
    pub fn from_data_type(dtype: DataType) -> Option<Self> {
        match dtype {
            DataType::QAsymmU8 => Some(QuantizationScheme::QAsymmU8),
            DataType::QSymmS16 => Some(QuantizationScheme::QSymmS16),
            DataType::Float32 => None,
        }
    }

    /// Data type this scheme quantizes to.
    pub fn data_type(&self) -> DataType {
        match self {
            QuantizationScheme::QAsymmU8 => DataType::QAsymmU8,
            QuantizationScheme::QSymmS16 => DataType::QSymmS16,
        }
    }

    /// Configure the per-tensor strategy for one dynamic range.
    pub fn configure(&self, range: &MinMaxRange) -> QuantizationStrategy {
        match self {
            QuantizationScheme::QAsymmU8 => QuantizationStrategy::PerTensorAffineU8(
                AffineQuantization::new(range.min, range.max),
            ),
            QuantizationScheme::QSymmS16 => QuantizationStrategy::PerTensorSymmetricI16(
                SymmetricQuantization::new(range.min, range.max),
            ),
        }
    }
}
