//! Arithmetic circuits over `F` relating an original grid to a final grid.
//!
//! A circuit is a list of gates
//!
//! ```text
//! q_L·a + q_R·b + q_O·c + q_M·a·b + q_C = 0
//! ```
//!
//! over declared variables. Every gate is also exactly one rank-1 constraint
//! `(q_M·a)·b = −(q_L·a + q_R·b + q_O·c + q_C)`, so both backends consume the
//! same list.
//!
//! ## Variable layout
//!
//! - `0 .. P`: public inputs, the final grid's channels in row-major,
//!   channel-minor order (`P = 3·H_f·W_f`).
//! - `P .. P + S`: secret original channels, same order (`S = 3·H_o·W_o`).
//! - the rest: auxiliary gadget values, each with a [`Hint`] telling the
//!   witness assigner how to compute it from earlier variables.
//!
//! ## Gadgets
//!
//! Geometric kinds emit one equality gate per final channel. Brighten and
//! contrast range-check the original channel to 8 bits and then prove the
//! saturating law with a clamp gadget built from two bit decompositions.

#![forbid(unsafe_code)]

use std::ops::Range;

use ark_ff::{One, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use blake3::Hasher;

use crate::grid::Dims;
use crate::transform::{
    contrast_coefficients, ChannelLaw, TransformKind, TransformationSpec, CONTRAST_DENOMINATOR,
};
use crate::F;

/// Errors raised while building a circuit.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The final dimensions are not a legal output of this transform.
    #[error("{kind}: final dimensions {final_dims} are incompatible with original {original}")]
    DimensionMismatch {
        /// Transform being built.
        kind: TransformKind,
        /// Original dimensions.
        original: Dims,
        /// Final dimensions.
        final_dims: Dims,
    },
    /// Either grid has a zero dimension.
    #[error("grids must be non-empty (original {original}, final {final_dims})")]
    EmptyGrid {
        /// Original dimensions.
        original: Dims,
        /// Final dimensions.
        final_dims: Dims,
    },
    /// Crop window leaves the original grid.
    #[error(
        "crop window {final_dims} at ({row_offset}, {col_offset}) exceeds original {original}"
    )]
    CropOutOfBounds {
        /// Window row offset.
        row_offset: usize,
        /// Window column offset.
        col_offset: usize,
        /// Original dimensions.
        original: Dims,
        /// Window (final) dimensions.
        final_dims: Dims,
    },
    /// Transform parameter outside its accepted range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Variable index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Var(pub usize);

/// `scale·var + offset` over the integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Affine {
    /// Variable.
    pub var: Var,
    /// Multiplier.
    pub scale: i64,
    /// Constant term.
    pub offset: i64,
}

impl Affine {
    /// `1·var + offset`.
    pub fn shifted(var: Var, offset: i64) -> Self {
        Self { var, scale: 1, offset }
    }
}

/// How the witness assigner computes a variable's integer value.
///
/// Hints only reference variables with a smaller index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Hint {
    /// Final grid channel (public input).
    Public,
    /// Original grid channel (secret input).
    Original,
    /// Bit `index` of `source`.
    Bit {
        /// Decomposed value.
        source: Affine,
        /// Bit position.
        index: u32,
    },
    /// `Σ coeff·var + constant`.
    Linear {
        /// Weighted variables.
        terms: Vec<(Var, i64)>,
        /// Constant term.
        constant: i64,
    },
    /// `left · right`.
    Product {
        /// Left factor.
        left: Var,
        /// Right factor.
        right: Affine,
    },
    /// `floor(source / divisor)`.
    DivFloor {
        /// Dividend.
        source: Affine,
        /// Positive divisor.
        divisor: i64,
    },
    /// `source mod divisor`, in `[0, divisor)`.
    RemEuclid {
        /// Dividend.
        source: Affine,
        /// Positive divisor.
        divisor: i64,
    },
}

/// One arithmetic gate. Unused wires are `None` and carry a zero selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gate {
    /// Wires `a`, `b`, `c`.
    pub wires: [Option<Var>; 3],
    /// Coefficient of `a`.
    pub q_l: F,
    /// Coefficient of `b`.
    pub q_r: F,
    /// Coefficient of `c`.
    pub q_o: F,
    /// Coefficient of `a·b`.
    pub q_m: F,
    /// Constant.
    pub q_c: F,
}

impl Gate {
    /// Residual of the gate under `values` (zero iff satisfied).
    pub fn residual(&self, values: &[F]) -> F {
        let w = |i: usize| {
            self.wires[i].and_then(|v| values.get(v.0).copied()).unwrap_or_else(F::zero)
        };
        let (a, b, c) = (w(0), w(1), w(2));
        self.q_l * a + self.q_r * b + self.q_o * c + self.q_m * a * b + self.q_c
    }

    fn linear(wires: [Option<Var>; 3], q_l: i64, q_r: i64, q_o: i64, q_c: i64) -> Self {
        Self { wires, q_l: fe(q_l), q_r: fe(q_r), q_o: fe(q_o), q_m: F::zero(), q_c: fe(q_c) }
    }

    // b·b − b = 0
    fn boolean(b: Var) -> Self {
        Self {
            wires: [Some(b), Some(b), None],
            q_l: -F::one(),
            q_r: F::zero(),
            q_o: F::zero(),
            q_m: F::one(),
            q_c: F::zero(),
        }
    }
}

/// Field image of a signed integer.
pub fn fe(v: i64) -> F {
    let mag = F::from(v.unsigned_abs());
    if v < 0 {
        -mag
    } else {
        mag
    }
}

/// What a circuit proves, independent of any witness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct CircuitShape {
    /// Transformation and parameters.
    pub spec: TransformationSpec,
    /// Original grid dimensions.
    pub original: Dims,
    /// Final grid dimensions.
    pub final_dims: Dims,
}

/// A built circuit.
#[derive(Clone, Debug)]
pub struct Circuit {
    shape: CircuitShape,
    hints: Vec<Hint>,
    gates: Vec<Gate>,
    digest: [u8; 32],
}

impl Circuit {
    /// Build the circuit for `spec` over grids of the given dimensions.
    pub fn build(
        spec: TransformationSpec,
        original: Dims,
        final_dims: Dims,
    ) -> Result<Self, BuildError> {
        ConstraintBuilder::build(spec, original, final_dims)
    }

    /// Shape descriptor.
    pub fn shape(&self) -> &CircuitShape {
        &self.shape
    }

    /// Digest binding the shape and every gate.
    pub fn digest(&self) -> [u8; 32] {
        self.digest
    }

    /// Total variable count.
    pub fn num_vars(&self) -> usize {
        self.hints.len()
    }

    /// Public input count.
    pub fn num_public(&self) -> usize {
        self.shape.final_dims.channels()
    }

    /// Public variables.
    pub fn public_range(&self) -> Range<usize> {
        0..self.num_public()
    }

    /// Secret original-channel variables.
    pub fn original_range(&self) -> Range<usize> {
        let start = self.num_public();
        start..start + self.shape.original.channels()
    }

    /// Gate list.
    pub fn gates(&self) -> &[Gate] {
        &self.gates
    }

    /// Per-variable hints.
    pub fn hints(&self) -> &[Hint] {
        &self.hints
    }

    /// Index of the first unsatisfied gate, if any.
    pub fn first_unsatisfied(&self, values: &[F]) -> Option<usize> {
        self.gates.iter().position(|g| !g.residual(values).is_zero())
    }
}

/// Digest of a shape plus gate list.
fn circuit_digest(shape: &CircuitShape, num_vars: usize, gates: &[Gate]) -> [u8; 32] {
    let mut h = Hasher::new();
    h.update(b"imgzkp.circuit.v1");
    let mut bytes = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = shape.serialize_compressed(&mut bytes);
    h.update(&(bytes.len() as u64).to_be_bytes());
    h.update(&bytes);
    h.update(&(num_vars as u64).to_be_bytes());
    h.update(&(gates.len() as u64).to_be_bytes());
    for g in gates {
        for w in g.wires {
            h.update(&w.map_or(u64::MAX, |v| v.0 as u64).to_be_bytes());
        }
        bytes.clear();
        for q in [g.q_l, g.q_r, g.q_o, g.q_m, g.q_c] {
            let _ = q.serialize_compressed(&mut bytes);
        }
        h.update(&bytes);
    }
    *h.finalize().as_bytes()
}

/// Emits the gates for one transformation.
pub struct ConstraintBuilder {
    hints: Vec<Hint>,
    gates: Vec<Gate>,
}

impl ConstraintBuilder {
    /// Build the circuit for `spec`.
    ///
    /// Dimension and parameter checks run before any gate is emitted.
    pub fn build(
        spec: TransformationSpec,
        original: Dims,
        final_dims: Dims,
    ) -> Result<Circuit, BuildError> {
        spec.validate_params()?;
        spec.check_dims(original, final_dims)?;

        let num_public = final_dims.channels();
        let mut b = ConstraintBuilder {
            hints: Vec::with_capacity(num_public + original.channels()),
            gates: Vec::new(),
        };
        b.hints.resize(num_public, Hint::Public);
        b.hints.resize(num_public + original.channels(), Hint::Original);

        let law = spec.channel_law();
        for r in 0..final_dims.height {
            for c in 0..final_dims.width {
                let (sr, sc) = spec.source_position(original, r, c);
                for ch in 0..3 {
                    let out = Var((r * final_dims.width + c) * 3 + ch);
                    let x = Var(num_public + (sr * original.width + sc) * 3 + ch);
                    match law {
                        ChannelLaw::Copy => b.equal(out, x),
                        ChannelLaw::Brighten(delta) => b.brighten(out, x, i64::from(delta)),
                        ChannelLaw::Contrast(factor) => b.contrast(out, x, factor),
                    }
                }
            }
        }

        let shape = CircuitShape { spec, original, final_dims };
        let digest = circuit_digest(&shape, b.hints.len(), &b.gates);
        tracing::debug!(
            kind = %spec.kind(),
            vars = b.hints.len(),
            gates = b.gates.len(),
            "circuit built"
        );
        Ok(Circuit { shape, hints: b.hints, gates: b.gates, digest })
    }

    fn aux(&mut self, hint: Hint) -> Var {
        self.hints.push(hint);
        Var(self.hints.len() - 1)
    }

    // out − x = 0
    fn equal(&mut self, out: Var, x: Var) {
        self.gates.push(Gate::linear([Some(out), Some(x), None], 1, -1, 0, 0));
    }

    /// Constrain `scale·var + offset` to equal `Σ 2^i·bit_i` over `count`
    /// boolean variables, returning the bits low to high.
    fn decompose(&mut self, source: Affine, count: u32) -> Vec<Var> {
        let bits: Vec<Var> =
            (0..count).map(|index| self.aux(Hint::Bit { source, index })).collect();
        for &bit in &bits {
            self.gates.push(Gate::boolean(bit));
        }
        let tie = |a: Var, a_coeff: i64, b: Option<(Var, i64)>| {
            let (b_var, b_coeff) = b.map_or((None, 0), |(v, k)| (Some(v), k));
            Gate::linear([Some(a), b_var, Some(source.var)], a_coeff, b_coeff, -source.scale, -source.offset)
        };
        let Some((&last, rest)) = bits.split_last() else {
            return bits;
        };
        if rest.is_empty() {
            self.gates.push(tie(last, 1, None));
            return bits;
        }
        // acc_j = acc_{j-1} + 2^j·b_j, with acc_0 = b_0
        let mut acc = rest[0];
        for (j, &bit) in rest.iter().enumerate().skip(1) {
            let weight = 1i64 << j;
            let next = self.aux(Hint::Linear { terms: vec![(acc, 1), (bit, weight)], constant: 0 });
            self.gates.push(Gate::linear([Some(acc), Some(bit), Some(next)], 1, weight, -1, 0));
            acc = next;
        }
        let top_weight = 1i64 << (bits.len() - 1);
        self.gates.push(tie(acc, 1, Some((last, top_weight))));
        bits
    }

    fn range_u8(&mut self, x: Var) {
        self.decompose(Affine::shifted(x, 0), 8);
    }

    /// `out = clamp(var + offset, 0, 255)` given the integer bounds
    /// `lo <= var + offset <= hi`, which the caller must enforce.
    fn clamp(&mut self, out: Var, var: Var, offset: i64, lo: i64, hi: i64) {
        let span = (256 - lo).max(hi + 1).max(1);
        let n = 64 - (span - 1).leading_zeros();
        let pow = 1i64 << n;

        // t1 = [s >= 0], t2 = [s >= 256], read off the top bit of n+1-bit decompositions
        let t1 = self.decompose(Affine::shifted(var, offset + pow), n + 1)[n as usize];
        let t2 = self.decompose(Affine::shifted(var, offset - 256 + pow), n + 1)[n as usize];

        // p = t2·(var + offset)
        let p = self.aux(Hint::Product { left: t2, right: Affine::shifted(var, offset) });
        self.gates.push(Gate {
            wires: [Some(t2), Some(var), Some(p)],
            q_l: fe(offset),
            q_r: F::zero(),
            q_o: -F::one(),
            q_m: F::one(),
            q_c: F::zero(),
        });
        // d = var − p
        let d = self.aux(Hint::Linear { terms: vec![(var, 1), (p, -1)], constant: 0 });
        self.gates.push(Gate::linear([Some(var), Some(p), Some(d)], 1, -1, -1, 0));
        // m = d + 255·t2 + offset
        let m = self.aux(Hint::Linear { terms: vec![(d, 1), (t2, 255)], constant: offset });
        self.gates.push(Gate::linear([Some(d), Some(t2), Some(m)], 1, 255, -1, offset));
        // out = t1·m
        self.gates.push(Gate {
            wires: [Some(t1), Some(m), Some(out)],
            q_l: F::zero(),
            q_r: F::zero(),
            q_o: -F::one(),
            q_m: F::one(),
            q_c: F::zero(),
        });
    }

    fn brighten(&mut self, out: Var, x: Var, delta: i64) {
        self.range_u8(x);
        self.clamp(out, x, delta, delta, 255 + delta);
    }

    fn contrast(&mut self, out: Var, x: Var, factor: i32) {
        self.range_u8(x);
        let (scale, constant) = contrast_coefficients(factor);
        let numerator = Affine { var: x, scale, offset: constant };
        let q = self.aux(Hint::DivFloor { source: numerator, divisor: CONTRAST_DENOMINATOR });
        let rem = self.aux(Hint::RemEuclid { source: numerator, divisor: CONTRAST_DENOMINATOR });
        // D·q + rem − scale·x − constant = 0
        self.gates.push(Gate::linear(
            [Some(q), Some(rem), Some(x)],
            CONTRAST_DENOMINATOR,
            1,
            -scale,
            -constant,
        ));
        // 0 <= rem < 2^15 and rem + (2^15 − D) < 2^15
        self.decompose(Affine::shifted(rem, 0), 15);
        self.decompose(Affine::shifted(rem, (1 << 15) - CONTRAST_DENOMINATOR), 15);

        // scale >= 0, so the quotient is monotone in x
        let lo = constant.div_euclid(CONTRAST_DENOMINATOR);
        let hi = (scale * 255 + constant).div_euclid(CONTRAST_DENOMINATOR);
        self.clamp(out, q, 0, lo, hi);
    }
}
