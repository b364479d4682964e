//! Witness assignment.
//!
//! Input variables come straight from the grids; every auxiliary variable is
//! computed from its [`Hint`] in index order. Arithmetic runs on `i64` and is
//! mapped into the field at the end, so hints never see wrapped values.

#![forbid(unsafe_code)]

use crate::circuit::{fe, Affine, Circuit, Hint};
use crate::grid::{Dims, PixelGrid};
use crate::F;

/// Errors raised during assignment.
#[derive(Debug, thiserror::Error)]
pub enum WitnessError {
    /// A grid does not have the dimensions the circuit was built for.
    #[error("{role} grid is {got}, circuit expects {expected}")]
    ShapeMismatch {
        /// Which grid.
        role: &'static str,
        /// Dimensions the circuit was built for.
        expected: Dims,
        /// Dimensions supplied.
        got: Dims,
    },
}

/// Full assignment: public values followed by every secret value.
#[derive(Clone, Debug)]
pub struct Witness {
    digest: [u8; 32],
    num_public: usize,
    values: Vec<F>,
}

impl Witness {
    /// Digest of the circuit this witness was assigned for.
    pub fn circuit_digest(&self) -> [u8; 32] {
        self.digest
    }

    /// All values, indexed by variable.
    pub fn values(&self) -> &[F] {
        &self.values
    }

    /// Public slice of the assignment.
    pub fn public(&self) -> PublicWitness {
        PublicWitness { digest: self.digest, values: self.values[..self.num_public].to_vec() }
    }
}

/// Public inputs only, in enumeration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicWitness {
    digest: [u8; 32],
    values: Vec<F>,
}

impl PublicWitness {
    /// Digest of the circuit this assignment was made for.
    pub fn circuit_digest(&self) -> [u8; 32] {
        self.digest
    }

    /// Public values.
    pub fn values(&self) -> &[F] {
        &self.values
    }
}

/// Binds grids to a circuit's variables.
pub struct WitnessAssigner;

impl WitnessAssigner {
    /// Assign every variable from both grids.
    pub fn assign_full(
        circuit: &Circuit,
        original: &PixelGrid,
        final_grid: &PixelGrid,
    ) -> Result<Witness, WitnessError> {
        check_dims("original", circuit.shape().original, original.dims())?;
        check_dims("final", circuit.shape().final_dims, final_grid.dims())?;

        let mut ints: Vec<i64> = Vec::with_capacity(circuit.num_vars());
        ints.extend(final_grid.channel_values().map(i64::from));
        ints.extend(original.channel_values().map(i64::from));
        for hint in &circuit.hints()[ints.len()..] {
            let v = eval_hint(hint, &ints);
            ints.push(v);
        }
        Ok(Witness {
            digest: circuit.digest(),
            num_public: circuit.num_public(),
            values: ints.into_iter().map(fe).collect(),
        })
    }

    /// Assign only the public inputs from the final grid.
    pub fn assign_public(
        circuit: &Circuit,
        final_grid: &PixelGrid,
    ) -> Result<PublicWitness, WitnessError> {
        check_dims("final", circuit.shape().final_dims, final_grid.dims())?;
        Ok(PublicWitness {
            digest: circuit.digest(),
            values: final_grid.channel_values().map(|v| F::from(u64::from(v))).collect(),
        })
    }
}

fn check_dims(role: &'static str, expected: Dims, got: Dims) -> Result<(), WitnessError> {
    if expected == got {
        Ok(())
    } else {
        Err(WitnessError::ShapeMismatch { role, expected, got })
    }
}

fn affine(a: &Affine, ints: &[i64]) -> i64 {
    a.scale * ints[a.var.0] + a.offset
}

fn eval_hint(hint: &Hint, ints: &[i64]) -> i64 {
    match hint {
        // inputs are filled before hints are evaluated
        Hint::Public | Hint::Original => 0,
        Hint::Bit { source, index } => (affine(source, ints) >> *index) & 1,
        Hint::Linear { terms, constant } => {
            terms.iter().map(|(v, k)| k * ints[v.0]).sum::<i64>() + constant
        }
        Hint::Product { left, right } => ints[left.0] * affine(right, ints),
        Hint::DivFloor { source, divisor } => affine(source, ints).div_euclid(*divisor),
        Hint::RemEuclid { source, divisor } => affine(source, ints).rem_euclid(*divisor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::TransformationSpec;

    #[test]
    fn public_assignment_matches_full() {
        let orig = PixelGrid::from_fn(2, 2, |r, c| [r as u8, c as u8, 9]).unwrap();
        let spec = TransformationSpec::Rotate180;
        let fin = spec.apply(&orig, None).unwrap();
        let circuit = Circuit::build(spec, orig.dims(), fin.dims()).unwrap();
        let full = WitnessAssigner::assign_full(&circuit, &orig, &fin).unwrap();
        let public = WitnessAssigner::assign_public(&circuit, &fin).unwrap();
        assert_eq!(full.public(), public);
        assert_eq!(public.values().len(), 12);
        assert_eq!(full.values().len(), circuit.num_vars());
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let orig = PixelGrid::filled(2, 3, [1, 2, 3]).unwrap();
        let circuit = Circuit::build(TransformationSpec::Rotate90, orig.dims(), Dims::new(3, 2)).unwrap();
        let wrong = PixelGrid::filled(2, 3, [1, 2, 3]).unwrap();
        assert!(matches!(
            WitnessAssigner::assign_public(&circuit, &wrong),
            Err(WitnessError::ShapeMismatch { role: "final", .. })
        ));
        assert!(matches!(
            WitnessAssigner::assign_full(&circuit, &wrong.with_pixel(0, 0, [0; 3]), &orig),
            Err(WitnessError::ShapeMismatch { .. })
        ));
    }
}
