//! Groth16 over BN254.
//!
//! Every gate becomes one rank-1 constraint
//!
//! ```text
//! (q_M·a) · b = −(q_L·a + q_R·b + q_O·c + q_C)
//! ```
//!
//! with the circuit's public variables allocated as instance variables in
//! enumeration order. Setup is circuit-specific: a key pair only verifies
//! proofs for the exact transform and dimensions it was produced from.

use std::sync::Arc;

use ark_bn254::Bn254;
use ark_groth16::Groth16;
use ark_relations::lc;
use ark_relations::r1cs::{
    ConstraintSynthesizer, ConstraintSystemRef, LinearCombination, SynthesisError, Variable,
};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::{CircuitSpecificSetupSNARK, SNARK};
use rand::rngs::OsRng;

use super::{
    wrong, BackendError, BackendKind, CompiledProgram, Proof, ProofBackend, ProvingKey,
    VerifyingKey,
};
use crate::circuit::{Circuit, CircuitShape};
use crate::witness::{PublicWitness, Witness};
use crate::F;

/// Groth16 backend. Stateless; each setup samples fresh toxic waste.
#[derive(Clone, Copy, Debug, Default)]
pub struct Groth16Backend;

/// A circuit ready for R1CS synthesis.
#[derive(Clone, Debug)]
pub struct Groth16Program {
    pub(crate) circuit: Arc<Circuit>,
}

/// Groth16 proving key bound to one circuit.
#[derive(Clone, Debug, CanonicalSerialize, CanonicalDeserialize)]
pub struct Groth16ProvingKey {
    /// Circuit digest.
    pub digest: [u8; 32],
    /// Circuit shape.
    pub shape: CircuitShape,
    /// arkworks proving key.
    pub pk: ark_groth16::ProvingKey<Bn254>,
}

/// Groth16 verifying key bound to one circuit.
#[derive(Clone, Debug, CanonicalSerialize, CanonicalDeserialize)]
pub struct Groth16VerifyingKey {
    /// Circuit digest.
    pub digest: [u8; 32],
    /// Circuit shape.
    pub shape: CircuitShape,
    /// arkworks verifying key.
    pub vk: ark_groth16::VerifyingKey<Bn254>,
}

/// Groth16 proof.
#[derive(Clone, Debug, CanonicalSerialize, CanonicalDeserialize)]
pub struct Groth16Proof {
    /// Circuit digest.
    pub digest: [u8; 32],
    /// arkworks proof `(A, B, C)`.
    pub proof: ark_groth16::Proof<Bn254>,
}

/// Feeds the gate list to an arkworks constraint system.
struct GateSynthesizer<'a> {
    circuit: &'a Circuit,
    values: Option<&'a [F]>,
}

impl ConstraintSynthesizer<F> for GateSynthesizer<'_> {
    fn generate_constraints(self, cs: ConstraintSystemRef<F>) -> Result<(), SynthesisError> {
        let num_public = self.circuit.num_public();
        let mut vars = Vec::with_capacity(self.circuit.num_vars());
        for i in 0..self.circuit.num_vars() {
            let values = self.values;
            let value = move || {
                values.and_then(|v| v.get(i).copied()).ok_or(SynthesisError::AssignmentMissing)
            };
            let var = if i < num_public {
                cs.new_input_variable(value)?
            } else {
                cs.new_witness_variable(value)?
            };
            vars.push(var);
        }

        for gate in self.circuit.gates() {
            let [a, b, c] = gate.wires.map(|w| w.map(|v| vars[v.0]));
            let mut left = lc!();
            if let Some(a) = a {
                left = left + (gate.q_m, a);
            }
            let mut right = lc!();
            if let Some(b) = b {
                right = right + b;
            }
            let mut out: LinearCombination<F> = lc!() + (-gate.q_c, Variable::One);
            for (q, w) in [(gate.q_l, a), (gate.q_r, b), (gate.q_o, c)] {
                if let Some(w) = w {
                    out = out + (-q, w);
                }
            }
            cs.enforce_constraint(left, right, out)?;
        }
        Ok(())
    }
}

fn synthesis(e: SynthesisError) -> BackendError {
    BackendError::Synthesis(e.to_string())
}

impl super::private::Sealed for Groth16Backend {}

impl ProofBackend for Groth16Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Groth16
    }

    fn compile(&self, circuit: Arc<Circuit>) -> Result<CompiledProgram, BackendError> {
        let num_vars = circuit.num_vars();
        if let Some((i, _)) = circuit
            .gates()
            .iter()
            .enumerate()
            .find(|(_, g)| g.wires.iter().flatten().any(|v| v.0 >= num_vars))
        {
            return Err(BackendError::MalformedCircuit(format!(
                "gate {i} references a variable beyond {num_vars}"
            )));
        }
        tracing::debug!(
            constraints = circuit.gates().len(),
            public = circuit.num_public(),
            variables = num_vars,
            "Groth16 R1CS"
        );
        Ok(CompiledProgram::Groth16(Groth16Program { circuit }))
    }

    fn setup(&self, program: &CompiledProgram) -> Result<(ProvingKey, VerifyingKey), BackendError> {
        let CompiledProgram::Groth16(program) = program else {
            return Err(wrong(BackendKind::Groth16, program.backend()));
        };
        let circuit = &program.circuit;
        let synth = GateSynthesizer { circuit, values: None };
        let (pk, vk) = Groth16::<Bn254>::setup(synth, &mut OsRng).map_err(synthesis)?;
        let digest = circuit.digest();
        let shape = *circuit.shape();
        Ok((
            ProvingKey::Groth16(Groth16ProvingKey { digest, shape, pk }),
            VerifyingKey::Groth16(Groth16VerifyingKey { digest, shape, vk }),
        ))
    }

    fn prove(
        &self,
        program: &CompiledProgram,
        pk: &ProvingKey,
        witness: &Witness,
    ) -> Result<Proof, BackendError> {
        let CompiledProgram::Groth16(program) = program else {
            return Err(wrong(BackendKind::Groth16, program.backend()));
        };
        let ProvingKey::Groth16(pk) = pk else {
            return Err(wrong(BackendKind::Groth16, pk.backend()));
        };
        let circuit = &program.circuit;
        let digest = circuit.digest();
        if pk.digest != digest
            || witness.circuit_digest() != digest
            || witness.values().len() != circuit.num_vars()
        {
            return Err(BackendError::CircuitMismatch);
        }
        if let Some(gate) = circuit.first_unsatisfied(witness.values()) {
            return Err(BackendError::Unsatisfied { gate });
        }
        let synth = GateSynthesizer { circuit, values: Some(witness.values()) };
        let proof = Groth16::<Bn254>::prove(&pk.pk, synth, &mut OsRng).map_err(synthesis)?;
        Ok(Proof::Groth16(Groth16Proof { digest, proof }))
    }

    fn verify(
        &self,
        vk: &VerifyingKey,
        proof: &Proof,
        public: &PublicWitness,
    ) -> Result<bool, BackendError> {
        let VerifyingKey::Groth16(vk) = vk else {
            return Err(wrong(BackendKind::Groth16, vk.backend()));
        };
        let Proof::Groth16(proof) = proof else {
            return Err(wrong(BackendKind::Groth16, proof.backend()));
        };
        if vk.digest != proof.digest || vk.digest != public.circuit_digest() {
            return Err(BackendError::CircuitMismatch);
        }
        let expected = vk.vk.gamma_abc_g1.len().saturating_sub(1);
        if public.values().len() != expected {
            return Err(BackendError::PublicInputLength { expected, got: public.values().len() });
        }
        Groth16::<Bn254>::verify(&vk.vk, public.values(), &proof.proof).map_err(synthesis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::PixelGrid;
    use crate::transform::TransformationSpec;
    use crate::witness::WitnessAssigner;

    fn grid(h: usize, w: usize, seed: u8) -> PixelGrid {
        PixelGrid::from_fn(h, w, |r, c| {
            let v = seed.wrapping_add((r * 31 + c * 7) as u8);
            [v, v.wrapping_mul(3), v ^ 0x5a]
        })
        .unwrap()
    }

    fn program(spec: TransformationSpec, original: &PixelGrid, final_grid: &PixelGrid) -> CompiledProgram {
        let circuit = Circuit::build(spec, original.dims(), final_grid.dims()).unwrap();
        Groth16Backend.compile(Arc::new(circuit)).unwrap()
    }

    #[test]
    fn flip_round_trip_and_tamper() {
        let original = grid(2, 3, 11);
        let spec = TransformationSpec::FlipVertical;
        let final_grid = spec.apply(&original, None).unwrap();
        let program = program(spec, &original, &final_grid);
        let (pk, vk) = Groth16Backend.setup(&program).unwrap();
        let witness =
            WitnessAssigner::assign_full(program.circuit(), &original, &final_grid).unwrap();
        let proof = Groth16Backend.prove(&program, &pk, &witness).unwrap();
        assert!(Groth16Backend.verify(&vk, &proof, &witness.public()).unwrap());

        let bumped = final_grid.with_pixel(0, 0, [0, 0, 0]);
        let public = WitnessAssigner::assign_public(program.circuit(), &bumped).unwrap();
        assert!(!Groth16Backend.verify(&vk, &proof, &public).unwrap());
    }

    #[test]
    fn prove_rejects_unsatisfying_witness() {
        let original = grid(2, 2, 3);
        let spec = TransformationSpec::Rotate180;
        let honest = spec.apply(&original, None).unwrap();
        let [r, g, b] = honest.get(1, 1).unwrap();
        let forged = honest.with_pixel(1, 1, [r ^ 1, g, b]);
        let program = program(spec, &original, &forged);
        let (pk, _) = Groth16Backend.setup(&program).unwrap();
        let witness = WitnessAssigner::assign_full(program.circuit(), &original, &forged).unwrap();
        assert!(matches!(
            Groth16Backend.prove(&program, &pk, &witness),
            Err(BackendError::Unsatisfied { .. })
        ));
    }

    #[test]
    fn public_length_is_checked() {
        let original = grid(1, 2, 5);
        let spec = TransformationSpec::FlipHorizontal;
        let final_grid = spec.apply(&original, None).unwrap();
        let program = program(spec, &original, &final_grid);
        let (pk, vk) = Groth16Backend.setup(&program).unwrap();
        let witness =
            WitnessAssigner::assign_full(program.circuit(), &original, &final_grid).unwrap();
        let proof = Groth16Backend.prove(&program, &pk, &witness).unwrap();

        let VerifyingKey::Groth16(inner) = &vk else { unreachable!() };
        let mut short = inner.clone();
        short.vk.gamma_abc_g1.pop();
        let err = Groth16Backend
            .verify(&VerifyingKey::Groth16(short), &proof, &witness.public())
            .unwrap_err();
        assert!(matches!(err, BackendError::PublicInputLength { expected: 5, got: 6 }));
    }
}
