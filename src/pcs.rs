//! KZG polynomial commitments on BN254
//!
//! Commitments are `[f(τ)]₁ = Σ fᵢ·[τⁱ]₁` computed by a variable-base MSM over
//! the SRS powers. An opening of `f` at `z` is the commitment to the witness
//! `W(X) = (f(X) − f(z)) / (X − z)`, and
//!
//! ```text
//! e(C − f(z)·G₁ + z·W, G₂) · e(−W, [τ]G₂) = 1
//! ```
//!
//! verifies it. Several openings are checked in one `multi_miller_loop`
//! followed by a single final exponentiation.
//!
//! Keys are explicit values ([`CommitterKey`], [`OpeningKey`]) carved out of a
//! loaded or generated [`Srs`](crate::srs_setup::Srs); there is no global SRS
//! state.

#![forbid(unsafe_code)]

use ark_bn254::{Bn254, G1Affine, G1Projective, G2Affine};
use ark_ec::{pairing::Pairing, AffineRepr, CurveGroup, VariableBaseMSM};
use ark_ff::{One, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use crate::{domain, F};

/// PCS commitment newtype (wrap **G1Affine** directly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct Commitment(pub G1Affine);

/// Errors raised while committing or opening.
#[derive(Debug, thiserror::Error)]
pub enum PcsError {
    /// The polynomial has more coefficients than the key has powers.
    #[error("polynomial of length {len} exceeds committer key of {max} powers")]
    DegreeTooLarge {
        /// Coefficient count.
        len: usize,
        /// Available powers.
        max: usize,
    },
}

/// Powers `[τ⁰]₁ … [τᵈ]₁` used to commit.
#[derive(Debug, Clone, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct CommitterKey {
    /// G1 powers of τ, low→high.
    pub powers: Vec<G1Affine>,
}

/// Group elements the verifier needs: `G₁`, `G₂`, `[τ]G₂`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct OpeningKey {
    /// G1 generator (first SRS power).
    pub g1: G1Affine,
    /// G2 generator.
    pub g2: G2Affine,
    /// `[τ]G₂`.
    pub tau_g2: G2Affine,
}

impl CommitterKey {
    /// Number of powers, i.e. the longest committable coefficient vector.
    pub fn len(&self) -> usize {
        self.powers.len()
    }

    /// True if the key holds no powers.
    pub fn is_empty(&self) -> bool {
        self.powers.is_empty()
    }

    /// Commit to a low→high coefficient vector.
    pub fn commit(&self, coeffs: &[F]) -> Result<Commitment, PcsError> {
        if coeffs.len() > self.powers.len() {
            return Err(PcsError::DegreeTooLarge { len: coeffs.len(), max: self.powers.len() });
        }
        let bases = &self.powers[..coeffs.len()];
        // equal lengths by construction, so the MSM cannot reject them
        let acc = G1Projective::msm(bases, coeffs).unwrap_or_else(|_| G1Projective::zero());
        Ok(Commitment(acc.into_affine()))
    }

    /// Open `coeffs` at `z`: returns `(f(z), [W]₁)`.
    pub fn open(&self, coeffs: &[F], z: F) -> Result<(F, Commitment), PcsError> {
        let (w, value) = domain::divide_by_linear(coeffs, z);
        Ok((value, self.commit(&w)?))
    }
}

/// One opening claim `f(point) = value` against `commitment`.
#[derive(Debug, Clone, Copy)]
pub struct OpeningClaim {
    /// Commitment to `f`.
    pub commitment: G1Projective,
    /// Evaluation point.
    pub point: F,
    /// Claimed value.
    pub value: F,
    /// Witness commitment.
    pub witness: G1Affine,
}

impl OpeningKey {
    /// Check a batch of opening claims, combined with powers of `r`.
    ///
    /// `r` must be sampled after every claim is fixed (Fiat–Shamir).
    pub fn verify_batch(&self, claims: &[OpeningClaim], r: F) -> bool {
        if claims.is_empty() {
            return true;
        }
        // Σ rᵏ·(Cₖ − vₖ·G₁ + zₖ·Wₖ)   paired with G₂
        // Σ rᵏ·Wₖ                    paired with −[τ]G₂
        let mut lhs = G1Projective::zero();
        let mut wit = G1Projective::zero();
        let mut scale = F::one();
        for c in claims {
            let w = c.witness.into_group();
            lhs += (c.commitment - self.g1 * c.value + w * c.point) * scale;
            wit += w * scale;
            scale *= r;
        }
        let a = [lhs.into_affine(), (-wit).into_affine()];
        let b = [self.g2, self.tau_g2];
        let mlo = <Bn254 as Pairing>::multi_miller_loop(a, b);
        match <Bn254 as Pairing>::final_exponentiation(mlo) {
            Some(fe) => fe.0.is_one(),
            None => false,
        }
    }
}
