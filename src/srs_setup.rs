//! Structured Reference String (SRS) setup and management
//!
//! A KZG SRS over BN254 is
//!
//! - **G1 powers** `[τ⁰·G₁, τ¹·G₁, …, τᵈ·G₁]`, and
//! - **G2 elements** `[G₂, τ·G₂]` (files holding only `[τ·G₂]` are accepted).
//!
//! Soundness of every PLONK proof rests on τ being unknown. [`Srs::generate`]
//! samples τ from the OS RNG and drops it; [`Srs::from_seed`] derives τ from a
//! seed and is for tests and local development only, since anyone holding the
//! seed can forge proofs. SRS files from a multi-party ceremony can be loaded
//! with [`Srs::load`].
//!
//! # File Format
//!
//! Arkworks-serialized (compressed) affine points:
//!
//! ```text
//! G1.bin: [G1Affine; degree+1]
//! G2.bin: [G2Affine; 1 or 2]     // [τ·G₂] or [G₂, τ·G₂]
//! ```

#![forbid(unsafe_code)]

use std::path::Path;

use ark_bn254::{Bn254, Fr, G1Affine, G1Projective, G2Affine};
use ark_ec::{pairing::Pairing, AffineRepr, CurveGroup, Group};
use ark_ff::{One, UniformRand};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use blake3::Hasher;
use rand::{rngs::StdRng, CryptoRng, RngCore, SeedableRng};

use crate::pcs::{CommitterKey, OpeningKey};

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur during SRS setup and validation.
#[derive(Debug, thiserror::Error)]
pub enum SrsSetupError {
    /// File I/O error (file not found, permissions, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to deserialize SRS from binary format
    #[error("deserialization error: {0}")]
    Deserialize(String),

    /// SRS failed structural validation
    #[error("SRS validation failed: {0}")]
    Validation(String),

    /// Pairing check failed (indicates corrupted or malicious SRS)
    #[error("pairing check failed: {0}")]
    PairingCheck(String),
}

/// Universal KZG parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Srs {
    /// `[τⁱ]G₁` for `i = 0..=degree`.
    pub g1_powers: Vec<G1Affine>,
    /// `[τ]G₂`.
    pub tau_g2: G2Affine,
}

impl Srs {
    /// Fresh SRS supporting polynomials of degree `max_degree`; τ is dropped
    /// before returning.
    pub fn generate<R: RngCore + CryptoRng>(max_degree: usize, rng: &mut R) -> Self {
        let tau = Fr::rand(rng);
        Self::from_tau(max_degree, tau)
    }

    /// Reproducible SRS derived from `seed`. τ is recoverable by anyone who
    /// knows the seed; never use it outside tests and local development.
    pub fn from_seed(max_degree: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::from_tau(max_degree, Fr::rand(&mut rng))
    }

    fn from_tau(max_degree: usize, tau: Fr) -> Self {
        let g1 = G1Projective::generator();
        let mut proj = Vec::with_capacity(max_degree + 1);
        let mut tau_pow = Fr::one();
        for i in 0..=max_degree {
            proj.push(g1 * tau_pow);
            tau_pow *= tau;
            if i > 0 && i % 4096 == 0 {
                tracing::debug!(computed = i, total = max_degree + 1, "SRS G1 powers");
            }
        }
        let g1_powers = G1Projective::normalize_batch(&proj);
        let tau_g2 = (<Bn254 as Pairing>::G2::generator() * tau).into_affine();
        Self { g1_powers, tau_g2 }
    }

    /// Highest supported polynomial degree.
    pub fn max_degree(&self) -> usize {
        self.g1_powers.len().saturating_sub(1)
    }

    /// Load and validate SRS files holding at least `max_degree + 1` powers.
    pub fn load(
        g1_path: impl AsRef<Path>,
        g2_path: impl AsRef<Path>,
        max_degree: usize,
        check_pairing: bool,
    ) -> Result<Self, SrsSetupError> {
        let g1_powers = load_and_validate_g1_srs(g1_path, max_degree)?;
        let tau_g2 = load_and_validate_g2_srs(g2_path)?;
        if check_pairing {
            validate_g1_pairing(&g1_powers, tau_g2)?;
        }
        Ok(Self { g1_powers, tau_g2 })
    }

    /// Write both files.
    pub fn save(
        &self,
        g1_path: impl AsRef<Path>,
        g2_path: impl AsRef<Path>,
    ) -> Result<(), SrsSetupError> {
        save_g1_srs(g1_path, &self.g1_powers)?;
        save_g2_srs(g2_path, self.tau_g2)
    }

    /// Split off a committer key of `len` powers plus the opening key.
    pub fn trim(&self, len: usize) -> Result<(CommitterKey, OpeningKey), SrsSetupError> {
        if len == 0 || len > self.g1_powers.len() {
            return Err(SrsSetupError::Validation(format!(
                "SRS has {} powers, need {}",
                self.g1_powers.len(),
                len
            )));
        }
        let ck = CommitterKey { powers: self.g1_powers[..len].to_vec() };
        let ok = OpeningKey {
            g1: self.g1_powers[0],
            g2: <Bn254 as Pairing>::G2::generator().into_affine(),
            tau_g2: self.tau_g2,
        };
        Ok((ck, ok))
    }

    /// Stable digest over both groups, for logs and audit trails.
    pub fn digest(&self) -> [u8; 32] {
        let mut g1 = Vec::new();
        let mut g2 = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.g1_powers.serialize_compressed(&mut g1);
        let _ = self.tau_g2.serialize_compressed(&mut g2);
        hash_bytes(&[&g1, &g2])
    }
}

fn hash_bytes(parts: &[&[u8]]) -> [u8; 32] {
    let mut h = Hasher::new();
    h.update(b"imgzkp.SRS.v1");
    for p in parts {
        h.update(&(p.len() as u64).to_be_bytes());
        h.update(p);
    }
    *h.finalize().as_bytes()
}

// ============================================================================
// G1 / G2 loading and validation
// ============================================================================

/// Load G1 SRS from a binary file and validate it.
///
/// 1. **Deserialization** (arkworks checks every point is on the curve and in
///    the prime-order subgroup)
/// 2. **Degree check**: `powers.len() >= expected_degree + 1`
/// 3. **Generator check**: `powers[0]` is the BN254 G1 generator
pub fn load_and_validate_g1_srs(
    path: impl AsRef<Path>,
    expected_degree: usize,
) -> Result<Vec<G1Affine>, SrsSetupError> {
    let bytes = std::fs::read(path.as_ref())?;
    let powers: Vec<G1Affine> = CanonicalDeserialize::deserialize_compressed(bytes.as_slice())
        .map_err(|e| SrsSetupError::Deserialize(format!("G1 SRS: {}", e)))?;

    if powers.len() < expected_degree + 1 {
        return Err(SrsSetupError::Validation(format!(
            "G1 SRS has {} powers, need at least {} for degree {}",
            powers.len(),
            expected_degree + 1,
            expected_degree
        )));
    }
    if powers[0] != G1Affine::generator() {
        return Err(SrsSetupError::Validation(
            "G1 SRS first element is not the generator (possible corruption or wrong curve)".into(),
        ));
    }
    Ok(powers)
}

/// Check `e([τ]G₁, G₂) = e(G₁, [τ]G₂)`.
pub fn validate_g1_pairing(g1_powers: &[G1Affine], tau_g2: G2Affine) -> Result<(), SrsSetupError> {
    if g1_powers.len() < 2 {
        return Err(SrsSetupError::Validation(
            "Need at least 2 G1 powers for pairing check".into(),
        ));
    }
    let lhs = Bn254::pairing(g1_powers[1], G2Affine::generator());
    let rhs = Bn254::pairing(G1Affine::generator(), tau_g2);
    if lhs != rhs {
        return Err(SrsSetupError::PairingCheck(
            "G1 powers do not satisfy e(τG₁, G₂) = e(G₁, τG₂)".into(),
        ));
    }
    Ok(())
}

/// Load G2 SRS from a binary file and extract `[τ]G₂`.
///
/// Accepts `[G₂, τ·G₂]` (the first element must then be the generator) or
/// `[τ·G₂]`; rejects an empty file and the point at infinity.
pub fn load_and_validate_g2_srs(path: impl AsRef<Path>) -> Result<G2Affine, SrsSetupError> {
    let bytes = std::fs::read(path.as_ref())?;
    let elements: Vec<G2Affine> = CanonicalDeserialize::deserialize_compressed(bytes.as_slice())
        .map_err(|e| SrsSetupError::Deserialize(format!("G2 SRS: {}", e)))?;

    let tau_g2 = match elements.as_slice() {
        [] => {
            return Err(SrsSetupError::Validation(
                "G2 SRS file is empty (need at least [τ·G₂])".into(),
            ))
        }
        [tau_g2] => *tau_g2,
        [g2, tau_g2, ..] => {
            if *g2 != G2Affine::generator() {
                return Err(SrsSetupError::Validation(
                    "G2 SRS first element is not the generator (expected [G₂, τ·G₂] format)"
                        .into(),
                ));
            }
            *tau_g2
        }
    };
    if tau_g2.is_zero() {
        return Err(SrsSetupError::Validation("τ·G₂ is the point at infinity".into()));
    }
    Ok(tau_g2)
}

/// Save G1 SRS to a binary file in compressed Arkworks format.
pub fn save_g1_srs(path: impl AsRef<Path>, powers: &[G1Affine]) -> Result<(), SrsSetupError> {
    let mut bytes = Vec::new();
    powers
        .serialize_compressed(&mut bytes)
        .map_err(|e| SrsSetupError::Validation(format!("G1 serialize: {}", e)))?;
    std::fs::write(path.as_ref(), bytes)?;
    Ok(())
}

/// Save G2 SRS as `[G₂, τ·G₂]`.
pub fn save_g2_srs(path: impl AsRef<Path>, tau_g2: G2Affine) -> Result<(), SrsSetupError> {
    let elements = vec![G2Affine::generator(), tau_g2];
    let mut bytes = Vec::new();
    elements
        .serialize_compressed(&mut bytes)
        .map_err(|e| SrsSetupError::Validation(format!("G2 serialize: {}", e)))?;
    std::fs::write(path.as_ref(), bytes)?;
    Ok(())
}
