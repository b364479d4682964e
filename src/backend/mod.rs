//! # Proof backends (sealed)
//!
//! Two interchangeable proving systems sit behind [`ProofBackend`]:
//!
//! - **Groth16** ([`groth16`]): pairing-based, circuit-specific setup, via
//!   `ark-groth16` over BN254.
//! - **PLONK** ([`plonk`]): universal KZG setup; the SRS is loaded from files
//!   or generated once per backend instance.
//!
//! The trait is **sealed**: only the implementations in this crate exist, so
//! a caller can never be handed a verifier that accepts everything.
//!
//! Artifacts are sum types over both systems. A backend handed the other
//! system's artifact fails with [`BackendError::WrongBackend`]; `verify`
//! returns `Ok(false)` for a well-formed proof that does not verify.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::circuit::{Circuit, CircuitShape};
use crate::config::PipelineConfig;
use crate::witness::{PublicWitness, Witness};

pub mod groth16;
pub mod plonk;

/// Which proving system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Groth16 over BN254.
    Groth16,
    /// PLONK with KZG over BN254.
    Plonk,
}

impl BackendKind {
    /// Stable lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Groth16 => "groth16",
            BackendKind::Plonk => "plonk",
        }
    }

    /// Artifact envelope tag.
    pub fn tag(&self) -> u8 {
        match self {
            BackendKind::Groth16 => 1,
            BackendKind::Plonk => 2,
        }
    }

    /// Inverse of [`Self::tag`].
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(BackendKind::Groth16),
            2 => Some(BackendKind::Plonk),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown backend name.
#[derive(Debug, thiserror::Error)]
#[error("unknown backend {0:?} (expected groth16 or plonk)")]
pub struct UnknownBackend(pub String);

impl FromStr for BackendKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "groth16" => Ok(BackendKind::Groth16),
            "plonk" => Ok(BackendKind::Plonk),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Errors raised by compile, setup, prove and verify.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The circuit violates a structural rule of the backend.
    #[error("malformed circuit: {0}")]
    MalformedCircuit(String),
    /// A key decoded cleanly but is internally inconsistent.
    #[error("malformed key: {0}")]
    MalformedKey(String),
    /// Artifact produced by the other backend.
    #[error("expected a {expected} artifact, got {got}")]
    WrongBackend {
        /// This backend.
        expected: BackendKind,
        /// The artifact's backend.
        got: BackendKind,
    },
    /// Artifacts belong to differently shaped circuits.
    #[error("artifacts were produced for a different circuit")]
    CircuitMismatch,
    /// The witness does not satisfy gate `gate`.
    #[error("witness does not satisfy gate {gate}")]
    Unsatisfied {
        /// First failing gate.
        gate: usize,
    },
    /// Public input count differs from the key's.
    #[error("expected {expected} public inputs, got {got}")]
    PublicInputLength {
        /// Count the key was set up for.
        expected: usize,
        /// Count supplied.
        got: usize,
    },
    /// SRS could not be loaded or is too small.
    #[error(transparent)]
    Srs(#[from] crate::srs_setup::SrsSetupError),
    /// Constraint synthesis failed inside the Groth16 backend.
    #[error("constraint synthesis: {0}")]
    Synthesis(String),
    /// Evaluation domain error.
    #[error(transparent)]
    Domain(#[from] crate::domain::DomainError),
    /// Commitment error.
    #[error(transparent)]
    Pcs(#[from] crate::pcs::PcsError),
    /// Quotient does not divide; the witness is unsatisfying.
    #[error(transparent)]
    Quotient(#[from] crate::quotient::QuotientError),
}

mod private {
    pub trait Sealed {}
}

/// Sealed interface shared by the two proving systems.
pub trait ProofBackend: private::Sealed + Send + Sync {
    /// Which system this is.
    fn kind(&self) -> BackendKind;

    /// Lower a circuit into the backend's constraint form.
    fn compile(&self, circuit: Arc<Circuit>) -> Result<CompiledProgram, BackendError>;

    /// Produce a key pair for a compiled program.
    fn setup(&self, program: &CompiledProgram) -> Result<(ProvingKey, VerifyingKey), BackendError>;

    /// Prove that `witness` satisfies the program.
    fn prove(
        &self,
        program: &CompiledProgram,
        pk: &ProvingKey,
        witness: &Witness,
    ) -> Result<Proof, BackendError>;

    /// `Ok(true)` iff the proof verifies against the public inputs.
    fn verify(
        &self,
        vk: &VerifyingKey,
        proof: &Proof,
        public: &PublicWitness,
    ) -> Result<bool, BackendError>;
}

/// Backend for `kind`, configured from `config`.
pub fn backend_for(kind: BackendKind, config: &PipelineConfig) -> Box<dyn ProofBackend> {
    match kind {
        BackendKind::Groth16 => Box::new(groth16::Groth16Backend),
        BackendKind::Plonk => Box::new(plonk::PlonkBackend::new(plonk::SrsSource::from_config(config))),
    }
}

/// A circuit lowered for one backend.
#[derive(Clone, Debug)]
pub enum CompiledProgram {
    /// Rank-1 view of the gate list.
    Groth16(groth16::Groth16Program),
    /// Row layout and permutation.
    Plonk(plonk::PlonkProgram),
}

impl CompiledProgram {
    /// Backend that compiled this program.
    pub fn backend(&self) -> BackendKind {
        match self {
            CompiledProgram::Groth16(_) => BackendKind::Groth16,
            CompiledProgram::Plonk(_) => BackendKind::Plonk,
        }
    }

    /// Source circuit.
    pub fn circuit(&self) -> &Arc<Circuit> {
        match self {
            CompiledProgram::Groth16(p) => &p.circuit,
            CompiledProgram::Plonk(p) => &p.circuit,
        }
    }
}

/// Proving key.
#[derive(Clone, Debug)]
pub enum ProvingKey {
    /// Groth16 proving key.
    Groth16(groth16::Groth16ProvingKey),
    /// PLONK proving key.
    Plonk(plonk::PlonkProvingKey),
}

impl ProvingKey {
    /// Backend that produced the key.
    pub fn backend(&self) -> BackendKind {
        match self {
            ProvingKey::Groth16(_) => BackendKind::Groth16,
            ProvingKey::Plonk(_) => BackendKind::Plonk,
        }
    }
}

/// Verifying key; carries the shape of the circuit it verifies.
#[derive(Clone, Debug)]
pub enum VerifyingKey {
    /// Groth16 verifying key.
    Groth16(groth16::Groth16VerifyingKey),
    /// PLONK verifying key.
    Plonk(plonk::PlonkVerifyingKey),
}

impl VerifyingKey {
    /// Backend that produced the key.
    pub fn backend(&self) -> BackendKind {
        match self {
            VerifyingKey::Groth16(_) => BackendKind::Groth16,
            VerifyingKey::Plonk(_) => BackendKind::Plonk,
        }
    }

    /// Transform and dimensions the key was set up for.
    pub fn shape(&self) -> &CircuitShape {
        match self {
            VerifyingKey::Groth16(vk) => &vk.shape,
            VerifyingKey::Plonk(vk) => &vk.shape,
        }
    }

    /// Digest of the circuit the key was set up for.
    pub fn circuit_digest(&self) -> [u8; 32] {
        match self {
            VerifyingKey::Groth16(vk) => vk.digest,
            VerifyingKey::Plonk(vk) => vk.digest,
        }
    }
}

/// Proof.
#[derive(Clone, Debug)]
pub enum Proof {
    /// Groth16 proof.
    Groth16(groth16::Groth16Proof),
    /// PLONK proof.
    Plonk(plonk::PlonkProof),
}

impl Proof {
    /// Backend that produced the proof.
    pub fn backend(&self) -> BackendKind {
        match self {
            Proof::Groth16(_) => BackendKind::Groth16,
            Proof::Plonk(_) => BackendKind::Plonk,
        }
    }

    /// Digest of the circuit the proof was produced for.
    pub fn circuit_digest(&self) -> [u8; 32] {
        match self {
            Proof::Groth16(p) => p.digest,
            Proof::Plonk(p) => p.digest,
        }
    }
}

fn wrong(expected: BackendKind, got: BackendKind) -> BackendError {
    BackendError::WrongBackend { expected, got }
}
