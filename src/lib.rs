//! Crate root: public surface, core aliases, and protocol-wide invariants
//!
//! `imgzkp` proves, in zero knowledge, that a public *final* image is a
//! specific transformation (crop, quarter/half rotation, flip, brighten,
//! contrast) of a secret *original* image.
//!
//! ## Invariants
//!
//! - **Field & Curve.** The scalar field is `ark_bn254::Fr` (`F` in this
//!   crate). Both proving systems run over BN254; we **forbid unsafe**
//!   throughout the crate.
//!
//! - **One circuit per statement.** A [`circuit::Circuit`] is fixed by the
//!   transform, its parameters and both grid sizes. Its BLAKE3 digest is
//!   carried by every key, proof and public witness, and artifacts of
//!   different circuits are never mixed.
//!
//! - **Public inputs** are the final grid's channels in row-major,
//!   channel-minor order. The original grid is only ever a witness.
//!
//! - **Fiat–Shamir (FS).** The PLONK backend uses BLAKE3 with explicit
//!   domain separation tags, length-delimited absorbs, and an XOF to derive
//!   challenges. Prover and verifier replay the same schedule.
//!
//! ## Flow
//!
//! ```text
//! PixelGrid ─┐
//!            ├─ ConstraintBuilder ─ ProofBackend::{compile, setup, prove}
//! Transform ─┘         │                          │
//!                 WitnessAssigner            ArtifactCodec ─ proof.bin / vkey.bin
//! ```
//!
//! [`pipeline::TransformationPipeline`] strings these together; the
//! `imgzkp` binary is a thin CLI around it.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Pixel grids and the image codec boundary.
pub mod grid;
/// Transform descriptors and the reference pixel law.
pub mod transform;
/// Gate-list circuits and the constraint builder.
pub mod circuit;
/// Witness assignment from grids.
pub mod witness;
/// Interchangeable proving systems (Groth16, PLONK).
pub mod backend;
/// Backend-tagged artifact envelope.
pub mod codec;
/// Pipeline configuration (file + environment).
pub mod config;
/// Pipeline error taxonomy.
pub mod error;
/// End-to-end prove/verify flows and artifact persistence.
pub mod pipeline;

/// Evaluation domains and coefficient helpers (radix-2 NTT over `X^N − 1`).
pub mod domain;
/// Division by the vanishing polynomial.
pub mod quotient;
/// KZG commitments and batched opening checks.
pub mod pcs;
/// Fiat–Shamir transcript (domain-separated hashing, hash→field).
pub mod transcript;
/// Universal SRS generation, loading and validation.
pub mod srs_setup;

// ============================================================================
// Canonical aliases and root-level re-exports
// ============================================================================

/// Scalar field used across the crate.
pub type F = ark_bn254::Fr;

pub use backend::{backend_for, BackendKind, Proof, ProofBackend, ProvingKey, VerifyingKey};
pub use circuit::{BuildError, Circuit, CircuitShape};
pub use codec::{Artifact, CodecError};
pub use config::PipelineConfig;
pub use error::{ErrorKind, PipelineError, Stage};
pub use grid::{Dims, PixelGrid};
pub use pipeline::{Claim, ProofArtifacts, TransformationPipeline, Verification};
pub use transform::{TransformKind, TransformationSpec};
pub use witness::{PublicWitness, Witness, WitnessAssigner};
