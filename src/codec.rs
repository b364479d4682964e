//! Binary artifact envelope.
//!
//! ```text
//! magic   b"IMGZKP\0\0"      8 bytes
//! version u16 big-endian     = 1
//! backend u8                 1 groth16, 2 plonk
//! kind    u8                 1 proving key, 2 verifying key, 3 proof
//! payload arkworks compressed, validated on decode
//! ```
//!
//! Encoding is deterministic. Decoding rejects a wrong header, invalid curve
//! points and trailing bytes, so an artifact from one backend can never be
//! read as the other's.

#![forbid(unsafe_code)]

use std::fmt;

use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};

use crate::backend::groth16::{Groth16Proof, Groth16ProvingKey, Groth16VerifyingKey};
use crate::backend::plonk::{PlonkProof, PlonkProvingKey, PlonkVerifyingKey};
use crate::backend::{BackendKind, Proof, ProvingKey, VerifyingKey};

/// Leading bytes of every artifact.
pub const MAGIC: [u8; 8] = *b"IMGZKP\0\0";
/// Envelope version this build writes and reads.
pub const FORMAT_VERSION: u16 = 1;
/// Envelope header length.
pub const HEADER_LEN: usize = MAGIC.len() + 2 + 1 + 1;

/// Which artifact an envelope holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// Proving key.
    ProvingKey,
    /// Verifying key.
    VerifyingKey,
    /// Proof.
    Proof,
}

impl ArtifactKind {
    fn tag(self) -> u8 {
        match self {
            ArtifactKind::ProvingKey => 1,
            ArtifactKind::VerifyingKey => 2,
            ArtifactKind::Proof => 3,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(ArtifactKind::ProvingKey),
            2 => Some(ArtifactKind::VerifyingKey),
            3 => Some(ArtifactKind::Proof),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArtifactKind::ProvingKey => "proving key",
            ArtifactKind::VerifyingKey => "verifying key",
            ArtifactKind::Proof => "proof",
        })
    }
}

/// Decode and encode failures. Every decode failure is a corrupt artifact.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Shorter than the header.
    #[error("artifact is {0} bytes, shorter than the {HEADER_LEN}-byte header")]
    Truncated(usize),
    /// Not an imgzkp artifact.
    #[error("bad magic bytes")]
    BadMagic,
    /// Written by an incompatible version.
    #[error("unsupported artifact version {0}")]
    UnsupportedVersion(u16),
    /// Backend tag unknown or not the expected one.
    #[error("artifact backend tag {got} does not match {expected}")]
    BackendMismatch {
        /// Backend the caller asked for.
        expected: BackendKind,
        /// Tag found in the header.
        got: u8,
    },
    /// Artifact tag unknown or not the expected one.
    #[error("artifact holds tag {got}, expected a {expected}")]
    ArtifactMismatch {
        /// Artifact the caller asked for.
        expected: ArtifactKind,
        /// Tag found in the header.
        got: u8,
    },
    /// Payload failed to deserialize.
    #[error("payload: {0}")]
    Payload(String),
    /// Bytes left over after the payload.
    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),
    /// Payload failed to serialize.
    #[error("encode: {0}")]
    Encode(String),
}

fn header(bytes: &[u8]) -> Result<(u8, u8), CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated(bytes.len()));
    }
    if bytes[..MAGIC.len()] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let version = u16::from_be_bytes([bytes[8], bytes[9]]);
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok((bytes[10], bytes[11]))
}

/// Backend and artifact kind of an envelope, without decoding the payload.
pub fn peek(bytes: &[u8]) -> Result<(BackendKind, ArtifactKind), CodecError> {
    let (backend, kind) = header(bytes)?;
    let backend = BackendKind::from_tag(backend)
        .ok_or(CodecError::BackendMismatch { expected: BackendKind::Groth16, got: backend })?;
    let kind = ArtifactKind::from_tag(kind)
        .ok_or(CodecError::ArtifactMismatch { expected: ArtifactKind::Proof, got: kind })?;
    Ok((backend, kind))
}

fn seal<T: CanonicalSerialize>(
    backend: BackendKind,
    kind: ArtifactKind,
    payload: &T,
) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.compressed_size());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_be_bytes());
    out.push(backend.tag());
    out.push(kind.tag());
    payload.serialize_compressed(&mut out).map_err(|e| CodecError::Encode(e.to_string()))?;
    Ok(out)
}

fn open(bytes: &[u8], backend: BackendKind, kind: ArtifactKind) -> Result<&[u8], CodecError> {
    let (backend_tag, kind_tag) = header(bytes)?;
    if backend_tag != backend.tag() {
        return Err(CodecError::BackendMismatch { expected: backend, got: backend_tag });
    }
    if kind_tag != kind.tag() {
        return Err(CodecError::ArtifactMismatch { expected: kind, got: kind_tag });
    }
    Ok(&bytes[HEADER_LEN..])
}

fn read_payload<T: CanonicalDeserialize>(mut payload: &[u8]) -> Result<T, CodecError> {
    let value = T::deserialize_compressed(&mut payload)
        .map_err(|e| CodecError::Payload(e.to_string()))?;
    if !payload.is_empty() {
        return Err(CodecError::TrailingBytes(payload.len()));
    }
    Ok(value)
}

/// An enveloped, backend-tagged artifact.
pub trait Artifact: Sized {
    /// Envelope kind.
    const KIND: ArtifactKind;

    /// Backend that produced the artifact.
    fn backend(&self) -> BackendKind;

    /// Envelope bytes.
    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    /// Decode an envelope that must have been written by `backend`.
    fn decode(backend: BackendKind, bytes: &[u8]) -> Result<Self, CodecError>;
}

impl Artifact for ProvingKey {
    const KIND: ArtifactKind = ArtifactKind::ProvingKey;

    fn backend(&self) -> BackendKind {
        ProvingKey::backend(self)
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            ProvingKey::Groth16(pk) => seal(BackendKind::Groth16, Self::KIND, pk),
            ProvingKey::Plonk(pk) => seal(BackendKind::Plonk, Self::KIND, pk),
        }
    }

    fn decode(backend: BackendKind, bytes: &[u8]) -> Result<Self, CodecError> {
        let payload = open(bytes, backend, Self::KIND)?;
        Ok(match backend {
            BackendKind::Groth16 => ProvingKey::Groth16(read_payload::<Groth16ProvingKey>(payload)?),
            BackendKind::Plonk => ProvingKey::Plonk(read_payload::<PlonkProvingKey>(payload)?),
        })
    }
}

impl Artifact for VerifyingKey {
    const KIND: ArtifactKind = ArtifactKind::VerifyingKey;

    fn backend(&self) -> BackendKind {
        VerifyingKey::backend(self)
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            VerifyingKey::Groth16(vk) => seal(BackendKind::Groth16, Self::KIND, vk),
            VerifyingKey::Plonk(vk) => seal(BackendKind::Plonk, Self::KIND, vk),
        }
    }

    fn decode(backend: BackendKind, bytes: &[u8]) -> Result<Self, CodecError> {
        let payload = open(bytes, backend, Self::KIND)?;
        Ok(match backend {
            BackendKind::Groth16 => {
                VerifyingKey::Groth16(read_payload::<Groth16VerifyingKey>(payload)?)
            }
            BackendKind::Plonk => VerifyingKey::Plonk(read_payload::<PlonkVerifyingKey>(payload)?),
        })
    }
}

impl Artifact for Proof {
    const KIND: ArtifactKind = ArtifactKind::Proof;

    fn backend(&self) -> BackendKind {
        Proof::backend(self)
    }

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Proof::Groth16(p) => seal(BackendKind::Groth16, Self::KIND, p),
            Proof::Plonk(p) => seal(BackendKind::Plonk, Self::KIND, p),
        }
    }

    fn decode(backend: BackendKind, bytes: &[u8]) -> Result<Self, CodecError> {
        let payload = open(bytes, backend, Self::KIND)?;
        Ok(match backend {
            BackendKind::Groth16 => Proof::Groth16(read_payload::<Groth16Proof>(payload)?),
            BackendKind::Plonk => Proof::Plonk(read_payload::<PlonkProof>(payload)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::groth16::Groth16Backend;
    use crate::backend::ProofBackend;
    use crate::circuit::Circuit;
    use crate::grid::PixelGrid;
    use crate::transform::TransformationSpec;
    use crate::witness::WitnessAssigner;
    use std::sync::Arc;

    fn groth16_artifacts() -> (ProvingKey, VerifyingKey, Proof) {
        let original = PixelGrid::from_fn(1, 2, |_, c| [c as u8, 9, 200]).unwrap();
        let spec = TransformationSpec::FlipHorizontal;
        let final_grid = spec.apply(&original, None).unwrap();
        let circuit = Circuit::build(spec, original.dims(), final_grid.dims()).unwrap();
        let program = Groth16Backend.compile(Arc::new(circuit)).unwrap();
        let (pk, vk) = Groth16Backend.setup(&program).unwrap();
        let witness =
            WitnessAssigner::assign_full(program.circuit(), &original, &final_grid).unwrap();
        let proof = Groth16Backend.prove(&program, &pk, &witness).unwrap();
        (pk, vk, proof)
    }

    #[test]
    fn header_layout() {
        let (_, vk, proof) = groth16_artifacts();
        let bytes = proof.encode().unwrap();
        assert_eq!(&bytes[..8], b"IMGZKP\0\0");
        assert_eq!(&bytes[8..12], &[0, 1, 1, 3]);
        assert_eq!(peek(&bytes).unwrap(), (BackendKind::Groth16, ArtifactKind::Proof));
        assert_eq!(peek(&vk.encode().unwrap()).unwrap().1, ArtifactKind::VerifyingKey);
    }

    #[test]
    fn encoding_is_deterministic_and_decodes() {
        let (pk, vk, proof) = groth16_artifacts();
        let bytes = vk.encode().unwrap();
        assert_eq!(bytes, vk.encode().unwrap());
        let back = VerifyingKey::decode(BackendKind::Groth16, &bytes).unwrap();
        assert_eq!(back.encode().unwrap(), bytes);
        assert_eq!(back.shape(), vk.shape());

        let pk_bytes = pk.encode().unwrap();
        let pk_back = ProvingKey::decode(BackendKind::Groth16, &pk_bytes).unwrap();
        assert_eq!(pk_back.encode().unwrap(), pk_bytes);

        let proof_bytes = proof.encode().unwrap();
        let proof_back = Proof::decode(BackendKind::Groth16, &proof_bytes).unwrap();
        assert_eq!(proof_back.circuit_digest(), proof.circuit_digest());
    }

    #[test]
    fn rejects_malformed_envelopes() {
        let (_, vk, proof) = groth16_artifacts();
        let bytes = proof.encode().unwrap();

        assert!(matches!(Proof::decode(BackendKind::Groth16, &bytes[..5]), Err(CodecError::Truncated(5))));

        let mut magic = bytes.clone();
        magic[0] = b'X';
        assert!(matches!(Proof::decode(BackendKind::Groth16, &magic), Err(CodecError::BadMagic)));

        let mut version = bytes.clone();
        version[9] = 7;
        assert!(matches!(
            Proof::decode(BackendKind::Groth16, &version),
            Err(CodecError::UnsupportedVersion(7))
        ));

        assert!(matches!(
            Proof::decode(BackendKind::Plonk, &bytes),
            Err(CodecError::BackendMismatch { expected: BackendKind::Plonk, got: 1 })
        ));

        let vk_bytes = vk.encode().unwrap();
        assert!(matches!(
            Proof::decode(BackendKind::Groth16, &vk_bytes),
            Err(CodecError::ArtifactMismatch { expected: ArtifactKind::Proof, got: 2 })
        ));

        let mut trailing = bytes.clone();
        trailing.push(0);
        assert!(matches!(
            Proof::decode(BackendKind::Groth16, &trailing),
            Err(CodecError::TrailingBytes(1))
        ));

        let short = &bytes[..bytes.len() - 1];
        assert!(matches!(Proof::decode(BackendKind::Groth16, short), Err(CodecError::Payload(_))));
    }
}
