//! Pipeline errors and their user-facing taxonomy.

use std::fmt;
use std::path::PathBuf;

use crate::backend::BackendError;
use crate::circuit::BuildError;
use crate::codec::CodecError;
use crate::config::ConfigError;
use crate::grid::GridError;
use crate::transform::TransformationSpec;
use crate::witness::WitnessError;

/// Coarse error class, one per user-visible failure mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Image, artifact or config file access.
    Io,
    /// A geometric invariant or circuit/grid shape disagreement.
    DimensionMismatch,
    /// An artifact failed to decode or belongs to another backend.
    CorruptArtifact,
    /// Compile, setup or prove failed inside a proving system.
    Backend,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Io => "io",
            ErrorKind::DimensionMismatch => "dimension mismatch",
            ErrorKind::CorruptArtifact => "corrupt artifact",
            ErrorKind::Backend => "backend",
        })
    }
}

/// Pipeline stage an error was raised in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Stage {
    Config,
    Decode,
    Build,
    Witness,
    Compile,
    Setup,
    Prove,
    Encode,
    Persist,
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Config => "config",
            Stage::Decode => "decode",
            Stage::Build => "build",
            Stage::Witness => "witness",
            Stage::Compile => "compile",
            Stage::Setup => "setup",
            Stage::Prove => "prove",
            Stage::Encode => "encode",
            Stage::Persist => "persist",
            Stage::Verify => "verify",
        })
    }
}

/// Any failure of a prove or verify flow.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// File access.
    #[error("{stage}: {}: {source}", path.display())]
    Io {
        /// Stage doing the access.
        stage: Stage,
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// An image file could not be decoded into a grid.
    #[error("decode: {}: {source}", path.display())]
    Image {
        /// Image path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: GridError,
    },
    /// Configuration could not be resolved.
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    /// Circuit construction rejected the statement.
    #[error("build: {0}")]
    Build(#[from] BuildError),
    /// Grid shapes disagree with the circuit.
    #[error("witness: {0}")]
    Witness(#[from] WitnessError),
    /// Artifact encode or decode.
    #[error("{stage}: {source}")]
    Codec {
        /// `encode` or `decode`.
        stage: Stage,
        /// Underlying error.
        #[source]
        source: CodecError,
    },
    /// Proving-system failure.
    #[error("{stage}: {source}")]
    Backend {
        /// Stage that called the backend.
        stage: Stage,
        /// Underlying error.
        #[source]
        source: BackendError,
    },
    /// The verifying key was produced for another statement.
    #[error("verify: key proves {key}, but {claimed} was claimed")]
    StatementMismatch {
        /// What the verifier asked about.
        claimed: String,
        /// What the key proves.
        key: TransformationSpec,
    },
}

impl PipelineError {
    pub(crate) fn backend(stage: Stage) -> impl FnOnce(BackendError) -> Self {
        move |source| PipelineError::Backend { stage, source }
    }

    pub(crate) fn codec(stage: Stage) -> impl FnOnce(CodecError) -> Self {
        move |source| PipelineError::Codec { stage, source }
    }

    pub(crate) fn io(stage: Stage, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PipelineError::Io { stage, path, source }
    }

    /// Taxonomy class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Io { .. } | PipelineError::Config(_) => ErrorKind::Io,
            PipelineError::Image { source: GridError::Codec(_), .. } => ErrorKind::Io,
            PipelineError::Image { .. } => ErrorKind::DimensionMismatch,
            PipelineError::Build(_) | PipelineError::Witness(_) => ErrorKind::DimensionMismatch,
            PipelineError::StatementMismatch { .. } => ErrorKind::DimensionMismatch,
            PipelineError::Codec { source: CodecError::Encode(_), .. } => ErrorKind::Backend,
            PipelineError::Codec { .. } => ErrorKind::CorruptArtifact,
            PipelineError::Backend { source, .. } => match source {
                BackendError::WrongBackend { .. } | BackendError::MalformedKey(_) => {
                    ErrorKind::CorruptArtifact
                }
                BackendError::CircuitMismatch | BackendError::PublicInputLength { .. } => {
                    ErrorKind::DimensionMismatch
                }
                _ => ErrorKind::Backend,
            },
        }
    }

    /// Stage that failed.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Io { stage, .. }
            | PipelineError::Codec { stage, .. }
            | PipelineError::Backend { stage, .. } => *stage,
            PipelineError::Image { .. } => Stage::Decode,
            PipelineError::Config(_) => Stage::Config,
            PipelineError::Build(_) => Stage::Build,
            PipelineError::Witness(_) => Stage::Witness,
            PipelineError::StatementMismatch { .. } => Stage::Verify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Dims;
    use crate::transform::TransformKind;

    #[test]
    fn kinds_follow_the_taxonomy() {
        let build = PipelineError::from(BuildError::DimensionMismatch {
            kind: TransformKind::Rotate90,
            original: Dims::new(2, 3),
            final_dims: Dims::new(2, 3),
        });
        assert_eq!(build.kind(), ErrorKind::DimensionMismatch);
        assert_eq!(build.stage(), Stage::Build);

        let codec = PipelineError::codec(Stage::Decode)(CodecError::BadMagic);
        assert_eq!(codec.kind(), ErrorKind::CorruptArtifact);

        let unsat = PipelineError::backend(Stage::Prove)(BackendError::Unsatisfied { gate: 3 });
        assert_eq!(unsat.kind(), ErrorKind::Backend);
        assert_eq!(unsat.stage(), Stage::Prove);
        assert_eq!(unsat.to_string(), "prove: witness does not satisfy gate 3");

        let io = PipelineError::io(Stage::Persist, "proofs/crop/proof.bin")(std::io::Error::from(
            std::io::ErrorKind::PermissionDenied,
        ));
        assert_eq!(io.kind(), ErrorKind::Io);
        assert_eq!(io.stage(), Stage::Persist);
    }
}
