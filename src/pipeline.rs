//! End-to-end prove and verify flows.
//!
//! ```text
//! prove : build → compile → setup → assign_full → prove
//! verify: claim check → build (key shape, final dims) → digest check
//!         → assign_public → verify
//! ```
//!
//! The file variants add image decode and artifact persistence under
//! `<proof_dir>/<transform>/{proof.bin,vkey.bin}`. Both artifacts are
//! encoded and staged as temporary files in that directory before either is
//! renamed into place. A rename failure undoes the renames already made and
//! restores the previous files, so a failed run never leaves a fresh
//! `proof.bin` next to a stale `vkey.bin`.
//!
//! Verifying keys are trusted input. The digest check in
//! [`TransformationPipeline::verify`] catches a key paired with the wrong
//! statement or grid size; it does not bind the key's commitments to the
//! rebuilt circuit.

#![forbid(unsafe_code)]

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tempfile::{NamedTempFile, TempDir};

use crate::backend::{backend_for, BackendError, BackendKind, Proof, ProofBackend, VerifyingKey};
use crate::circuit::Circuit;
use crate::codec::Artifact;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Stage};
use crate::grid::{Dims, PixelGrid};
use crate::transform::{TransformKind, TransformationSpec};
use crate::witness::WitnessAssigner;

/// Proof file name inside a transform's artifact directory.
pub const PROOF_FILE: &str = "proof.bin";
/// Verifying key file name inside a transform's artifact directory.
pub const VKEY_FILE: &str = "vkey.bin";

/// Output of a successful prove flow.
#[derive(Clone, Debug)]
pub struct ProofArtifacts {
    /// The proof.
    pub proof: Proof,
    /// Key that verifies it.
    pub verifying_key: VerifyingKey,
}

/// Wall-clock time spent in each prove stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProveTimings {
    /// Circuit build plus backend compile.
    pub compile: Duration,
    /// Key generation.
    pub setup: Duration,
    /// Witness assignment plus proving.
    pub prove: Duration,
}

/// Summary of [`TransformationPipeline::prove_files`].
#[derive(Clone, Debug)]
pub struct ProveReport {
    /// Statement proven.
    pub spec: TransformationSpec,
    /// Backend used.
    pub backend: BackendKind,
    /// Original grid dimensions.
    pub original: Dims,
    /// Final grid dimensions.
    pub final_dims: Dims,
    /// Directory holding the artifacts.
    pub dir: PathBuf,
    /// Encoded proof size.
    pub proof_bytes: usize,
    /// Encoded verifying key size.
    pub vkey_bytes: usize,
    /// Stage timings.
    pub timings: ProveTimings,
}

impl ProveReport {
    /// `| original | final | compile s | prove s | proof bytes | backend |`
    pub fn markdown_row(&self) -> String {
        format!(
            "| {} | {} | {:.3} | {:.3} | {} | {} |",
            self.original,
            self.final_dims,
            (self.timings.compile + self.timings.setup).as_secs_f64(),
            self.timings.prove.as_secs_f64(),
            self.proof_bytes,
            self.backend
        )
    }
}

/// Header written before the first row of a fresh benchmark file.
pub const MARKDOWN_HEADER: &str = "| original | final | compile s | prove s | proof bytes | backend |\n\
                                   |---|---|---|---|---|---|";

/// Append `report` to a markdown table at `path`, writing the header first if
/// the file is new or empty.
pub fn append_markdown_row(path: &Path, report: &ProveReport) -> Result<(), PipelineError> {
    let fresh = std::fs::metadata(path).map_or(true, |m| m.len() == 0);
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(PipelineError::io(Stage::Persist, path))?;
    let mut text = String::new();
    if fresh {
        text.push_str(MARKDOWN_HEADER);
        text.push('\n');
    }
    text.push_str(&report.markdown_row());
    text.push('\n');
    file.write_all(text.as_bytes()).map_err(PipelineError::io(Stage::Persist, path))
}

/// Outcome of [`TransformationPipeline::verify_files`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Verification {
    /// Whether the proof was accepted.
    pub accepted: bool,
    /// Statement the verifying key proves, parameters included.
    pub statement: TransformationSpec,
}

/// What a verifier checks the verifying key against.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Claim {
    /// Any parameters of this kind; they are read from the key.
    Kind(TransformKind),
    /// Exactly this transform and parameters.
    Exact(TransformationSpec),
}

impl Claim {
    /// Kind claimed.
    pub fn kind(&self) -> TransformKind {
        match self {
            Claim::Kind(kind) => *kind,
            Claim::Exact(spec) => spec.kind(),
        }
    }

    fn admits(&self, key: &TransformationSpec) -> bool {
        match self {
            Claim::Kind(kind) => key.kind() == *kind,
            Claim::Exact(spec) => spec == key,
        }
    }
}

impl fmt::Display for Claim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Claim::Kind(kind) => write!(f, "{kind}"),
            Claim::Exact(spec) => write!(f, "{spec}"),
        }
    }
}

/// Orchestrates one backend over the prove and verify flows.
pub struct TransformationPipeline {
    config: PipelineConfig,
    backend: Box<dyn ProofBackend>,
}

impl fmt::Debug for TransformationPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformationPipeline")
            .field("config", &self.config)
            .field("backend", &self.backend.kind())
            .finish()
    }
}

fn ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

impl TransformationPipeline {
    /// Pipeline using the backend named in `config`.
    pub fn new(config: PipelineConfig) -> Self {
        let backend = backend_for(config.backend, &config);
        Self { config, backend }
    }

    /// Pipeline with an explicitly constructed backend.
    pub fn with_backend(config: PipelineConfig, backend: Box<dyn ProofBackend>) -> Self {
        Self { config, backend }
    }

    /// Active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Active backend.
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Artifact directory for `kind`.
    pub fn artifact_dir(&self, kind: TransformKind) -> PathBuf {
        self.config.proof_dir.join(kind.name())
    }

    /// Prove that `final_grid` is `spec` applied to `original`.
    pub fn prove(
        &self,
        spec: TransformationSpec,
        original: &PixelGrid,
        final_grid: &PixelGrid,
    ) -> Result<ProofArtifacts, PipelineError> {
        self.prove_timed(spec, original, final_grid).map(|(artifacts, _)| artifacts)
    }

    fn prove_timed(
        &self,
        spec: TransformationSpec,
        original: &PixelGrid,
        final_grid: &PixelGrid,
    ) -> Result<(ProofArtifacts, ProveTimings), PipelineError> {
        let span = tracing::info_span!("prove", transform = %spec, backend = %self.backend.kind());
        let _enter = span.enter();

        let t = Instant::now();
        let circuit = Arc::new(Circuit::build(spec, original.dims(), final_grid.dims())?);
        let program =
            self.backend.compile(circuit.clone()).map_err(PipelineError::backend(Stage::Compile))?;
        let compile = t.elapsed();
        tracing::info!(
            gates = circuit.gates().len(),
            variables = circuit.num_vars(),
            public = circuit.num_public(),
            ms = ms(compile),
            "compiled"
        );

        let t = Instant::now();
        let (pk, verifying_key) =
            self.backend.setup(&program).map_err(PipelineError::backend(Stage::Setup))?;
        let setup = t.elapsed();
        tracing::info!(ms = ms(setup), "setup done");

        let t = Instant::now();
        let witness = WitnessAssigner::assign_full(&circuit, original, final_grid)?;
        let proof = self
            .backend
            .prove(&program, &pk, &witness)
            .map_err(PipelineError::backend(Stage::Prove))?;
        let prove = t.elapsed();
        tracing::info!(ms = ms(prove), digest = %hex::encode(circuit.digest()), "proved");

        Ok((ProofArtifacts { proof, verifying_key }, ProveTimings { compile, setup, prove }))
    }

    /// Check `proof` for `claim` against the public `final_grid`.
    ///
    /// `vk` must come from a trusted setup. The circuit is rebuilt from the
    /// key's shape and its digest compared with the one the key carries,
    /// which rejects honest mix-ups but not a key forged to carry a matching
    /// digest.
    ///
    /// `Ok(false)` means the proof was well formed and rejected.
    pub fn verify(
        &self,
        claim: &Claim,
        final_grid: &PixelGrid,
        proof: &Proof,
        vk: &VerifyingKey,
    ) -> Result<bool, PipelineError> {
        let span = tracing::info_span!("verify", claim = %claim, backend = %self.backend.kind());
        let _enter = span.enter();
        let t = Instant::now();

        let expected = self.backend.kind();
        for got in [vk.backend(), proof.backend()] {
            if got != expected {
                return Err(PipelineError::Backend {
                    stage: Stage::Verify,
                    source: BackendError::WrongBackend { expected, got },
                });
            }
        }
        let shape = *vk.shape();
        if !claim.admits(&shape.spec) {
            return Err(PipelineError::StatementMismatch {
                claimed: claim.to_string(),
                key: shape.spec,
            });
        }
        let circuit = Circuit::build(shape.spec, shape.original, final_grid.dims())?;
        if circuit.digest() != vk.circuit_digest() {
            return Err(PipelineError::Backend {
                stage: Stage::Verify,
                source: BackendError::CircuitMismatch,
            });
        }
        let public = WitnessAssigner::assign_public(&circuit, final_grid)?;
        let accepted = self
            .backend
            .verify(vk, proof, &public)
            .map_err(PipelineError::backend(Stage::Verify))?;
        tracing::info!(accepted, ms = ms(t.elapsed()), "verified");
        Ok(accepted)
    }

    /// Decode both images, prove, and persist `proof.bin` and `vkey.bin`.
    pub fn prove_files(
        &self,
        spec: TransformationSpec,
        original_path: &Path,
        final_path: &Path,
    ) -> Result<ProveReport, PipelineError> {
        let original = load_grid(original_path)?;
        let final_grid = load_grid(final_path)?;
        let (artifacts, timings) = self.prove_timed(spec, &original, &final_grid)?;

        let proof_bytes =
            artifacts.proof.encode().map_err(PipelineError::codec(Stage::Encode))?;
        let vkey_bytes =
            artifacts.verifying_key.encode().map_err(PipelineError::codec(Stage::Encode))?;

        let dir = self.artifact_dir(spec.kind());
        persist_all(&dir, &[(PROOF_FILE, proof_bytes.as_slice()), (VKEY_FILE, vkey_bytes.as_slice())])?;
        tracing::info!(
            dir = %dir.display(),
            proof_bytes = proof_bytes.len(),
            vkey_bytes = vkey_bytes.len(),
            "artifacts written"
        );

        Ok(ProveReport {
            spec,
            backend: self.backend.kind(),
            original: original.dims(),
            final_dims: final_grid.dims(),
            dir,
            proof_bytes: proof_bytes.len(),
            vkey_bytes: vkey_bytes.len(),
            timings,
        })
    }

    /// Read the persisted artifacts for `claim` and verify them against the
    /// image at `final_path`.
    pub fn verify_files(
        &self,
        claim: &Claim,
        final_path: &Path,
    ) -> Result<Verification, PipelineError> {
        let final_grid = load_grid(final_path)?;
        let dir = self.artifact_dir(claim.kind());
        let backend = self.backend.kind();

        let proof_path = dir.join(PROOF_FILE);
        let bytes = std::fs::read(&proof_path).map_err(PipelineError::io(Stage::Decode, &proof_path))?;
        let proof = Proof::decode(backend, &bytes).map_err(PipelineError::codec(Stage::Decode))?;

        let vkey_path = dir.join(VKEY_FILE);
        let bytes = std::fs::read(&vkey_path).map_err(PipelineError::io(Stage::Decode, &vkey_path))?;
        let vk =
            VerifyingKey::decode(backend, &bytes).map_err(PipelineError::codec(Stage::Decode))?;

        let accepted = self.verify(claim, &final_grid, &proof, &vk)?;
        Ok(Verification { accepted, statement: vk.shape().spec })
    }
}

fn load_grid(path: &Path) -> Result<PixelGrid, PipelineError> {
    PixelGrid::load(path).map_err(|source| match source {
        crate::grid::GridError::Codec(image::ImageError::IoError(e)) => {
            PipelineError::Io { stage: Stage::Decode, path: path.to_path_buf(), source: e }
        }
        source => PipelineError::Image { path: path.to_path_buf(), source },
    })
}

/// Stage every file, then rename them all into place.
///
/// Existing targets are moved into a scratch directory first. If any rename
/// fails, files already placed are removed and the previous ones restored.
fn persist_all(dir: &Path, files: &[(&str, &[u8])]) -> Result<(), PipelineError> {
    std::fs::create_dir_all(dir).map_err(PipelineError::io(Stage::Persist, dir))?;
    let mut staged = Vec::with_capacity(files.len());
    for (name, bytes) in files {
        let mut tmp = NamedTempFile::new_in(dir).map_err(PipelineError::io(Stage::Persist, dir))?;
        tmp.write_all(bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(PipelineError::io(Stage::Persist, tmp.path()))?;
        staged.push((tmp, *name));
    }

    let backups = TempDir::new_in(dir).map_err(PipelineError::io(Stage::Persist, dir))?;
    let mut placed: Vec<(PathBuf, Option<PathBuf>)> = Vec::with_capacity(staged.len());
    for (tmp, name) in staged {
        let target = dir.join(name);
        let backup = if target.is_file() {
            let aside = backups.path().join(name);
            if let Err(source) = std::fs::rename(&target, &aside) {
                roll_back(&placed);
                return Err(PipelineError::Io { stage: Stage::Persist, path: target, source });
            }
            Some(aside)
        } else {
            None
        };
        if let Err(e) = tmp.persist(&target) {
            if let Some(aside) = &backup {
                let _ = std::fs::rename(aside, &target);
            }
            roll_back(&placed);
            return Err(PipelineError::Io { stage: Stage::Persist, path: target, source: e.error });
        }
        placed.push((target, backup));
    }
    Ok(())
}

// best effort; the original error is what the caller sees
fn roll_back(placed: &[(PathBuf, Option<PathBuf>)]) {
    for (target, backup) in placed.iter().rev() {
        match backup {
            Some(aside) => {
                let _ = std::fs::rename(aside, target);
            }
            None => {
                let _ = std::fs::remove_file(target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn report(dir: PathBuf) -> ProveReport {
        ProveReport {
            spec: TransformationSpec::Rotate90,
            backend: BackendKind::Groth16,
            original: Dims::new(2, 3),
            final_dims: Dims::new(3, 2),
            dir,
            proof_bytes: 128,
            vkey_bytes: 600,
            timings: ProveTimings {
                compile: Duration::from_millis(250),
                setup: Duration::from_millis(250),
                prove: Duration::from_millis(1500),
            },
        }
    }

    #[test]
    fn markdown_rows_append_under_one_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.md");
        let r = report(dir.path().to_path_buf());
        append_markdown_row(&path, &r).unwrap();
        append_markdown_row(&path, &r).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "| 2x3 | 3x2 | 0.500 | 1.500 | 128 | groth16 |");
        assert_eq!(lines[2], lines[3]);
    }

    #[test]
    fn persist_writes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("crop");
        persist_all(&target, &[(PROOF_FILE, &b"p"[..]), (VKEY_FILE, &b"vk"[..])]).unwrap();
        assert_eq!(std::fs::read(target.join(PROOF_FILE)).unwrap(), b"p");
        assert_eq!(std::fs::read(target.join(VKEY_FILE)).unwrap(), b"vk");
        // only the two artifacts remain
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 2);
    }

    fn block_vkey(target: &Path) {
        // a non-empty directory cannot be replaced by a rename
        std::fs::create_dir_all(target.join(VKEY_FILE)).unwrap();
        std::fs::write(target.join(VKEY_FILE).join("keep"), b"x").unwrap();
    }

    #[test]
    fn failed_second_rename_removes_the_new_proof() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("rotate180");
        block_vkey(&target);
        let err = persist_all(&target, &[(PROOF_FILE, &b"p"[..]), (VKEY_FILE, &b"vk"[..])])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.stage(), Stage::Persist);
        assert!(!target.join(PROOF_FILE).exists());
        let left: Vec<_> = std::fs::read_dir(&target)
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![std::ffi::OsString::from(VKEY_FILE)]);
    }

    #[test]
    fn failed_second_rename_restores_the_previous_proof() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("rotate180");
        block_vkey(&target);
        std::fs::write(target.join(PROOF_FILE), b"old").unwrap();
        assert!(persist_all(&target, &[(PROOF_FILE, &b"new"[..]), (VKEY_FILE, &b"vk"[..])])
            .is_err());
        assert_eq!(std::fs::read(target.join(PROOF_FILE)).unwrap(), b"old");
        assert!(target.join(VKEY_FILE).join("keep").is_file());
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 2);
    }

    #[test]
    fn persist_replaces_previous_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("crop");
        persist_all(&target, &[(PROOF_FILE, &b"p1"[..]), (VKEY_FILE, &b"v1"[..])]).unwrap();
        persist_all(&target, &[(PROOF_FILE, &b"p2"[..]), (VKEY_FILE, &b"v2"[..])]).unwrap();
        assert_eq!(std::fs::read(target.join(PROOF_FILE)).unwrap(), b"p2");
        assert_eq!(std::fs::read(target.join(VKEY_FILE)).unwrap(), b"v2");
        assert_eq!(std::fs::read_dir(&target).unwrap().count(), 2);
    }

    #[test]
    fn claims_admit_keys() {
        let spec = TransformationSpec::Brighten { delta: 10 };
        assert!(Claim::Kind(TransformKind::Brighten).admits(&spec));
        assert!(Claim::Exact(spec).admits(&spec));
        assert!(!Claim::Exact(TransformationSpec::Brighten { delta: 11 }).admits(&spec));
        assert!(!Claim::Kind(TransformKind::Contrast).admits(&spec));
    }

    #[test]
    fn missing_images_are_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = TransformationPipeline::new(PipelineConfig {
            proof_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        let missing = dir.path().join("nope.png");
        let err = pipeline
            .prove_files(TransformationSpec::Rotate180, &missing, &missing)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.stage(), Stage::Decode);
    }
}
