//! Pipeline configuration.
//!
//! Resolution order, later wins:
//!
//! 1. built-in defaults
//! 2. a JSON file (`--config <path>`)
//! 3. environment: `IMGZKP_BACKEND`, `IMGZKP_PROOF_DIR`, `IMGZKP_SRS_G1`,
//!    `IMGZKP_SRS_G2`, `IMGZKP_VALIDATE_PAIRING`
//! 4. command-line flags, applied by the binary
//!
//! ```json
//! { "backend": "plonk", "proof_dir": "proofs", "srs_g1": "G1.bin", "srs_g2": "G2.bin" }
//! ```

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::BackendKind;

/// Environment variable names.
pub mod env {
    /// Backend name.
    pub const BACKEND: &str = "IMGZKP_BACKEND";
    /// Artifact root.
    pub const PROOF_DIR: &str = "IMGZKP_PROOF_DIR";
    /// PLONK G1 SRS file.
    pub const SRS_G1: &str = "IMGZKP_SRS_G1";
    /// PLONK G2 SRS file.
    pub const SRS_G2: &str = "IMGZKP_SRS_G2";
    /// `1`/`true` to run the SRS pairing check.
    pub const VALIDATE_PAIRING: &str = "IMGZKP_VALIDATE_PAIRING";
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("reading config {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid JSON for [`PipelineConfig`].
    #[error("parsing config {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },
    /// An environment override could not be parsed.
    #[error("{var}={value:?}: {reason}")]
    Env {
        /// Variable name.
        var: &'static str,
        /// Raw value.
        value: String,
        /// What was wrong.
        reason: String,
    },
    /// Settings are inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by the pipeline and both binaries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Proving system.
    pub backend: BackendKind,
    /// Artifact root; each transform writes under `<proof_dir>/<name>/`.
    pub proof_dir: PathBuf,
    /// PLONK G1 powers file.
    pub srs_g1: Option<PathBuf>,
    /// PLONK G2 file.
    pub srs_g2: Option<PathBuf>,
    /// Run the pairing consistency check when loading the SRS.
    pub validate_srs_pairing: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Groth16,
            proof_dir: PathBuf::from("proofs"),
            srs_g1: None,
            srs_g2: None,
            validate_srs_pairing: false,
        }
    }
}

impl PipelineConfig {
    /// Defaults, then `path` if given, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_with(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a JSON config file; absent fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        serde_json::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(value) = lookup(env::BACKEND) {
            self.backend = value.parse().map_err(|e: crate::backend::UnknownBackend| {
                ConfigError::Env { var: env::BACKEND, value: value.clone(), reason: e.to_string() }
            })?;
        }
        if let Some(value) = lookup(env::PROOF_DIR) {
            self.proof_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup(env::SRS_G1) {
            self.srs_g1 = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(env::SRS_G2) {
            self.srs_g2 = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup(env::VALIDATE_PAIRING) {
            self.validate_srs_pairing = match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" | "" => false,
                _ => {
                    return Err(ConfigError::Env {
                        var: env::VALIDATE_PAIRING,
                        value,
                        reason: "expected 1/0 or true/false".into(),
                    })
                }
            };
        }
        Ok(())
    }

    /// Both SRS paths or neither.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (&self.srs_g1, &self.srs_g2) {
            (Some(_), None) => Err(ConfigError::Invalid("srs_g1 is set but srs_g2 is not".into())),
            (None, Some(_)) => Err(ConfigError::Invalid("srs_g2 is set but srs_g1 is not".into())),
            _ => Ok(()),
        }
    }
}
