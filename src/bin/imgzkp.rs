//! `imgzkp` command-line entry point
//!
//! ```text
//! imgzkp prove  <kind> --original-image A.png --final-image B.png [--proof-dir D] [--backend plonk]
//! imgzkp verify <kind> --final-image B.png [--proof-dir D] [--backend plonk]
//! imgzkp apply  <kind> --original-image A.png --final-image B.png
//! ```
//!
//! Parameters: `--row-offset/--col-offset` (crop), `--delta` (brighten),
//! `--factor` (contrast). `verify` checks the exact parameters when any are
//! given and otherwise accepts whatever the verifying key proves for `<kind>`.
//!
//! Exit status is 0 when the command ran, including a rejected proof, and 1
//! on any error.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use imgzkp::pipeline::append_markdown_row;
use imgzkp::{
    BackendKind, Claim, Dims, PipelineConfig, PixelGrid, TransformKind, TransformationPipeline,
    TransformationSpec,
};

#[derive(Parser, Debug)]
#[command(name = "imgzkp", version, about = "Zero-knowledge proofs of image transformations")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true, env = "IMGZKP_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Prove that the final image is a transformation of the original.
    Prove(ProveArgs),
    /// Verify a persisted proof against the final image.
    Verify(VerifyArgs),
    /// Write the transformed image for a given original.
    Apply(ApplyArgs),
}

#[derive(Args, Debug)]
struct TransformArgs {
    /// crop, rotate90, rotate180, rotate270, flip_horizontal, flip_vertical,
    /// brighten or contrast.
    kind: TransformKind,

    /// First original row kept by a crop.
    #[arg(long)]
    row_offset: Option<usize>,

    /// First original column kept by a crop.
    #[arg(long)]
    col_offset: Option<usize>,

    /// Brighten offset, -255..=255.
    #[arg(long, allow_negative_numbers = true)]
    delta: Option<i32>,

    /// Contrast factor, -100..=100.
    #[arg(long, allow_negative_numbers = true)]
    factor: Option<i32>,
}

impl TransformArgs {
    fn has_params(&self) -> bool {
        self.row_offset.is_some()
            || self.col_offset.is_some()
            || self.delta.is_some()
            || self.factor.is_some()
    }

    /// Full statement; offsets default to 0, `delta` and `factor` are required.
    fn spec(&self) -> anyhow::Result<TransformationSpec> {
        Ok(match self.kind {
            TransformKind::Crop => TransformationSpec::Crop {
                row_offset: self.row_offset.unwrap_or(0),
                col_offset: self.col_offset.unwrap_or(0),
            },
            TransformKind::Rotate90 => TransformationSpec::Rotate90,
            TransformKind::Rotate180 => TransformationSpec::Rotate180,
            TransformKind::Rotate270 => TransformationSpec::Rotate270,
            TransformKind::FlipHorizontal => TransformationSpec::FlipHorizontal,
            TransformKind::FlipVertical => TransformationSpec::FlipVertical,
            TransformKind::Brighten => TransformationSpec::Brighten {
                delta: self.delta.context("brighten needs --delta")?,
            },
            TransformKind::Contrast => TransformationSpec::Contrast {
                factor: self.factor.context("contrast needs --factor")?,
            },
        })
    }

    fn claim(&self) -> anyhow::Result<Claim> {
        if self.has_params() {
            Ok(Claim::Exact(self.spec()?))
        } else {
            Ok(Claim::Kind(self.kind))
        }
    }
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Artifact root; files go under `<proof-dir>/<kind>/`.
    #[arg(long)]
    proof_dir: Option<PathBuf>,

    /// groth16 or plonk.
    #[arg(long)]
    backend: Option<BackendKind>,
}

impl PipelineArgs {
    fn pipeline(&self, config: Option<&std::path::Path>) -> anyhow::Result<TransformationPipeline> {
        let mut config = PipelineConfig::load(config)?;
        if let Some(dir) = &self.proof_dir {
            config.proof_dir = dir.clone();
        }
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        tracing::debug!(?config, "resolved configuration");
        Ok(TransformationPipeline::new(config))
    }
}

#[derive(Args, Debug)]
struct ProveArgs {
    #[command(flatten)]
    transform: TransformArgs,

    /// Secret original image.
    #[arg(long)]
    original_image: PathBuf,

    /// Public final image.
    #[arg(long)]
    final_image: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Append a benchmark row to this markdown file.
    #[arg(long)]
    markdown_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    #[command(flatten)]
    transform: TransformArgs,

    /// Public final image.
    #[arg(long)]
    final_image: PathBuf,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct ApplyArgs {
    #[command(flatten)]
    transform: TransformArgs,

    /// Input image.
    #[arg(long)]
    original_image: PathBuf,

    /// Output image; the format follows the extension.
    #[arg(long)]
    final_image: PathBuf,

    /// Crop window height.
    #[arg(long)]
    crop_height: Option<usize>,

    /// Crop window width.
    #[arg(long)]
    crop_width: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if cli.log_json {
        fmt.json().init();
    } else {
        fmt.compact().init();
    }

    let config = cli.config.as_deref();
    let result = match &cli.command {
        Command::Prove(args) => run_prove(args, config),
        Command::Verify(args) => run_verify(args, config),
        Command::Apply(args) => run_apply(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<imgzkp::PipelineError>() {
                Some(pe) => tracing::error!(kind = %pe.kind(), stage = %pe.stage(), "{e:#}"),
                None => tracing::error!("{e:#}"),
            }
            ExitCode::from(1)
        }
    }
}

fn run_prove(args: &ProveArgs, config: Option<&std::path::Path>) -> anyhow::Result<()> {
    let spec = args.transform.spec()?;
    let pipeline = args.pipeline.pipeline(config)?;
    let report = pipeline.prove_files(spec, &args.original_image, &args.final_image)?;
    if let Some(path) = &args.markdown_file {
        append_markdown_row(path, &report)?;
    }
    println!(
        "Proof written to {} ({} bytes, {})",
        report.dir.display(),
        report.proof_bytes,
        report.backend
    );
    Ok(())
}

fn run_verify(args: &VerifyArgs, config: Option<&std::path::Path>) -> anyhow::Result<()> {
    let claim = args.transform.claim()?;
    let pipeline = args.pipeline.pipeline(config)?;
    let outcome = pipeline.verify_files(&claim, &args.final_image)?;
    if outcome.accepted {
        println!("Proof verified: {}", outcome.statement);
    } else {
        println!("Invalid proof: {}", outcome.statement);
    }
    Ok(())
}

fn run_apply(args: &ApplyArgs) -> anyhow::Result<()> {
    let spec = args.transform.spec()?;
    let original = PixelGrid::load(&args.original_image)
        .with_context(|| format!("reading {}", args.original_image.display()))?;
    let crop = match (args.crop_height, args.crop_width) {
        (Some(h), Some(w)) => Some(Dims::new(h, w)),
        (None, None) => None,
        _ => anyhow::bail!("--crop-height and --crop-width go together"),
    };
    let out = spec.apply(&original, crop)?;
    out.save(&args.final_image)
        .with_context(|| format!("writing {}", args.final_image.display()))?;
    println!("{} -> {} ({})", original.dims(), out.dims(), spec);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_prove_crop() {
        let cli = Cli::try_parse_from([
            "imgzkp",
            "prove",
            "crop",
            "--original-image",
            "a.png",
            "--final-image",
            "b.png",
            "--row-offset",
            "1",
            "--backend",
            "plonk",
        ])
        .unwrap();
        let Command::Prove(args) = cli.command else { panic!("expected prove") };
        assert_eq!(
            args.transform.spec().unwrap(),
            TransformationSpec::Crop { row_offset: 1, col_offset: 0 }
        );
        assert_eq!(args.pipeline.backend, Some(BackendKind::Plonk));
    }

    #[test]
    fn negative_delta_parses() {
        let cli = Cli::try_parse_from([
            "imgzkp",
            "verify",
            "brighten",
            "--final-image",
            "b.png",
            "--delta",
            "-20",
        ])
        .unwrap();
        let Command::Verify(args) = cli.command else { panic!("expected verify") };
        assert_eq!(
            args.transform.claim().unwrap(),
            Claim::Exact(TransformationSpec::Brighten { delta: -20 })
        );
    }

    #[test]
    fn verify_without_params_claims_the_kind() {
        let cli =
            Cli::try_parse_from(["imgzkp", "verify", "contrast", "--final-image", "b.png"]).unwrap();
        let Command::Verify(args) = cli.command else { panic!("expected verify") };
        assert_eq!(args.transform.claim().unwrap(), Claim::Kind(TransformKind::Contrast));
        assert!(args.transform.spec().is_err());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(Cli::try_parse_from(["imgzkp", "verify", "blur", "--final-image", "b.png"]).is_err());
    }
}
