//! Generate a universal KZG SRS for the PLONK backend
//!
//! Writes `G1.bin` (`[τⁱ]G₁` for `i = 0..=degree`) and `G2.bin`
//! (`[G₂, τG₂]`), both arkworks-compressed.
//!
//! # Security Model
//!
//! By default this is a **single-party trusted setup**: τ is drawn from
//! `OsRng`, exists only in memory during generation, and is dropped before the
//! files are written. With `--seed` the SRS is reproducible and τ is known to
//! anyone holding the seed; use that only for local development.
//!
//! A circuit with `n` PLONK rows needs `3n + 6` powers, i.e. `--degree 3n+5`.

#![forbid(unsafe_code)]

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use rand::rngs::OsRng;
use tracing_subscriber::EnvFilter;

use imgzkp::srs_setup::{validate_g1_pairing, Srs};

#[derive(Parser, Debug)]
#[command(name = "generate_srs", about = "Generate a universal KZG SRS (G1.bin, G2.bin)")]
struct Args {
    /// Highest supported polynomial degree.
    #[arg(long, default_value_t = 1 << 14)]
    degree: usize,

    /// G1 output file.
    #[arg(long, default_value = "srs/G1.bin")]
    output_g1: PathBuf,

    /// G2 output file.
    #[arg(long, default_value = "srs/G2.bin")]
    output_g2: PathBuf,

    /// Derive τ from this seed instead of the OS RNG (development only).
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    anyhow::ensure!(args.degree >= 1, "--degree must be at least 1");

    let srs = match args.seed {
        Some(seed) => {
            tracing::warn!(seed, "seeded SRS: tau is recoverable from the seed");
            Srs::from_seed(args.degree, seed)
        }
        None => Srs::generate(args.degree, &mut OsRng),
    };
    validate_g1_pairing(&srs.g1_powers, srs.tau_g2).context("self-check of generated SRS")?;

    for path in [&args.output_g1, &args.output_g2] {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    srs.save(&args.output_g1, &args.output_g2).context("writing SRS files")?;

    tracing::info!(
        degree = srs.max_degree(),
        powers = srs.g1_powers.len(),
        digest = %hex::encode(srs.digest()),
        g1 = %args.output_g1.display(),
        g2 = %args.output_g2.display(),
        "SRS written"
    );
    println!("SRS written: {} / {}", args.output_g1.display(), args.output_g2.display());
    Ok(())
}
