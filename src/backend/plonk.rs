//! PLONK over KZG (BN254).
//!
//! ## Row layout
//!
//! ```text
//! rows 0 .. P        public inputs: q_L = 1 on wire a, PI(ωⁱ) = −xᵢ
//! rows P .. P+G      one circuit gate per row
//! rows P+G .. n      padding, every selector zero
//! ```
//!
//! `n` is the next power of two of `P + G`, at least [`MIN_ROWS`]. Copy
//! constraints use the identities `k_j·ωⁱ` with `k = (1, g, g²)` for the
//! field's multiplicative generator `g`; cells without a variable keep the
//! identity permutation and carry the value zero.
//!
//! ## Protocol
//!
//! 1. blind and commit `a, b, c` → `β, γ`
//! 2. grand product `z` with `z(1) = 1` → `α`
//! 3. quotient `t` = (gate + PI + α·perm + α²·(z − 1)·L₁) / Z_H → `ζ`
//! 4. evaluations at `ζ` and `z(ζω)` → `v`
//! 5. one batched opening at `ζ`, one opening of `z` at `ζω` → `u`
//!
//! The numerator is evaluated on the subgroup of size `8n`, interpolated, and
//! divided exactly by `Xⁿ − 1`; a non-zero remainder means the witness does
//! not satisfy the circuit and no proof is produced.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use ark_bn254::G1Projective;
use ark_ec::AffineRepr;
use ark_ff::{FftField, Field, One, UniformRand, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::rngs::OsRng;

use super::{
    wrong, BackendError, BackendKind, CompiledProgram, Proof, ProofBackend, ProvingKey,
    VerifyingKey,
};
use crate::circuit::{Circuit, CircuitShape};
use crate::config::PipelineConfig;
use crate::domain::{self, Domain, DomainError};
use crate::pcs::{Commitment, CommitterKey, OpeningClaim, OpeningKey};
use crate::quotient::divide_by_vanishing_exact;
use crate::srs_setup::Srs;
use crate::transcript::{FsLabel, Transcript};
use crate::witness::{PublicWitness, Witness};
use crate::F;

/// Smallest row count.
pub const MIN_ROWS: usize = 8;

const QUOTIENT_BLOWUP: usize = 8;
const TRANSCRIPT_LABEL: &str = "imgzkp.plonk.v1";

// selector order
const Q_L: usize = 0;
const Q_R: usize = 1;
const Q_O: usize = 2;
const Q_M: usize = 3;
const Q_C: usize = 4;

/// SRS powers needed for a domain of `n` rows: the quotient has degree at
/// most `3n + 5`.
pub fn srs_powers_for(n: usize) -> usize {
    3 * n + 6
}

fn coset_shifts() -> [F; 3] {
    let g = F::GENERATOR;
    [F::one(), g, g * g]
}

/// Where the PLONK backend gets its SRS.
#[derive(Clone, Debug)]
pub enum SrsSource {
    /// Load `g1`/`g2` files, optionally running the pairing check.
    Files {
        /// G1 powers file.
        g1: PathBuf,
        /// G2 file.
        g2: PathBuf,
        /// Run `e([τ]G₁, G₂) = e(G₁, [τ]G₂)` on load.
        check_pairing: bool,
    },
    /// A caller-provided SRS.
    Fixed(Arc<Srs>),
    /// Sample a fresh SRS from the OS RNG on first use.
    Generate,
}

impl SrsSource {
    /// Files when both paths are configured, otherwise [`SrsSource::Generate`].
    pub fn from_config(config: &PipelineConfig) -> Self {
        match (&config.srs_g1, &config.srs_g2) {
            (Some(g1), Some(g2)) => SrsSource::Files {
                g1: g1.clone(),
                g2: g2.clone(),
                check_pairing: config.validate_srs_pairing,
            },
            _ => SrsSource::Generate,
        }
    }
}

/// PLONK backend; caches its SRS for the lifetime of the instance.
#[derive(Debug)]
pub struct PlonkBackend {
    source: SrsSource,
    cache: Mutex<Option<Arc<Srs>>>,
}

impl PlonkBackend {
    /// Backend drawing its SRS from `source`.
    pub fn new(source: SrsSource) -> Self {
        let cache = match &source {
            SrsSource::Fixed(srs) => Some(srs.clone()),
            _ => None,
        };
        Self { source, cache: Mutex::new(cache) }
    }

    fn srs_for(&self, powers: usize) -> Result<Arc<Srs>, BackendError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(srs) = cache.as_ref() {
            if srs.g1_powers.len() >= powers {
                return Ok(srs.clone());
            }
        }
        let srs = match &self.source {
            SrsSource::Files { g1, g2, check_pairing } => {
                let srs = Srs::load(g1, g2, powers - 1, *check_pairing)?;
                tracing::info!(powers = srs.g1_powers.len(), digest = %hex::encode(srs.digest()), "loaded SRS");
                srs
            }
            SrsSource::Fixed(srs) => {
                return Err(crate::srs_setup::SrsSetupError::Validation(format!(
                    "SRS has {} powers, need {}",
                    srs.g1_powers.len(),
                    powers
                ))
                .into())
            }
            SrsSource::Generate => {
                tracing::warn!(
                    powers,
                    "no SRS files configured; sampling a fresh SRS for this process only"
                );
                Srs::generate(powers - 1, &mut OsRng)
            }
        };
        let srs = Arc::new(srs);
        *cache = Some(srs.clone());
        Ok(srs)
    }
}

/// Row layout and permutation of one circuit.
#[derive(Clone, Debug)]
struct Layout {
    domain: Domain,
    num_public: usize,
    // per column, the variable occupying each row
    wires: Vec<Vec<Option<usize>>>,
    selectors: Vec<Vec<F>>,
    sigma_evals: Vec<Vec<F>>,
    sigmas: Vec<Vec<F>>,
}

impl Layout {
    fn build(circuit: &Circuit) -> Result<Self, BackendError> {
        let num_public = circuit.num_public();
        let num_vars = circuit.num_vars();
        if num_public > num_vars {
            return Err(BackendError::MalformedCircuit(format!(
                "{num_public} public inputs but only {num_vars} variables"
            )));
        }
        let n = (num_public + circuit.gates().len()).next_power_of_two().max(MIN_ROWS);
        let domain = Domain::new(n)?;

        let mut wires = vec![vec![None; n]; 3];
        let mut sel = vec![vec![F::zero(); n]; 5];
        for i in 0..num_public {
            wires[0][i] = Some(i);
            sel[Q_L][i] = F::one();
        }
        for (j, gate) in circuit.gates().iter().enumerate() {
            let row = num_public + j;
            for (col, w) in gate.wires.iter().enumerate() {
                if let Some(v) = w {
                    if v.0 >= num_vars {
                        return Err(BackendError::MalformedCircuit(format!(
                            "gate {j} references variable {} of {num_vars}",
                            v.0
                        )));
                    }
                    wires[col][row] = Some(v.0);
                }
            }
            sel[Q_L][row] = gate.q_l;
            sel[Q_R][row] = gate.q_r;
            sel[Q_O][row] = gate.q_o;
            sel[Q_M][row] = gate.q_m;
            sel[Q_C][row] = gate.q_c;
        }

        // σ maps each cell to the next cell holding the same variable
        let omegas = domain.elements();
        let ks = coset_shifts();
        let mut sigma_evals: Vec<Vec<F>> =
            ks.iter().map(|k| omegas.iter().map(|w| *k * w).collect()).collect();
        let mut cycles: Vec<Vec<(usize, usize)>> = vec![Vec::new(); num_vars];
        for (col, column) in wires.iter().enumerate() {
            for (row, w) in column.iter().enumerate() {
                if let Some(v) = w {
                    cycles[*v].push((col, row));
                }
            }
        }
        for cycle in cycles.iter().filter(|c| c.len() > 1) {
            for (i, &(col, row)) in cycle.iter().enumerate() {
                let (next_col, next_row) = cycle[(i + 1) % cycle.len()];
                sigma_evals[col][row] = ks[next_col] * omegas[next_row];
            }
        }

        let selectors = sel.iter().map(|e| domain.ifft(e)).collect::<Result<Vec<_>, _>>()?;
        let sigmas = sigma_evals.iter().map(|e| domain.ifft(e)).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { domain, num_public, wires, selectors, sigma_evals, sigmas })
    }
}

/// A circuit laid out in PLONK rows.
#[derive(Clone, Debug)]
pub struct PlonkProgram {
    pub(crate) circuit: Arc<Circuit>,
    layout: Arc<Layout>,
}

impl PlonkProgram {
    /// Row count `n`.
    pub fn rows(&self) -> usize {
        self.layout.domain.n
    }
}

/// PLONK verifying key.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
pub struct PlonkVerifyingKey {
    /// Circuit digest.
    pub digest: [u8; 32],
    /// Circuit shape.
    pub shape: CircuitShape,
    /// Row count.
    pub n: u64,
    /// Public input count.
    pub num_public: u64,
    /// `[q_L], [q_R], [q_O], [q_M], [q_C]`.
    pub selectors: Vec<Commitment>,
    /// `[σ₁], [σ₂], [σ₃]`.
    pub sigmas: Vec<Commitment>,
    /// KZG verification elements.
    pub opening_key: OpeningKey,
}

impl PlonkVerifyingKey {
    fn check(&self) -> Result<Domain, BackendError> {
        let n = usize::try_from(self.n)
            .map_err(|_| BackendError::MalformedKey(format!("row count {}", self.n)))?;
        if n < MIN_ROWS || !n.is_power_of_two() {
            return Err(BackendError::MalformedKey(format!("row count {n}")));
        }
        if self.num_public > self.n {
            return Err(BackendError::MalformedKey(format!(
                "{} public inputs in {n} rows",
                self.num_public
            )));
        }
        if self.selectors.len() != 5 || self.sigmas.len() != 3 {
            return Err(BackendError::MalformedKey(format!(
                "{} selector and {} permutation commitments",
                self.selectors.len(),
                self.sigmas.len()
            )));
        }
        Ok(Domain::new(n)?)
    }

    fn transcript(&self, public: &[F]) -> Transcript {
        let mut bytes = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = self.serialize_compressed(&mut bytes);
        let mut ts = Transcript::new(TRANSCRIPT_LABEL);
        ts.absorb_bytes_l(FsLabel::VerifyingKey, blake3::hash(&bytes).as_bytes());
        ts.absorb_scalars_l(FsLabel::PublicInputs, public);
        ts
    }
}

/// PLONK proving key: the verifying key plus the committer powers.
#[derive(Clone, Debug, CanonicalSerialize, CanonicalDeserialize)]
pub struct PlonkProvingKey {
    /// Matching verifying key.
    pub vk: PlonkVerifyingKey,
    /// Powers of τ in G1.
    pub ck: CommitterKey,
}

/// Claimed evaluations; everything except `z_omega` is taken at `ζ`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
#[allow(missing_docs)]
pub struct PlonkEvaluations {
    pub a: F,
    pub b: F,
    pub c: F,
    pub z: F,
    pub t: F,
    pub q_l: F,
    pub q_r: F,
    pub q_o: F,
    pub q_m: F,
    pub q_c: F,
    pub s1: F,
    pub s2: F,
    pub s3: F,
    /// `z(ζω)`.
    pub z_omega: F,
}

impl PlonkEvaluations {
    // same order as the batched commitments
    fn at_zeta(&self) -> [F; 13] {
        [
            self.a, self.b, self.c, self.z, self.t, self.q_l, self.q_r, self.q_o, self.q_m,
            self.q_c, self.s1, self.s2, self.s3,
        ]
    }

    fn all(&self) -> [F; 14] {
        let mut out = [F::zero(); 14];
        out[..13].copy_from_slice(&self.at_zeta());
        out[13] = self.z_omega;
        out
    }
}

/// PLONK proof.
#[derive(Clone, Debug, PartialEq, Eq, CanonicalSerialize, CanonicalDeserialize)]
#[allow(missing_docs)]
pub struct PlonkProof {
    /// Circuit digest.
    pub digest: [u8; 32],
    pub a: Commitment,
    pub b: Commitment,
    pub c: Commitment,
    pub z: Commitment,
    pub t: Commitment,
    /// Opening witness at `ζ`.
    pub w_zeta: Commitment,
    /// Opening witness of `z` at `ζω`.
    pub w_zeta_omega: Commitment,
    pub evals: PlonkEvaluations,
}

fn gate_value(q: [F; 5], a: F, b: F, c: F) -> F {
    q[Q_M] * a * b + q[Q_L] * a + q[Q_R] * b + q[Q_O] * c + q[Q_C]
}

fn perm_value(beta: F, gamma: F, x: F, w: [F; 3], s: [F; 3], z: F, z_omega: F) -> F {
    let ks = coset_shifts();
    let mut id = z;
    let mut sigma = z_omega;
    for j in 0..3 {
        id *= w[j] + beta * ks[j] * x + gamma;
        sigma *= w[j] + beta * s[j] + gamma;
    }
    id - sigma
}

fn random_blinders(count: usize) -> Vec<F> {
    let mut rng = OsRng;
    (0..count).map(|_| F::rand(&mut rng)).collect()
}

impl super::private::Sealed for PlonkBackend {}

impl ProofBackend for PlonkBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Plonk
    }

    fn compile(&self, circuit: Arc<Circuit>) -> Result<CompiledProgram, BackendError> {
        let layout = Layout::build(&circuit)?;
        tracing::debug!(
            rows = layout.domain.n,
            gates = circuit.gates().len(),
            public = layout.num_public,
            "PLONK layout"
        );
        Ok(CompiledProgram::Plonk(PlonkProgram { circuit, layout: Arc::new(layout) }))
    }

    fn setup(&self, program: &CompiledProgram) -> Result<(ProvingKey, VerifyingKey), BackendError> {
        let CompiledProgram::Plonk(program) = program else {
            return Err(wrong(BackendKind::Plonk, program.backend()));
        };
        let layout = &program.layout;
        let n = layout.domain.n;
        let srs = self.srs_for(srs_powers_for(n))?;
        let (ck, opening_key) = srs.trim(srs_powers_for(n))?;
        let selectors = layout.selectors.iter().map(|p| ck.commit(p)).collect::<Result<_, _>>()?;
        let sigmas = layout.sigmas.iter().map(|p| ck.commit(p)).collect::<Result<_, _>>()?;
        let vk = PlonkVerifyingKey {
            digest: program.circuit.digest(),
            shape: *program.circuit.shape(),
            n: n as u64,
            num_public: layout.num_public as u64,
            selectors,
            sigmas,
            opening_key,
        };
        Ok((
            ProvingKey::Plonk(PlonkProvingKey { vk: vk.clone(), ck }),
            VerifyingKey::Plonk(vk),
        ))
    }

    fn prove(
        &self,
        program: &CompiledProgram,
        pk: &ProvingKey,
        witness: &Witness,
    ) -> Result<Proof, BackendError> {
        let CompiledProgram::Plonk(program) = program else {
            return Err(wrong(BackendKind::Plonk, program.backend()));
        };
        let ProvingKey::Plonk(pk) = pk else {
            return Err(wrong(BackendKind::Plonk, pk.backend()));
        };
        let circuit = &program.circuit;
        let layout = &program.layout;
        let digest = circuit.digest();
        let values = witness.values();
        if pk.vk.digest != digest
            || witness.circuit_digest() != digest
            || values.len() != circuit.num_vars()
            || pk.vk.n != layout.domain.n as u64
        {
            return Err(BackendError::CircuitMismatch);
        }
        if let Some(gate) = circuit.first_unsatisfied(values) {
            return Err(BackendError::Unsatisfied { gate });
        }

        let domain = layout.domain;
        let n = domain.n;
        let ck = &pk.ck;
        let public = &values[..layout.num_public];

        // Round 1: wires
        let trace: Vec<Vec<F>> = layout
            .wires
            .iter()
            .map(|col| col.iter().map(|w| w.map_or(F::zero(), |v| values[v])).collect())
            .collect();
        let mut wire_polys = Vec::with_capacity(3);
        for col in &trace {
            wire_polys.push(domain::blind(&domain.ifft(col)?, &random_blinders(2), n));
        }
        let wire_comms =
            wire_polys.iter().map(|p| ck.commit(p)).collect::<Result<Vec<_>, _>>()?;
        let mut ts = pk.vk.transcript(public);
        ts.absorb_commitments_l(
            FsLabel::WireCommit,
            &[&wire_comms[0], &wire_comms[1], &wire_comms[2]],
        );
        let beta = ts.challenge_f_l(FsLabel::Beta);
        let gamma = ts.challenge_f_l(FsLabel::Gamma);

        // Round 2: permutation grand product
        let omegas = domain.elements();
        let ks = coset_shifts();
        let mut nums = Vec::with_capacity(n);
        let mut dens = Vec::with_capacity(n);
        for row in 0..n {
            let mut num = F::one();
            let mut den = F::one();
            for col in 0..3 {
                let w = trace[col][row];
                num *= w + beta * ks[col] * omegas[row] + gamma;
                den *= w + beta * layout.sigma_evals[col][row] + gamma;
            }
            nums.push(num);
            dens.push(den);
        }
        ark_ff::batch_inversion(&mut dens);
        let mut z_evals = Vec::with_capacity(n);
        let mut acc = F::one();
        for (num, den_inv) in nums.iter().zip(&dens) {
            z_evals.push(acc);
            acc *= *num * den_inv;
        }
        let z_poly = domain::blind(&domain.ifft(&z_evals)?, &random_blinders(3), n);
        let z_comm = ck.commit(&z_poly)?;
        ts.absorb_commitments_l(FsLabel::PermZCommit, &[&z_comm]);
        let alpha = ts.challenge_f_l(FsLabel::Alpha);

        // Round 3: quotient
        let big = Domain::new(n * QUOTIENT_BLOWUP)?;
        let lift = |coeffs: &[F]| big.fft(coeffs);
        let w8 = wire_polys.iter().map(|p| lift(p)).collect::<Result<Vec<_>, _>>()?;
        let z8 = lift(&z_poly)?;
        let mut shift = F::one();
        let z_shifted: Vec<F> = z_poly
            .iter()
            .map(|c| {
                let out = *c * shift;
                shift *= domain.omega;
                out
            })
            .collect();
        let zw8 = lift(&z_shifted)?;
        let q8 = layout.selectors.iter().map(|p| lift(p)).collect::<Result<Vec<_>, _>>()?;
        let s8 = layout.sigmas.iter().map(|p| lift(p)).collect::<Result<Vec<_>, _>>()?;
        let mut pi = vec![F::zero(); n];
        for (slot, x) in pi.iter_mut().zip(public) {
            *slot = -*x;
        }
        let pi8 = lift(&domain.ifft(&pi)?)?;
        let mut l1 = vec![F::zero(); n];
        l1[0] = F::one();
        let l18 = lift(&domain.ifft(&l1)?)?;

        let alpha2 = alpha.square();
        let xs = big.elements();
        let mut numerator = Vec::with_capacity(big.n);
        for (i, x) in xs.iter().enumerate() {
            let (a, b, c) = (w8[0][i], w8[1][i], w8[2][i]);
            let q = [q8[Q_L][i], q8[Q_R][i], q8[Q_O][i], q8[Q_M][i], q8[Q_C][i]];
            let gate = gate_value(q, a, b, c) + pi8[i];
            let perm = perm_value(
                beta,
                gamma,
                *x,
                [a, b, c],
                [s8[0][i], s8[1][i], s8[2][i]],
                z8[i],
                zw8[i],
            );
            numerator.push(gate + alpha * perm + alpha2 * (z8[i] - F::one()) * l18[i]);
        }
        let t_poly = divide_by_vanishing_exact(&big.ifft(&numerator)?, n)?;
        let t_comm = ck.commit(&t_poly)?;
        ts.absorb_commitments_l(FsLabel::QuotientCommit, &[&t_comm]);
        let zeta = ts.challenge_f_l(FsLabel::Zeta);
        if domain.vanishing_at(zeta).is_zero() {
            return Err(DomainError::PointInDomain.into());
        }
        let zeta_omega = zeta * domain.omega;

        // Round 4: evaluations
        let at = |p: &[F]| domain::evaluate(p, zeta);
        let evals = PlonkEvaluations {
            a: at(&wire_polys[0]),
            b: at(&wire_polys[1]),
            c: at(&wire_polys[2]),
            z: at(&z_poly),
            t: at(&t_poly),
            q_l: at(&layout.selectors[Q_L]),
            q_r: at(&layout.selectors[Q_R]),
            q_o: at(&layout.selectors[Q_O]),
            q_m: at(&layout.selectors[Q_M]),
            q_c: at(&layout.selectors[Q_C]),
            s1: at(&layout.sigmas[0]),
            s2: at(&layout.sigmas[1]),
            s3: at(&layout.sigmas[2]),
            z_omega: domain::evaluate(&z_poly, zeta_omega),
        };
        ts.absorb_scalars_l(FsLabel::Evaluations, &evals.all());
        let v = ts.challenge_f_l(FsLabel::Nu);

        // Round 5: openings
        let opened: [&[F]; 13] = [
            &wire_polys[0],
            &wire_polys[1],
            &wire_polys[2],
            &z_poly,
            &t_poly,
            &layout.selectors[Q_L],
            &layout.selectors[Q_R],
            &layout.selectors[Q_O],
            &layout.selectors[Q_M],
            &layout.selectors[Q_C],
            &layout.sigmas[0],
            &layout.sigmas[1],
            &layout.sigmas[2],
        ];
        let mut combined = Vec::new();
        let mut scale = F::one();
        for p in opened {
            domain::add_scaled(&mut combined, p, scale);
            scale *= v;
        }
        let (_, w_zeta) = ck.open(&combined, zeta)?;
        let (_, w_zeta_omega) = ck.open(&z_poly, zeta_omega)?;

        Ok(Proof::Plonk(PlonkProof {
            digest,
            a: wire_comms[0],
            b: wire_comms[1],
            c: wire_comms[2],
            z: z_comm,
            t: t_comm,
            w_zeta,
            w_zeta_omega,
            evals,
        }))
    }

    fn verify(
        &self,
        vk: &VerifyingKey,
        proof: &Proof,
        public: &PublicWitness,
    ) -> Result<bool, BackendError> {
        let VerifyingKey::Plonk(vk) = vk else {
            return Err(wrong(BackendKind::Plonk, vk.backend()));
        };
        let Proof::Plonk(proof) = proof else {
            return Err(wrong(BackendKind::Plonk, proof.backend()));
        };
        if vk.digest != proof.digest || vk.digest != public.circuit_digest() {
            return Err(BackendError::CircuitMismatch);
        }
        let domain = vk.check()?;
        let inputs = public.values();
        if inputs.len() as u64 != vk.num_public {
            return Err(BackendError::PublicInputLength {
                expected: vk.num_public as usize,
                got: inputs.len(),
            });
        }

        let mut ts = vk.transcript(inputs);
        ts.absorb_commitments_l(FsLabel::WireCommit, &[&proof.a, &proof.b, &proof.c]);
        let beta = ts.challenge_f_l(FsLabel::Beta);
        let gamma = ts.challenge_f_l(FsLabel::Gamma);
        ts.absorb_commitments_l(FsLabel::PermZCommit, &[&proof.z]);
        let alpha = ts.challenge_f_l(FsLabel::Alpha);
        ts.absorb_commitments_l(FsLabel::QuotientCommit, &[&proof.t]);
        let zeta = ts.challenge_f_l(FsLabel::Zeta);
        let e = &proof.evals;
        ts.absorb_scalars_l(FsLabel::Evaluations, &e.all());
        let v = ts.challenge_f_l(FsLabel::Nu);
        ts.absorb_commitments_l(FsLabel::OpeningCommit, &[&proof.w_zeta, &proof.w_zeta_omega]);
        let u = ts.challenge_f_l(FsLabel::U);

        let zh = domain.vanishing_at(zeta);
        if zh.is_zero() {
            return Ok(false);
        }
        let l1 = domain.lagrange_at(0, zeta)?;
        let pi = -domain.interpolate_at(inputs, zeta)?;
        let gate = gate_value([e.q_l, e.q_r, e.q_o, e.q_m, e.q_c], e.a, e.b, e.c) + pi;
        let perm =
            perm_value(beta, gamma, zeta, [e.a, e.b, e.c], [e.s1, e.s2, e.s3], e.z, e.z_omega);
        let lhs = gate + alpha * perm + alpha.square() * (e.z - F::one()) * l1;
        if lhs != e.t * zh {
            tracing::debug!("PLONK identity does not hold at zeta");
            return Ok(false);
        }

        let mut comms = vec![proof.a, proof.b, proof.c, proof.z, proof.t];
        comms.extend(&vk.selectors);
        comms.extend(&vk.sigmas);
        let mut folded = G1Projective::zero();
        let mut value = F::zero();
        let mut scale = F::one();
        for (c, y) in comms.iter().zip(e.at_zeta()) {
            folded += c.0 * scale;
            value += y * scale;
            scale *= v;
        }
        let claims = [
            OpeningClaim { commitment: folded, point: zeta, value, witness: proof.w_zeta.0 },
            OpeningClaim {
                commitment: proof.z.0.into_group(),
                point: zeta * domain.omega,
                value: e.z_omega,
                witness: proof.w_zeta_omega.0,
            },
        ];
        Ok(vk.opening_key.verify_batch(&claims, u))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::PixelGrid;
    use crate::transform::TransformationSpec;
    use crate::witness::WitnessAssigner;

    fn backend() -> PlonkBackend {
        PlonkBackend::new(SrsSource::Fixed(Arc::new(Srs::from_seed(srs_powers_for(64), 42))))
    }

    fn grid(h: usize, w: usize) -> PixelGrid {
        PixelGrid::from_fn(h, w, |r, c| [(r * 40 + c) as u8, (c * 17) as u8, 200]).unwrap()
    }

    fn prove(
        be: &PlonkBackend,
        spec: TransformationSpec,
        original: &PixelGrid,
        final_grid: &PixelGrid,
    ) -> (VerifyingKey, Proof, PublicWitness) {
        let circuit = Circuit::build(spec, original.dims(), final_grid.dims()).unwrap();
        let program = be.compile(Arc::new(circuit)).unwrap();
        let (pk, vk) = be.setup(&program).unwrap();
        let witness =
            WitnessAssigner::assign_full(program.circuit(), original, final_grid).unwrap();
        let proof = be.prove(&program, &pk, &witness).unwrap();
        (vk, proof, witness.public())
    }

    #[test]
    fn layout_pads_to_power_of_two() {
        let circuit = Circuit::build(
            TransformationSpec::Rotate90,
            crate::grid::Dims::new(1, 1),
            crate::grid::Dims::new(1, 1),
        )
        .unwrap();
        let layout = Layout::build(&circuit).unwrap();
        // 3 public rows + 3 equality gates
        assert_eq!(layout.domain.n, MIN_ROWS);
        assert_eq!(layout.wires[0][0], Some(0));
    }

    #[test]
    fn permutation_is_a_bijection_on_cells() {
        let original = grid(2, 3);
        let circuit =
            Circuit::build(TransformationSpec::Rotate270, original.dims(), original.dims().transposed())
                .unwrap();
        let layout = Layout::build(&circuit).unwrap();
        let mut all: Vec<F> = layout.sigma_evals.iter().flatten().copied().collect();
        let before = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), before);
    }

    #[test]
    fn rotate_round_trip() {
        let be = backend();
        let original = grid(2, 3);
        let spec = TransformationSpec::Rotate90;
        let final_grid = spec.apply(&original, None).unwrap();
        let (vk, proof, public) = prove(&be, spec, &original, &final_grid);
        assert!(be.verify(&vk, &proof, &public).unwrap());
    }

    #[test]
    fn decoded_proving_key_still_proves() {
        use crate::codec::Artifact;

        let be = backend();
        let original = grid(2, 3);
        let spec = TransformationSpec::Rotate180;
        let final_grid = spec.apply(&original, None).unwrap();
        let circuit = Circuit::build(spec, original.dims(), final_grid.dims()).unwrap();
        let program = be.compile(Arc::new(circuit)).unwrap();
        let (pk, vk) = be.setup(&program).unwrap();

        let bytes = pk.encode().unwrap();
        let decoded = ProvingKey::decode(BackendKind::Plonk, &bytes).unwrap();
        assert_eq!(decoded.encode().unwrap(), bytes);
        let vk_bytes = vk.encode().unwrap();
        let vk = VerifyingKey::decode(BackendKind::Plonk, &vk_bytes).unwrap();

        let witness =
            WitnessAssigner::assign_full(program.circuit(), &original, &final_grid).unwrap();
        let proof = be.prove(&program, &decoded, &witness).unwrap();
        assert!(be.verify(&vk, &proof, &witness.public()).unwrap());
    }

    #[test]
    fn tampered_evaluation_is_rejected() {
        let be = backend();
        let original = grid(2, 2);
        let spec = TransformationSpec::FlipHorizontal;
        let final_grid = spec.apply(&original, None).unwrap();
        let (vk, proof, public) = prove(&be, spec, &original, &final_grid);
        let Proof::Plonk(mut inner) = proof else { unreachable!() };
        inner.evals.a += F::one();
        assert!(!be.verify(&vk, &Proof::Plonk(inner), &public).unwrap());
    }

    #[test]
    fn other_public_inputs_are_rejected() {
        let be = backend();
        let original = grid(2, 2);
        let spec = TransformationSpec::FlipVertical;
        let final_grid = spec.apply(&original, None).unwrap();
        let (vk, proof, _) = prove(&be, spec, &original, &final_grid);
        let circuit = Circuit::build(spec, original.dims(), final_grid.dims()).unwrap();
        let [r, g, b] = final_grid.get(0, 1).unwrap();
        let forged = final_grid.with_pixel(0, 1, [r, g ^ 4, b]);
        let public = WitnessAssigner::assign_public(&circuit, &forged).unwrap();
        assert!(!be.verify(&vk, &proof, &public).unwrap());
    }

    #[test]
    fn fixed_srs_too_small_is_an_error() {
        let be = PlonkBackend::new(SrsSource::Fixed(Arc::new(Srs::from_seed(8, 1))));
        let circuit = Circuit::build(
            TransformationSpec::FlipVertical,
            crate::grid::Dims::new(1, 1),
            crate::grid::Dims::new(1, 1),
        )
        .unwrap();
        let program = be.compile(Arc::new(circuit)).unwrap();
        assert!(matches!(be.setup(&program), Err(BackendError::Srs(_))));
    }
}
