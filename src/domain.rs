//! Evaluation domains and coefficient-form polynomial helpers
//!
//! A [`Domain`] is the multiplicative subgroup `H = {1, ω, …, ω^{N−1}}` of
//! `F` with vanishing polynomial `Z_H(X) = X^N − 1`. Transforms are radix-2
//! Cooley–Tukey over `H` (bit-reversal, then butterflies).
//!
//! Polynomials are plain `Vec<F>` in **low→high** coefficient order.
//!
//! ## Validation
//! `N` must be a power of two with `ω^N = 1` and `ω^{N/2} ≠ 1` (primitive
//! root); every constructor checks this.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use ark_ff::{FftField, Field, One, Zero};

use crate::F;

/// Multiplicative subgroup of size `n` together with cached inverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Domain {
    /// Domain size `N`, a power of two.
    pub n: usize,
    /// Generator `ω` of `H`.
    pub omega: F,
    omega_inv: F,
    n_inv: F,
}

/// Errors produced by domain checks / transforms.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("domain size must be a positive power of two (got {0})")]
    BadSize(usize),
    #[error("field has no subgroup of size {0}")]
    NoRootOfUnity(usize),
    #[error("omega^N != 1")]
    OmegaNPowNotOne,
    #[error("omega is not primitive: omega^(N/2) == 1")]
    OmegaNotPrimitive,
    #[error("polynomial has {len} coefficients, domain of size {n} holds at most {n}")]
    TooLong { len: usize, n: usize },
    #[error("evaluation vector must have exactly N entries (got {got}, N={n})")]
    BadLen { got: usize, n: usize },
    #[error("evaluation point lies in H")]
    PointInDomain,
}

impl Domain {
    /// The size-`n` subgroup, generated by the field's canonical root of unity.
    pub fn new(n: usize) -> Result<Self, DomainError> {
        if n == 0 || !n.is_power_of_two() {
            return Err(DomainError::BadSize(n));
        }
        let omega = F::get_root_of_unity(n as u64).ok_or(DomainError::NoRootOfUnity(n))?;
        Self::with_generator(n, omega)
    }

    /// Domain with an explicit generator, checked for primitivity.
    pub fn with_generator(n: usize, omega: F) -> Result<Self, DomainError> {
        if n == 0 || !n.is_power_of_two() {
            return Err(DomainError::BadSize(n));
        }
        if !pow_u64(omega, n as u64).is_one() {
            return Err(DomainError::OmegaNPowNotOne);
        }
        if n > 1 && pow_u64(omega, (n / 2) as u64).is_one() {
            return Err(DomainError::OmegaNotPrimitive);
        }
        // ω^N = 1 makes ω a unit, and N is a power of two below the field characteristic
        let omega_inv = pow_u64(omega, (n - 1) as u64);
        let n_inv = F::from(n as u64).inverse().ok_or(DomainError::BadSize(n))?;
        Ok(Self { n, omega, omega_inv, n_inv })
    }

    /// `ω^i`.
    pub fn element(&self, i: usize) -> F {
        pow_u64(self.omega, (i % self.n) as u64)
    }

    /// `[1, ω, …, ω^{N−1}]`.
    pub fn elements(&self) -> Vec<F> {
        let mut out = Vec::with_capacity(self.n);
        let mut x = F::one();
        for _ in 0..self.n {
            out.push(x);
            x *= self.omega;
        }
        out
    }

    /// Evaluate a coefficient vector (length ≤ N, zero-padded) on `H`.
    pub fn fft(&self, coeffs: &[F]) -> Result<Vec<F>, DomainError> {
        if coeffs.len() > self.n {
            return Err(DomainError::TooLong { len: coeffs.len(), n: self.n });
        }
        let mut a = coeffs.to_vec();
        a.resize(self.n, F::zero());
        ntt_in_place(&mut a, self.omega);
        Ok(a)
    }

    /// Interpolate `N` evaluations on `H` into coefficients.
    pub fn ifft(&self, evals: &[F]) -> Result<Vec<F>, DomainError> {
        if evals.len() != self.n {
            return Err(DomainError::BadLen { got: evals.len(), n: self.n });
        }
        let mut a = evals.to_vec();
        ntt_in_place(&mut a, self.omega_inv);
        for x in a.iter_mut() {
            *x *= self.n_inv;
        }
        Ok(a)
    }

    /// `Z_H(z) = z^N − 1`.
    #[inline]
    pub fn vanishing_at(&self, z: F) -> F {
        pow_u64(z, self.n as u64) - F::one()
    }

    /// Lagrange basis `L_i(z) = ω^i·(z^N − 1) / (N·(z − ω^i))` for `z ∉ H`.
    pub fn lagrange_at(&self, i: usize, z: F) -> Result<F, DomainError> {
        let w_i = self.element(i);
        let denom = (F::from(self.n as u64) * (z - w_i))
            .inverse()
            .ok_or(DomainError::PointInDomain)?;
        Ok(w_i * self.vanishing_at(z) * denom)
    }

    /// `Σ_i values[i]·L_i(z)` for `z ∉ H`, one batched inversion.
    pub fn interpolate_at(&self, values: &[F], z: F) -> Result<F, DomainError> {
        let zh = self.vanishing_at(z);
        if zh.is_zero() {
            return Err(DomainError::PointInDomain);
        }
        let mut w_i = F::one();
        let mut denoms = Vec::with_capacity(values.len());
        let mut weights = Vec::with_capacity(values.len());
        for _ in values {
            denoms.push(z - w_i);
            weights.push(w_i);
            w_i *= self.omega;
        }
        ark_ff::batch_inversion(&mut denoms);
        let sum: F = values
            .iter()
            .zip(weights.iter().zip(denoms.iter()))
            .map(|(v, (w, d))| *v * w * d)
            .sum();
        Ok(sum * zh * self.n_inv)
    }
}

/// Square-and-multiply exponentiation.
#[inline]
pub fn pow_u64(mut base: F, mut exp: u64) -> F {
    let mut acc = F::one();
    while exp > 0 {
        if (exp & 1) == 1 {
            acc *= base;
        }
        base.square_in_place();
        exp >>= 1;
    }
    acc
}

fn ntt_in_place(a: &mut [F], root: F) {
    let n = a.len();
    debug_assert!(n.is_power_of_two());

    // bit-reversal
    let mut j = 0usize;
    for i in 1..n {
        let mut bit = n >> 1;
        while j & bit != 0 {
            j ^= bit;
            bit >>= 1;
        }
        j ^= bit;
        if i < j {
            a.swap(i, j);
        }
    }

    // Cooley–Tukey
    let mut len = 2;
    while len <= n {
        let w_len = pow_u64(root, (n / len) as u64);
        let half = len / 2;
        let mut twiddles = Vec::with_capacity(half);
        let mut w = F::one();
        for _ in 0..half {
            twiddles.push(w);
            w *= w_len;
        }
        for start in (0..n).step_by(len) {
            for i in 0..half {
                let u = a[start + i];
                let v = a[start + i + half] * twiddles[i];
                a[start + i] = u + v;
                a[start + i + half] = u - v;
            }
        }
        len <<= 1;
    }
}

// ------------------------- Coefficient helpers -------------------------

/// Horner evaluation of a low→high coefficient vector.
pub fn evaluate(coeffs: &[F], z: F) -> F {
    coeffs.iter().rev().fold(F::zero(), |acc, c| acc * z + c)
}

/// Synthetic division by `(X − z)`: returns `(W, f(z))` with
/// `f(X) = W(X)·(X − z) + f(z)`.
pub fn divide_by_linear(coeffs: &[F], z: F) -> (Vec<F>, F) {
    if coeffs.is_empty() {
        return (Vec::new(), F::zero());
    }
    let mut w = vec![F::zero(); coeffs.len() - 1];
    let mut acc = F::zero();
    for i in (0..coeffs.len()).rev() {
        acc = coeffs[i] + z * acc;
        if i > 0 {
            w[i - 1] = acc;
        }
    }
    (w, acc)
}

/// `acc += scale·poly`, growing `acc` as needed.
pub fn add_scaled(acc: &mut Vec<F>, poly: &[F], scale: F) {
    if acc.len() < poly.len() {
        acc.resize(poly.len(), F::zero());
    }
    for (a, p) in acc.iter_mut().zip(poly) {
        *a += scale * p;
    }
}

/// `coeffs + (Σ_i blinders[i]·X^i)·(X^n − 1)`.
///
/// Leaves the evaluations on the size-`n` subgroup unchanged.
pub fn blind(coeffs: &[F], blinders: &[F], n: usize) -> Vec<F> {
    let mut out = coeffs.to_vec();
    out.resize(out.len().max(n + blinders.len()), F::zero());
    for (i, b) in blinders.iter().enumerate() {
        out[n + i] += b;
        out[i] -= b;
    }
    out
}
