//! Division by the vanishing polynomial
//!
//! We construct `Q` such that `R(X) = (X^N − 1)·Q(X) + Rem(X)` with
//! `deg(Rem) < N`. A zero remainder is exactly the statement that `R`
//! vanishes on `H`, which is how the prover detects an unsatisfied witness
//! before committing to anything.

#![forbid(unsafe_code)]

use ark_ff::Zero;

use crate::F;

/// Errors surfaced by the quotient builder.
#[derive(Debug, thiserror::Error)]
pub enum QuotientError {
    /// `R` does not vanish on `H`; `degree` is the highest non-zero
    /// remainder coefficient.
    #[error("numerator does not vanish on the domain (remainder degree {degree})")]
    NonZeroRemainder {
        /// Degree of the remainder.
        degree: usize,
    },
}

/// Long-division by `X^N − 1` on **low→high** coefficients.
///
/// Standard in-place recurrence, processed from the top coefficient down:
/// ```text
/// for i = deg .. N:
///    q_{i-N} += r_i
///    r_{i-N} += r_i
///    r_i      = 0
/// ```
/// Returns `(Q, Rem)`, both low→high; `Rem` has exactly `min(N, len)` entries.
pub fn long_divide_by_vanishing(r_lo_to_hi: &[F], n: usize) -> (Vec<F>, Vec<F>) {
    let mut r = r_lo_to_hi.to_vec();
    if r.len() <= n {
        return (Vec::new(), r);
    }
    let mut q = vec![F::zero(); r.len() - n];
    for i in (n..r.len()).rev() {
        let coeff = r[i];
        if !coeff.is_zero() {
            q[i - n] += coeff;
            r[i - n] += coeff;
            r[i] = F::zero();
        }
    }
    r.truncate(n);
    while q.last().map_or(false, |x| x.is_zero()) {
        q.pop();
    }
    (q, r)
}

/// Exact division by `X^N − 1`, failing when the remainder is non-zero.
pub fn divide_by_vanishing_exact(r_lo_to_hi: &[F], n: usize) -> Result<Vec<F>, QuotientError> {
    let (q, rem) = long_divide_by_vanishing(r_lo_to_hi, n);
    match rem.iter().rposition(|c| !c.is_zero()) {
        Some(degree) => Err(QuotientError::NonZeroRemainder { degree }),
        None => Ok(q),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{evaluate, Domain};
    use ark_ff::{One, UniformRand};
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn recovers_quotient_of_multiple() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 8;
        let q: Vec<F> = (0..13).map(|_| F::rand(&mut rng)).collect();
        // r = q·(X^n − 1)
        let mut r = vec![F::zero(); q.len() + n];
        for (i, c) in q.iter().enumerate() {
            r[i + n] += c;
            r[i] -= c;
        }
        let got = divide_by_vanishing_exact(&r, n).unwrap();
        assert_eq!(got, q);
    }

    #[test]
    fn remainder_flags_non_vanishing() {
        let d = Domain::new(4).unwrap();
        let mut r = vec![F::zero(); 9];
        r[8] = F::one();
        r[1] = F::one(); // X^8 + X: X^8 vanishes on H, X does not
        let (q, rem) = long_divide_by_vanishing(&r, d.n);
        let x = F::from(9u64);
        assert_eq!(evaluate(&q, x) * d.vanishing_at(x) + evaluate(&rem, x), evaluate(&r, x));
        assert!(matches!(
            divide_by_vanishing_exact(&r, d.n),
            Err(QuotientError::NonZeroRemainder { degree: 1 })
        ));
    }
}
