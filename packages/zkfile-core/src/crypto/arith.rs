//! # Modular Arithmetic
//!
//! Big-integer helpers shared by the identification schemes and the
//! keystream cipher. Primality is delegated to `num-prime`.

use num_bigint::{BigInt, BigUint, RandBigInt, Sign};
use num_integer::Integer;
use num_prime::nt_funcs::is_prime;
use num_traits::{One, Zero};
use rand::RngCore;

/// `base^exp mod modulus`
pub fn mod_pow(base: &BigUint, exp: &BigUint, modulus: &BigUint) -> BigUint {
    base.modpow(exp, modulus)
}

/// `a * b mod modulus`
pub fn mod_mul(a: &BigUint, b: &BigUint, modulus: &BigUint) -> BigUint {
    (a * b) % modulus
}

/// Multiplicative inverse of `a` modulo `modulus`.
///
/// Returns `None` when `gcd(a, modulus) != 1` or the modulus is below 2.
pub fn mod_inverse(a: &BigUint, modulus: &BigUint) -> Option<BigUint> {
    if modulus <= &BigUint::one() {
        return None;
    }
    let a = BigInt::from_biguint(Sign::Plus, a % modulus);
    let m = BigInt::from_biguint(Sign::Plus, modulus.clone());
    let egcd = a.extended_gcd(&m);
    if !egcd.gcd.is_one() {
        return None;
    }
    // x may be negative; fold it back into [0, m)
    egcd.x.mod_floor(&m).to_biguint()
}

/// Whether `gcd(a, b) == 1`
pub fn is_coprime(a: &BigUint, b: &BigUint) -> bool {
    a.gcd(b).is_one()
}

/// Probabilistic primality test
pub fn is_probable_prime(n: &BigUint) -> bool {
    if n < &BigUint::from(2u8) {
        return false;
    }
    is_prime(n, None).probably()
}

/// Uniform draw from the inclusive range `[low, high]`.
///
/// Callers guarantee `low <= high`.
pub fn random_in_range(rng: &mut dyn RngCore, low: &BigUint, high: &BigUint) -> BigUint {
    let upper = high + 1u8;
    rng.gen_biguint_range(low, &upper)
}

/// Search `[low, high]` for a prime by uniform sampling.
///
/// Gives up after `attempts` draws.
pub fn random_prime_in_range(
    rng: &mut dyn RngCore,
    low: &BigUint,
    high: &BigUint,
    attempts: usize,
) -> Option<BigUint> {
    if low > high {
        return None;
    }
    (0..attempts)
        .map(|_| random_in_range(rng, low, high))
        .find(is_probable_prime)
}

/// Draw a value in `[low, high]` coprime to `modulus`, giving up after
/// `attempts` draws.
pub fn random_coprime_in_range(
    rng: &mut dyn RngCore,
    low: &BigUint,
    high: &BigUint,
    modulus: &BigUint,
    attempts: usize,
) -> Option<BigUint> {
    if low > high {
        return None;
    }
    (0..attempts)
        .map(|_| random_in_range(rng, low, high))
        .find(|candidate| !candidate.is_zero() && is_coprime(candidate, modulus))
}
