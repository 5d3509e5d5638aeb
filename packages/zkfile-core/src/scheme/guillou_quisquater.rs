//! Guillou–Quisquater identification.
//!
//! Like Fiat–Shamir but with a public exponent `v` in place of squaring, so
//! a single round already has soundness error `1/(v-1)`.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{
    Challenge, Commitment, IdentificationScheme, KeyPair, PublicKey, Response, SchemeKind,
    Secret, Witness, KEYGEN_ATTEMPTS,
};
use crate::crypto::arith::{
    is_coprime, mod_mul, mod_pow, random_coprime_in_range, random_in_range,
    random_prime_in_range,
};
use crate::error::{Error, Result};

/// Upper bound for generated public exponents.
const MAX_EXPONENT: u32 = 1 << 16;

/// Public parameters: composite modulus `N` and exponent `v`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GqParams {
    /// `N`
    #[serde(with = "crate::config::big_uint")]
    pub modulus: BigUint,
    /// `v`, also the size of the challenge space
    #[serde(with = "crate::config::big_uint")]
    pub exponent: BigUint,
}

impl GqParams {
    /// `N = 3233`, `v = 17`.
    pub fn reference() -> Self {
        Self {
            modulus: BigUint::from(3233u32),
            exponent: BigUint::from(17u32),
        }
    }

    /// `N = p·q` from primes in `[low, high]` and a prime `v` coprime to
    /// `φ(N)`.
    pub fn generate(rng: &mut dyn RngCore, low: &BigUint, high: &BigUint) -> Result<Self> {
        let no_prime = || Error::KeyGeneration(format!("no prime in [{}, {}]", low, high));
        for _ in 0..KEYGEN_ATTEMPTS {
            let p = random_prime_in_range(rng, low, high, KEYGEN_ATTEMPTS * 4)
                .ok_or_else(no_prime)?;
            let q = random_prime_in_range(rng, low, high, KEYGEN_ATTEMPTS * 4)
                .ok_or_else(no_prime)?;
            if p == q {
                continue;
            }
            let phi = (&p - 1u8) * (&q - 1u8);
            let upper = (&phi - 1u8).min(BigUint::from(MAX_EXPONENT));
            let exponent = (0..KEYGEN_ATTEMPTS)
                .filter_map(|_| {
                    random_prime_in_range(&mut *rng, &BigUint::from(3u8), &upper, KEYGEN_ATTEMPTS)
                })
                .find(|v| is_coprime(v, &phi));
            if let Some(exponent) = exponent {
                return Ok(Self {
                    modulus: p * q,
                    exponent,
                });
            }
        }
        Err(Error::KeyGeneration(
            "no guillou-quisquater parameters found within the retry budget".into(),
        ))
    }

    /// Reject `N <= 3` and `v` outside `[2, N-1]`.
    pub fn validate(&self) -> Result<()> {
        if self.modulus <= BigUint::from(3u8) {
            return Err(Error::InvalidParameters(format!(
                "guillou-quisquater modulus {} is too small",
                self.modulus
            )));
        }
        if self.exponent < BigUint::from(2u8) || self.exponent >= self.modulus {
            return Err(Error::InvalidParameters(format!(
                "guillou-quisquater exponent {} must lie in [2, N-1]",
                self.exponent
            )));
        }
        Ok(())
    }
}

/// Guillou–Quisquater scheme over fixed `(N, v)`.
#[derive(Debug, Clone)]
pub struct GuillouQuisquater {
    params: GqParams,
}

impl GuillouQuisquater {
    /// Validates `params` first.
    pub fn new(params: GqParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The public parameters.
    pub fn params(&self) -> &GqParams {
        &self.params
    }

    fn in_group(&self, value: &BigUint) -> bool {
        !value.is_zero() && value < &self.params.modulus
    }
}

impl IdentificationScheme for GuillouQuisquater {
    fn kind(&self) -> SchemeKind {
        SchemeKind::GuillouQuisquater
    }

    fn generate_keys(&self, rng: &mut dyn RngCore) -> Result<KeyPair> {
        let n = &self.params.modulus;
        let high = n - 1u8;
        let secret = random_coprime_in_range(rng, &BigUint::from(2u8), &high, n, KEYGEN_ATTEMPTS)
            .ok_or_else(|| Error::KeyGeneration(format!("no secret coprime to {} found", n)))?;
        self.key_pair_from_secret(secret)
    }

    fn key_pair_from_secret(&self, secret: BigUint) -> Result<KeyPair> {
        let n = &self.params.modulus;
        if secret <= BigUint::one() || &secret >= n || !is_coprime(&secret, n) {
            return Err(Error::KeyGeneration(format!(
                "secret must lie in [2, N-1] and be coprime to N={}",
                n
            )));
        }
        // J = S^v
        let public = mod_pow(&secret, &self.params.exponent, n);
        Ok(KeyPair {
            public: PublicKey(public),
            secret: Secret::new(secret),
        })
    }

    fn draw_witness(&self, rng: &mut dyn RngCore) -> Witness {
        let high = &self.params.modulus - 1u8;
        Witness::from_value(random_in_range(rng, &BigUint::one(), &high))
    }

    fn commitment_for(&self, witness: &Witness) -> Commitment {
        Commitment(mod_pow(
            witness.value(),
            &self.params.exponent,
            &self.params.modulus,
        ))
    }

    fn challenge_bounds(&self) -> (BigUint, BigUint) {
        (BigUint::one(), &self.params.exponent - 1u8)
    }

    fn respond(&self, witness: Witness, secret: &Secret, challenge: Challenge) -> Response {
        let n = &self.params.modulus;
        let s_e = mod_pow(secret.expose(), challenge.value(), n);
        Response(mod_mul(witness.value(), &s_e, n))
    }

    fn verify(
        &self,
        commitment: &Commitment,
        challenge: &Challenge,
        response: &Response,
        public: &PublicKey,
    ) -> bool {
        let GqParams {
            modulus: n,
            exponent: v,
        } = &self.params;
        let in_range = self.in_group(&commitment.0) && self.in_group(&response.0);
        let lhs = mod_pow(&response.0, v, n);
        let rhs = mod_mul(&commitment.0, &mod_pow(&public.0, challenge.value(), n), n);
        in_range & (lhs == rhs)
    }

    fn is_valid_public_key(&self, public: &PublicKey) -> bool {
        self.in_group(&public.0)
    }
}
