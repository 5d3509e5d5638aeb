//! Schnorr discrete-log identification over a prime-order subgroup.

use num_bigint::BigUint;
use num_traits::{One, Zero};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{
    Challenge, Commitment, IdentificationScheme, KeyPair, PublicKey, Response, SchemeKind,
    Secret, Witness, KEYGEN_ATTEMPTS,
};
use crate::crypto::arith::{
    is_probable_prime, mod_mul, mod_pow, random_in_range, random_prime_in_range,
};
use crate::error::{Error, Result};

/// Largest cofactor tried when searching for `p = k·q + 1`.
const MAX_COFACTOR: u32 = 64;

/// Group parameters `(p, q, g)` with `q | p - 1` and `g` of order `q`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrParams {
    /// Field prime `p`
    #[serde(with = "crate::config::big_uint")]
    pub prime: BigUint,
    /// Subgroup order `q`
    #[serde(with = "crate::config::big_uint")]
    pub order: BigUint,
    /// Generator `g` of the order-`q` subgroup
    #[serde(with = "crate::config::big_uint")]
    pub generator: BigUint,
}

impl SchnorrParams {
    /// `p = 2267`, `q = 103`, `g = 354`.
    pub fn reference() -> Self {
        Self {
            prime: BigUint::from(2267u32),
            order: BigUint::from(103u32),
            generator: BigUint::from(354u32),
        }
    }

    /// Pick a prime `q` in `[low, high]`, then a prime `p = k·q + 1`, then
    /// `g = h^((p-1)/q) mod p` with `g != 1`.
    pub fn generate(rng: &mut dyn RngCore, low: &BigUint, high: &BigUint) -> Result<Self> {
        let two = BigUint::from(2u8);
        for _ in 0..KEYGEN_ATTEMPTS {
            let q = random_prime_in_range(rng, low, high, KEYGEN_ATTEMPTS * 4).ok_or_else(
                || Error::KeyGeneration(format!("no prime order in [{}, {}]", low, high)),
            )?;
            let p = match (2..=MAX_COFACTOR)
                .map(|k| &q * k + 1u8)
                .find(is_probable_prime)
            {
                Some(p) => p,
                None => continue,
            };
            let cofactor = (&p - 1u8) / &q;
            let upper = &p - 2u8;
            for _ in 0..KEYGEN_ATTEMPTS {
                let h = random_in_range(rng, &two, &upper);
                let g = mod_pow(&h, &cofactor, &p);
                if !g.is_one() {
                    return Ok(Self {
                        prime: p,
                        order: q,
                        generator: g,
                    });
                }
            }
        }
        Err(Error::KeyGeneration(
            "no schnorr group found within the retry budget".into(),
        ))
    }

    /// Check primality, `q | p - 1`, and that `g` has order `q`.
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| Err(Error::InvalidParameters(format!("schnorr: {}", what)));
        if !is_probable_prime(&self.prime) {
            return invalid("p is not prime");
        }
        if !is_probable_prime(&self.order) {
            return invalid("q is not prime");
        }
        if !((&self.prime - 1u8) % &self.order).is_zero() {
            return invalid("q does not divide p - 1");
        }
        if self.generator <= BigUint::one() || self.generator >= self.prime {
            return invalid("g must lie in [2, p-1]");
        }
        if !mod_pow(&self.generator, &self.order, &self.prime).is_one() {
            return invalid("g^q != 1 mod p");
        }
        Ok(())
    }
}

/// Schnorr scheme over a fixed group.
#[derive(Debug, Clone)]
pub struct Schnorr {
    params: SchnorrParams,
}

impl Schnorr {
    /// Build the scheme, validating the group.
    pub fn new(params: SchnorrParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The group parameters.
    pub fn params(&self) -> &SchnorrParams {
        &self.params
    }

    fn nonzero_exponent(&self, rng: &mut dyn RngCore) -> BigUint {
        let high = &self.params.order - 1u8;
        random_in_range(rng, &BigUint::one(), &high)
    }
}

impl IdentificationScheme for Schnorr {
    fn kind(&self) -> SchemeKind {
        SchemeKind::Schnorr
    }

    fn generate_keys(&self, rng: &mut dyn RngCore) -> Result<KeyPair> {
        let secret = self.nonzero_exponent(rng);
        self.key_pair_from_secret(secret)
    }

    fn key_pair_from_secret(&self, secret: BigUint) -> Result<KeyPair> {
        if secret.is_zero() || secret >= self.params.order {
            return Err(Error::KeyGeneration(format!(
                "secret must lie in [1, q-1] for q={}",
                self.params.order
            )));
        }
        let public = mod_pow(&self.params.generator, &secret, &self.params.prime);
        Ok(KeyPair {
            public: PublicKey(public),
            secret: Secret::new(secret),
        })
    }

    fn draw_witness(&self, rng: &mut dyn RngCore) -> Witness {
        Witness::from_value(self.nonzero_exponent(rng))
    }

    fn commitment_for(&self, witness: &Witness) -> Commitment {
        Commitment(mod_pow(
            &self.params.generator,
            witness.value(),
            &self.params.prime,
        ))
    }

    fn challenge_bounds(&self) -> (BigUint, BigUint) {
        (BigUint::one(), &self.params.order - 1u8)
    }

    fn respond(&self, witness: Witness, secret: &Secret, challenge: Challenge) -> Response {
        let q = &self.params.order;
        let ex = mod_mul(challenge.value(), secret.expose(), q);
        Response((witness.value() + ex) % q)
    }

    fn verify(
        &self,
        commitment: &Commitment,
        challenge: &Challenge,
        response: &Response,
        public: &PublicKey,
    ) -> bool {
        let SchnorrParams {
            prime: p,
            order: q,
            generator: g,
        } = &self.params;
        let in_range = !commitment.0.is_zero() && &commitment.0 < p && &response.0 < q;
        let lhs = mod_pow(g, &response.0, p);
        let rhs = mod_mul(&commitment.0, &mod_pow(&public.0, challenge.value(), p), p);
        in_range & (lhs == rhs)
    }

    fn is_valid_public_key(&self, public: &PublicKey) -> bool {
        let p = &self.params.prime;
        public.0 > BigUint::one()
            && &public.0 < p
            && mod_pow(&public.0, &self.params.order, p).is_one()
    }
}
