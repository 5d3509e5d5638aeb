//! Fiat–Shamir quadratic-residue identification.
//!
//! Public key `V = S² mod N`; one round proves knowledge of a square root of
//! `V` with soundness error 1/2.

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

/// Reference composite modulus (61 · 53).
pub const REFERENCE_MODULUS: u64 = 3233;

/// Public parameters: the composite modulus `N`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FiatShamirParams {
    /// Composite modulus `N = p·q` with unknown factorisation
    #[serde(with = "crate::config::big_uint")]
    pub modulus: BigUint,
}

impl FiatShamirParams {
    /// The toy parameters of the reference deployment.
    pub fn reference() -> Self {
        Self {
            modulus: BigUint::from(REFERENCE_MODULUS),
        }
    }

    /// Generate `N = p·q` from two distinct primes drawn from `[low, high]`.
    pub fn generate(rng: &mut dyn RngCore, low: &BigUint, high: &BigUint) -> Result<Self> {
        let p = random_prime_in_range(rng, low, high, KEYGEN_ATTEMPTS * 4)
            .ok_or_else(|| Error::KeyGeneration(format!("no prime in [{}, {}]", low, high)))?;
        for _ in 0..KEYGEN_ATTEMPTS {
            let q = random_prime_in_range(rng, low, high, KEYGEN_ATTEMPTS * 4).ok_or_else(
                || Error::KeyGeneration(format!("no prime in [{}, {}]", low, high)),
            )?;
            if q != p {
                return Ok(Self { modulus: p * q });
            }
        }
        Err(Error::KeyGeneration(format!(
            "no second distinct prime in [{}, {}]",
            low, high
        )))
    }

    /// Reject moduli too small to hold a secret and a witness.
    pub fn validate(&self) -> Result<()> {
        if self.modulus <= BigUint::from(3u8) {
            return Err(Error::InvalidParameters(format!(
                "fiat-shamir modulus {} is too small",
                self.modulus
            )));
        }
        Ok(())
    }
}

/// Fiat–Shamir scheme over a fixed modulus.
#[derive(Debug, Clone)]
pub struct FiatShamir {
    params: FiatShamirParams,
}

impl FiatShamir {
    /// Build the scheme, validating the parameters.
    pub fn new(params: FiatShamirParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    /// The public parameters.
    pub fn params(&self) -> &FiatShamirParams {
        &self.params
    }

    fn in_group(&self, value: &BigUint) -> bool {
        !value.is_zero() && value < &self.params.modulus
    }
}

impl IdentificationScheme for FiatShamir {
    fn kind(&self) -> SchemeKind {
        SchemeKind::FiatShamir
    }

    fn generate_keys(&self, rng: &mut dyn RngCore) -> Result<KeyPair> {
        let n = &self.params.modulus;
        let high = n - 1u8;
        let secret = random_coprime_in_range(rng, &BigUint::from(2u8), &high, n, KEYGEN_ATTEMPTS)
            .ok_or_else(|| {
                Error::KeyGeneration(format!("no secret coprime to {} found", n))
            })?;
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
        let public = mod_pow(&secret, &BigUint::from(2u8), n);
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
            &BigUint::from(2u8),
            &self.params.modulus,
        ))
    }

    fn challenge_bounds(&self) -> (BigUint, BigUint) {
        (BigUint::zero(), BigUint::one())
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
        let n = &self.params.modulus;
        // y = 0 would satisfy y² = X·V^e for X = 0
        let in_range = self.in_group(&commitment.0) && self.in_group(&response.0);
        let lhs = mod_pow(&response.0, &BigUint::from(2u8), n);
        let rhs = mod_mul(&commitment.0, &mod_pow(&public.0, challenge.value(), n), n);
        in_range & (lhs == rhs)
    }

    fn is_valid_public_key(&self, public: &PublicKey) -> bool {
        self.in_group(&public.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scheme() -> FiatShamir {
        FiatShamir::new(FiatShamirParams::reference()).unwrap()
    }

    fn big(x: u64) -> BigUint {
        BigUint::from(x)
    }

    #[test]
    fn test_reference_known_answer() {
        let fs = scheme();
        let keys = fs.key_pair_from_secret(big(123)).unwrap();
        assert_eq!(keys.public.0, big(2197));

        let witness = Witness::from_value(big(1000));
        let commitment = fs.commitment_for(&witness);
        assert_eq!(commitment.0, big(1003));

        let challenge = fs.accept_challenge(big(1)).unwrap();
        let response = fs.respond(witness, &keys.secret, challenge);
        assert_eq!(response.0, big(146));

        let n = big(3233);
        assert_eq!(mod_pow(&response.0, &big(2), &n), big(1918));
        assert_eq!(mod_mul(&commitment.0, &keys.public.0, &n), big(1918));

        let challenge = fs.accept_challenge(big(1)).unwrap();
        assert!(fs.verify(&commitment, &challenge, &response, &keys.public));
    }

    #[test]
    fn test_completeness_for_every_challenge() {
        let fs = scheme();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..50 {
            let keys = fs.generate_keys(&mut rng).unwrap();
            for e in 0..=1u64 {
                let (witness, commitment) = fs.commit(&mut rng);
                let response = fs.respond(witness, &keys.secret, fs.accept_challenge(big(e)).unwrap());
                let challenge = fs.accept_challenge(big(e)).unwrap();
                assert!(fs.verify(&commitment, &challenge, &response, &keys.public));
            }
        }
    }

    #[test]
    fn test_soundness_bound_is_one_half() {
        // A forger who guesses e = 1 picks y freely and sets X = y² / V.
        // It wins exactly when the verifier also draws 1.
        let fs = scheme();
        let mut rng = StdRng::seed_from_u64(99);
        let keys = fs.key_pair_from_secret(big(123)).unwrap();
        let n = big(3233);
        let v_inv = crate::crypto::arith::mod_inverse(&keys.public.0, &n).unwrap();

        let trials = 4000;
        let mut accepted = 0;
        for _ in 0..trials {
            let y = random_in_range(&mut rng, &big(1), &big(3232));
            let forged = Commitment(mod_mul(&mod_pow(&y, &big(2), &n), &v_inv, &n));
            let challenge = fs.draw_challenge(&mut rng);
            if fs.verify(&forged, &challenge, &Response(y), &keys.public) {
                accepted += 1;
            }
        }
        let rate = accepted as f64 / trials as f64;
        assert!((rate - 0.5).abs() < 0.05, "acceptance rate {rate}");
    }

    #[test]
    fn test_wrong_secret_rejected_on_challenge_one() {
        let fs = scheme();
        let keys = fs.key_pair_from_secret(big(123)).unwrap();
        let impostor = fs.key_pair_from_secret(big(124)).unwrap();

        let witness = Witness::from_value(big(1000));
        let commitment = fs.commitment_for(&witness);
        let response = fs.respond(witness, &impostor.secret, fs.accept_challenge(big(1)).unwrap());
        let challenge = fs.accept_challenge(big(1)).unwrap();
        assert!(!fs.verify(&commitment, &challenge, &response, &keys.public));
    }

    #[test]
    fn test_zero_commitment_rejected() {
        let fs = scheme();
        let keys = fs.key_pair_from_secret(big(123)).unwrap();
        let challenge = fs.accept_challenge(big(1)).unwrap();
        assert!(!fs.verify(&Commitment(big(0)), &challenge, &Response(big(0)), &keys.public));
    }

    #[test]
    fn test_secret_must_be_coprime() {
        let fs = scheme();
        assert!(matches!(
            fs.key_pair_from_secret(big(61)),
            Err(Error::KeyGeneration(_))
        ));
        assert!(fs.key_pair_from_secret(big(1)).is_err());
        assert!(fs.key_pair_from_secret(big(3233)).is_err());
    }

    #[test]
    fn test_generate_params_in_reference_range() {
        let mut rng = StdRng::seed_from_u64(5);
        let params = FiatShamirParams::generate(&mut rng, &big(100), &big(500)).unwrap();
        assert!(params.modulus >= big(101 * 103));
        assert!(params.modulus <= big(499 * 491));
        params.validate().unwrap();
    }

    #[test]
    fn test_generate_params_fails_without_primes() {
        let mut rng = StdRng::seed_from_u64(5);
        let err = FiatShamirParams::generate(&mut rng, &big(24), &big(28)).unwrap_err();
        assert!(matches!(err, Error::KeyGeneration(_)));
    }

    #[test]
    fn test_tiny_modulus_rejected() {
        assert!(FiatShamir::new(FiatShamirParams { modulus: big(3) }).is_err());
    }
}
