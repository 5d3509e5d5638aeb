//! # Identification Schemes
//!
//! Three interactive zero-knowledge identification protocols behind one
//! contract.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    ONE IDENTIFICATION ROUND                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Prover                                   Verifier                     │
//! │  ──────                                   ────────                     │
//! │                                                                         │
//! │  commit() ─► (Witness, Commitment)                                     │
//! │                    Commitment ─────────►  INIT → COMMITTED             │
//! │                                                                         │
//! │                          ◄───────────── Challenge (draw_challenge)     │
//! │                                           COMMITTED → CHALLENGED       │
//! │                                                                         │
//! │  respond(Witness, Secret, Challenge)                                   │
//! │                    Response ───────────►  CHALLENGED → RESPONDED       │
//! │                                                                         │
//! │                                           verify() → ACCEPTED/REJECTED │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Tag | Scheme | Commitment | Response | Check | Challenge space |
//! |-----|--------|------------|----------|-------|-----------------|
//! | 1 | Fiat–Shamir | `X = r² mod N` | `y = r·S^e mod N` | `y² = X·V^e` | `{0,1}` |
//! | 2 | Schnorr | `r = g^k mod p` | `s = k + e·x mod q` | `g^s = r·y^e` | `[1, q-1]` |
//! | 3 | Guillou–Quisquater | `X = r^v mod N` | `y = r·S^e mod N` | `y^v = X·J^e` | `[1, v-1]` |
//!
//! `Witness` and `Challenge` are move-only so a witness cannot be fed into
//! two responses.

mod attempt;
mod fiat_shamir;
mod guillou_quisquater;
mod schnorr;

use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use rand::RngCore;

use crate::config::DeploymentParameters;
use crate::crypto::arith::random_in_range;
use crate::error::{Error, Result};

pub use attempt::{AttemptState, Challenged, Committed, Responded};
pub use fiat_shamir::{FiatShamir, FiatShamirParams};
pub use guillou_quisquater::{GqParams, GuillouQuisquater};
pub use schnorr::{Schnorr, SchnorrParams};

/// Retry budget for secret/parameter searches.
pub(crate) const KEYGEN_ATTEMPTS: usize = 256;

// ============================================================================
// SCHEME SELECTOR
// ============================================================================

/// Wire selector for the three supported schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemeKind {
    /// Quadratic-residue identification (selector `1`, cipher tag `FS`)
    FiatShamir,
    /// Discrete-log identification (selector `2`, cipher tag `SH`)
    Schnorr,
    /// Higher-root identification (selector `3`, cipher tag `GQ`)
    GuillouQuisquater,
}

impl SchemeKind {
    /// All schemes in selector order.
    pub const ALL: [SchemeKind; 3] = [
        SchemeKind::FiatShamir,
        SchemeKind::Schnorr,
        SchemeKind::GuillouQuisquater,
    ];

    /// ASCII selector sent as the first frame of a session.
    pub fn selector(&self) -> u8 {
        match self {
            SchemeKind::FiatShamir => 1,
            SchemeKind::Schnorr => 2,
            SchemeKind::GuillouQuisquater => 3,
        }
    }

    /// Parse the selector frame text.
    pub fn from_selector(text: &str) -> Result<Self> {
        match text.trim() {
            "1" => Ok(SchemeKind::FiatShamir),
            "2" => Ok(SchemeKind::Schnorr),
            "3" => Ok(SchemeKind::GuillouQuisquater),
            other => Err(Error::InvalidSchemeSelector(other.to_string())),
        }
    }

    /// Tag used in the `ENCRYPTION:` frame.
    pub fn cipher_tag(&self) -> &'static str {
        match self {
            SchemeKind::FiatShamir => "FS",
            SchemeKind::Schnorr => "SH",
            SchemeKind::GuillouQuisquater => "GQ",
        }
    }

    /// Parse an `ENCRYPTION:` tag.
    pub fn from_cipher_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.cipher_tag() == tag)
    }

    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            SchemeKind::FiatShamir => "fiat-shamir",
            SchemeKind::Schnorr => "schnorr",
            SchemeKind::GuillouQuisquater => "guillou-quisquater",
        }
    }
}

impl fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SchemeKind {
    type Err = Error;

    /// Accepts the selector digit, the cipher tag, or the name.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Ok(kind) = Self::from_selector(s) {
            return Ok(kind);
        }
        Self::ALL
            .into_iter()
            .find(|kind| kind.cipher_tag().eq_ignore_ascii_case(s) || kind.name() == s)
            .ok_or_else(|| Error::InvalidSchemeSelector(s.to_string()))
    }
}

// ============================================================================
// PROTOCOL VALUES
// ============================================================================

/// A prover's public key (`V`, `y` or `J` depending on the scheme).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(pub BigUint);

/// A prover's long-term secret (`S` or `x`).
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(BigUint);

impl Secret {
    /// Wrap a raw secret value. Range checks happen in
    /// [`IdentificationScheme::key_pair_from_secret`].
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    /// Raw value, for cipher key derivation.
    pub fn expose(&self) -> &BigUint {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// Public key plus secret, owned by the prover.
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// Shared with verifiers
    pub public: PublicKey,
    /// Never leaves the prover during identification
    pub secret: Secret,
}

/// Ephemeral random value behind one commitment.
///
/// Not `Clone`: [`IdentificationScheme::respond`] takes it by value.
pub struct Witness(BigUint);

impl Witness {
    /// Fixed witness for known-answer tests and deterministic replays.
    pub fn from_value(value: BigUint) -> Self {
        Self(value)
    }

    pub(crate) fn value(&self) -> &BigUint {
        &self.0
    }
}

impl fmt::Debug for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Witness(<redacted>)")
    }
}

/// Value published before the challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commitment(pub BigUint);

/// Verifier-chosen value. Consumed by [`IdentificationScheme::respond`].
#[derive(Debug, PartialEq, Eq)]
pub struct Challenge(BigUint);

impl Challenge {
    /// The challenge value, for putting on the wire.
    pub fn value(&self) -> &BigUint {
        &self.0
    }
}

/// Prover's answer to a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response(pub BigUint);

/// Result of a completed identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Every round verified
    Accepted,
    /// At least one round failed, or the announced key was not the pinned one
    Rejected,
}

impl AuthOutcome {
    /// Whether the prover was accepted
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthOutcome::Accepted)
    }
}

// ============================================================================
// SCHEME CONTRACT
// ============================================================================

/// The contract every identification protocol implements.
///
/// Randomness is always injected so tests can replay exact transcripts.
pub trait IdentificationScheme {
    /// Which wire selector this scheme answers to.
    fn kind(&self) -> SchemeKind;

    /// Fresh key pair satisfying the scheme's algebraic relation.
    fn generate_keys(&self, rng: &mut dyn RngCore) -> Result<KeyPair>;

    /// Rebuild the key pair for a known secret.
    fn key_pair_from_secret(&self, secret: BigUint) -> Result<KeyPair>;

    /// Draw a fresh witness from the scheme's domain.
    fn draw_witness(&self, rng: &mut dyn RngCore) -> Witness;

    /// Commitment published for a witness.
    fn commitment_for(&self, witness: &Witness) -> Commitment;

    /// Draw a fresh witness and its commitment.
    fn commit(&self, rng: &mut dyn RngCore) -> (Witness, Commitment) {
        let witness = self.draw_witness(rng);
        let commitment = self.commitment_for(&witness);
        (witness, commitment)
    }

    /// Verifier side: draw a challenge uniformly from the challenge space.
    fn draw_challenge(&self, rng: &mut dyn RngCore) -> Challenge {
        let (low, high) = self.challenge_bounds();
        Challenge(random_in_range(rng, &low, &high))
    }

    /// Prover side: accept a challenge received from the wire.
    fn accept_challenge(&self, value: BigUint) -> Result<Challenge> {
        let (low, high) = self.challenge_bounds();
        if value < low || value > high {
            return Err(Error::MalformedFrame(format!(
                "challenge {} outside [{}, {}]",
                value, low, high
            )));
        }
        Ok(Challenge(value))
    }

    /// Inclusive bounds of the challenge space.
    fn challenge_bounds(&self) -> (BigUint, BigUint);

    /// Number of distinct challenges; a forger succeeds with probability
    /// about `1 / challenge_space_size()` per round.
    fn challenge_space_size(&self) -> BigUint {
        let (low, high) = self.challenge_bounds();
        high - low + 1u8
    }

    /// Combine witness, secret and challenge into the response.
    fn respond(&self, witness: Witness, secret: &Secret, challenge: Challenge) -> Response;

    /// Recompute both sides of the verification equation.
    fn verify(
        &self,
        commitment: &Commitment,
        challenge: &Challenge,
        response: &Response,
        public: &PublicKey,
    ) -> bool;

    /// Range check for a public key announced by a prover.
    fn is_valid_public_key(&self, public: &PublicKey) -> bool;
}

// ============================================================================
// TAGGED VARIANT
// ============================================================================

/// One concrete scheme, chosen once per session from the selector.
#[derive(Debug, Clone)]
pub enum Scheme {
    /// Selector `1`
    FiatShamir(FiatShamir),
    /// Selector `2`
    Schnorr(Schnorr),
    /// Selector `3`
    GuillouQuisquater(GuillouQuisquater),
}

macro_rules! delegate {
    ($self:ident, $inner:ident => $call:expr) => {
        match $self {
            Scheme::FiatShamir($inner) => $call,
            Scheme::Schnorr($inner) => $call,
            Scheme::GuillouQuisquater($inner) => $call,
        }
    };
}

impl Scheme {
    /// Build the scheme for `kind` from the deployment's public parameters.
    pub fn for_kind(kind: SchemeKind, params: &DeploymentParameters) -> Result<Self> {
        Ok(match kind {
            SchemeKind::FiatShamir => {
                Scheme::FiatShamir(FiatShamir::new(params.fiat_shamir.clone())?)
            }
            SchemeKind::Schnorr => Scheme::Schnorr(Schnorr::new(params.schnorr.clone())?),
            SchemeKind::GuillouQuisquater => Scheme::GuillouQuisquater(GuillouQuisquater::new(
                params.guillou_quisquater.clone(),
            )?),
        })
    }
}

impl IdentificationScheme for Scheme {
    fn kind(&self) -> SchemeKind {
        delegate!(self, s => s.kind())
    }

    fn generate_keys(&self, rng: &mut dyn RngCore) -> Result<KeyPair> {
        delegate!(self, s => s.generate_keys(rng))
    }

    fn key_pair_from_secret(&self, secret: BigUint) -> Result<KeyPair> {
        delegate!(self, s => s.key_pair_from_secret(secret))
    }

    fn draw_witness(&self, rng: &mut dyn RngCore) -> Witness {
        delegate!(self, s => s.draw_witness(rng))
    }

    fn commitment_for(&self, witness: &Witness) -> Commitment {
        delegate!(self, s => s.commitment_for(witness))
    }

    fn draw_challenge(&self, rng: &mut dyn RngCore) -> Challenge {
        delegate!(self, s => s.draw_challenge(rng))
    }

    fn challenge_bounds(&self) -> (BigUint, BigUint) {
        delegate!(self, s => s.challenge_bounds())
    }

    fn respond(&self, witness: Witness, secret: &Secret, challenge: Challenge) -> Response {
        delegate!(self, s => s.respond(witness, secret, challenge))
    }

    fn verify(
        &self,
        commitment: &Commitment,
        challenge: &Challenge,
        response: &Response,
        public: &PublicKey,
    ) -> bool {
        delegate!(self, s => s.verify(commitment, challenge, response, public))
    }

    fn is_valid_public_key(&self, public: &PublicKey) -> bool {
        delegate!(self, s => s.is_valid_public_key(public))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_selector_roundtrip() {
        for kind in SchemeKind::ALL {
            let text = kind.selector().to_string();
            assert_eq!(SchemeKind::from_selector(&text).unwrap(), kind);
        }
    }

    #[test]
    fn test_invalid_selector() {
        for bad in ["0", "4", "", "abc", "1 2"] {
            let err = SchemeKind::from_selector(bad).unwrap_err();
            assert!(matches!(err, Error::InvalidSchemeSelector(_)), "{bad:?}");
        }
    }

    #[test]
    fn test_cipher_tags() {
        assert_eq!(SchemeKind::from_cipher_tag("FS"), Some(SchemeKind::FiatShamir));
        assert_eq!(SchemeKind::from_cipher_tag("SH"), Some(SchemeKind::Schnorr));
        assert_eq!(
            SchemeKind::from_cipher_tag("GQ"),
            Some(SchemeKind::GuillouQuisquater)
        );
        assert_eq!(SchemeKind::from_cipher_tag("XX"), None);
    }

    #[test]
    fn test_from_str_accepts_names_and_tags() {
        assert_eq!("2".parse::<SchemeKind>().unwrap(), SchemeKind::Schnorr);
        assert_eq!("gq".parse::<SchemeKind>().unwrap(), SchemeKind::GuillouQuisquater);
        assert_eq!("fiat-shamir".parse::<SchemeKind>().unwrap(), SchemeKind::FiatShamir);
        assert!("rsa".parse::<SchemeKind>().is_err());
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = Secret::new(BigUint::from(123u32));
        assert!(!format!("{:?}", secret).contains("123"));
        let witness = Witness::from_value(BigUint::from(1000u32));
        assert!(!format!("{:?}", witness).contains("1000"));
    }

    #[test]
    fn test_tagged_variant_completeness() {
        let params = DeploymentParameters::default();
        let mut rng = StdRng::seed_from_u64(42);

        for kind in SchemeKind::ALL {
            let scheme = Scheme::for_kind(kind, &params).unwrap();
            assert_eq!(scheme.kind(), kind);

            let keys = scheme.generate_keys(&mut rng).unwrap();
            assert!(scheme.is_valid_public_key(&keys.public));

            for _ in 0..20 {
                let (witness, commitment) = scheme.commit(&mut rng);
                let challenge = scheme.draw_challenge(&mut rng);
                let echoed = scheme.accept_challenge(challenge.value().clone()).unwrap();
                let response = scheme.respond(witness, &keys.secret, echoed);
                assert!(scheme.verify(&commitment, &challenge, &response, &keys.public));
            }
        }
    }

    #[test]
    fn test_accept_challenge_rejects_out_of_range() {
        let params = DeploymentParameters::default();
        let fs = Scheme::for_kind(SchemeKind::FiatShamir, &params).unwrap();
        assert!(fs.accept_challenge(BigUint::from(2u8)).is_err());

        let gq = Scheme::for_kind(SchemeKind::GuillouQuisquater, &params).unwrap();
        assert!(gq.accept_challenge(BigUint::from(0u8)).is_err());
        assert!(gq.accept_challenge(BigUint::from(17u8)).is_err());
        assert!(gq.accept_challenge(BigUint::from(16u8)).is_ok());
    }

    #[test]
    fn test_challenge_space_sizes() {
        let params = DeploymentParameters::default();
        let size = |kind| {
            Scheme::for_kind(kind, &params)
                .unwrap()
                .challenge_space_size()
        };
        assert_eq!(size(SchemeKind::FiatShamir), BigUint::from(2u8));
        assert_eq!(size(SchemeKind::Schnorr), BigUint::from(102u8));
        assert_eq!(size(SchemeKind::GuillouQuisquater), BigUint::from(16u8));
    }
}
