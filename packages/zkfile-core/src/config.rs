//! # Deployment Configuration
//!
//! Public parameters and pinned identities shared by both ends of a
//! deployment, plus the per-session knobs (round count, I/O timeout).
//!
//! Parameters are fixed for a deployment and never regenerated mid-session.
//! They default to the reference constants and can be loaded from a TOML
//! file where every big integer is a decimal string:
//!
//! ```toml
//! [fiat_shamir]
//! modulus = "3233"
//!
//! [schnorr]
//! prime = "2267"
//! order = "103"
//! generator = "354"
//!
//! [guillou_quisquater]
//! modulus = "3233"
//! exponent = "17"
//!
//! [pinned]
//! fiat_shamir = "2197"
//! schnorr = "2094"
//! guillou_quisquater = "255"
//! ```

use std::path::Path;
use std::time::Duration;

use num_bigint::BigUint;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::scheme::{
    FiatShamirParams, GqParams, IdentificationScheme, PublicKey, Scheme, SchemeKind,
    SchnorrParams,
};

/// Default number of identification rounds per session.
pub const DEFAULT_ROUNDS: u32 = 1;

/// Default deadline for every transport read and write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Secrets of the reference identities. Demo use only.
pub fn reference_secret(kind: SchemeKind) -> BigUint {
    match kind {
        SchemeKind::FiatShamir => BigUint::from(123u32),
        SchemeKind::Schnorr => BigUint::from(47u32),
        SchemeKind::GuillouQuisquater => BigUint::from(621u32),
    }
}

// ============================================================================
// PARAMETERS
// ============================================================================

/// Public parameters for all three schemes plus the pinned prover keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentParameters {
    /// Fiat–Shamir modulus
    pub fiat_shamir: FiatShamirParams,
    /// Schnorr group
    pub schnorr: SchnorrParams,
    /// Guillou–Quisquater modulus and exponent
    pub guillou_quisquater: GqParams,
    /// Expected prover public keys. A file without a `[pinned]` table pins
    /// nothing.
    #[serde(default = "PinnedKeys::none")]
    pub pinned: PinnedKeys,
}

impl Default for DeploymentParameters {
    fn default() -> Self {
        Self {
            fiat_shamir: FiatShamirParams::reference(),
            schnorr: SchnorrParams::reference(),
            guillou_quisquater: GqParams::reference(),
            pinned: PinnedKeys::default(),
        }
    }
}

impl DeploymentParameters {
    /// Load and validate a TOML parameter file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml(&text)
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let params: Self = toml::from_str(text)?;
        params.validate()?;
        Ok(params)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validate every scheme's parameters and every pinned key.
    pub fn validate(&self) -> Result<()> {
        self.fiat_shamir.validate()?;
        self.schnorr.validate()?;
        self.guillou_quisquater.validate()?;
        for kind in SchemeKind::ALL {
            if let Some(public) = self.pinned.for_kind(kind) {
                let scheme = Scheme::for_kind(kind, self)?;
                if !scheme.is_valid_public_key(&public) {
                    return Err(Error::Config(format!(
                        "pinned {} key {} is outside the group",
                        kind, public.0
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fresh parameters for every scheme with primes drawn from
    /// `[low, high]`. Nothing is pinned.
    pub fn generate(rng: &mut dyn RngCore, low: &BigUint, high: &BigUint) -> Result<Self> {
        Ok(Self {
            fiat_shamir: FiatShamirParams::generate(rng, low, high)?,
            schnorr: SchnorrParams::generate(rng, low, high)?,
            guillou_quisquater: GqParams::generate(rng, low, high)?,
            pinned: PinnedKeys::none(),
        })
    }
}

/// Prover public keys a verifier insists on, one per scheme.
///
/// A scheme with no pinned key accepts whatever key the prover announces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinnedKeys {
    /// Expected `V`
    #[serde(
        default,
        with = "option_big_uint",
        skip_serializing_if = "Option::is_none"
    )]
    pub fiat_shamir: Option<BigUint>,
    /// Expected `y`
    #[serde(
        default,
        with = "option_big_uint",
        skip_serializing_if = "Option::is_none"
    )]
    pub schnorr: Option<BigUint>,
    /// Expected `J`
    #[serde(
        default,
        with = "option_big_uint",
        skip_serializing_if = "Option::is_none"
    )]
    pub guillou_quisquater: Option<BigUint>,
}

impl Default for PinnedKeys {
    /// Pins the reference identities.
    fn default() -> Self {
        Self {
            fiat_shamir: Some(BigUint::from(2197u32)),
            schnorr: Some(BigUint::from(2094u32)),
            guillou_quisquater: Some(BigUint::from(255u32)),
        }
    }
}

impl PinnedKeys {
    /// Pin nothing.
    pub fn none() -> Self {
        Self {
            fiat_shamir: None,
            schnorr: None,
            guillou_quisquater: None,
        }
    }

    /// Pinned key for `kind`, if any.
    pub fn for_kind(&self, kind: SchemeKind) -> Option<PublicKey> {
        let value = match kind {
            SchemeKind::FiatShamir => &self.fiat_shamir,
            SchemeKind::Schnorr => &self.schnorr,
            SchemeKind::GuillouQuisquater => &self.guillou_quisquater,
        };
        value.clone().map(PublicKey)
    }

    /// Whether `announced` is acceptable for `kind`.
    pub fn admits(&self, kind: SchemeKind, announced: &PublicKey) -> bool {
        self.for_kind(kind).map_or(true, |pinned| &pinned == announced)
    }
}

// ============================================================================
// SESSION SETTINGS
// ============================================================================

/// Settings shared by the prover and verifier ends of one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Public parameters and pinned keys
    pub params: DeploymentParameters,
    /// Identification rounds; all must pass
    pub rounds: u32,
    /// Deadline for each read and write
    pub io_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            params: DeploymentParameters::default(),
            rounds: DEFAULT_ROUNDS,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl SessionConfig {
    /// Reject a zero round count.
    pub fn validate(&self) -> Result<()> {
        if self.rounds == 0 {
            return Err(Error::Config("rounds must be at least 1".into()));
        }
        if self.io_timeout.is_zero() {
            return Err(Error::Config("I/O timeout must be non-zero".into()));
        }
        self.params.validate()
    }
}

// ============================================================================
// SERDE HELPERS
// ============================================================================

/// Serialize `BigUint` as a decimal string; accept a string or a `u64`.
pub mod big_uint {
    use num_bigint::BigUint;
    use num_traits::Num;
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    pub(super) enum StringOrUint {
        String(String),
        Uint(u64),
    }

    impl StringOrUint {
        pub(super) fn into_big_uint<E: de::Error>(self) -> Result<BigUint, E> {
            match self {
                StringOrUint::String(s) => {
                    BigUint::from_str_radix(s.trim(), 10).map_err(de::Error::custom)
                }
                StringOrUint::Uint(u) => Ok(BigUint::from(u)),
            }
        }
    }

    /// Serialize as a decimal string.
    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_str_radix(10).serialize(serializer)
    }

    /// Deserialize from a decimal string or an integer.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        StringOrUint::deserialize(deserializer)?.into_big_uint()
    }
}

/// [`big_uint`] for optional fields.
pub mod option_big_uint {
    use num_bigint::BigUint;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::big_uint::StringOrUint;

    /// Serialize `Some` as a decimal string.
    pub fn serialize<S>(value: &Option<BigUint>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.to_str_radix(10)),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional decimal string or integer.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<BigUint>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<StringOrUint>::deserialize(deserializer)?
            .map(StringOrUint::into_big_uint)
            .transpose()
    }
}
