//! # Keystream Cipher
//!
//! A fixed multiplicative mask applied to every text unit of a file.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        MASK PER SCHEME                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Tag   Key fields                 Encrypt mask      Decrypt multiplier │
//! │  ───   ─────────────────────────  ────────────      ────────────────── │
//! │  FS    N, S                       S² mod N          (S²)^-1 mod N      │
//! │  SH    p, g, x                    g^x mod p         (g^x)^-1 mod p     │
//! │  GQ    N, v' = S^-2 mod N, S      S² mod N          v'                 │
//! │                                                                         │
//! │  c = u · mask mod modulus            u = c · mask^-1 mod modulus        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Units are Unicode scalar values and every unit must be below the
//! modulus. Ciphertext is the decimal units joined by single spaces.
//!
//! ## Security Considerations
//!
//! This is a deterministic substitution over an integer alphabet. Equal
//! plaintext units always give equal ciphertext units, and multiplying a
//! ciphertext unit by `k` multiplies the plaintext by `k`. Nothing is
//! authenticated. On top of that the `ENCRYPTION:` frame carries the key
//! itself, so anyone who can read the connection can decrypt the file.
//! Treat the cipher as obfuscation only.

use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, ToPrimitive};
use rand::RngCore;

use crate::crypto::arith::{
    mod_inverse, mod_mul, mod_pow, random_coprime_in_range, random_in_range,
    random_prime_in_range,
};
use crate::error::{Error, Result};
use crate::scheme::{KeyPair, Scheme, SchemeKind};

/// Prime range for fresh Fiat–Shamir and Guillou–Quisquater file keys.
const FRESH_MODULUS_PRIMES: (u32, u32) = (100, 500);

/// Prime range for fresh Schnorr file keys.
const FRESH_SCHNORR_PRIME: (u32, u32) = (1000, 5000);

const FRESH_KEY_ATTEMPTS: usize = 1024;

// ============================================================================
// KEY
// ============================================================================

/// Everything a receiver needs to decrypt one file.
#[derive(Clone, PartialEq, Eq)]
pub enum CipherKey {
    /// Mask `S² mod N`
    FiatShamir {
        /// `N`
        modulus: BigUint,
        /// `S`
        secret: BigUint,
    },
    /// Mask `g^x mod p`
    Schnorr {
        /// `p`
        prime: BigUint,
        /// `g`
        generator: BigUint,
        /// `x`
        secret: BigUint,
    },
    /// Mask `S² mod N`, unmasked with `S^-2 mod N`
    GuillouQuisquater {
        /// `N`
        modulus: BigUint,
        /// `S^-2 mod N`
        inverse_mask: BigUint,
        /// `S`
        secret: BigUint,
    },
}

impl CipherKey {
    /// Derive the file key from an identification key pair.
    pub fn from_identity(scheme: &Scheme, keys: &KeyPair) -> Result<Self> {
        let secret = keys.secret.expose().clone();
        Ok(match scheme {
            Scheme::FiatShamir(fs) => CipherKey::FiatShamir {
                modulus: fs.params().modulus.clone(),
                secret,
            },
            Scheme::Schnorr(sh) => CipherKey::Schnorr {
                prime: sh.params().prime.clone(),
                generator: sh.params().generator.clone(),
                secret,
            },
            Scheme::GuillouQuisquater(gq) => {
                Self::guillou_quisquater(gq.params().modulus.clone(), secret)?
            }
        })
    }

    /// Fresh parameters and secret for one file.
    pub fn generate(kind: SchemeKind, rng: &mut dyn RngCore) -> Result<Self> {
        match kind {
            SchemeKind::FiatShamir => {
                let modulus = fresh_composite(rng)?;
                let secret = fresh_unit(rng, &modulus)?;
                Ok(CipherKey::FiatShamir { modulus, secret })
            }
            SchemeKind::Schnorr => {
                let (low, high) = FRESH_SCHNORR_PRIME;
                let prime = random_prime_in_range(
                    rng,
                    &BigUint::from(low),
                    &BigUint::from(high),
                    FRESH_KEY_ATTEMPTS,
                )
                .ok_or_else(|| Error::KeyGeneration("no prime for file key".into()))?;
                let upper = &prime - 2u8;
                let generator = random_in_range(rng, &BigUint::from(2u8), &upper);
                let secret = random_in_range(rng, &BigUint::from(2u8), &upper);
                Ok(CipherKey::Schnorr {
                    prime,
                    generator,
                    secret,
                })
            }
            SchemeKind::GuillouQuisquater => {
                let modulus = fresh_composite(rng)?;
                let secret = fresh_unit(rng, &modulus)?;
                Self::guillou_quisquater(modulus, secret)
            }
        }
    }

    fn guillou_quisquater(modulus: BigUint, secret: BigUint) -> Result<Self> {
        let mask = mod_pow(&secret, &BigUint::from(2u8), &modulus);
        let inverse_mask = mod_inverse(&mask, &modulus).ok_or_else(|| {
            Error::NonInvertibleKey(format!("S² has no inverse modulo {}", modulus))
        })?;
        Ok(CipherKey::GuillouQuisquater {
            modulus,
            inverse_mask,
            secret,
        })
    }

    /// Which scheme tag this key travels under.
    pub fn kind(&self) -> SchemeKind {
        match self {
            CipherKey::FiatShamir { .. } => SchemeKind::FiatShamir,
            CipherKey::Schnorr { .. } => SchemeKind::Schnorr,
            CipherKey::GuillouQuisquater { .. } => SchemeKind::GuillouQuisquater,
        }
    }

    /// Modulus every unit is reduced by.
    pub fn modulus(&self) -> &BigUint {
        match self {
            CipherKey::FiatShamir { modulus, .. } => modulus,
            CipherKey::Schnorr { prime, .. } => prime,
            CipherKey::GuillouQuisquater { modulus, .. } => modulus,
        }
    }

    /// Body of the `ENCRYPTION:` frame, e.g. `FS:3233:123`.
    pub fn to_wire(&self) -> String {
        let tag = self.kind().cipher_tag();
        match self {
            CipherKey::FiatShamir { modulus, secret } => format!("{}:{}:{}", tag, modulus, secret),
            CipherKey::Schnorr {
                prime,
                generator,
                secret,
            } => format!("{}:{}:{}:{}", tag, prime, generator, secret),
            CipherKey::GuillouQuisquater {
                modulus,
                inverse_mask,
                secret,
            } => format!("{}:{}:{}:{}", tag, modulus, inverse_mask, secret),
        }
    }

    /// Parse the body of an `ENCRYPTION:` frame.
    pub fn parse(body: &str) -> Result<Self> {
        let mut parts = body.split(':');
        let tag = parts.next().unwrap_or_default();
        let kind = SchemeKind::from_cipher_tag(tag)
            .ok_or_else(|| Error::MalformedFrame(format!("unknown cipher tag {:?}", tag)))?;
        let fields = parts
            .map(|field| {
                field.parse::<BigUint>().map_err(|_| {
                    Error::MalformedFrame(format!("cipher field {:?} is not an integer", field))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let key = match (kind, fields.as_slice()) {
            (SchemeKind::FiatShamir, [modulus, secret]) => CipherKey::FiatShamir {
                modulus: modulus.clone(),
                secret: secret.clone(),
            },
            (SchemeKind::Schnorr, [prime, generator, secret]) => CipherKey::Schnorr {
                prime: prime.clone(),
                generator: generator.clone(),
                secret: secret.clone(),
            },
            (SchemeKind::GuillouQuisquater, [modulus, inverse_mask, secret]) => {
                CipherKey::GuillouQuisquater {
                    modulus: modulus.clone(),
                    inverse_mask: inverse_mask.clone(),
                    secret: secret.clone(),
                }
            }
            _ => {
                return Err(Error::MalformedFrame(format!(
                    "wrong number of fields for {} cipher key",
                    tag
                )))
            }
        };
        if key.modulus() <= &BigUint::one() {
            return Err(Error::MalformedFrame("cipher modulus must exceed 1".into()));
        }
        Ok(key)
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKey")
            .field("kind", &self.kind())
            .field("modulus", self.modulus())
            .field("secret", &"<redacted>")
            .finish()
    }
}

fn fresh_composite(rng: &mut dyn RngCore) -> Result<BigUint> {
    let (low, high) = FRESH_MODULUS_PRIMES;
    let (low, high) = (BigUint::from(low), BigUint::from(high));
    for _ in 0..FRESH_KEY_ATTEMPTS {
        let p = random_prime_in_range(rng, &low, &high, FRESH_KEY_ATTEMPTS);
        let q = random_prime_in_range(rng, &low, &high, FRESH_KEY_ATTEMPTS);
        if let (Some(p), Some(q)) = (p, q) {
            if p != q {
                return Ok(p * q);
            }
        }
    }
    Err(Error::KeyGeneration("no modulus for file key".into()))
}

fn fresh_unit(rng: &mut dyn RngCore, modulus: &BigUint) -> Result<BigUint> {
    let upper = modulus - 1u8;
    random_coprime_in_range(rng, &BigUint::from(2u8), &upper, modulus, FRESH_KEY_ATTEMPTS)
        .ok_or_else(|| Error::KeyGeneration("no secret for file key".into()))
}

// ============================================================================
// CIPHER
// ============================================================================

/// Ready-to-use mask pair for one key.
#[derive(Clone)]
pub struct KeystreamCipher {
    modulus: BigUint,
    mask: BigUint,
    unmask: BigUint,
}

impl KeystreamCipher {
    /// Compute the mask and its inverse.
    ///
    /// Fails with [`Error::NonInvertibleKey`] when the mask shares a factor
    /// with the modulus.
    pub fn new(key: &CipherKey) -> Result<Self> {
        let modulus = key.modulus().clone();
        let non_invertible =
            || Error::NonInvertibleKey(format!("mask has no inverse modulo {}", modulus));

        let (mask, unmask) = match key {
            CipherKey::FiatShamir { modulus, secret } => {
                let mask = mod_pow(secret, &BigUint::from(2u8), modulus);
                let unmask = mod_inverse(&mask, modulus).ok_or_else(non_invertible)?;
                (mask, unmask)
            }
            CipherKey::Schnorr {
                prime,
                generator,
                secret,
            } => {
                let mask = mod_pow(generator, secret, prime);
                let unmask = mod_inverse(&mask, prime).ok_or_else(non_invertible)?;
                (mask, unmask)
            }
            CipherKey::GuillouQuisquater {
                modulus,
                inverse_mask,
                ..
            } => {
                let mask = mod_inverse(inverse_mask, modulus).ok_or_else(non_invertible)?;
                (mask, inverse_mask.clone())
            }
        };
        Ok(Self {
            modulus,
            mask,
            unmask,
        })
    }

    /// Encrypt one code point.
    pub fn encrypt_unit(&self, unit: u32) -> Result<BigUint> {
        let value = BigUint::from(unit);
        if value >= self.modulus {
            return Err(Error::AlphabetOverflow {
                unit,
                modulus: self.modulus.to_string(),
            });
        }
        Ok(mod_mul(&value, &self.mask, &self.modulus))
    }

    /// Decrypt one unit back to a code point.
    pub fn decrypt_unit(&self, unit: &BigUint) -> Result<u32> {
        if unit >= &self.modulus {
            return Err(Error::MalformedCiphertext(format!(
                "unit {} is not below modulus {}",
                unit, self.modulus
            )));
        }
        let plain = mod_mul(unit, &self.unmask, &self.modulus);
        plain
            .to_u32()
            .ok_or_else(|| Error::InvalidCodePoint(plain.to_string()))
    }

    /// Encrypt every character of `text`.
    pub fn encrypt_text(&self, text: &str) -> Result<Vec<BigUint>> {
        text.chars().map(|c| self.encrypt_unit(c as u32)).collect()
    }

    /// Decrypt a unit sequence into a string.
    pub fn decrypt_units(&self, units: &[BigUint]) -> Result<String> {
        units
            .iter()
            .map(|unit| {
                let code = self.decrypt_unit(unit)?;
                char::from_u32(code).ok_or_else(|| Error::InvalidCodePoint(format!("{:#x}", code)))
            })
            .collect()
    }

    /// Encrypt `text` into the space-separated ciphertext format.
    pub fn encrypt_to_string(&self, text: &str) -> Result<String> {
        Ok(format_ciphertext(&self.encrypt_text(text)?))
    }

    /// Decrypt space-separated ciphertext.
    pub fn decrypt_str(&self, ciphertext: &str) -> Result<String> {
        self.decrypt_units(&parse_ciphertext(ciphertext)?)
    }
}

impl fmt::Debug for KeystreamCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeystreamCipher")
            .field("modulus", &self.modulus)
            .finish_non_exhaustive()
    }
}

/// Decimal units joined by single spaces.
pub fn format_ciphertext(units: &[BigUint]) -> String {
    units
        .iter()
        .map(|unit| unit.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Split on whitespace and parse every token as a decimal integer.
pub fn parse_ciphertext(text: &str) -> Result<Vec<BigUint>> {
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<BigUint>()
                .map_err(|_| Error::MalformedCiphertext(format!("{:?} is not an integer", token)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{reference_secret, DeploymentParameters};
    use crate::scheme::IdentificationScheme;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn big(x: u64) -> BigUint {
        BigUint::from(x)
    }

    fn reference_key(kind: SchemeKind) -> CipherKey {
        let scheme = Scheme::for_kind(kind, &DeploymentParameters::default()).unwrap();
        let keys = scheme.key_pair_from_secret(reference_secret(kind)).unwrap();
        CipherKey::from_identity(&scheme, &keys).unwrap()
    }

    #[test]
    fn test_reference_keys_on_the_wire() {
        assert_eq!(reference_key(SchemeKind::FiatShamir).to_wire(), "FS:3233:123");
        assert_eq!(reference_key(SchemeKind::Schnorr).to_wire(), "SH:2267:354:47");

        let gq = reference_key(SchemeKind::GuillouQuisquater);
        let wire = gq.to_wire();
        assert!(wire.starts_with("GQ:3233:"));
        assert!(wire.ends_with(":621"));
        assert_eq!(CipherKey::parse(&wire).unwrap(), gq);
    }

    #[test]
    fn test_roundtrip_for_every_scheme() {
        let text = "Hello, World!\nÀ bientôt";
        for kind in SchemeKind::ALL {
            let cipher = KeystreamCipher::new(&reference_key(kind)).unwrap();
            let ciphertext = cipher.encrypt_to_string(text).unwrap();
            assert_ne!(ciphertext, text);
            assert_eq!(cipher.decrypt_str(&ciphertext).unwrap(), text, "{kind}");
        }
    }

    #[test]
    fn test_fiat_shamir_mask_is_v() {
        let cipher = KeystreamCipher::new(&reference_key(SchemeKind::FiatShamir)).unwrap();
        // 'A' = 65, mask = 123² mod 3233 = 2197
        assert_eq!(cipher.encrypt_unit(65).unwrap(), big(65 * 2197 % 3233));
    }

    #[test]
    fn test_identical_units_encrypt_identically() {
        let cipher = KeystreamCipher::new(&reference_key(SchemeKind::Schnorr)).unwrap();
        let units = cipher.encrypt_text("aaa").unwrap();
        assert_eq!(units[0], units[1]);
        assert_eq!(units[1], units[2]);
    }

    #[test]
    fn test_ciphertext_is_malleable() {
        let cipher = KeystreamCipher::new(&reference_key(SchemeKind::FiatShamir)).unwrap();
        let c = cipher.encrypt_unit('!' as u32).unwrap();
        // 33 · 2 = 66 = 'B'
        let doubled = mod_mul(&c, &big(2), &big(3233));
        assert_eq!(cipher.decrypt_unit(&doubled).unwrap(), 'B' as u32);
    }

    #[test]
    fn test_alphabet_overflow() {
        let cipher = KeystreamCipher::new(&reference_key(SchemeKind::FiatShamir)).unwrap();
        let err = cipher.encrypt_text("中文").unwrap_err();
        assert!(matches!(err, Error::AlphabetOverflow { unit: 0x4E2D, .. }));
    }

    #[test]
    fn test_non_invertible_mask() {
        // 61 divides 3233, so 61² has no inverse
        let key = CipherKey::FiatShamir {
            modulus: big(3233),
            secret: big(61),
        };
        assert!(matches!(
            KeystreamCipher::new(&key),
            Err(Error::NonInvertibleKey(_))
        ));

        let key = CipherKey::GuillouQuisquater {
            modulus: big(3233),
            inverse_mask: big(53),
            secret: big(2),
        };
        assert!(matches!(
            KeystreamCipher::new(&key),
            Err(Error::NonInvertibleKey(_))
        ));
    }

    #[test]
    fn test_invalid_code_point() {
        // Surrogates are not scalar values
        let key = CipherKey::Schnorr {
            prime: big(65537),
            generator: big(3),
            secret: big(5),
        };
        let cipher = KeystreamCipher::new(&key).unwrap();
        let c = mod_mul(&big(0xD800), &mod_pow(&big(3), &big(5), &big(65537)), &big(65537));
        let err = cipher.decrypt_units(&[c]).unwrap_err();
        assert!(matches!(err, Error::InvalidCodePoint(_)));
    }

    #[test]
    fn test_malformed_ciphertext() {
        let cipher = KeystreamCipher::new(&reference_key(SchemeKind::FiatShamir)).unwrap();
        assert!(matches!(
            cipher.decrypt_str("12 abc 7"),
            Err(Error::MalformedCiphertext(_))
        ));
        assert!(matches!(
            cipher.decrypt_str("99999"),
            Err(Error::MalformedCiphertext(_))
        ));
        assert_eq!(cipher.decrypt_str("").unwrap(), "");
    }

    #[test]
    fn test_parse_rejects_bad_frames() {
        assert!(CipherKey::parse("XX:1:2").is_err());
        assert!(CipherKey::parse("FS:3233").is_err());
        assert!(CipherKey::parse("SH:2267:354").is_err());
        assert!(CipherKey::parse("FS:abc:1").is_err());
        assert!(CipherKey::parse("FS:1:1").is_err());
        assert!(CipherKey::parse("").is_err());
    }

    #[test]
    fn test_fresh_keys_roundtrip() {
        let mut rng = StdRng::seed_from_u64(17);
        for kind in SchemeKind::ALL {
            let key = CipherKey::generate(kind, &mut rng).unwrap();
            assert_eq!(key.kind(), kind);
            let parsed = CipherKey::parse(&key.to_wire()).unwrap();
            let cipher = KeystreamCipher::new(&parsed).unwrap();
            let text = "fresh key per file";
            assert_eq!(cipher.decrypt_str(&cipher.encrypt_to_string(text).unwrap()).unwrap(), text);
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        let key = reference_key(SchemeKind::FiatShamir);
        assert!(!format!("{:?}", key).contains("123"));
    }
}
