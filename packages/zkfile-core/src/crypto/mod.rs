//! # Cryptography Module
//!
//! Number-theoretic primitives and the file cipher.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CRYPTO LAYOUT                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────┐      ┌──────────────────────────────┐    │
//! │  │  arith                   │      │  cipher                      │    │
//! │  │                          │◄─────│                              │    │
//! │  │ • mod_pow / mod_mul      │      │ • CipherKey (FS / SH / GQ)   │    │
//! │  │ • mod_inverse (ext. gcd) │      │ • KeystreamCipher            │    │
//! │  │ • primality (num-prime)  │      │ • ciphertext text format     │    │
//! │  │ • ranged random draws    │      │                              │    │
//! │  └──────────────────────────┘      └──────────────────────────────┘    │
//! │               ▲                                                         │
//! │               │                                                         │
//! │        crate::scheme                                                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! 1. **Toy parameters**: the reference moduli are four-digit numbers and
//!    offer no real security
//! 2. **Randomness**: production code passes `rand::rngs::OsRng`; tests pass
//!    a seeded `StdRng`
//! 3. **Cipher**: see [`cipher`] for why the file cipher is obfuscation only

pub mod arith;
pub mod cipher;

pub use cipher::{format_ciphertext, parse_ciphertext, CipherKey, KeystreamCipher};
