//! # zkfile Core
//!
//! Zero-knowledge identification (Fiat–Shamir, Schnorr, Guillou–Quisquater)
//! followed by an encrypted file upload on the same connection.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         ZKFILE CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────┐  ┌──────────────────┐  ┌─────────────────────────┐    │
//! │  │   Crypto    │  │     Scheme       │  │        Network          │    │
//! │  │             │  │                  │  │                         │    │
//! │  │ - mod_pow   │◄─│ - Fiat–Shamir    │◄─│ - Channel (framing)     │    │
//! │  │ - inverse   │  │ - Schnorr        │  │ - ProofSession          │    │
//! │  │ - primes    │  │ - GQ             │  │ - ProverSession         │    │
//! │  │ - Keystream │  │ - attempt states │  │ - file transfer         │    │
//! │  └──────┬──────┘  └──────────────────┘  └────────────┬────────────┘    │
//! │         │                                            │                 │
//! │         └────────────────────┬───────────────────────┘                 │
//! │                              │                                          │
//! │  ┌─────────────┐  ┌──────────┴──┐                                      │
//! │  │   Config    │  │   Storage   │                                      │
//! │  │             │  │             │                                      │
//! │  │ - params    │  │ - output dir│                                      │
//! │  │ - pinned    │  │ - scratch   │                                      │
//! │  │ - session   │  │   files     │                                      │
//! │  └─────────────┘  └─────────────┘                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Modular arithmetic and the keystream cipher
//! - [`scheme`] - The three identification schemes
//! - [`config`] - Deployment parameters and session settings
//! - [`network`] - Framing, identification sessions, file transfer
//! - [`storage`] - Received-file directory
//!
//! ## Security Model
//!
//! The identification rounds reveal nothing about the prover's secret
//! beyond the fact that the prover knows it. The file cipher is another
//! matter: its key travels in the clear in the `ENCRYPTION:` frame, so the
//! upload is obfuscated, not confidential. Run it over a secure transport
//! if the contents matter.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod config;
pub mod crypto;
pub mod error;
pub mod network;
pub mod scheme;
pub mod storage;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use config::{DeploymentParameters, PinnedKeys, SessionConfig};
pub use crypto::{CipherKey, KeystreamCipher};
pub use error::{Error, Result};
pub use network::{Channel, ProofSession, ProverSession};
pub use scheme::{
    AuthOutcome, IdentificationScheme, KeyPair, PublicKey, Scheme, SchemeKind, Secret,
};
pub use storage::ReceivedFiles;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of zkfile Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns build information for debugging
pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("CARGO_PKG_VERSION"),
        target: std::env::consts::OS,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Build information for debugging
#[derive(Debug, Clone, serde::Serialize)]
pub struct BuildInfo {
    /// Crate version
    pub version: &'static str,
    /// Target operating system
    pub target: &'static str,
    /// Build profile (debug/release)
    pub profile: &'static str,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }

    #[test]
    fn test_build_info() {
        let info = build_info();
        assert_eq!(info.version, version());
        assert!(!info.target.is_empty());
    }
}
