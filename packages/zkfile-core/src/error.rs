//! # Error Handling
//!
//! Error types for zkfile core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Protocol Errors (terminal, peer gets ERROR:<msg>)                 │
//! │  │   ├── InvalidSchemeSelector - Selector is not 1, 2 or 3             │
//! │  │   ├── MalformedFrame        - Frame text cannot be parsed           │
//! │  │   ├── UnexpectedFrame       - Well-formed frame, wrong step         │
//! │  │   ├── FrameTooLarge         - Length prefix above the cap           │
//! │  │   └── PeerError             - Peer sent ERROR:<msg>                 │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── KeyGeneration         - Retry budget exhausted                │
//! │  │   ├── InvalidParameters     - Moduli/generators fail validation     │
//! │  │   ├── NonInvertibleKey      - gcd(mask, modulus) != 1               │
//! │  │   ├── AlphabetOverflow      - Text unit >= modulus                  │
//! │  │   ├── InvalidCodePoint      - Decrypted unit is not a char          │
//! │  │   └── MalformedCiphertext   - Ciphertext token is not an integer    │
//! │  │                                                                      │
//! │  ├── Transfer Errors                                                   │
//! │  │   ├── TruncatedTransfer     - Stream closed before FILESIZE bytes   │
//! │  │   ├── InvalidFileName       - Empty or path-like file name          │
//! │  │   └── FileTooLarge          - FILESIZE above the configured cap     │
//! │  │                                                                      │
//! │  ├── Transport Errors                                                  │
//! │  │   ├── TransportTimeout      - Read/write deadline expired           │
//! │  │   ├── ConnectionClosed      - Peer hung up                          │
//! │  │   └── Io                    - Any other I/O failure                 │
//! │  │                                                                      │
//! │  └── Config Errors                                                     │
//! │      └── Config                - Parameter file unreadable/invalid     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A verifier rejecting a proof is *not* an error. It is the
//! [`AuthOutcome::Rejected`](crate::scheme::AuthOutcome) value.

use thiserror::Error;

/// Result type alias for zkfile core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for zkfile core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Protocol Errors (100-199)
    // ========================================================================

    /// Scheme selector was not one of the supported tags
    #[error("Invalid scheme selector: {0:?}")]
    InvalidSchemeSelector(String),

    /// A frame could not be parsed
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// A well-formed frame arrived at the wrong protocol step
    #[error("Unexpected frame: expected {expected}, got {got:?}")]
    UnexpectedFrame {
        /// What the protocol step was waiting for
        expected: &'static str,
        /// The frame text actually received
        got: String,
    },

    /// Length prefix announced more than the frame cap
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Announced size
        size: usize,
        /// Configured cap
        max: usize,
    },

    /// The peer answered with `ERROR:<msg>`
    #[error("Peer reported an error: {0}")]
    PeerError(String),

    // ========================================================================
    // Crypto Errors (200-299)
    // ========================================================================

    /// No valid key or parameter could be found within the retry budget
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// Public parameters fail validation
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The cipher mask has no inverse modulo the modulus
    #[error("Key is not invertible: {0}")]
    NonInvertibleKey(String),

    /// A text unit does not fit below the cipher modulus
    #[error("Text unit U+{unit:04X} does not fit below modulus {modulus}")]
    AlphabetOverflow {
        /// Offending code point
        unit: u32,
        /// Modulus in decimal
        modulus: String,
    },

    /// A decrypted unit is not a Unicode scalar value
    #[error("Decrypted unit is not a valid code point: {0}")]
    InvalidCodePoint(String),

    /// A ciphertext token is not a decimal integer below the modulus
    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    // ========================================================================
    // Transfer Errors (300-399)
    // ========================================================================

    /// Transport closed before the declared number of bytes arrived
    #[error("Truncated transfer: expected {expected} bytes, received {received}")]
    TruncatedTransfer {
        /// Declared FILESIZE
        expected: u64,
        /// Bytes actually read
        received: u64,
    },

    /// File name is empty or tries to escape the output directory
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    /// Declared file size exceeds the receiver's cap
    #[error("File too large: {size} bytes (max {max})")]
    FileTooLarge {
        /// Declared size
        size: u64,
        /// Configured cap
        max: u64,
    },

    // ========================================================================
    // Transport Errors (400-499)
    // ========================================================================

    /// A read or write did not complete before the deadline
    #[error("Transport timed out while {0}")]
    TransportTimeout(String),

    /// The peer closed the connection
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Any other I/O failure
    #[error("I/O error: {0}")]
    Io(String),

    // ========================================================================
    // Config Errors (500-599)
    // ========================================================================

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Get a stable numeric code for the error
    ///
    /// - 100-199: Protocol
    /// - 200-299: Crypto
    /// - 300-399: Transfer
    /// - 400-499: Transport
    /// - 500-599: Config
    pub fn code(&self) -> i32 {
        match self {
            // Protocol (100-199)
            Error::InvalidSchemeSelector(_) => 100,
            Error::MalformedFrame(_) => 101,
            Error::UnexpectedFrame { .. } => 102,
            Error::FrameTooLarge { .. } => 103,
            Error::PeerError(_) => 104,

            // Crypto (200-299)
            Error::KeyGeneration(_) => 200,
            Error::InvalidParameters(_) => 201,
            Error::NonInvertibleKey(_) => 202,
            Error::AlphabetOverflow { .. } => 203,
            Error::InvalidCodePoint(_) => 204,
            Error::MalformedCiphertext(_) => 205,

            // Transfer (300-399)
            Error::TruncatedTransfer { .. } => 300,
            Error::InvalidFileName(_) => 301,
            Error::FileTooLarge { .. } => 302,

            // Transport (400-499)
            Error::TransportTimeout(_) => 400,
            Error::ConnectionClosed => 401,
            Error::Io(_) => 402,

            // Config (500-599)
            Error::Config(_) => 500,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Nothing is retried automatically inside a session; this only tells a
    /// caller whether opening a fresh connection may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TransportTimeout(_) | Error::ConnectionClosed | Error::Io(_)
        )
    }

    /// Whether the peer broke the framing or sequencing rules
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::InvalidSchemeSelector(_)
                | Error::MalformedFrame(_)
                | Error::UnexpectedFrame { .. }
                | Error::FrameTooLarge { .. }
        )
    }

    /// Whether the transport can still carry an `ERROR:<msg>` frame
    pub fn transport_writable(&self) -> bool {
        !matches!(
            self,
            Error::ConnectionClosed | Error::TransportTimeout(_) | Error::TruncatedTransfer { .. }
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            _ => Error::Io(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
