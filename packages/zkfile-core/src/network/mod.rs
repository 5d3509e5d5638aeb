//! # Network Module
//!
//! Everything that talks to the peer over a byte stream.
//!
//! ## Connection Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      CONNECTION FLOW                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. Transport (TCP, or any AsyncRead + AsyncWrite)                     │
//! │     └─► Wrapped in a Channel: length-prefixed frames + I/O deadline    │
//! │                                                                         │
//! │  2. ProofSession (verifier) / ProverSession (prover)                   │
//! │     └─► Selector "1" | "2" | "3" picks the scheme                      │
//! │     └─► Prover announces its public key                                │
//! │     └─► N rounds of commitment → challenge → response                  │
//! │     └─► AUTH_SUCCESS or AUTH_FAILED                                    │
//! │                                                                         │
//! │  3. File transfer (only after AUTH_SUCCESS)                            │
//! │     └─► FILENAME → ENCRYPTION → FILESIZE → payload → FILE_RECEIVED    │
//! │                                                                         │
//! │  Any failure: ERROR: <msg> if the stream is still writable, then close │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Submodules
//!
//! - [`codec`]: the [`Channel`] framing and deadlines
//! - [`frame`]: typed control frames
//! - [`session`]: identification state machines for both ends
//! - [`file_transfer`]: the encrypted upload

pub mod codec;
pub mod file_transfer;
pub mod frame;
pub mod session;

pub use codec::{Channel, MAX_FRAME_SIZE};
pub use file_transfer::{
    send_file, FileReceiver, ReceivedFile, TransferState, DEFAULT_MAX_FILE_SIZE,
};
pub use frame::Frame;
pub use session::{ProofSession, ProverSession, SessionState};
