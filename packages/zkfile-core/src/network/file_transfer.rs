//! # File Transfer Protocol
//!
//! Encrypted upload that runs on the same connection once the prover has
//! been authenticated.
//!
//! ## Transfer Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     FILE TRANSFER PROTOCOL                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Sender                            Receiver                            │
//! │  ──────                            ────────                            │
//! │                                                                         │
//! │  1. FILENAME:<name> ──────────────►  AwaitingName                      │
//! │                          ◄──────── OK                                   │
//! │                                                                         │
//! │  2. ENCRYPTION:<tag>:<fields> ────►  AwaitingCipher                    │
//! │                          ◄──────── OK                                   │
//! │                                                                         │
//! │  3. FILESIZE:<n> ─────────────────►  AwaitingSize                      │
//! │                          ◄──────── READY                                │
//! │                                                                         │
//! │  4. <n raw ciphertext bytes> ─────►  Receiving → scratch file          │
//! │                                                                         │
//! │                          ◄──────── FILE_RECEIVED: <msg>   Completed    │
//! │                                    or ERROR: <msg>        Failed       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A stream that closes before `n` bytes arrived is a
//! [`TruncatedTransfer`](crate::Error::TruncatedTransfer); nothing is saved.

use std::path::PathBuf;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};

use super::codec::{unexpected, Channel};
use super::frame::Frame;
use crate::crypto::{CipherKey, KeystreamCipher};
use crate::error::{Error, Result};
use crate::scheme::SchemeKind;
use crate::storage::{sanitize_file_name, ReceivedFiles};

/// Default cap on `FILESIZE` (64 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 64 * 1024 * 1024;

// ============================================================================
// TRANSFER STATE
// ============================================================================

/// Receiver-side progress of one transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    /// Waiting for `FILENAME:`
    AwaitingName,
    /// Waiting for `ENCRYPTION:`
    AwaitingCipher,
    /// Waiting for `FILESIZE:`
    AwaitingSize,
    /// Streaming the payload
    Receiving,
    /// Decrypted and saved
    Completed,
    /// Aborted; nothing saved
    Failed,
}

impl TransferState {
    /// Whether the transfer is over.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// What the receiver saved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    /// Sanitized name the sender used
    pub name: String,
    /// Where the plaintext was written
    pub path: PathBuf,
    /// Ciphertext bytes received
    pub bytes: u64,
    /// Cipher the sender chose
    pub cipher: SchemeKind,
}

// ============================================================================
// RECEIVER
// ============================================================================

/// Receiving end of one transfer.
#[derive(Debug)]
pub struct FileReceiver<'a> {
    files: &'a ReceivedFiles,
    conn_tag: String,
    max_file_size: u64,
    state: TransferState,
}

impl<'a> FileReceiver<'a> {
    /// Files land in `files` prefixed with `conn_tag`.
    pub fn new(files: &'a ReceivedFiles, conn_tag: impl Into<String>, max_file_size: u64) -> Self {
        Self {
            files,
            conn_tag: conn_tag.into(),
            max_file_size,
            state: TransferState::AwaitingName,
        }
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Run the receiving side of the protocol.
    ///
    /// `progress` is told about every state change and, while receiving,
    /// the running byte count. On failure the sender gets an `ERROR:` frame
    /// when the transport still accepts writes.
    pub async fn receive<S>(
        &mut self,
        channel: &mut Channel<S>,
        mut progress: impl FnMut(TransferState, u64),
    ) -> Result<ReceivedFile>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        progress(self.state, 0);
        match self.run(channel, &mut progress).await {
            Ok(file) => {
                // The file is on disk whether or not the ack gets through
                self.state = TransferState::Completed;
                progress(self.state, file.bytes);
                tracing::info!(file = %file.name, bytes = file.bytes, cipher = %file.cipher, "file saved");
                let ack = Frame::FileReceived(format!("File {} received and decrypted", file.name));
                if let Err(err) = channel.send_frame(&ack).await {
                    tracing::warn!(file = %file.name, error = %err, "sender left before the acknowledgement");
                }
                Ok(file)
            }
            Err(err) => {
                self.state = TransferState::Failed;
                progress(self.state, 0);
                if err.transport_writable() && !matches!(err, Error::PeerError(_)) {
                    let _ = channel.send_frame(&Frame::error(&err)).await;
                }
                Err(err)
            }
        }
    }

    async fn run<S>(
        &mut self,
        channel: &mut Channel<S>,
        progress: &mut impl FnMut(TransferState, u64),
    ) -> Result<ReceivedFile>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let name = match channel.recv_frame().await? {
            Frame::FileName(raw) => sanitize_file_name(&raw)?,
            other => return Err(unexpected("FILENAME", other)),
        };
        channel.send_frame(&Frame::Ok).await?;
        self.advance(TransferState::AwaitingCipher, progress);

        let key = match channel.recv_frame().await? {
            Frame::Encryption(key) => key,
            other => return Err(unexpected("ENCRYPTION", other)),
        };
        let cipher = KeystreamCipher::new(&key)?;
        channel.send_frame(&Frame::Ok).await?;
        self.advance(TransferState::AwaitingSize, progress);

        let size = match channel.recv_frame().await? {
            Frame::FileSize(size) => size,
            other => return Err(unexpected("FILESIZE", other)),
        };
        if size > self.max_file_size {
            return Err(Error::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        let mut scratch = self.files.scratch(&self.conn_tag, &name).await?;
        channel.send_frame(&Frame::Ready).await?;
        self.advance(TransferState::Receiving, progress);
        tracing::debug!(file = %name, bytes = size, "receiving payload");

        let state = self.state;
        let received = channel
            .recv_payload(size, scratch.file_mut(), |bytes| progress(state, bytes))
            .await?;

        let ciphertext = scratch.read_to_string().await?;
        let plaintext = cipher.decrypt_str(&ciphertext)?;
        let path = self
            .files
            .save(&self.conn_tag, &name, plaintext.as_bytes())
            .await?;

        Ok(ReceivedFile {
            name,
            path,
            bytes: received,
            cipher: key.kind(),
        })
    }

    fn advance(&mut self, next: TransferState, progress: &mut impl FnMut(TransferState, u64)) {
        self.state = next;
        progress(next, 0);
    }
}

// ============================================================================
// SENDER
// ============================================================================

/// Encrypt `plaintext` under `key` and upload it as `name`.
///
/// Returns the receiver's `FILE_RECEIVED` message. Encryption happens
/// before anything is sent, so an [`Error::AlphabetOverflow`] leaves the
/// connection untouched.
pub async fn send_file<S>(
    channel: &mut Channel<S>,
    name: &str,
    plaintext: &str,
    key: &CipherKey,
) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let name = sanitize_file_name(name)?;
    let ciphertext = KeystreamCipher::new(key)?.encrypt_to_string(plaintext)?;

    channel.send_frame(&Frame::FileName(name.clone())).await?;
    channel.expect(Frame::Ok).await?;
    channel.send_frame(&Frame::Encryption(key.clone())).await?;
    channel.expect(Frame::Ok).await?;
    channel
        .send_frame(&Frame::FileSize(ciphertext.len() as u64))
        .await?;
    channel.expect(Frame::Ready).await?;

    tracing::debug!(file = %name, bytes = ciphertext.len(), "sending payload");
    channel.send_payload(ciphertext.as_bytes()).await?;

    match channel.recv_frame().await? {
        Frame::FileReceived(msg) => Ok(msg),
        other => Err(unexpected("FILE_RECEIVED", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;
    use std::time::Duration;
    use tokio::io::DuplexStream;

    fn channels() -> (Channel<DuplexStream>, Channel<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        (
            Channel::new(a, Duration::from_secs(5)),
            Channel::new(b, Duration::from_secs(5)),
        )
    }

    fn fs_key() -> CipherKey {
        CipherKey::FiatShamir {
            modulus: BigUint::from(3233u32),
            secret: BigUint::from(123u32),
        }
    }

    fn dir_entries(dir: &std::path::Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_transfer_state_terminal() {
        assert!(TransferState::Completed.is_terminal());
        assert!(TransferState::Failed.is_terminal());
        assert!(!TransferState::Receiving.is_terminal());
        assert!(!TransferState::AwaitingName.is_terminal());
    }

    #[tokio::test]
    async fn test_full_transfer() {
        let dir = tempfile::tempdir().unwrap();
        let files = ReceivedFiles::open(dir.path()).await.unwrap();
        let (mut server, mut client) = channels();
        let mut receiver = FileReceiver::new(&files, "conn1", DEFAULT_MAX_FILE_SIZE);
        let mut states = Vec::new();

        let text = "Hello, World!\nSecond line.";
        let key = fs_key();
        let (received, ack) = tokio::join!(
            receiver.receive(&mut server, |state, _| {
                if states.last() != Some(&state) {
                    states.push(state)
                }
            }),
            send_file(&mut client, "notes.txt", text, &key)
        );

        let received = received.unwrap();
        assert!(ack.unwrap().contains("notes.txt"));
        assert_eq!(received.name, "notes.txt");
        assert_eq!(received.cipher, SchemeKind::FiatShamir);
        assert_eq!(std::fs::read_to_string(&received.path).unwrap(), text);
        assert_eq!(dir_entries(dir.path()), vec!["conn1_notes.txt"]);
        assert_eq!(receiver.state(), TransferState::Completed);
        assert_eq!(
            states,
            vec![
                TransferState::AwaitingName,
                TransferState::AwaitingCipher,
                TransferState::AwaitingSize,
                TransferState::Receiving,
                TransferState::Completed,
            ]
        );
    }

    #[tokio::test]
    async fn test_truncated_transfer_saves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let files = ReceivedFiles::open(dir.path()).await.unwrap();
        let (mut server, mut client) = channels();
        let mut receiver = FileReceiver::new(&files, "conn2", DEFAULT_MAX_FILE_SIZE);

        let sender = async move {
            client.send_frame(&Frame::FileName("short.txt".into())).await.unwrap();
            client.expect(Frame::Ok).await.unwrap();
            client.send_frame(&Frame::Encryption(fs_key())).await.unwrap();
            client.expect(Frame::Ok).await.unwrap();
            client.send_frame(&Frame::FileSize(100)).await.unwrap();
            client.expect(Frame::Ready).await.unwrap();
            client.send_payload(&[b'1'; 40]).await.unwrap();
            // Connection closes here
        };
        let (result, _) = tokio::join!(receiver.receive(&mut server, |_, _| {}), sender);

        assert!(matches!(
            result,
            Err(Error::TruncatedTransfer {
                expected: 100,
                received: 40
            })
        ));
        assert_eq!(receiver.state(), TransferState::Failed);
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_sender_gone_before_ack_still_completes() {
        let dir = tempfile::tempdir().unwrap();
        let files = ReceivedFiles::open(dir.path()).await.unwrap();
        let (mut server, mut client) = channels();
        let mut receiver = FileReceiver::new(&files, "c", DEFAULT_MAX_FILE_SIZE);
        let mut last = TransferState::AwaitingName;

        let ciphertext = KeystreamCipher::new(&fs_key())
            .unwrap()
            .encrypt_to_string("left early")
            .unwrap();
        let sender = async move {
            client.send_frame(&Frame::FileName("a.txt".into())).await.unwrap();
            client.expect(Frame::Ok).await.unwrap();
            client.send_frame(&Frame::Encryption(fs_key())).await.unwrap();
            client.expect(Frame::Ok).await.unwrap();
            client
                .send_frame(&Frame::FileSize(ciphertext.len() as u64))
                .await
                .unwrap();
            client.expect(Frame::Ready).await.unwrap();
            client.send_payload(ciphertext.as_bytes()).await.unwrap();
            // Dropped without reading FILE_RECEIVED
        };
        let (result, _) = tokio::join!(receiver.receive(&mut server, |state, _| last = state), sender);

        let file = result.unwrap();
        assert_eq!(std::fs::read_to_string(&file.path).unwrap(), "left early");
        assert_eq!(receiver.state(), TransferState::Completed);
        assert!(last.is_terminal());
        assert_eq!(dir_entries(dir.path()), vec!["c_a.txt"]);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let files = ReceivedFiles::open(dir.path()).await.unwrap();
        let (mut server, mut client) = channels();
        let mut receiver = FileReceiver::new(&files, "conn3", DEFAULT_MAX_FILE_SIZE);

        let sender = async {
            client
                .send_frame(&Frame::FileName("../escape.txt".into()))
                .await
                .unwrap();
            client.recv_frame().await.unwrap()
        };
        let (result, reply) = tokio::join!(receiver.receive(&mut server, |_, _| {}), sender);
        assert!(matches!(result, Err(Error::InvalidFileName(_))));
        assert!(matches!(reply, Frame::Error(_)));
    }

    #[tokio::test]
    async fn test_oversized_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let files = ReceivedFiles::open(dir.path()).await.unwrap();
        let (mut server, mut client) = channels();
        let mut receiver = FileReceiver::new(&files, "conn4", 10);

        let text = "this ciphertext is longer than ten bytes";
        let key = fs_key();
        let (result, sent) = tokio::join!(
            receiver.receive(&mut server, |_, _| {}),
            send_file(&mut client, "big.txt", text, &key)
        );
        assert!(matches!(result, Err(Error::FileTooLarge { max: 10, .. })));
        assert!(matches!(sent, Err(Error::PeerError(_))));
        assert!(dir_entries(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_non_invertible_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let files = ReceivedFiles::open(dir.path()).await.unwrap();
        let (mut server, mut client) = channels();
        let mut receiver = FileReceiver::new(&files, "conn5", DEFAULT_MAX_FILE_SIZE);

        let sender = async {
            client.send_frame(&Frame::FileName("a.txt".into())).await.unwrap();
            client.expect(Frame::Ok).await.unwrap();
            client
                .send_text("ENCRYPTION:FS:3233:61")
                .await
                .unwrap();
            client.recv_frame().await.unwrap()
        };
        let (result, reply) = tokio::join!(receiver.receive(&mut server, |_, _| {}), sender);
        assert!(matches!(result, Err(Error::NonInvertibleKey(_))));
        assert!(matches!(reply, Frame::Error(_)));
    }

    #[tokio::test]
    async fn test_overflowing_text_never_hits_the_wire() {
        let (_server, mut client) = channels();
        let err = send_file(&mut client, "cjk.txt", "中文", &fs_key())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlphabetOverflow { .. }));
    }

    #[tokio::test]
    async fn test_garbage_payload_reported() {
        let dir = tempfile::tempdir().unwrap();
        let files = ReceivedFiles::open(dir.path()).await.unwrap();
        let (mut server, mut client) = channels();
        let mut receiver = FileReceiver::new(&files, "conn6", DEFAULT_MAX_FILE_SIZE);

        let payload = b"12 not-a-number";
        let sender = async {
            client.send_frame(&Frame::FileName("g.txt".into())).await.unwrap();
            client.expect(Frame::Ok).await.unwrap();
            client.send_frame(&Frame::Encryption(fs_key())).await.unwrap();
            client.expect(Frame::Ok).await.unwrap();
            client
                .send_frame(&Frame::FileSize(payload.len() as u64))
                .await
                .unwrap();
            client.expect(Frame::Ready).await.unwrap();
            client.send_payload(payload).await.unwrap();
            client.recv_frame().await.unwrap()
        };
        let (result, reply) = tokio::join!(receiver.receive(&mut server, |_, _| {}), sender);
        assert!(matches!(result, Err(Error::MalformedCiphertext(_))));
        assert!(matches!(reply, Frame::Error(_)));
        assert!(dir_entries(dir.path()).is_empty());
    }
}
