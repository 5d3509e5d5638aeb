//! # Storage Module
//!
//! The receiver's output directory.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       OUTPUT DIRECTORY                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  received_files/                                                        │
//! │  ├── .<conn-id>_encrypted_<name>.part   ◄── ScratchFile (while        │
//! │  │                                           receiving, removed on     │
//! │  │                                           drop)                     │
//! │  ├── .<conn-id>_<name>.part             ◄── plaintext being saved     │
//! │  └── <conn-id>_<name>                   ◄── decrypted plaintext        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Concurrent sessions share the directory. Every file name carries the
//! connection id, and files are opened with `create_new`, so two sessions
//! can never write the same path.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::{Error, Result};

/// Reduce a peer-supplied name to a safe bare file name.
///
/// Surrounding whitespace is trimmed. Empty names, `.`/`..`, path
/// separators and control characters are rejected.
pub fn sanitize_file_name(raw: &str) -> Result<String> {
    let name = raw.trim();
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.chars().any(char::is_control);
    if invalid {
        return Err(Error::InvalidFileName(raw.to_string()));
    }
    Ok(name.to_string())
}

/// Handle to the shared output directory.
#[derive(Debug, Clone)]
pub struct ReceivedFiles {
    dir: PathBuf,
}

impl ReceivedFiles {
    /// Create the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    /// The directory path.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open a scratch file for the ciphertext of `name`.
    pub async fn scratch(&self, conn_tag: &str, name: &str) -> Result<ScratchFile> {
        self.part_file(format!(".{}_encrypted_{}.part", conn_tag, name))
            .await
    }

    /// Write the plaintext as `<conn_tag>_<name>`.
    ///
    /// The contents are staged in a hidden `.part` file and linked into
    /// place only once fully written and synced, so a failed write never
    /// leaves a partial file under the final name. An existing file is
    /// never replaced.
    pub async fn save(&self, conn_tag: &str, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}_{}", conn_tag, name));
        let mut staged = self
            .part_file(format!(".{}_{}.part", conn_tag, name))
            .await?;
        staged.file.write_all(contents).await?;
        staged.file.sync_all().await?;
        // Fails with `AlreadyExists` instead of overwriting
        fs::hard_link(&staged.path, &path).await?;
        Ok(path)
    }

    async fn part_file(&self, file_name: String) -> Result<ScratchFile> {
        let path = self.dir.join(file_name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(ScratchFile { path, file })
    }
}

/// Ciphertext being received. The file is deleted when this is dropped,
/// whether the transfer finished, failed or was cancelled.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    file: File,
}

impl ScratchFile {
    /// Where the scratch file lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writable handle for the incoming payload.
    pub fn file_mut(&mut self) -> &mut File {
        &mut self.file
    }

    /// Rewind and read everything back as text.
    pub async fn read_to_string(&mut self) -> Result<String> {
        self.file.flush().await?;
        self.file.seek(SeekFrom::Start(0)).await?;
        let mut bytes = Vec::new();
        self.file.read_to_end(&mut bytes).await?;
        String::from_utf8(bytes)
            .map_err(|_| Error::MalformedCiphertext("ciphertext is not UTF-8".into()))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to remove scratch file");
            }
        }
    }
}
