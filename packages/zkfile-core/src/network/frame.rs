//! Control frames exchanged after the scheme selector.
//!
//! Every frame is a single line of text with no newline. Integers are plain
//! ASCII decimal; everything else is a literal or a `TAG:<body>` pair.

use std::fmt;

use num_bigint::BigUint;

use crate::crypto::CipherKey;
use crate::error::{Error, Result};

/// A parsed control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Public key, commitment, challenge or response
    Integer(BigUint),
    /// Every round verified
    AuthSuccess,
    /// Some round failed or the key was not the pinned one
    AuthFailed,
    /// `ERROR: <msg>`, terminal
    Error(String),
    /// `FILENAME:<name>`
    FileName(String),
    /// `ENCRYPTION:<tag>:<fields…>`
    Encryption(CipherKey),
    /// `FILESIZE:<n>`
    FileSize(u64),
    /// Acknowledgement
    Ok,
    /// Receiver is ready for the raw payload
    Ready,
    /// `FILE_RECEIVED: <msg>`
    FileReceived(String),
}

impl Frame {
    /// Parse frame text.
    pub fn parse(text: &str) -> Result<Self> {
        if text.contains(['\n', '\r']) {
            return Err(Error::MalformedFrame("frame contains a line break".into()));
        }
        match text {
            "AUTH_SUCCESS" => return Ok(Frame::AuthSuccess),
            "AUTH_FAILED" => return Ok(Frame::AuthFailed),
            "OK" => return Ok(Frame::Ok),
            "READY" => return Ok(Frame::Ready),
            _ => {}
        }
        if let Some(msg) = text.strip_prefix("ERROR:") {
            return Ok(Frame::Error(msg.trim_start().to_string()));
        }
        if let Some(msg) = text.strip_prefix("FILE_RECEIVED:") {
            return Ok(Frame::FileReceived(msg.trim_start().to_string()));
        }
        if let Some(name) = text.strip_prefix("FILENAME:") {
            return Ok(Frame::FileName(name.to_string()));
        }
        if let Some(body) = text.strip_prefix("ENCRYPTION:") {
            return CipherKey::parse(body).map(Frame::Encryption);
        }
        if let Some(size) = text.strip_prefix("FILESIZE:") {
            return size
                .trim()
                .parse::<u64>()
                .map(Frame::FileSize)
                .map_err(|_| Error::MalformedFrame(format!("bad file size {:?}", size)));
        }
        let trimmed = text.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed
                .parse::<BigUint>()
                .map(Frame::Integer)
                .map_err(|e| Error::MalformedFrame(e.to_string()));
        }
        Err(Error::MalformedFrame(format!("unrecognised frame {:?}", text)))
    }

    /// Short name for logs and `UnexpectedFrame` errors.
    pub fn label(&self) -> &'static str {
        match self {
            Frame::Integer(_) => "integer",
            Frame::AuthSuccess => "AUTH_SUCCESS",
            Frame::AuthFailed => "AUTH_FAILED",
            Frame::Error(_) => "ERROR",
            Frame::FileName(_) => "FILENAME",
            Frame::Encryption(_) => "ENCRYPTION",
            Frame::FileSize(_) => "FILESIZE",
            Frame::Ok => "OK",
            Frame::Ready => "READY",
            Frame::FileReceived(_) => "FILE_RECEIVED",
        }
    }

    /// Build an `ERROR:` frame, folding line breaks so the text stays one line.
    pub fn error(msg: impl fmt::Display) -> Self {
        Frame::Error(single_line(&msg.to_string()))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Integer(value) => write!(f, "{}", value),
            Frame::AuthSuccess => f.write_str("AUTH_SUCCESS"),
            Frame::AuthFailed => f.write_str("AUTH_FAILED"),
            Frame::Error(msg) => write!(f, "ERROR: {}", msg),
            Frame::FileName(name) => write!(f, "FILENAME:{}", name),
            Frame::Encryption(key) => write!(f, "ENCRYPTION:{}", key.to_wire()),
            Frame::FileSize(size) => write!(f, "FILESIZE:{}", size),
            Frame::Ok => f.write_str("OK"),
            Frame::Ready => f.write_str("READY"),
            Frame::FileReceived(msg) => write!(f, "FILE_RECEIVED: {}", msg),
        }
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals() {
        for frame in [Frame::AuthSuccess, Frame::AuthFailed, Frame::Ok, Frame::Ready] {
            assert_eq!(Frame::parse(&frame.to_string()).unwrap(), frame);
        }
    }

    #[test]
    fn test_integer_frames() {
        assert_eq!(
            Frame::parse("1003").unwrap(),
            Frame::Integer(BigUint::from(1003u32))
        );
        assert_eq!(Frame::parse(" 42 ").unwrap(), Frame::Integer(BigUint::from(42u32)));
        assert!(Frame::parse("-5").is_err());
        assert!(Frame::parse("").is_err());
        assert!(Frame::parse("12a").is_err());
    }

    #[test]
    fn test_tagged_frames() {
        assert_eq!(
            Frame::parse("FILENAME:notes.txt").unwrap(),
            Frame::FileName("notes.txt".into())
        );
        assert_eq!(Frame::parse("FILESIZE:100").unwrap(), Frame::FileSize(100));
        assert_eq!(
            Frame::parse("ERROR: Invalid protocol").unwrap(),
            Frame::Error("Invalid protocol".into())
        );
        assert_eq!(
            Frame::FileReceived("notes.txt saved".into()).to_string(),
            "FILE_RECEIVED: notes.txt saved"
        );
    }

    #[test]
    fn test_encryption_frame() {
        let frame = Frame::parse("ENCRYPTION:FS:3233:123").unwrap();
        match &frame {
            Frame::Encryption(CipherKey::FiatShamir { modulus, secret }) => {
                assert_eq!(modulus, &BigUint::from(3233u32));
                assert_eq!(secret, &BigUint::from(123u32));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(frame.to_string(), "ENCRYPTION:FS:3233:123");
        assert!(Frame::parse("ENCRYPTION:ZZ:1:2").is_err());
    }

    #[test]
    fn test_bad_file_size() {
        assert!(matches!(
            Frame::parse("FILESIZE:-1"),
            Err(Error::MalformedFrame(_))
        ));
        assert!(Frame::parse("FILESIZE:").is_err());
    }

    #[test]
    fn test_line_breaks_rejected() {
        assert!(Frame::parse("OK\n").is_err());
        assert_eq!(Frame::error("a\nb").to_string(), "ERROR: a b");
    }
}
