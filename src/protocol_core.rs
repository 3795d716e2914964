//! Shared protocol logic for both the client and the server session
//!
//! Pure data transformation: header framing, opcode mapping, string payloads
//! and filename validation. No I/O happens here.

use crate::error::{FtpError, Result};
use crate::fs_enum::UPLOAD_PREFIX;
use crate::protocol::{opcode, HEADER_LEN, MAGIC, MAX_NAME_LEN};
use std::convert::TryFrom;
use std::fmt;

/// Every message kind the protocol knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    OpenConnRequest,
    OpenConnReply,
    AuthRequest,
    AuthReply,
    ListRequest,
    ListReply,
    GetRequest,
    GetReply,
    PutRequest,
    PutReply,
    QuitRequest,
    QuitReply,
    FileData,
}

impl Opcode {
    pub fn as_u8(self) -> u8 {
        match self {
            Opcode::OpenConnRequest => opcode::OPEN_CONN_REQUEST,
            Opcode::OpenConnReply => opcode::OPEN_CONN_REPLY,
            Opcode::AuthRequest => opcode::AUTH_REQUEST,
            Opcode::AuthReply => opcode::AUTH_REPLY,
            Opcode::ListRequest => opcode::LIST_REQUEST,
            Opcode::ListReply => opcode::LIST_REPLY,
            Opcode::GetRequest => opcode::GET_REQUEST,
            Opcode::GetReply => opcode::GET_REPLY,
            Opcode::PutRequest => opcode::PUT_REQUEST,
            Opcode::PutReply => opcode::PUT_REPLY,
            Opcode::QuitRequest => opcode::QUIT_REQUEST,
            Opcode::QuitReply => opcode::QUIT_REPLY,
            Opcode::FileData => opcode::FILE_DATA,
        }
    }
}

impl TryFrom<u8> for Opcode {
    type Error = FtpError;

    fn try_from(b: u8) -> Result<Self> {
        Ok(match b {
            opcode::OPEN_CONN_REQUEST => Opcode::OpenConnRequest,
            opcode::OPEN_CONN_REPLY => Opcode::OpenConnReply,
            opcode::AUTH_REQUEST => Opcode::AuthRequest,
            opcode::AUTH_REPLY => Opcode::AuthReply,
            opcode::LIST_REQUEST => Opcode::ListRequest,
            opcode::LIST_REPLY => Opcode::ListReply,
            opcode::GET_REQUEST => Opcode::GetRequest,
            opcode::GET_REPLY => Opcode::GetReply,
            opcode::PUT_REQUEST => Opcode::PutRequest,
            opcode::PUT_REPLY => Opcode::PutReply,
            opcode::QUIT_REQUEST => Opcode::QuitRequest,
            opcode::QUIT_REPLY => Opcode::QuitReply,
            opcode::FILE_DATA => Opcode::FileData,
            other => return Err(FtpError::Framing(format!("unknown opcode 0x{:02X}", other))),
        })
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:02X})", self, self.as_u8())
    }
}

/// Decoded fixed-size header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub opcode: Opcode,
    pub status: u8,
    /// Total length on the wire, header included
    pub length: u32,
}

impl Header {
    pub fn payload_len(&self) -> usize {
        self.length as usize - HEADER_LEN
    }
}

/// A complete in-memory message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub opcode: Opcode,
    pub status: u8,
    pub payload: Vec<u8>,
}

/// Build frame header (12 bytes)
/// Format: MAGIC (6) | OPCODE (1) | STATUS (1) | TOTAL LENGTH (4, big-endian)
pub fn build_header(op: Opcode, status: u8, payload_len: u64) -> Result<[u8; HEADER_LEN]> {
    let total = payload_len
        .checked_add(HEADER_LEN as u64)
        .and_then(|t| u32::try_from(t).ok())
        .ok_or_else(|| {
            FtpError::Framing(format!("payload of {} bytes does not fit a frame", payload_len))
        })?;

    let mut header = [0u8; HEADER_LEN];
    header[0..6].copy_from_slice(MAGIC);
    header[6] = op.as_u8();
    header[7] = status;
    header[8..12].copy_from_slice(&total.to_be_bytes());
    Ok(header)
}

/// Parse and validate a frame header. Never looks past the 12 header bytes.
pub fn parse_header(header: &[u8; HEADER_LEN]) -> Result<Header> {
    if &header[0..6] != MAGIC {
        return Err(FtpError::Framing("invalid magic in frame header".into()));
    }
    let length = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    if (length as usize) < HEADER_LEN {
        return Err(FtpError::Framing(format!(
            "declared length {} is shorter than the header",
            length
        )));
    }
    let opcode = Opcode::try_from(header[6])?;
    Ok(Header {
        opcode,
        status: header[7],
        length,
    })
}

pub fn encode(op: Opcode, status: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let header = build_header(op, status, payload.len() as u64)?;
    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Decode exactly one message occupying the whole of `bytes`
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let raw: &[u8; HEADER_LEN] = bytes
        .get(..HEADER_LEN)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| FtpError::Framing(format!("truncated header: {} bytes", bytes.len())))?;
    let header = parse_header(raw)?;
    if bytes.len() != header.length as usize {
        return Err(FtpError::Framing(format!(
            "declared length {} but got {} bytes",
            header.length,
            bytes.len()
        )));
    }
    Ok(Message {
        opcode: header.opcode,
        status: header.status,
        payload: bytes[HEADER_LEN..].to_vec(),
    })
}

/// Encode a string payload with its trailing NUL terminator
pub fn cstr_payload(s: &str) -> Vec<u8> {
    let mut v = Vec::with_capacity(s.len() + 1);
    v.extend_from_slice(s.as_bytes());
    v.push(0);
    v
}

/// Decode a NUL-terminated string payload. Trailing NULs are dropped.
pub fn parse_cstr(payload: &[u8]) -> Result<String> {
    let end = payload
        .iter()
        .rposition(|&b| b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    String::from_utf8(payload[..end].to_vec())
        .map_err(|_| FtpError::InvalidArgument("payload is not valid UTF-8".into()))
}

/// Reject names that could escape the store directory.
/// Only bare filenames are legal: no separators, no NUL, no "." or "..".
pub fn validate_filename(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(FtpError::InvalidArgument("empty filename".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FtpError::InvalidArgument(format!(
            "filename longer than {} bytes",
            MAX_NAME_LEN
        )));
    }
    if name == "." || name == ".." {
        return Err(FtpError::InvalidArgument(format!("{:?} is not a file", name)));
    }
    // reserved for in-flight uploads, which listings hide
    if name.starts_with(UPLOAD_PREFIX) {
        return Err(FtpError::InvalidArgument(format!("filename {:?} is reserved", name)));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(FtpError::InvalidArgument(format!(
            "filename {:?} contains a disallowed character",
            name
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::status;

    #[test]
    fn test_encode_decode_round_trip() {
        let sizes = [0usize, 1, 11, 12, 13, 255, 4096, 65535, 65536];
        for &n in &sizes {
            let payload: Vec<u8> = (0..n).map(|i| (i % 251) as u8).collect();
            let bytes = encode(Opcode::FileData, status::SUCCESS, &payload).unwrap();
            assert_eq!(bytes.len(), HEADER_LEN + n);

            let msg = decode(&bytes).unwrap();
            assert_eq!(msg.opcode, Opcode::FileData);
            assert_eq!(msg.status, status::SUCCESS);
            assert_eq!(msg.payload, payload);
        }
    }

    #[test]
    fn test_length_is_big_endian_and_counts_header() {
        let bytes = encode(Opcode::GetRequest, 0, b"a.txt\0").unwrap();
        assert_eq!(&bytes[0..6], MAGIC);
        assert_eq!(bytes[6], 0xA7);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 18]);
    }

    #[test]
    fn test_parse_header_invalid_magic() {
        let mut header = build_header(Opcode::ListRequest, 0, 0).unwrap();
        header[0] = b'X';
        assert!(matches!(parse_header(&header), Err(FtpError::Framing(_))));
    }

    #[test]
    fn test_parse_header_short_length() {
        for declared in [0u32, 1, 11] {
            let mut header = build_header(Opcode::ListRequest, 0, 0).unwrap();
            header[8..12].copy_from_slice(&declared.to_be_bytes());
            assert!(matches!(parse_header(&header), Err(FtpError::Framing(_))));
        }
    }

    #[test]
    fn test_decode_rejects_bad_header_before_payload() {
        // Length claims a huge payload that is not there; the magic check must fire first
        let mut bytes = encode(Opcode::FileData, 1, b"").unwrap();
        bytes[1] = b'M';
        bytes[8..12].copy_from_slice(&u32::MAX.to_be_bytes());
        match decode(&bytes) {
            Err(FtpError::Framing(msg)) => assert!(msg.contains("magic")),
            other => panic!("expected framing error, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_opcode_is_framing_error() {
        let mut header = build_header(Opcode::ListRequest, 0, 0).unwrap();
        header[6] = 0x42;
        assert!(matches!(parse_header(&header), Err(FtpError::Framing(_))));
    }

    #[test]
    fn test_decode_truncated() {
        assert!(decode(&MAGIC[..]).is_err());
        let bytes = encode(Opcode::ListReply, 1, b"a\nb\n\0").unwrap();
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_build_header_overflow() {
        assert!(build_header(Opcode::FileData, 1, crate::protocol::MAX_FILE_LEN).is_ok());
        assert!(build_header(Opcode::FileData, 1, crate::protocol::MAX_FILE_LEN + 1).is_err());
    }

    #[test]
    fn test_opcode_mapping_is_stable() {
        for b in [0xA1u8, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8, 0xA9, 0xAA, 0xAB, 0xAC, 0xFF] {
            assert_eq!(Opcode::try_from(b).unwrap().as_u8(), b);
        }
        assert!(Opcode::try_from(0xA0).is_err());
        assert!(Opcode::try_from(0xAD).is_err());
    }

    #[test]
    fn test_cstr_payloads() {
        assert_eq!(cstr_payload("alice pass1"), b"alice pass1\0".to_vec());
        assert_eq!(parse_cstr(b"alice pass1\0").unwrap(), "alice pass1");
        assert_eq!(parse_cstr(b"name\0\0\0").unwrap(), "name");
        assert_eq!(parse_cstr(b"").unwrap(), "");
        assert!(parse_cstr(&[0xff, 0xfe, 0]).is_err());
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename("report-2024_v1.txt").is_ok());
        assert!(validate_filename(".hidden").is_ok());

        assert!(validate_filename("").is_err());
        assert!(validate_filename(".").is_err());
        assert!(validate_filename("..").is_err());
        assert!(validate_filename("../etc/passwd").is_err());
        assert!(validate_filename("/etc/passwd").is_err());
        assert!(validate_filename("dir\\file").is_err());
        assert!(validate_filename("file\0.txt").is_err());
        assert!(validate_filename(&"x".repeat(MAX_NAME_LEN + 1)).is_err());
        assert!(validate_filename(".tinyftp-upload-notes.txt").is_err());
        assert!(validate_filename(".tinyftp-uploaded").is_ok());
    }
}
