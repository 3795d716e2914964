//! FILE_DATA transfer in both directions
//!
//! A file always travels as one FILE_DATA message whose header announces the
//! full size. The body is moved in CHUNK_SIZE blocks through a caller-owned
//! scratch buffer, so memory use does not grow with the file.

use crate::error::{FtpError, Result};
use crate::net::{read_exact, write_exact};
use crate::protocol::{status, CHUNK_SIZE, MAX_FILE_LEN};
use crate::protocol_core::{build_header, Header, Opcode};
use std::io::{self, ErrorKind, Read, Write};

/// Connection-scoped scratch buffer sized for streaming
pub fn scratch_buffer() -> Vec<u8> {
    vec![0u8; CHUNK_SIZE]
}

/// Send `len` bytes from `source` as a single FILE_DATA message
pub fn send_file_data<W, R>(conn: &mut W, source: &mut R, len: u64, scratch: &mut [u8]) -> Result<u64>
where
    W: Write + ?Sized,
    R: Read + ?Sized,
{
    if len > MAX_FILE_LEN {
        return Err(FtpError::InvalidArgument(format!(
            "file of {} bytes exceeds the {} byte frame limit",
            len, MAX_FILE_LEN
        )));
    }
    let header = build_header(Opcode::FileData, status::SUCCESS, len)?;
    write_exact(conn, &header)?;

    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(scratch.len() as u64) as usize;
        let n = match source.read(&mut scratch[..want]) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(FtpError::Io(e)),
        };
        if n == 0 {
            // The header already promised `len` bytes; the stream cannot be resynchronised
            return Err(FtpError::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                format!("source ended with {} of {} bytes unsent", remaining, len),
            )));
        }
        write_exact(conn, &scratch[..n])?;
        remaining -= n as u64;
    }
    conn.flush()?;
    Ok(len)
}

/// Copy the body announced by a FILE_DATA `header` from `conn` into `sink`.
///
/// The outer error is a connection failure. The inner error means the sink
/// failed part way; the rest of the body is still consumed so the
/// connection stays usable.
pub fn recv_file_data<R, W>(conn: &mut R, header: &Header, sink: &mut W, scratch: &mut [u8]) -> Result<io::Result<u64>>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    expect_file_data(header)?;
    let total = header.payload_len() as u64;
    let mut remaining = total;
    let mut sink_err: Option<io::Error> = None;
    while remaining > 0 {
        let n = remaining.min(scratch.len() as u64) as usize;
        read_exact(conn, &mut scratch[..n])?;
        if sink_err.is_none() {
            if let Err(e) = sink.write_all(&scratch[..n]) {
                sink_err = Some(e);
            }
        }
        remaining -= n as u64;
    }
    if let Some(e) = sink_err {
        return Ok(Err(e));
    }
    Ok(sink.flush().map(|_| total))
}

/// Consume and discard a FILE_DATA body so the connection stays in step
pub fn drain_file_data<R: Read + ?Sized>(conn: &mut R, header: &Header, scratch: &mut [u8]) -> Result<u64> {
    let n = recv_file_data(conn, header, &mut io::sink(), scratch)?;
    // io::sink never fails
    Ok(n.unwrap_or(0))
}

pub fn expect_file_data(header: &Header) -> Result<()> {
    if header.opcode != Opcode::FileData {
        return Err(FtpError::ProtocolViolation(format!(
            "expected {} but got {}",
            Opcode::FileData,
            header.opcode
        )));
    }
    Ok(())
}
