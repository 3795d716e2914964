//! Blocking transport helpers shared by client and server
//!
//! Everything here is generic over `Read`/`Write` so sessions can be driven
//! by a `TcpStream` in production and by in-memory streams in tests.

use crate::error::{FtpError, Result};
use crate::protocol::HEADER_LEN;
use crate::protocol_core::{build_header, parse_header, Header, Opcode};
use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;

/// Write until the whole buffer is sent or the peer stops accepting data.
/// Returns the number of bytes actually sent; a short count means the
/// connection is gone.
pub fn send_all<W: Write + ?Sized>(conn: &mut W, buf: &[u8]) -> io::Result<usize> {
    let mut sent = 0;
    while sent < buf.len() {
        match conn.write(&buf[sent..]) {
            Ok(0) => break,
            Ok(n) => sent += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(sent)
}

/// Read until `buf` is full or the peer closes.
/// Returns the number of bytes actually received; a short count means EOF.
pub fn receive_all<R: Read + ?Sized>(conn: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut received = 0;
    while received < buf.len() {
        match conn.read(&mut buf[received..]) {
            Ok(0) => break,
            Ok(n) => received += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(received)
}

pub fn write_exact<W: Write + ?Sized>(conn: &mut W, buf: &[u8]) -> Result<()> {
    let sent = send_all(conn, buf)?;
    if sent < buf.len() {
        return Err(FtpError::Io(io::Error::new(
            ErrorKind::WriteZero,
            format!("connection closed after {} of {} bytes", sent, buf.len()),
        )));
    }
    Ok(())
}

pub fn read_exact<R: Read + ?Sized>(conn: &mut R, buf: &mut [u8]) -> Result<()> {
    let received = receive_all(conn, buf)?;
    if received < buf.len() {
        return Err(FtpError::Io(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("peer closed after {} of {} bytes", received, buf.len()),
        )));
    }
    Ok(())
}

/// Read and validate one header. The payload is left on the stream.
pub fn read_header<R: Read + ?Sized>(conn: &mut R) -> Result<Header> {
    let mut raw = [0u8; HEADER_LEN];
    read_exact(conn, &mut raw)?;
    parse_header(&raw)
}

/// Read the payload announced by `header`, refusing anything above `limit`
pub fn read_payload<R: Read + ?Sized>(conn: &mut R, header: &Header, limit: usize) -> Result<Vec<u8>> {
    let len = header.payload_len();
    if len > limit {
        return Err(FtpError::Framing(format!(
            "{} payload too large: {} bytes (max: {})",
            header.opcode, len, limit
        )));
    }
    let mut payload = vec![0u8; len];
    read_exact(conn, &mut payload)?;
    Ok(payload)
}

pub fn write_message<W: Write + ?Sized>(conn: &mut W, op: Opcode, status: u8, payload: &[u8]) -> Result<()> {
    let header = build_header(op, status, payload.len() as u64)?;
    write_exact(conn, &header)?;
    if !payload.is_empty() {
        write_exact(conn, payload)?;
    }
    conn.flush()?;
    Ok(())
}

// Requests and replies are tiny; don't let Nagle hold them back
pub fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
}
