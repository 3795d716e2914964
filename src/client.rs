//! Synchronous client: one connection, one outstanding request at a time

use crate::error::{FtpError, Result};
use crate::fs_enum::decode_listing;
use crate::net::{read_header, read_payload, tune_socket, write_message};
use crate::protocol::{status, MAX_FILE_LEN, MAX_LIST_PAYLOAD};
use crate::protocol_core::{cstr_payload, Header, Opcode};
use crate::store::FileStore;
use crate::transfer::{drain_file_data, recv_file_data, scratch_buffer, send_file_data};
use std::io;
use std::net::{Shutdown, TcpStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connected,
    Authenticated,
}

/// Expected shape of a reply's total length
#[derive(Clone, Copy)]
enum ReplyLen {
    Bodiless,
    AtLeastHeader,
}

pub struct Client {
    stream: Option<TcpStream>,
    state: ClientState,
    local: FileStore,
    scratch: Vec<u8>,
}

impl Client {
    /// `local` is where downloads land and uploads are read from
    pub fn new(local: FileStore) -> Self {
        Self {
            stream: None,
            state: ClientState::Disconnected,
            local,
            scratch: scratch_buffer(),
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn open(&mut self, host: &str, port: u16) -> Result<()> {
        if self.state != ClientState::Disconnected {
            return Err(FtpError::InvalidState("connection already open"));
        }
        if port == 0 {
            return Err(FtpError::InvalidArgument("port must be non-zero".into()));
        }
        let stream = TcpStream::connect((host, port))?;
        tune_socket(&stream);
        self.stream = Some(stream);

        let reply = self.guarded(|c| {
            c.send(Opcode::OpenConnRequest, b"")?;
            c.expect_reply(Opcode::OpenConnReply, ReplyLen::Bodiless)
        })?;
        if reply.status != status::SUCCESS {
            self.disconnect();
            return Err(FtpError::Refused);
        }
        self.state = ClientState::Connected;
        Ok(())
    }

    pub fn auth(&mut self, user: &str, pass: &str) -> Result<()> {
        match self.state {
            ClientState::Disconnected => return Err(FtpError::InvalidState("no connection is open")),
            ClientState::Authenticated => return Err(FtpError::InvalidState("already authenticated")),
            ClientState::Connected => {}
        }
        if user.is_empty() || user.contains([' ', '\0']) || pass.contains([' ', '\0']) {
            return Err(FtpError::InvalidArgument(
                "username and password must be non-empty words".into(),
            ));
        }

        let body = cstr_payload(&format!("{} {}", user, pass));
        let reply = self.guarded(|c| {
            c.send(Opcode::AuthRequest, &body)?;
            c.expect_reply(Opcode::AuthReply, ReplyLen::Bodiless)
        })?;
        if reply.status != status::SUCCESS {
            self.disconnect();
            return Err(FtpError::AuthRejected);
        }
        self.state = ClientState::Authenticated;
        Ok(())
    }

    pub fn list(&mut self) -> Result<Vec<String>> {
        self.require_authenticated()?;
        self.guarded(|c| {
            c.send(Opcode::ListRequest, b"")?;
            let reply = c.expect_reply(Opcode::ListReply, ReplyLen::AtLeastHeader)?;
            let payload = read_payload(c.stream_mut()?, &reply, MAX_LIST_PAYLOAD)?;
            Ok(decode_listing(&payload))
        })
    }

    /// Download `name` into the local store. Returns the byte count.
    pub fn get(&mut self, name: &str) -> Result<u64> {
        self.require_authenticated()?;
        // bad names fail here, before anything is sent
        self.local.path_of(name)?;

        self.guarded(|c| {
            c.send(Opcode::GetRequest, &cstr_payload(name))?;
            let reply = c.expect_reply(Opcode::GetReply, ReplyLen::Bodiless)?;
            if reply.status != status::SUCCESS {
                return Err(FtpError::NotFound(name.to_string()));
            }
            let header = c.expect_reply(Opcode::FileData, ReplyLen::AtLeastHeader)?;
            c.receive_into_store(name, &header)
        })
    }

    /// Upload a file from the local store. Returns the byte count.
    pub fn put(&mut self, name: &str) -> Result<u64> {
        self.require_authenticated()?;
        let (mut file, len) = match self.local.open_file(name)? {
            Some(f) => f,
            None => {
                return Err(FtpError::local(
                    self.local.path_of(name)?,
                    io::Error::new(io::ErrorKind::NotFound, "no such local file"),
                ));
            }
        };
        if len > MAX_FILE_LEN {
            return Err(FtpError::InvalidArgument(format!(
                "{} is {} bytes, above the protocol limit",
                name, len
            )));
        }

        self.guarded(|c| {
            c.send(Opcode::PutRequest, &cstr_payload(name))?;
            // status carries no meaning on PUT_REPLY
            c.expect_reply(Opcode::PutReply, ReplyLen::Bodiless)?;
            let Client { stream, scratch, .. } = c;
            let stream = stream.as_mut().ok_or(FtpError::InvalidState("no connection is open"))?;
            send_file_data(stream, &mut file, len, scratch)
        })
    }

    /// End the session. The connection is closed whatever the outcome.
    pub fn quit(&mut self) -> Result<()> {
        match self.state {
            ClientState::Disconnected => Err(FtpError::InvalidState("no connection is open")),
            // Server only accepts AUTH_REQUEST here; just hang up
            ClientState::Connected => {
                self.disconnect();
                Ok(())
            }
            ClientState::Authenticated => {
                let res = self.guarded(|c| {
                    c.send(Opcode::QuitRequest, b"")?;
                    c.expect_reply(Opcode::QuitReply, ReplyLen::Bodiless)
                });
                self.disconnect();
                res.map(|_| ())
            }
        }
    }

    fn receive_into_store(&mut self, name: &str, header: &Header) -> Result<u64> {
        let Client {
            stream,
            local,
            scratch,
            ..
        } = self;
        let stream = stream.as_mut().ok_or(FtpError::InvalidState("no connection is open"))?;
        let mut upload = match local.create(name) {
            Ok(u) => u,
            Err(e) => {
                // keep the connection usable before reporting the local failure
                drain_file_data(stream, header, scratch)?;
                return Err(e);
            }
        };
        let n = recv_file_data(stream, header, upload.file(), scratch)?
            .map_err(|e| FtpError::local(upload.dest(), e))?;
        upload.commit()?;
        Ok(n)
    }

    fn require_authenticated(&self) -> Result<()> {
        match self.state {
            ClientState::Authenticated => Ok(()),
            ClientState::Connected => Err(FtpError::InvalidState("not authenticated")),
            ClientState::Disconnected => Err(FtpError::InvalidState("no connection is open")),
        }
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or(FtpError::InvalidState("no connection is open"))
    }

    fn send(&mut self, op: Opcode, payload: &[u8]) -> Result<()> {
        write_message(self.stream_mut()?, op, status::FAILURE, payload)
    }

    fn expect_reply(&mut self, op: Opcode, shape: ReplyLen) -> Result<Header> {
        let header = read_header(self.stream_mut()?)?;
        if header.opcode != op {
            return Err(FtpError::ProtocolViolation(format!(
                "expected {} but got {}",
                op, header.opcode
            )));
        }
        if let ReplyLen::Bodiless = shape {
            if header.payload_len() != 0 {
                return Err(FtpError::Framing(format!(
                    "{} declared length {}, expected 12",
                    op, header.length
                )));
            }
        }
        Ok(header)
    }

    /// Run one exchange; any connection-fatal error drops the connection
    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let res = f(self);
        if let Err(e) = &res {
            if e.is_connection_fatal() {
                self.disconnect();
            }
        }
        res
    }

    fn disconnect(&mut self) {
        if let Some(s) = self.stream.take() {
            let _ = s.shutdown(Shutdown::Both);
        }
        self.state = ClientState::Disconnected;
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.disconnect();
    }
}
