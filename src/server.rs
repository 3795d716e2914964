//! Multi-client daemon: an accept loop plus one session thread per connection
//!
//! A session walks Opening -> Authenticating -> Authenticated -> Closed and
//! owns everything it touches while doing so (stream, header and scratch
//! buffers). Only the store, credential table and logger are shared, and all
//! three are read-only or internally synchronised.

use crate::auth::{split_credentials, CredentialStore, FileCredentials};
use crate::config::ServerConfig;
use crate::error::{FtpError, Result};
use crate::fs_enum::encode_listing;
use crate::logger::{Logger, TextLogger};
use crate::net::{read_header, read_payload, tune_socket, write_message};
use crate::protocol::{status, MAX_CONTROL_PAYLOAD, MAX_FILE_LEN};
use crate::protocol_core::{parse_cstr, Header, Opcode};
use crate::store::FileStore;
use crate::transfer::{drain_file_data, expect_file_data, recv_file_data, scratch_buffer, send_file_data};
use anyhow::Context;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

/// What every session shares
pub struct ServerContext {
    pub store: FileStore,
    pub credentials: Box<dyn CredentialStore>,
    pub logger: Arc<dyn Logger>,
}

impl ServerContext {
    pub fn from_config(config: &ServerConfig) -> anyhow::Result<Self> {
        let store = FileStore::open(&config.root)
            .with_context(|| format!("Failed to open root directory: {}", config.root.display()))?;
        let logger: Arc<dyn Logger> = match config.log_file {
            Some(ref p) => Arc::new(
                TextLogger::new(p).with_context(|| format!("Failed to open log file: {}", p.display()))?,
            ),
            None => Arc::new(TextLogger::stderr()),
        };
        Ok(Self {
            store,
            credentials: Box::new(FileCredentials::new(&config.credentials)),
            logger,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Authenticating,
    Authenticated,
    Closed,
}

/// Requests accepted once authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
enum Request {
    List,
    Get(String),
    Put(String),
    Quit,
}

impl Request {
    fn parse(op: Opcode, payload: &[u8]) -> Result<Self> {
        // undecodable names become "" and fail store validation
        let name = || parse_cstr(payload).unwrap_or_default();
        match op {
            Opcode::ListRequest => Ok(Request::List),
            Opcode::GetRequest => Ok(Request::Get(name())),
            Opcode::PutRequest => Ok(Request::Put(name())),
            Opcode::QuitRequest => Ok(Request::Quit),
            other => Err(FtpError::ProtocolViolation(format!(
                "unexpected {} from authenticated client",
                other
            ))),
        }
    }

    fn accepts(op: Opcode) -> bool {
        matches!(
            op,
            Opcode::ListRequest | Opcode::GetRequest | Opcode::PutRequest | Opcode::QuitRequest
        )
    }
}

enum Flow {
    Continue,
    Quit,
}

pub struct Session<S> {
    stream: S,
    peer: String,
    state: SessionState,
    ctx: Arc<ServerContext>,
    scratch: Vec<u8>,
}

impl<S: Read + Write> Session<S> {
    pub fn new(stream: S, peer: String, ctx: Arc<ServerContext>) -> Self {
        Self {
            stream,
            peer,
            state: SessionState::Opening,
            ctx,
            scratch: scratch_buffer(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drive the connection to completion. `Ok` covers quit and a rejected
    /// login; any error means the session was cut short.
    pub fn run(&mut self) -> Result<()> {
        let res = self.drive();
        self.state = SessionState::Closed;
        res
    }

    fn drive(&mut self) -> Result<()> {
        self.handshake()?;
        self.state = SessionState::Authenticating;
        if !self.authenticate()? {
            return Ok(());
        }
        self.state = SessionState::Authenticated;
        loop {
            let request = self.read_request()?;
            if let Flow::Quit = self.dispatch(request)? {
                return Ok(());
            }
        }
    }

    fn handshake(&mut self) -> Result<()> {
        let header = self.expect_request(Opcode::OpenConnRequest)?;
        read_payload(&mut self.stream, &header, MAX_CONTROL_PAYLOAD)?;
        // no admission control
        write_message(&mut self.stream, Opcode::OpenConnReply, status::SUCCESS, b"")
    }

    fn authenticate(&mut self) -> Result<bool> {
        let header = self.expect_request(Opcode::AuthRequest)?;
        let payload = read_payload(&mut self.stream, &header, MAX_CONTROL_PAYLOAD)?;
        let body = parse_cstr(&payload).unwrap_or_default();

        let (user, verdict) = match split_credentials(&body) {
            Some((user, pass)) => (user, self.ctx.credentials.verify(user, pass)),
            None => (body.as_str(), Ok(false)),
        };
        let granted = match verdict {
            Ok(granted) => granted,
            Err(e) => {
                write_message(&mut self.stream, Opcode::AuthReply, status::FAILURE, b"")?;
                return Err(FtpError::Credentials(e));
            }
        };

        let st = if granted { status::SUCCESS } else { status::FAILURE };
        write_message(&mut self.stream, Opcode::AuthReply, st, b"")?;
        if granted {
            self.ctx.logger.authenticated(&self.peer, user);
        } else {
            self.ctx.logger.rejected(&self.peer, user);
        }
        Ok(granted)
    }

    fn expect_request(&mut self, op: Opcode) -> Result<Header> {
        let header = read_header(&mut self.stream)?;
        if header.opcode != op {
            return Err(FtpError::ProtocolViolation(format!(
                "expected {} but got {}",
                op, header.opcode
            )));
        }
        Ok(header)
    }

    fn read_request(&mut self) -> Result<Request> {
        let header = read_header(&mut self.stream)?;
        if !Request::accepts(header.opcode) {
            return Err(FtpError::ProtocolViolation(format!(
                "unexpected {} from authenticated client",
                header.opcode
            )));
        }
        let payload = read_payload(&mut self.stream, &header, MAX_CONTROL_PAYLOAD)?;
        Request::parse(header.opcode, &payload)
    }

    fn dispatch(&mut self, request: Request) -> Result<Flow> {
        match request {
            Request::List => self.handle_list().map(|_| Flow::Continue),
            Request::Get(name) => self.handle_get(&name).map(|_| Flow::Continue),
            Request::Put(name) => self.handle_put(&name).map(|_| Flow::Continue),
            Request::Quit => self.handle_quit().map(|_| Flow::Quit),
        }
    }

    fn handle_list(&mut self) -> Result<()> {
        let (st, names) = match self.ctx.store.list() {
            Ok(names) => (status::SUCCESS, names),
            Err(e) => {
                self.ctx.logger.error(&self.peer, "list", &e.to_string());
                (status::FAILURE, Vec::new())
            }
        };
        write_message(&mut self.stream, Opcode::ListReply, st, &encode_listing(&names))?;
        self.ctx.logger.listed(&self.peer, names.len());
        Ok(())
    }

    fn handle_get(&mut self, name: &str) -> Result<()> {
        let (mut file, len) = match self.ctx.store.open_file(name) {
            Ok(Some((file, len))) if len <= MAX_FILE_LEN => (file, len),
            Ok(Some((_, len))) => return self.refuse_get(&format!("{} too large: {} bytes", name, len)),
            Ok(None) => return self.refuse_get(&format!("no such file: {:?}", name)),
            Err(e) => return self.refuse_get(&e.to_string()),
        };
        write_message(&mut self.stream, Opcode::GetReply, status::SUCCESS, b"")?;
        let sent = send_file_data(&mut self.stream, &mut file, len, &mut self.scratch)?;
        self.ctx.logger.sent(&self.peer, name, sent);
        Ok(())
    }

    fn refuse_get(&mut self, reason: &str) -> Result<()> {
        self.ctx.logger.error(&self.peer, "get", reason);
        write_message(&mut self.stream, Opcode::GetReply, status::FAILURE, b"")
    }

    fn handle_put(&mut self, name: &str) -> Result<()> {
        // PUT_REPLY never signals rejection; problems are only visible in the log
        write_message(&mut self.stream, Opcode::PutReply, status::SUCCESS, b"")?;
        let header = read_header(&mut self.stream)?;
        expect_file_data(&header)?;

        let mut upload = match self.ctx.store.create(name) {
            Ok(u) => u,
            Err(e) => {
                self.ctx.logger.error(&self.peer, "put", &e.to_string());
                drain_file_data(&mut self.stream, &header, &mut self.scratch)?;
                return Ok(());
            }
        };
        let written = recv_file_data(&mut self.stream, &header, upload.file(), &mut self.scratch)?;
        let outcome = written.map_err(|e| FtpError::local(upload.dest(), e)).and_then(|n| {
            upload.commit()?;
            Ok(n)
        });
        match outcome {
            Ok(n) => self.ctx.logger.received(&self.peer, name, n),
            Err(e) => self.ctx.logger.error(&self.peer, "put", &e.to_string()),
        }
        Ok(())
    }

    fn handle_quit(&mut self) -> Result<()> {
        write_message(&mut self.stream, Opcode::QuitReply, status::SUCCESS, b"")
    }
}

/// Serve one accepted connection to completion, then drop it
pub fn run_session(stream: TcpStream, peer: String, ctx: Arc<ServerContext>) {
    ctx.logger.connected(&peer);
    let mut session = Session::new(stream, peer.clone(), Arc::clone(&ctx));
    if let Err(e) = session.run() {
        ctx.logger.error(&peer, "session", &e.to_string());
    }
    ctx.logger.closed(&peer);
}

pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Server {
    pub fn bind<A: ToSocketAddrs + std::fmt::Display>(addr: A, ctx: ServerContext) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&addr).with_context(|| format!("bind {}", addr))?;
        Ok(Self {
            listener,
            ctx: Arc::new(ctx),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Canonical directory being served
    pub fn root(&self) -> &std::path::Path {
        self.ctx.store.root()
    }

    /// Accept forever. Each connection is handed to its own thread before
    /// its handshake, so a slow client never holds up the next accept.
    pub fn run(&self) -> anyhow::Result<()> {
        for conn in self.listener.incoming() {
            match conn {
                Ok(stream) => self.spawn_session(stream),
                Err(e) => self.ctx.logger.error("-", "accept", &e.to_string()),
            }
        }
        Ok(())
    }

    fn spawn_session(&self, stream: TcpStream) {
        tune_socket(&stream);
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let ctx = Arc::clone(&self.ctx);
        let spawned = thread::Builder::new()
            .name(format!("session-{}", peer))
            .spawn({
                let peer = peer.clone();
                move || run_session(stream, peer, ctx)
            });
        if let Err(e) = spawned {
            self.ctx.logger.error(&peer, "spawn", &e.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryCredentials;
    use crate::logger::NoopLogger;
    use crate::net::read_payload;
    use crate::protocol::MAX_LIST_PAYLOAD;
    use crate::protocol_core::{cstr_payload, encode, Message};
    use std::io::{self, Cursor};
    use tempfile::TempDir;

    /// Scripted client bytes in, server bytes out
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn context(tmp: &TempDir) -> Arc<ServerContext> {
        Arc::new(ServerContext {
            store: FileStore::open(tmp.path().join("filedir")).unwrap(),
            credentials: Box::new(MemoryCredentials::new().with_user("alice", "pass1")),
            logger: Arc::new(NoopLogger),
        })
    }

    fn msg(op: Opcode, payload: &[u8]) -> Vec<u8> {
        encode(op, 0, payload).unwrap()
    }

    fn login() -> Vec<u8> {
        let mut script = msg(Opcode::OpenConnRequest, b"");
        script.extend(msg(Opcode::AuthRequest, &cstr_payload("alice pass1")));
        script
    }

    fn run(ctx: Arc<ServerContext>, script: Vec<u8>) -> (Session<Duplex>, Result<()>) {
        let duplex = Duplex {
            input: Cursor::new(script),
            output: Vec::new(),
        };
        let mut session = Session::new(duplex, "test".to_string(), ctx);
        let res = session.run();
        (session, res)
    }

    fn replies(output: &[u8]) -> Vec<Message> {
        let mut c = Cursor::new(output.to_vec());
        let mut out = Vec::new();
        while (c.position() as usize) < output.len() {
            let header = read_header(&mut c).unwrap();
            let payload = read_payload(&mut c, &header, MAX_LIST_PAYLOAD).unwrap();
            out.push(Message {
                opcode: header.opcode,
                status: header.status,
                payload,
            });
        }
        out
    }

    #[test]
    fn test_handshake_bad_magic_gets_no_reply() {
        let tmp = TempDir::new().unwrap();
        let mut script = msg(Opcode::OpenConnRequest, b"");
        script[0] = 0;
        let (session, res) = run(context(&tmp), script);
        assert!(matches!(res, Err(FtpError::Framing(_))));
        assert!(session.stream.output.is_empty());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_handshake_wrong_opcode_gets_no_reply() {
        let tmp = TempDir::new().unwrap();
        let (session, res) = run(context(&tmp), msg(Opcode::ListRequest, b""));
        assert!(matches!(res, Err(FtpError::ProtocolViolation(_))));
        assert!(session.stream.output.is_empty());
    }

    #[test]
    fn test_rejected_login_closes_session() {
        let tmp = TempDir::new().unwrap();
        let mut script = msg(Opcode::OpenConnRequest, b"");
        script.extend(msg(Opcode::AuthRequest, &cstr_payload("alice wrong")));
        // never read: the session ends after the rejection
        script.extend(msg(Opcode::ListRequest, b""));
        let (session, res) = run(context(&tmp), script);
        assert!(res.is_ok());
        let r = replies(&session.stream.output);
        assert_eq!(r.len(), 2);
        assert_eq!((r[0].opcode, r[0].status), (Opcode::OpenConnReply, status::SUCCESS));
        assert_eq!((r[1].opcode, r[1].status), (Opcode::AuthReply, status::FAILURE));
    }

    #[test]
    fn test_malformed_auth_body_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let mut script = msg(Opcode::OpenConnRequest, b"");
        script.extend(msg(Opcode::AuthRequest, &cstr_payload("alice")));
        let (session, res) = run(context(&tmp), script);
        assert!(res.is_ok());
        let r = replies(&session.stream.output);
        assert_eq!(r[1].status, status::FAILURE);
    }

    #[test]
    fn test_full_session_script() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        std::fs::write(ctx.store.root().join("hello.txt"), b"hello").unwrap();

        let mut script = login();
        script.extend(msg(Opcode::ListRequest, b""));
        script.extend(msg(Opcode::GetRequest, &cstr_payload("missing.txt")));
        script.extend(msg(Opcode::GetRequest, &cstr_payload("hello.txt")));
        script.extend(msg(Opcode::PutRequest, &cstr_payload("up.bin")));
        script.extend(encode(Opcode::FileData, 1, b"uploaded").unwrap());
        script.extend(msg(Opcode::QuitRequest, b""));

        let (session, res) = run(Arc::clone(&ctx), script);
        res.unwrap();

        let r = replies(&session.stream.output);
        let ops: Vec<_> = r.iter().map(|m| m.opcode).collect();
        assert_eq!(
            ops,
            vec![
                Opcode::OpenConnReply,
                Opcode::AuthReply,
                Opcode::ListReply,
                Opcode::GetReply,
                Opcode::GetReply,
                Opcode::FileData,
                Opcode::PutReply,
                Opcode::QuitReply,
            ]
        );
        assert_eq!(r[1].status, status::SUCCESS);
        assert_eq!(r[2].payload, b"hello.txt\n\0".to_vec());
        assert_eq!(r[3].status, status::FAILURE);
        assert_eq!(r[4].status, status::SUCCESS);
        assert_eq!(r[5].payload, b"hello".to_vec());
        assert_eq!(std::fs::read(ctx.store.root().join("up.bin")).unwrap(), b"uploaded");
    }

    #[test]
    fn test_unexpected_opcode_ends_session_silently() {
        let tmp = TempDir::new().unwrap();
        let mut script = login();
        script.extend(msg(Opcode::AuthRequest, &cstr_payload("alice pass1")));
        let (session, res) = run(context(&tmp), script);
        assert!(matches!(res, Err(FtpError::ProtocolViolation(_))));
        // only the handshake and login replies
        assert_eq!(replies(&session.stream.output).len(), 2);
    }

    #[test]
    fn test_put_with_traversal_name_is_drained() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let mut script = login();
        script.extend(msg(Opcode::PutRequest, &cstr_payload("../escape.txt")));
        script.extend(encode(Opcode::FileData, 1, b"should not land").unwrap());
        script.extend(msg(Opcode::ListRequest, b""));
        script.extend(msg(Opcode::QuitRequest, b""));

        let (session, res) = run(Arc::clone(&ctx), script);
        res.unwrap();
        assert!(!tmp.path().join("escape.txt").exists());

        let r = replies(&session.stream.output);
        assert_eq!(r[2].opcode, Opcode::PutReply);
        assert_eq!(r[3].opcode, Opcode::ListReply);
        assert_eq!(r[3].payload, vec![0u8]);
        assert_eq!(r[4].opcode, Opcode::QuitReply);
    }

    #[test]
    fn test_put_with_reserved_name_is_drained() {
        let tmp = TempDir::new().unwrap();
        let ctx = context(&tmp);
        let mut script = login();
        script.extend(msg(Opcode::PutRequest, &cstr_payload(".tinyftp-upload-notes.txt")));
        script.extend(encode(Opcode::FileData, 1, b"note").unwrap());
        script.extend(msg(Opcode::ListRequest, b""));
        script.extend(msg(Opcode::QuitRequest, b""));

        let (session, res) = run(Arc::clone(&ctx), script);
        res.unwrap();

        let r = replies(&session.stream.output);
        assert_eq!(r[2].opcode, Opcode::PutReply);
        assert_eq!(r[3].payload, vec![0u8]);
        // nothing landed that a listing could hide
        assert_eq!(std::fs::read_dir(ctx.store.root()).unwrap().count(), 0);
    }

    /// Keeps every error line for inspection
    #[derive(Default)]
    struct Recorder {
        errors: parking_lot::Mutex<Vec<String>>,
    }

    impl Logger for Recorder {
        fn error(&self, _peer: &str, context: &str, msg: &str) {
            self.errors.lock().push(format!("{}: {}", context, msg));
        }
    }

    #[test]
    fn test_refused_get_logs_one_error() {
        let tmp = TempDir::new().unwrap();
        let recorder = Arc::new(Recorder::default());
        let ctx = Arc::new(ServerContext {
            store: FileStore::open(tmp.path().join("filedir")).unwrap(),
            credentials: Box::new(MemoryCredentials::new().with_user("alice", "pass1")),
            logger: recorder.clone(),
        });
        // sparse, one byte past what a frame can carry
        let huge = std::fs::File::create(ctx.store.root().join("huge.bin")).unwrap();
        huge.set_len(MAX_FILE_LEN + 1).unwrap();

        let mut script = login();
        script.extend(msg(Opcode::GetRequest, &cstr_payload("huge.bin")));
        script.extend(msg(Opcode::GetRequest, &cstr_payload("absent.bin")));
        script.extend(msg(Opcode::QuitRequest, b""));
        let (session, res) = run(Arc::clone(&ctx), script);
        res.unwrap();

        let r = replies(&session.stream.output);
        assert_eq!((r[2].opcode, r[2].status), (Opcode::GetReply, status::FAILURE));
        assert_eq!((r[3].opcode, r[3].status), (Opcode::GetReply, status::FAILURE));
        assert_eq!(r[4].opcode, Opcode::QuitReply);

        let errors = recorder.errors.lock();
        assert_eq!(errors.len(), 2, "{:?}", *errors);
        assert!(errors[0].contains("too large"));
        assert!(errors[1].contains("no such file"));
    }

    #[test]
    fn test_put_followed_by_wrong_message_is_violation() {
        let tmp = TempDir::new().unwrap();
        let mut script = login();
        script.extend(msg(Opcode::PutRequest, &cstr_payload("a.txt")));
        script.extend(msg(Opcode::ListRequest, b""));
        let (_, res) = run(context(&tmp), script);
        assert!(matches!(res, Err(FtpError::ProtocolViolation(_))));
    }

    #[test]
    fn test_peer_disconnect_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let (session, res) = run(context(&tmp), login());
        assert!(matches!(res, Err(FtpError::Io(_))));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_request_parse() {
        assert_eq!(Request::parse(Opcode::ListRequest, b"").unwrap(), Request::List);
        assert_eq!(
            Request::parse(Opcode::GetRequest, b"a.txt\0").unwrap(),
            Request::Get("a.txt".into())
        );
        assert_eq!(
            Request::parse(Opcode::PutRequest, &[0xff, 0]).unwrap(),
            Request::Put(String::new())
        );
        assert!(Request::parse(Opcode::FileData, b"").is_err());
        assert!(!Request::accepts(Opcode::OpenConnRequest));
    }
}
