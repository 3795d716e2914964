use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

pub trait Logger: Send + Sync {
    fn connected(&self, _peer: &str) {}
    fn authenticated(&self, _peer: &str, _user: &str) {}
    fn rejected(&self, _peer: &str, _user: &str) {}
    fn listed(&self, _peer: &str, _entries: usize) {}
    fn sent(&self, _peer: &str, _name: &str, _bytes: u64) {}
    fn received(&self, _peer: &str, _name: &str, _bytes: u64) {}
    fn error(&self, _peer: &str, _context: &str, _msg: &str) {}
    fn closed(&self, _peer: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

pub struct TextLogger {
    out: Mutex<Box<dyn Write + Send>>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::from_writer(Box::new(f)))
    }

    pub fn stderr() -> Self {
        Self::from_writer(Box::new(std::io::stderr()))
    }

    pub fn from_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    fn line(&self, s: &str) {
        let mut out = self.out.lock();
        let _ = writeln!(out, "[{}] {}", Utc::now().to_rfc3339(), s);
        let _ = out.flush();
    }
}

impl Logger for TextLogger {
    fn connected(&self, peer: &str) {
        self.line(&format!("CONNECT peer={}", peer));
    }
    fn authenticated(&self, peer: &str, user: &str) {
        self.line(&format!("LOGIN peer={} user={}", peer, user));
    }
    fn rejected(&self, peer: &str, user: &str) {
        self.line(&format!("REJECT peer={} user={}", peer, user));
    }
    fn listed(&self, peer: &str, entries: usize) {
        self.line(&format!("LIST peer={} entries={}", peer, entries));
    }
    fn sent(&self, peer: &str, name: &str, bytes: u64) {
        self.line(&format!("GET peer={} name={} bytes={}", peer, name, bytes));
    }
    fn received(&self, peer: &str, name: &str, bytes: u64) {
        self.line(&format!("PUT peer={} name={} bytes={}", peer, name, bytes));
    }
    fn error(&self, peer: &str, context: &str, msg: &str) {
        self.line(&format!("ERROR peer={} ctx={} msg={}", peer, context, msg));
    }
    fn closed(&self, peer: &str) {
        self.line(&format!("CLOSE peer={}", peer));
    }
}
