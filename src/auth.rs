//! Credential lookup for AUTH_REQUEST

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

pub trait CredentialStore: Send + Sync {
    /// True when `user` exists and `pass` matches exactly
    fn verify(&self, user: &str, pass: &str) -> io::Result<bool>;
}

/// Line-oriented `username password` file, re-read on every attempt so
/// edits take effect without a restart. Reading stops at the first blank line.
#[derive(Debug, Clone)]
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl CredentialStore for FileCredentials {
    fn verify(&self, user: &str, pass: &str) -> io::Result<bool> {
        let reader = BufReader::new(std::fs::File::open(&self.path)?);
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            if let Some((u, p)) = line.split_once(' ') {
                if u == user && p == pass {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

/// Fixed in-memory table
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentials {
    users: HashMap<String, String>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, user: &str, pass: &str) -> Self {
        self.users.insert(user.to_string(), pass.to_string());
        self
    }
}

impl CredentialStore for MemoryCredentials {
    fn verify(&self, user: &str, pass: &str) -> io::Result<bool> {
        Ok(self.users.get(user).map(|p| p == pass).unwrap_or(false))
    }
}

/// Split an AUTH_REQUEST body (`"user pass"`, NUL already stripped) at the first space
pub fn split_credentials(body: &str) -> Option<(&str, &str)> {
    let (user, pass) = body.split_once(' ')?;
    if user.is_empty() {
        return None;
    }
    Some((user, pass))
}
