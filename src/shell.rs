//! Line-oriented command front-end for the client
//!
//! Owns the input restrictions the protocol layer leaves to its caller:
//! filenames limited to `[0-9A-Za-z._-]`, credentials to alphanumerics.

use crate::client::Client;
use crate::error::{FtpError, Result};
use crate::protocol_core::validate_filename;
use std::io::{self, Write};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open { host: String, port: u16 },
    Auth { user: String, pass: String },
    List,
    Get(String),
    Put(String),
    Quit,
    Help,
}

pub const HELP: &str = "\
Commands:
  open HOST PORT   connect to a server
  auth USER PASS   log in
  ls               list files on the server
  get NAME         download NAME into the local directory
  put NAME         upload NAME from the local directory
  quit             close the connection and exit
  help             show this text";

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> Result<Option<Command>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&verb, args)) = words.split_first() else {
        return Ok(None);
    };

    let cmd = match (verb, args) {
        ("open", [host, port]) => Command::Open {
            host: host.to_string(),
            port: port
                .parse::<u16>()
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| FtpError::InvalidArgument(format!("bad port {:?}", port)))?,
        },
        ("auth", [user, pass]) => Command::Auth {
            user: credential_word(user)?,
            pass: credential_word(pass)?,
        },
        ("ls", []) => Command::List,
        ("get", [name]) => Command::Get(portable_name(name)?),
        ("put", [name]) => Command::Put(portable_name(name)?),
        ("quit", []) => Command::Quit,
        ("help", []) => Command::Help,
        ("open" | "auth" | "ls" | "get" | "put" | "quit" | "help", _) => {
            return Err(FtpError::InvalidArgument(format!(
                "wrong number of arguments for {:?}",
                verb
            )))
        }
        _ => return Err(FtpError::InvalidArgument(format!("unknown command {:?}", verb))),
    };
    Ok(Some(cmd))
}

fn portable_name(name: &str) -> Result<String> {
    let ok = name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if !ok {
        return Err(FtpError::InvalidArgument(format!(
            "filename {:?} may only use letters, digits, '.', '_' and '-'",
            name
        )));
    }
    Ok(validate_filename(name)?.to_string())
}

fn credential_word(word: &str) -> Result<String> {
    if word.is_empty() || !word.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FtpError::InvalidArgument(
            "username and password may only use letters and digits".into(),
        ));
    }
    Ok(word.to_string())
}

/// Run one command and report the outcome to `out`.
/// Returns false once the user has asked to quit.
pub fn execute(client: &mut Client, cmd: Command, out: &mut dyn Write) -> io::Result<bool> {
    match cmd {
        Command::Open { host, port } => match client.open(&host, port) {
            Ok(()) => writeln!(out, "Server connection accepted.")?,
            Err(e) => report(out, &e)?,
        },
        Command::Auth { user, pass } => match client.auth(&user, &pass) {
            Ok(()) => writeln!(out, "Authentication granted.")?,
            Err(FtpError::AuthRejected) => {
                writeln!(out, "ERROR: Authentication rejected. Connection closed.")?
            }
            Err(e) => report(out, &e)?,
        },
        Command::List => match client.list() {
            Ok(names) => {
                writeln!(out, "---- file list start ----")?;
                for n in names {
                    writeln!(out, "{}", n)?;
                }
                writeln!(out, "---- file list end ----")?;
            }
            Err(e) => report(out, &e)?,
        },
        Command::Get(name) => match client.get(&name) {
            Ok(n) => writeln!(out, "File downloaded ({} bytes).", n)?,
            Err(e) => report(out, &e)?,
        },
        Command::Put(name) => match client.put(&name) {
            Ok(n) => writeln!(out, "File uploaded ({} bytes).", n)?,
            Err(e) => report(out, &e)?,
        },
        Command::Quit => {
            match client.quit() {
                Ok(()) | Err(FtpError::InvalidState(_)) => writeln!(out, "Thank you")?,
                Err(e) => report(out, &e)?,
            }
            return Ok(false);
        }
        Command::Help => writeln!(out, "{}", HELP)?,
    }
    Ok(true)
}

fn report(out: &mut dyn Write, e: &FtpError) -> io::Result<()> {
    if e.is_connection_fatal() {
        writeln!(out, "ERROR: {}. Connection closed.", e)
    } else {
        writeln!(out, "ERROR: {}", e)
    }
}
