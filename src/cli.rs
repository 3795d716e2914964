//! Shared CLI definitions for tinyftp and tinyftpd

use clap::Parser;
use std::path::PathBuf;

/// Daemon options. Anything left unset falls back to the config file, then
/// to built-in defaults.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "tinyftpd - multi-client tinyftp server")]
pub struct DaemonOpts {
    /// Port to listen on (shorthand for --bind 0.0.0.0:PORT)
    pub port: Option<u16>,

    /// TOML configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bind address (host:port)
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory served to clients
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Credential file, one "username password" record per line
    #[arg(long)]
    pub credentials: Option<PathBuf>,

    /// Append session events to this file instead of stderr
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,
}

/// Interactive client options
#[derive(Clone, Debug, Parser)]
#[command(author, version, about = "tinyftp - interactive tinyftp client")]
pub struct ClientOpts {
    /// Local directory for downloads and uploads
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Server to open immediately
    pub host: Option<String>,

    /// Server port (with HOST)
    #[arg(requires = "host")]
    pub port: Option<u16>,
}
