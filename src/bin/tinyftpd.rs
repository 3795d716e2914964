use anyhow::{Context, Result};
use clap::Parser;

use tinyftp::cli::DaemonOpts;
use tinyftp::config::ServerConfig;
use tinyftp::{Server, ServerContext};

fn main() -> Result<()> {
    let opts = DaemonOpts::parse();
    let cfg = ServerConfig::from_opts(&opts)?;

    if cfg.root.exists() && !cfg.root.is_dir() {
        anyhow::bail!("Error: Root path is not a directory: {}", cfg.root.display());
    }
    if !cfg.credentials.is_file() {
        // Re-read on every login, so it may appear later; every login fails until then
        eprintln!(
            "WARNING: credential file not found: {} (all logins will be refused)",
            cfg.credentials.display()
        );
    }

    let ctx = ServerContext::from_config(&cfg)?;
    let server = Server::bind(cfg.bind.as_str(), ctx)?;
    let local = server.local_addr().context("Failed to read bound address")?;

    println!("Starting tinyftp daemon:");
    println!("  Root: {}", server.root().display());
    println!("  Bind: {}", local);
    println!("  Credentials: {}", cfg.credentials.display());
    match cfg.log_file {
        Some(ref p) => println!("  Log: {}", p.display()),
        None => println!("  Log: stderr"),
    }

    if cfg.bind.starts_with("0.0.0.0") {
        eprintln!("WARNING: Binding to 0.0.0.0 exposes the daemon on all network interfaces");
        eprintln!("   Credentials and file contents travel unencrypted");
        eprintln!("   Only use on trusted networks (LAN)");
        eprintln!();
    }

    server.run()
}
