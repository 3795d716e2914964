//! tinyftp - interactive client
//!
//! Reads commands from stdin, one per line, and runs each as a single
//! synchronous round trip against the server.

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use tinyftp::cli::ClientOpts;
use tinyftp::shell::{execute, parse_command, Command};
use tinyftp::store::FileStore;
use tinyftp::Client;

fn main() -> Result<()> {
    let opts = ClientOpts::parse();

    let store = FileStore::open(&opts.dir)
        .with_context(|| format!("Failed to open local directory: {}", opts.dir.display()))?;
    let client = Arc::new(Mutex::new(Client::new(store)));

    // Best-effort QUIT on Ctrl-C so the server sees a clean close
    {
        let client = Arc::clone(&client);
        ctrlc::set_handler(move || {
            eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
            if let Some(mut c) = client.try_lock_for(Duration::from_millis(500)) {
                let _ = c.quit();
            }
            // 128 + SIGINT
            std::process::exit(130);
        })
        .context("Error setting Ctrl-C handler")?;
    }

    let mut stdout = io::stdout();
    if let (Some(host), Some(port)) = (opts.host, opts.port) {
        execute(&mut client.lock(), Command::Open { host, port }, &mut stdout)?;
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("Client> ");
        stdout.flush().ok();

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            // EOF behaves like quit
            let _ = client.lock().quit();
            println!();
            break;
        }
        let cmd = match parse_command(&line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => continue,
            Err(e) => {
                println!("ERROR: {}", e);
                continue;
            }
        };
        if !execute(&mut client.lock(), cmd, &mut stdout)? {
            break;
        }
    }
    Ok(())
}
