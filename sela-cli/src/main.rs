//! sela-cli — researcher frontend for the Sela study server
//!
//! Thin HTTP client over the server's researcher endpoints, for pulling
//! collected study data off a running deployment without a browser.
//!
//! # Subcommands
//! - `status`                         — server health
//! - `dashboard`                      — collection counters
//! - `files`                          — list files under the storage root
//! - `export complete [-o <path>]`    — download the full data archive
//! - `export latest [-o <path>]`      — download latest-session CSVs (needs DB)

use std::io::Write;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:5001";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(name = "sela-cli", version, about = "Sela study server — researcher CLI")]
struct Cli {
    /// Sela HTTP server URL (overrides SELA_HTTP_URL env var)
    #[arg(long, env = "SELA_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Show server health
    Status,

    /// Show collection counters (participants, sessions, storage)
    Dashboard,

    /// List every file under the server's storage root
    Files,

    /// Download collected data as a ZIP archive
    Export {
        #[command(subcommand)]
        what: ExportTarget,
    },
}

#[derive(Debug, Subcommand)]
enum ExportTarget {
    /// The complete storage tree (audio, logs, recordings)
    Complete {
        /// Output path for the archive
        #[arg(short, long, default_value = "sela_export.zip")]
        output: String,
    },
    /// CSVs covering the most recent session per participant
    Latest {
        /// Output path for the archive
        #[arg(short, long, default_value = "latest_sessions.zip")]
        output: String,
    },
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct FileEntry {
    path: String,
    size: u64,
}

#[derive(Debug, Deserialize)]
struct FilesResponse {
    root: String,
    count: usize,
    files: Vec<FileEntry>,
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    match client(10)?.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Sela server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:     {}", body["version"].as_str().unwrap_or("?"));
            println!("Database:    {}", body["database"].as_str().unwrap_or("?"));
            println!("Concepts:    {}", body["concepts"].as_u64().unwrap_or(0));
        }
        Ok(r) => {
            eprintln!("sela-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("sela-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }
    Ok(())
}

/// Print the dashboard counters from GET /dashboard.
fn do_dashboard(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/dashboard", server);
    let resp = match client(10)?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("sela-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    };
    if !resp.status().is_success() {
        eprintln!("sela-cli: server returned {}", resp.status());
        std::process::exit(1);
    }
    let body: serde_json::Value = resp.json()?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

/// List files from GET /files.
fn do_files(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/files", server);
    let resp = match client(30)?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("sela-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    };
    if !resp.status().is_success() {
        eprintln!("sela-cli: server returned {}", resp.status());
        std::process::exit(1);
    }
    let listing: FilesResponse = resp.json()?;
    println!("{} ({} files)", listing.root, listing.count);
    for f in &listing.files {
        println!("{:>10}  {}", f.size, f.path);
    }
    Ok(())
}

/// Download a ZIP endpoint to `output`.
fn do_export(server: &str, endpoint: &str, output: &str) -> anyhow::Result<()> {
    let url = format!("{}{}", server, endpoint);
    let resp = match client(300)?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("sela-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    };
    match resp.status().as_u16() {
        200 => {}
        404 => {
            eprintln!("sela-cli: nothing to export yet");
            std::process::exit(1);
        }
        503 => {
            eprintln!("sela-cli: server has no database configured");
            std::process::exit(1);
        }
        code => {
            eprintln!("sela-cli: server returned HTTP {}", code);
            std::process::exit(1);
        }
    }
    let bytes = resp.bytes()?;
    let mut file = std::fs::File::create(output)?;
    file.write_all(&bytes)?;
    println!("Wrote {} bytes to {}", bytes.len(), output);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Status => do_status(&cli.server),
        Commands::Dashboard => do_dashboard(&cli.server),
        Commands::Files => do_files(&cli.server),
        Commands::Export { what } => match what {
            ExportTarget::Complete { output } => {
                do_export(&cli.server, "/export/complete", &output)
            }
            ExportTarget::Latest { output } => do_export(&cli.server, "/export/latest", &output),
        },
    }
}
