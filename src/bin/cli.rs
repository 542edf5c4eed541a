// LCP Core - Licensed Content Protection engine
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lcp_core::crypto::{CryptoError, DecryptionContext, LcpCrypto};
use lcp_core::license::Links;
use lcp_core::{LcpConfig, LcpService, LicenseDocument};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lcp-cli")]
#[command(about = "LCP CLI - inspect licenses and talk to license servers", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database, overrides the configuration
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the content of a License Document
    Inspect {
        /// Path to the .lcpl file
        license: PathBuf,
    },
    /// Fetch and print the Status Document of a license
    Status {
        /// Path to the .lcpl file
        license: PathBuf,
    },
    /// Download the certificate revocation list
    Crl {
        /// Ignore the cached copy
        #[arg(long)]
        refresh: bool,
    },
    /// Download the publication protected by a license
    Acquire {
        /// Path to the .lcpl file
        license: PathBuf,
        /// Where to write the publication
        output: PathBuf,
    },
}

/// Stand-in for the native crypto library, which this tool doesn't ship.
/// Commands that need it fail with a crypto error.
struct NoCrypto;

impl LcpCrypto for NoCrypto {
    fn find_one_valid_passphrase(&self, _license_json: &str, _passphrases: &[String]) -> Option<String> {
        None
    }

    fn create_context(
        &self,
        _license_json: &str,
        _passphrase: &str,
        _crl: &str,
    ) -> std::result::Result<DecryptionContext, CryptoError> {
        Err(CryptoError::Other("no crypto library available".to_string()))
    }

    fn decrypt(&self, _context: &DecryptionContext, _data: &[u8]) -> std::result::Result<Vec<u8>, CryptoError> {
        Err(CryptoError::ContextInvalid)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => LcpConfig::from_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => LcpConfig::default(),
    };
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }

    match cli.command {
        Commands::Inspect { license } => {
            let license = read_license(&license)?;
            println!("id:        {}", license.id);
            println!("provider:  {}", license.provider);
            println!("issued:    {}", license.issued);
            println!("updated:   {}", license.effective_updated());
            println!("profile:   {}", license.encryption.profile);
            println!("hint:      {}", license.encryption.user_key.text_hint);
            if let Some(end) = license.rights.end {
                println!("ends:      {}", end);
            }
            println!("print:     {}", optional_budget(license.rights.print));
            println!("copy:      {}", optional_budget(license.rights.copy));
            for link in license.links() {
                println!("link:      {} {}", link.rel.join(","), link.href);
            }
        }
        Commands::Status { license } => {
            let license = read_license(&license)?;
            let service = LcpService::new(config, Arc::new(NoCrypto)).await?;
            let status = service.fetch_status(&license).await?;
            println!("status:    {}", status.status.as_str());
            if !status.message.is_empty() {
                println!("message:   {}", status.message);
            }
            println!("devices:   {}", status.registered_device_count());
            if let Some(end) = status.potential_end() {
                println!("renewable: until {}", end);
            }
        }
        Commands::Crl { refresh } => {
            let service = LcpService::new(config, Arc::new(NoCrypto)).await?;
            let pem = if refresh {
                service.crl().refresh().await?
            } else {
                service.crl().retrieve().await?
            };
            println!("{}", pem);
        }
        Commands::Acquire { license, output } => {
            let bytes = tokio::fs::read(&license)
                .await
                .with_context(|| format!("reading {}", license.display()))?;
            let service = LcpService::new(config, Arc::new(NoCrypto)).await?;
            let acquired = service.acquire_publication(&bytes, &output).await?;
            println!("saved {} (suggested name: {})", acquired.path.display(), acquired.suggested_filename);
        }
    }

    Ok(())
}

fn read_license(path: &PathBuf) -> Result<LicenseDocument> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(LicenseDocument::parse(&bytes)?)
}

fn optional_budget(value: Option<u32>) -> String {
    value.map_or_else(|| "unlimited".to_string(), |v| v.to_string())
}
