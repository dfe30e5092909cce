use std::{fs, ops::RangeInclusive};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug, Clone, Deserialize)]
#[command(name = "server")]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    #[clap(long)]
    #[arg(short = 'c')]
    #[serde(default)]
    pub config: Option<String>,
    /// MariaDB connection string. Keys and users live in memory when unset.
    #[clap(long, env)]
    #[serde(default)]
    pub database_url: Option<String>,
    #[clap(long, env)]
    #[arg(default_value_t = 50)]
    #[serde(default = "default_max_size")]
    pub max_size: u32,
    #[clap(long, env)]
    #[arg(default_value_t = 30)]
    #[serde(default = "default_min_idle")]
    pub min_idle: u32,
    #[clap(long, env)]
    #[arg(default_value_t = false)]
    #[serde(default)]
    pub run_migrations: bool,
    #[clap(long, env)]
    #[arg(default_value_t = default_rust_log())]
    #[serde(default = "default_rust_log")]
    pub rust_log: String,
    #[clap(long, env)]
    #[arg(value_parser = port_in_range, short = 'p', default_value_t = 30050)]
    #[serde(default = "default_port")]
    pub port: u16,
    #[clap(long, env)]
    #[arg(default_value_t = default_endpoint())]
    #[serde(default = "default_endpoint")]
    pub cors_origin: String,
    /// Public base URL, used as the `iss` claim of every token.
    #[clap(long, env)]
    #[arg(default_value_t = default_endpoint())]
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Session token lifetime in seconds.
    #[clap(long, env)]
    #[arg(default_value_t = 3600)]
    #[serde(default = "default_expiration")]
    pub expiration: i64,
    /// Identity token lifetime in seconds.
    #[clap(long, env)]
    #[arg(default_value_t = 300)]
    #[serde(default = "default_identity_expiration")]
    pub identity_expiration: i64,
    /// One identity token is issued per audience, or a single token without
    /// `aud` when empty.
    #[clap(long, env, value_delimiter = ',')]
    #[serde(default)]
    pub identity_audiences: Vec<String>,
    #[clap(long, env)]
    #[arg(default_value_t = 6 * 60 * 60)]
    #[serde(default = "default_rotation_frequency")]
    pub rotation_frequency: i64,
    /// How long a public key stays published after it stopped signing.
    #[clap(long, env)]
    #[arg(default_value_t = 24 * 60 * 60)]
    #[serde(default = "default_keep")]
    pub keep: i64,
    #[clap(long, env)]
    #[serde(default)]
    pub owner_email: Option<String>,
    #[clap(long, env)]
    #[arg(default_value_t = String::from("Owner"))]
    #[serde(default = "default_owner_name")]
    pub owner_name: String,
}

fn default_rust_log() -> String {
    String::from("ident_server=info,tower_http=info")
}

fn default_endpoint() -> String {
    String::from("http://127.0.0.1:30050")
}

fn default_port() -> u16 {
    30050
}

fn default_max_size() -> u32 {
    50
}

fn default_min_idle() -> u32 {
    30
}

fn default_expiration() -> i64 {
    3600
}

fn default_identity_expiration() -> i64 {
    300
}

fn default_rotation_frequency() -> i64 {
    6 * 60 * 60
}

fn default_keep() -> i64 {
    24 * 60 * 60
}

fn default_owner_name() -> String {
    String::from("Owner")
}

const PORT_RANGE: RangeInclusive<usize> = 1..=65535;

fn port_in_range(s: &str) -> Result<u16, String> {
    let port: usize = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a port number"))?;
    if PORT_RANGE.contains(&port) {
        Ok(port as u16)
    } else {
        Err(format!(
            "port not in range {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ))
    }
}

impl AppConfig {
    /// Rejects settings under which a published key could disappear before
    /// the tokens it signed expire.
    pub fn check(&self) -> Result<()> {
        if self.expiration <= 0 || self.identity_expiration <= 0 {
            anyhow::bail!("token lifetimes must be positive");
        }
        if self.rotation_frequency <= 0 {
            anyhow::bail!("rotation_frequency must be positive");
        }
        let longest = self.expiration.max(self.identity_expiration);
        if self.keep < longest {
            anyhow::bail!(
                "keep ({}s) must cover the longest token lifetime ({}s)",
                self.keep,
                longest
            );
        }
        if self
            .identity_audiences
            .iter()
            .any(|aud| aud == crate::services::session::SESSION_AUDIENCE)
        {
            anyhow::bail!(
                "`{}` is reserved for session tokens",
                crate::services::session::SESSION_AUDIENCE
            );
        }
        Ok(())
    }
}

pub fn load(cfg: &str) -> Result<AppConfig> {
    let content =
        fs::read_to_string(cfg).context("could not read config file")?;
    toml::from_str(&content).context("could not parse config file")
}
