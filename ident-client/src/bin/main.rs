use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ident_client::{version, JwksClient, Verifier};

#[derive(Debug, Parser)]
#[command(name = "identctl")]
#[command(author, about, long_about = None)]
struct Cli {
    #[arg(long, env = "RUST_LOG", default_value = "warn", global = true)]
    rust_log: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Verify a token against a JWKS URL and print its claims.
    Verify {
        #[arg(long)]
        jwks: String,
        #[arg(long)]
        audience: Option<String>,
        #[arg(long)]
        issuer: Option<String>,
        token: String,
    },
    /// Request identity tokens from a server and verify each of them.
    Identities {
        #[arg(long, default_value = "http://127.0.0.1:30050")]
        server: String,
        /// Bearer session token of the owner.
        #[arg(long, env = "IDENT_SESSION")]
        session: String,
    },
    #[command(short_flag = 'v')]
    Version,
}

#[derive(Debug, Deserialize)]
struct IdentityList {
    identities: Vec<Identity>,
}

#[derive(Debug, Deserialize)]
struct Identity {
    token: String,
    audience: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&args.rust_log))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match args.command {
        Commands::Verify {
            jwks,
            audience,
            issuer,
            token,
        } => {
            let mut verifier = Verifier::new(JwksClient::new(jwks));
            if let Some(aud) = audience {
                verifier = verifier.with_audience(aud);
            }
            if let Some(iss) = issuer {
                verifier = verifier.with_issuer(iss);
            }
            let claims = verifier.verify(&token).await?;
            println!("{}", serde_json::to_string_pretty(&claims)?);
        }
        Commands::Identities { server, session } => {
            identities(server.trim_end_matches('/'), &session).await?;
        }
        Commands::Version => {
            println!("{}", version());
        }
    }
    Ok(())
}

async fn identities(server: &str, session: &str) -> Result<()> {
    let response = reqwest::Client::new()
        .get(format!("{server}/v1/identities/"))
        .bearer_auth(session)
        .send()
        .await
        .context("could not reach the server")?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        bail!("server answered {}: {}", status, body);
    }
    let list: IdentityList = response
        .json()
        .await
        .context("unexpected identities response")?;

    let jwks = format!("{server}/.well-known/jwks.json");
    for identity in list.identities {
        let mut verifier = Verifier::new(JwksClient::new(jwks.as_str()));
        if let Some(ref aud) = identity.audience {
            verifier = verifier.with_audience(aud.as_str());
        }
        let claims = verifier
            .verify(&identity.token)
            .await
            .with_context(|| format!("identity {:?} failed to verify", identity.audience))?;
        println!("{}", identity.token);
        println!("{}", serde_json::to_string_pretty(&claims)?);
    }
    Ok(())
}
