use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;

use edge_gateway::security::auth::issue_token;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for the edge gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway and counter store health
    Health,
    /// Application metadata and route map
    Info,
    /// Uptime, memory and circuit breaker state
    Metrics,
    /// Fetch the fallback body for a service
    Fallback { service: String },
    /// Mint a development token for a subject
    Token {
        subject: String,

        /// HMAC secret (defaults to GATEWAY_AUTH_SECRET, then the built-in development secret)
        #[arg(short, long)]
        secret: Option<String>,

        /// Lifetime in seconds
        #[arg(long, default_value_t = 3600)]
        ttl: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    match cli.command {
        Commands::Health => print_response(client.get(format!("{base}/gateway/health")).send().await?).await?,
        Commands::Info => print_response(client.get(format!("{base}/gateway/info")).send().await?).await?,
        Commands::Metrics => print_response(client.get(format!("{base}/gateway/metrics")).send().await?).await?,
        Commands::Fallback { service } => {
            print_response(client.get(format!("{base}/fallback/{service}")).send().await?).await?
        }
        Commands::Token { subject, secret, ttl } => {
            let secret = secret
                .or_else(|| std::env::var("GATEWAY_AUTH_SECRET").ok())
                .unwrap_or_else(|| edge_gateway::config::AuthConfig::default().secret);
            println!("{}", issue_token(&secret, &subject, Duration::from_secs(ttl))?);
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{text}"),
    }
    if !status.is_success() {
        eprintln!("Gateway returned status {status}");
    }
    Ok(())
}
