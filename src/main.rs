//! Edge gateway (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                      ┌──────────────────────────────────────────────────────────┐
//!                      │                       EDGE GATEWAY                        │
//!                      │                                                           │
//!   Client Request     │  ┌──────┐   ┌────────────┐   ┌──────┐   ┌────────────┐    │
//!   ───────────────────┼─▶│ CORS │──▶│ rate limit │──▶│ auth │──▶│  routing   │    │
//!                      │  └──────┘   └────────────┘   └──────┘   └─────┬──────┘    │
//!                      │                                              │           │
//!                      │                                              ▼           │
//!                      │                              ┌──────────────────────────┐ │
//!                      │                              │ breaker → retry → client │─┼──▶ Upstream
//!   Client Response    │                              └────────────┬─────────────┘ │
//!   ◀──────────────────┼───────────── response | fallback ◀────────┘               │
//!                      │                                                           │
//!                      │  config (hot reload) · observability · lifecycle           │
//!                      └──────────────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use edge_gateway::lifecycle::startup::{run, Args};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    run(args).await?;
    Ok(())
}
