use std::collections::BTreeMap;
use std::time::Duration;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::http::server::AppState;
use crate::resilience::circuit_breaker::BreakerSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComponentStatus {
    #[serde(rename = "UP")]
    Up,
    #[serde(rename = "DOWN")]
    Down,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthComponents {
    pub gateway: ComponentStatus,
    pub counter_store: ComponentStatus,
}

#[derive(Serialize)]
pub struct HealthReport {
    pub status: ComponentStatus,
    pub timestamp: DateTime<Utc>,
    pub components: HealthComponents,
}

#[derive(Serialize)]
pub struct ApplicationInfo {
    pub name: String,
    pub version: &'static str,
    pub description: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub started_at: DateTime<Utc>,
    pub rust_edition: &'static str,
}

#[derive(Serialize)]
pub struct GatewayInfo {
    pub application: ApplicationInfo,
    pub build: BuildInfo,
    pub routes: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub resident_bytes: u64,
    pub virtual_bytes: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStats {
    pub workers: usize,
    pub alive_tasks: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMetrics {
    pub uptime: String,
    pub uptime_seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub memory: Option<MemoryStats>,
    pub runtime: RuntimeStats,
    pub circuit_breakers: BTreeMap<String, BreakerSnapshot>,
}

/// `GET /gateway/health`. Always 200; the body says whether the counter
/// store answered.
pub async fn get_health(State(state): State<AppState>) -> Json<HealthReport> {
    let deadline = Duration::from_millis(state.config.rate_limit.store_timeout_ms);
    let store_up = match tokio::time::timeout(deadline, state.counter_store.ping()).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(store = state.counter_store.kind(), error = %e, "Counter store health check failed");
            false
        }
        Err(_) => {
            tracing::warn!(store = state.counter_store.kind(), "Counter store health check timed out");
            false
        }
    };
    let counter_store = if store_up { ComponentStatus::Up } else { ComponentStatus::Down };

    Json(HealthReport {
        status: counter_store,
        timestamp: Utc::now(),
        components: HealthComponents {
            gateway: ComponentStatus::Up,
            counter_store,
        },
    })
}

/// `GET /gateway/info`.
pub async fn get_info(State(state): State<AppState>) -> Json<GatewayInfo> {
    let routes = state
        .routes
        .load()
        .routes()
        .iter()
        .map(|r| (r.id.clone(), format!("{}/**", r.matcher.as_str())))
        .collect();

    Json(GatewayInfo {
        application: ApplicationInfo {
            name: state.config.info.name.clone(),
            version: env!("CARGO_PKG_VERSION"),
            description: state.config.info.description.clone(),
        },
        build: BuildInfo {
            started_at: state.started_at,
            rust_edition: "2021",
        },
        routes,
    })
}

/// `GET /gateway/metrics`.
pub async fn get_metrics(State(state): State<AppState>) -> Json<GatewayMetrics> {
    let uptime = state.uptime.elapsed();
    let runtime = tokio::runtime::Handle::current().metrics();

    Json(GatewayMetrics {
        uptime: iso8601_duration(uptime),
        uptime_seconds: uptime.as_secs(),
        timestamp: Utc::now(),
        memory: read_memory(),
        runtime: RuntimeStats {
            workers: runtime.num_workers(),
            alive_tasks: runtime.num_alive_tasks(),
        },
        circuit_breakers: state.breakers.snapshot(),
    })
}

/// `PT1H2M3.5S` style duration.
fn iso8601_duration(d: Duration) -> String {
    let total = d.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    let millis = d.subsec_millis();

    let mut out = String::from("PT");
    if hours > 0 {
        out.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        out.push_str(&format!("{minutes}M"));
    }
    if millis > 0 {
        out.push_str(&format!("{seconds}.{millis:03}S"));
    } else if seconds > 0 || (hours == 0 && minutes == 0) {
        out.push_str(&format!("{seconds}S"));
    }
    out
}

/// Process memory from `/proc/self/status`; `None` off Linux.
fn read_memory() -> Option<MemoryStats> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    parse_proc_status(&status)
}

fn parse_proc_status(status: &str) -> Option<MemoryStats> {
    let field = |name: &str| -> Option<u64> {
        let line = status.lines().find(|l| l.starts_with(name))?;
        let kb: u64 = line[name.len()..].split_whitespace().next()?.parse().ok()?;
        Some(kb * 1024)
    };
    Some(MemoryStats {
        resident_bytes: field("VmRSS:")?,
        virtual_bytes: field("VmSize:")?,
    })
}
