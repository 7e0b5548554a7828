mod fleet;
mod tokens;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokens::{TokenStore, MAX_LIVE_TOKENS};
use tracing::{info, warn};

/// Fake thermostat cloud and time-series ingest endpoint for local runs
#[derive(Debug, Parser)]
struct Args {
    #[arg(long, env = "SIM_ADDR", default_value = "127.0.0.1:9090")]
    addr: String,

    #[arg(long, env = "DEVICES", default_value_t = 10)]
    devices: usize,

    #[arg(long, env = "DANFOSS_API_KEY", default_value = "sim-key")]
    api_key: String,

    #[arg(long, env = "DANFOSS_API_SECRET", default_value = "sim-secret")]
    api_secret: String,

    /// Percentage of write requests answered with 503
    #[arg(long, env = "WRITE_FAILURE_RATE", default_value_t = 0)]
    write_failure_rate: u8,
}

struct SimState {
    basic_auth: String,
    devices: usize,
    write_failure_rate: u8,
    tokens: TokenStore,
    records_written: AtomicU64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct WriteRecordsRequest {
    database_name: String,
    table_name: String,
    records: Vec<Value>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("Starting thermostat cloud simulator");
    info!("Address: {}, Devices: {}", args.addr, args.devices);

    let credentials = format!("{}:{}", args.api_key, args.api_secret);
    let state = Arc::new(SimState {
        basic_auth: format!("Basic {}", STANDARD.encode(credentials)),
        devices: args.devices,
        write_failure_rate: args.write_failure_rate.min(100),
        tokens: TokenStore::new(MAX_LIVE_TOKENS),
        records_written: AtomicU64::new(0),
    });

    let app = Router::new()
        .route("/oauth2/token", post(issue_token))
        .route("/ally/devices", get(list_devices))
        .route("/", post(write_records))
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind(&args.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind to {}: {}", args.addr, e);
            std::process::exit(1);
        }
    };

    info!("Token endpoint:   http://{}/oauth2/token", args.addr);
    info!("Devices endpoint: http://{}/ally/devices", args.addr);
    info!("Write endpoint:   http://{}/", args.addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

async fn issue_token(
    State(state): State<Arc<SimState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    if header(&headers, "authorization") != state.basic_auth {
        warn!("Token request with wrong credentials");
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "invalid_client"})),
        );
    }
    if body != "grant_type=client_credentials" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unsupported_grant_type"})),
        );
    }

    let token = state.tokens.issue();
    info!("Issued access token ({} live)", state.tokens.len());

    (
        StatusCode::OK,
        Json(json!({
            "access_token": token,
            "token_type": "Bearer",
            "expires_in": "3599"
        })),
    )
}

async fn list_devices(
    State(state): State<Arc<SimState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let token = header(&headers, "authorization")
        .strip_prefix("Bearer ")
        .unwrap_or_default();
    if !state.tokens.is_valid(token) {
        warn!("Devices request with unknown token");
        return (StatusCode::UNAUTHORIZED, Json(json!({"success": false})));
    }

    let fleet = fleet::generate_fleet(&mut rand::thread_rng(), state.devices);
    info!("Serving {} devices", fleet.result.len());

    match serde_json::to_value(&fleet) {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        ),
    }
}

async fn write_records(
    State(state): State<Arc<SimState>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    if header(&headers, "x-amz-target") != "Timestream_20181101.WriteRecords" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "unknown operation"})),
        );
    }

    if rand::random::<u8>() % 100 < state.write_failure_rate {
        warn!("Simulating store outage");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"message": "simulated outage"})),
        );
    }

    let request: WriteRecordsRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"message": e.to_string()})),
            )
        }
    };

    if request.records.len() > 100 {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": "too many records"})),
        );
    }

    let total = state
        .records_written
        .fetch_add(request.records.len() as u64, Ordering::Relaxed)
        + request.records.len() as u64;
    info!(
        "Wrote {} records to {}.{} ({} total)",
        request.records.len(),
        request.database_name,
        request.table_name,
        total
    );

    (
        StatusCode::OK,
        Json(json!({"RecordsIngested": {"Total": request.records.len()}})),
    )
}
