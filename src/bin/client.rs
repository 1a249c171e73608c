//! `bft-client <N>`: the latency sink. Seeds `cluster:config`, then serves
//! `/start` and `/end` and prints the per-height commit latency once `q`
//! distinct replicas have reported completion. Grounded on
//! `cmd/client/main.go` + `internal/clientsvc/service.go`.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use bft_testbed::config::{ClusterConfig, LatencyStore, Register, RedisRegister};
use bft_testbed::types::{EndRequest, Height, StartRequest};
use clap::Parser;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "bft-client", about = "latency sink for a BFT consensus cluster")]
struct Args {
    /// Cluster size, used only to derive the reply quorum `q`.
    n: u32,
    #[arg(long, env = "REGISTER_ADDR", default_value = "redis://127.0.0.1:6379")]
    redis_addr: String,
    #[arg(long, default_value = "127.0.0.1:8000")]
    listen: String,
}

struct AppState {
    register: RedisRegister,
    q: u32,
    current_height: Mutex<Height>,
}

fn now_unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the epoch")
        .as_nanos() as i64
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let register = RedisRegister::new(&args.redis_addr)?;
    register
        .write_cluster_config(&ClusterConfig {
            n: args.n,
            base_port: 9000,
            client_addr: args.listen.clone(),
        })
        .await?;

    let q = bft_testbed::types::Thresholds::new(args.n).q;
    info!(n = args.n, q, listen = %args.listen, "starting latency sink");

    let state = Arc::new(AppState {
        register,
        q,
        current_height: Mutex::new(0),
    });
    let app = Router::new()
        .route("/start", post(handle_start))
        .route("/end", post(handle_end))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_start(State(state): State<Arc<AppState>>, Json(req): Json<StartRequest>) -> StatusCode {
    let now = now_unix_nanos();
    let mut current = state.current_height.lock().await;
    if req.height > *current {
        *current = req.height;
        if let Err(err) = state.register.reset_start(req.height, now).await {
            tracing::warn!(height = req.height, error = %err, "failed to reset latency record");
        }
        info!(height = req.height, "start recorded, end/printed reset");
    } else if req.height == *current {
        debug!(height = req.height, "duplicate start ignored");
    } else {
        debug!(height = req.height, "stale start dropped");
    }
    StatusCode::OK
}

async fn handle_end(State(state): State<Arc<AppState>>, Json(req): Json<EndRequest>) -> StatusCode {
    let now = now_unix_nanos();
    let height = req.height;

    match state.register.has_start(height).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(height, from = req.from, "end without start dropped");
            return StatusCode::OK;
        }
        Err(err) => {
            tracing::warn!(height, error = %err, "register unreachable while checking start");
            return StatusCode::OK;
        }
    }
    if matches!(state.register.is_printed(height).await, Ok(true)) {
        return StatusCode::OK;
    }
    let added = match state.register.mark_end_seen(height, req.from).await {
        Ok(added) => added,
        Err(err) => {
            tracing::warn!(height, error = %err, "register unreachable while recording end");
            return StatusCode::OK;
        }
    };
    if !added {
        debug!(height, from = req.from, "duplicate end ignored");
        return StatusCode::OK;
    }

    let replies = state.register.incr_reply(height).await.unwrap_or(0);
    let _ = state.register.set_end_if_absent(height, now).await;
    info!(height, from = req.from, reply = replies, "end accepted");

    if replies as u32 == state.q {
        let start = state.register.start_nanos(height).await.ok().flatten().unwrap_or(0);
        let end = state.register.end_nanos(height).await.ok().flatten().unwrap_or(0);
        let latency = (end - start) as f64 / 1e9;
        println!("height {} latency is {} batch is {}", height, latency, 200 * height);
        let _ = state.register.mark_printed(height).await;
    }
    StatusCode::OK
}
