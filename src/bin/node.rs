//! `bft-node <id> <alg>`: boots one replica process — loads the cluster
//! config and per-node keys from the register, starts the inbound HTTP
//! server, and kicks off the first proposal if this replica is leader of
//! view 1. Grounded on `cmd/node/main.go` + `internal/nodesvc/service.go`
//! (`New`, `Run`, `StartIfLeader`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bft_testbed::config::{Register, RedisRegister};
use bft_testbed::engine::Replica;
use bft_testbed::error::BootError;
use bft_testbed::server;
use bft_testbed::transport::HttpTransport;
use bft_testbed::types::{Algorithm, Thresholds};
use clap::Parser;
use tracing::info;

/// Warm-up delay before the leader of view 1 issues its first proposal,
/// giving every peer time to finish booting (spec §4.7).
const KICKOFF_DELAY: Duration = Duration::from_millis(600);

#[derive(Parser)]
#[command(name = "bft-node", about = "run one BFT consensus replica")]
struct Args {
    /// This replica's stable id, `1..=N`.
    self_id: u32,
    /// Protocol variant this process runs (pbft | hotstuff | fast-hotstuff | hpbft).
    alg: Algorithm,
    #[arg(long, env = "REGISTER_ADDR", default_value = "redis://127.0.0.1:6379")]
    redis_addr: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();
    if let Err(err) = run(args).await {
        tracing::error!(error = %err, "node exiting");
        std::process::exit(1);
    }
    Ok(())
}

async fn run(args: Args) -> Result<(), BootError> {
    let register = RedisRegister::new(&args.redis_addr)?;
    let cfg = register.read_cluster_config().await?;
    let thresholds = Thresholds::new(cfg.n);

    let mut keys = HashMap::new();
    let mut peer_addrs = HashMap::new();
    for i in 1..=cfg.n {
        keys.insert(i, register.read_node_key(i).await?);
        peer_addrs.insert(i, format!("127.0.0.1:{}", cfg.base_port + i as u16));
    }

    let transport = HttpTransport::new(peer_addrs, args.alg, cfg.n, &cfg.client_addr);
    let replica = Replica::new(args.self_id, args.alg, thresholds, keys, Arc::new(transport));

    let addr = format!("127.0.0.1:{}", cfg.base_port + args.self_id as u16);
    info!(
        node = args.self_id,
        alg = %args.alg,
        listen = %addr,
        n = thresholds.n,
        t = thresholds.t,
        q = thresholds.q,
        "starting replica"
    );

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| BootError::Bind { addr: addr.clone(), source })?;

    let kickoff = Arc::clone(&replica);
    tokio::spawn(async move {
        tokio::time::sleep(KICKOFF_DELAY).await;
        kickoff.kickoff_if_leader();
    });

    axum::serve(listener, server::router(replica))
        .await
        .expect("http server crashed");
    Ok(())
}
