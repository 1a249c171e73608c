//! `bft-keygen <N>`: provisions the cluster config and `N` per-node key
//! records into the shared register. Real threshold-signature keys are out
//! of scope (spec §1's non-goal); this writes the same placeholder shape
//! the symmetric-MAC stand-in reads back at boot. Grounded on
//! `cmd/genkey/main.go`.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use bft_testbed::config::{ClusterConfig, NodeKeyRecord, Register, RedisRegister};
use bft_testbed::types::Thresholds;
use clap::Parser;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;

#[derive(Parser)]
#[command(name = "bft-keygen", about = "provision cluster config and node keys")]
struct Args {
    /// Cluster size.
    n: u32,
    #[arg(long, env = "REGISTER_ADDR", default_value = "redis://127.0.0.1:6379")]
    redis_addr: String,
}

fn rand_key() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    B64.encode(bytes)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let register = RedisRegister::new(&args.redis_addr)?;
    let th = Thresholds::new(args.n);
    register
        .write_cluster_config(&ClusterConfig {
            n: args.n,
            base_port: 9000,
            client_addr: "127.0.0.1:8000".to_string(),
        })
        .await?;

    for i in 1..=args.n {
        let record = NodeKeyRecord {
            threshold_pk: "demo-threshold-pk".to_string(),
            threshold_sk: rand_key(),
            agg_pk: "demo-agg-pk".to_string(),
            agg_sk: rand_key(),
        };
        register.write_node_key(i, &record).await?;
    }

    info!(n = args.n, t = th.t, q = th.q, "generated keys for cluster");
    Ok(())
}
