//! Config/key register client (spec §4.7, §6). `Register` is the async
//! trait abstraction; `RedisRegister` is the concrete backend. Grounded on
//! `internal/redisx/redis.go` (`ReadClusterConfig`, `ClusterConfig`,
//! `HSet`/`HGet`/`HGetAll`), reimplemented against the `redis` crate
//! instead of shelling out to `redis-cli`; the connection-reuse pattern
//! (`ensure_connection` lazily creating a `ConnectionManager`) follows
//! `happybigmtn-nullspace`'s `simulator/src/cache.rs::RedisCache`.

use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::error::BootError;
use crate::types::{Height, NodeId};

pub const CLUSTER_CONFIG_KEY: &str = "cluster:config";

pub fn node_key(id: NodeId) -> String {
    format!("Node:{id}")
}

/// Cluster parameters published by the register (spec §2, collaborator i):
/// `N`, base port, client address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterConfig {
    pub n: u32,
    pub base_port: u16,
    pub client_addr: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        ClusterConfig {
            n: 0,
            base_port: 9000,
            client_addr: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Per-node key record `bft-keygen` provisions. Only `threshold_sk` is ever
/// read back by a replica; the rest exist for shape parity with a
/// deployment that later plugs in real threshold cryptography (spec §1's
/// stated non-goal), matching the Go original's provisioning shape exactly.
#[derive(Clone, Debug)]
pub struct NodeKeyRecord {
    pub threshold_pk: String,
    pub threshold_sk: String,
    pub agg_pk: String,
    pub agg_sk: String,
}

#[async_trait]
pub trait Register: Send + Sync {
    async fn read_cluster_config(&self) -> Result<ClusterConfig, BootError>;
    async fn read_node_key(&self, id: NodeId) -> Result<String, BootError>;
    async fn write_cluster_config(&self, cfg: &ClusterConfig) -> Result<(), BootError>;
    async fn write_node_key(&self, id: NodeId, record: &NodeKeyRecord) -> Result<(), BootError>;
}

pub struct RedisRegister {
    client: redis::Client,
    connection: Mutex<Option<redis::aio::ConnectionManager>>,
}

impl RedisRegister {
    pub fn new(addr: &str) -> Result<Self, BootError> {
        let client = redis::Client::open(addr).map_err(BootError::Register)?;
        Ok(RedisRegister {
            client,
            connection: Mutex::new(None),
        })
    }

    async fn connection(&self) -> Result<redis::aio::ConnectionManager, BootError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(
                self.client
                    .get_connection_manager()
                    .await
                    .map_err(BootError::Register)?,
            );
        }
        Ok(guard.as_ref().expect("just populated above").clone())
    }
}

#[async_trait]
impl Register for RedisRegister {
    async fn read_cluster_config(&self) -> Result<ClusterConfig, BootError> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn
            .hgetall(CLUSTER_CONFIG_KEY)
            .await
            .map_err(BootError::Register)?;
        let n: u32 = fields
            .get("N")
            .ok_or(BootError::MissingClusterConfig)?
            .parse()
            .map_err(|_| BootError::MissingClusterConfig)?;
        let mut cfg = ClusterConfig {
            n,
            ..ClusterConfig::default()
        };
        if let Some(bp) = fields.get("basePort").and_then(|v| v.parse().ok()) {
            cfg.base_port = bp;
        }
        if let Some(addr) = fields.get("clientAddr") {
            cfg.client_addr = addr.clone();
        }
        Ok(cfg)
    }

    async fn read_node_key(&self, id: NodeId) -> Result<String, BootError> {
        let mut conn = self.connection().await?;
        let sk: Option<String> = conn
            .hget(node_key(id), "threshold_sk")
            .await
            .map_err(BootError::Register)?;
        sk.ok_or(BootError::MissingNodeKey(id))
    }

    async fn write_cluster_config(&self, cfg: &ClusterConfig) -> Result<(), BootError> {
        let mut conn = self.connection().await?;
        let fields: [(&str, String); 3] = [
            ("N", cfg.n.to_string()),
            ("basePort", cfg.base_port.to_string()),
            ("clientAddr", cfg.client_addr.clone()),
        ];
        conn.hset_multiple(CLUSTER_CONFIG_KEY, &fields)
            .await
            .map_err(BootError::Register)
    }

    async fn write_node_key(&self, id: NodeId, record: &NodeKeyRecord) -> Result<(), BootError> {
        let mut conn = self.connection().await?;
        let fields: [(&str, &str); 4] = [
            ("threshold_pk", &record.threshold_pk),
            ("threshold_sk", &record.threshold_sk),
            ("agg_pk", &record.agg_pk),
            ("agg_sk", &record.agg_sk),
        ];
        conn.hset_multiple(node_key(id), &fields)
            .await
            .map_err(BootError::Register)
    }
}

/// The latency-sink bookkeeping `bft-client` keeps in the shared register
/// (spec §6): five Redis records per height (`latency:start`,
/// `latency:end`, `latency:reply`, `latency:printed`,
/// `latency:dedup:<h>`), so a restarted client binary finds in-flight
/// heights exactly where the last one left them. Grounded directly on
/// `internal/clientsvc/service.go`'s `rdb.HSet`/`HGet`/`HExists`/`SAdd`/
/// `HIncrBy`/`HDel` call sites; the one piece of state that stays
/// process-local is "current height", matching the Go original's
/// in-memory `Service.currentHeight` guarded by its own mutex.
#[async_trait]
pub trait LatencyStore: Send + Sync {
    /// Resets the record set for `height`: records `start = now`, zeroes
    /// the reply counter, and clears `end`/`printed`/`dedup` from any
    /// earlier run at this height.
    async fn reset_start(&self, height: Height, now_unix_nanos: i64) -> Result<(), BootError>;
    async fn has_start(&self, height: Height) -> Result<bool, BootError>;
    async fn is_printed(&self, height: Height) -> Result<bool, BootError>;
    /// Adds `from` to this height's dedup set; returns `true` the first
    /// time a given `from` is added (mirrors Redis `SADD`'s return count).
    async fn mark_end_seen(&self, height: Height, from: NodeId) -> Result<bool, BootError>;
    /// Increments and returns the reply counter for `height`.
    async fn incr_reply(&self, height: Height) -> Result<i64, BootError>;
    async fn has_end(&self, height: Height) -> Result<bool, BootError>;
    async fn set_end_if_absent(&self, height: Height, now_unix_nanos: i64) -> Result<(), BootError>;
    async fn start_nanos(&self, height: Height) -> Result<Option<i64>, BootError>;
    async fn end_nanos(&self, height: Height) -> Result<Option<i64>, BootError>;
    async fn mark_printed(&self, height: Height) -> Result<(), BootError>;
}

fn dedup_key(height: Height) -> String {
    format!("latency:dedup:{height}")
}

#[async_trait]
impl LatencyStore for RedisRegister {
    async fn reset_start(&self, height: Height, now_unix_nanos: i64) -> Result<(), BootError> {
        let mut conn = self.connection().await?;
        let h = height.to_string();
        let () = conn
            .hset("latency:start", &h, now_unix_nanos.to_string())
            .await
            .map_err(BootError::Register)?;
        let () = conn
            .hset("latency:reply", &h, "0")
            .await
            .map_err(BootError::Register)?;
        let _: i64 = conn.del(dedup_key(height)).await.map_err(BootError::Register)?;
        let _: i64 = conn
            .hdel("latency:end", &h)
            .await
            .map_err(BootError::Register)?;
        let _: i64 = conn
            .hdel("latency:printed", &h)
            .await
            .map_err(BootError::Register)?;
        Ok(())
    }

    async fn has_start(&self, height: Height) -> Result<bool, BootError> {
        let mut conn = self.connection().await?;
        conn.hexists("latency:start", height.to_string())
            .await
            .map_err(BootError::Register)
    }

    async fn is_printed(&self, height: Height) -> Result<bool, BootError> {
        let mut conn = self.connection().await?;
        let flag: Option<String> = conn
            .hget("latency:printed", height.to_string())
            .await
            .map_err(BootError::Register)?;
        Ok(flag.as_deref() == Some("1"))
    }

    async fn mark_end_seen(&self, height: Height, from: NodeId) -> Result<bool, BootError> {
        let mut conn = self.connection().await?;
        let added: i64 = conn
            .sadd(dedup_key(height), from.to_string())
            .await
            .map_err(BootError::Register)?;
        Ok(added > 0)
    }

    async fn incr_reply(&self, height: Height) -> Result<i64, BootError> {
        let mut conn = self.connection().await?;
        conn.hincr("latency:reply", height.to_string(), 1)
            .await
            .map_err(BootError::Register)
    }

    async fn has_end(&self, height: Height) -> Result<bool, BootError> {
        let mut conn = self.connection().await?;
        conn.hexists("latency:end", height.to_string())
            .await
            .map_err(BootError::Register)
    }

    async fn set_end_if_absent(&self, height: Height, now_unix_nanos: i64) -> Result<(), BootError> {
        if self.has_end(height).await? {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        conn.hset("latency:end", height.to_string(), now_unix_nanos.to_string())
            .await
            .map_err(BootError::Register)
    }

    async fn start_nanos(&self, height: Height) -> Result<Option<i64>, BootError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .hget("latency:start", height.to_string())
            .await
            .map_err(BootError::Register)?;
        Ok(raw.and_then(|v| v.parse().ok()))
    }

    async fn end_nanos(&self, height: Height) -> Result<Option<i64>, BootError> {
        let mut conn = self.connection().await?;
        let raw: Option<String> = conn
            .hget("latency:end", height.to_string())
            .await
            .map_err(BootError::Register)?;
        Ok(raw.and_then(|v| v.parse().ok()))
    }

    async fn mark_printed(&self, height: Height) -> Result<(), BootError> {
        let mut conn = self.connection().await?;
        conn.hset("latency:printed", height.to_string(), "1")
            .await
            .map_err(BootError::Register)
    }
}
