use derive_more::Display;
use thiserror::Error;

/// Core protocol rejections. None of these are ever surfaced to a peer;
/// they are logged locally and the inbound message is dropped without any
/// state mutation (spec §7).
#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum ConsensusError {
    /// Message height/view does not match the replica's current position.
    #[display("stale or future message: height {height}, view {view}")]
    HeightViewMismatch { height: u64, view: u64 },
    /// Fingerprint already present in the height's dedup set.
    #[display("duplicate fingerprint for height {0}")]
    Duplicate(u64),
    /// Proposal digest did not match `H(view, height, tx)`.
    #[display("digest mismatch at height {0}")]
    DigestMismatch(u64),
    /// A vote's share failed to verify against the sender's key.
    #[display("signature verification failed from node {0}")]
    BadSignature(u32),
    /// Message type not recognized under the active algorithm.
    #[display("unknown message type {0:?}")]
    UnknownType(String),
    /// Message well-formed but the receiver is not authorized to act on it
    /// (e.g. a vote delivered to a non-leader).
    #[display("not authorized to process this message")]
    NotAuthorized,
}

/// Typed fatal startup failures. Distinct from `ConsensusError`: these abort
/// the process (spec §7 item 7) rather than representing a recoverable,
/// per-message rejection.
#[derive(Debug, Error)]
pub enum BootError {
    #[error("config/key register unreachable: {0}")]
    Register(#[from] redis::RedisError),
    #[error("cluster:config is missing or has no N field")]
    MissingClusterConfig,
    #[error("Node:{0} has no threshold_sk field")]
    MissingNodeKey(u32),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
