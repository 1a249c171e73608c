//! Per-height replica state (spec §3). Grounded on
//! `internal/nodesvc/service.go::heightState`.

use std::collections::{HashMap, HashSet};

use crate::types::{Digest, Fingerprint, NodeId};

/// State for a single height, created lazily on first message for that
/// height (spec §3, Lifecycle) and pruned once `done` and superseded by a
/// later height (see `Engine::advance_height`, DESIGN.md Open Question 3).
#[derive(Debug, Default)]
pub struct HeightState {
    /// Set exactly once, on the first accepted proposal at this height/view.
    pub proposal_digest: Option<Digest>,
    pub proposal_tx: Option<Vec<String>>,

    /// Three-phase-only: first vote round.
    pub prepared: HashMap<NodeId, String>,
    /// Three-phase-only: second vote round.
    pub committed: HashMap<NodeId, String>,
    /// Single-vote variants' sole round.
    pub voted: HashMap<NodeId, String>,

    /// Three-phase-only idempotency guard for `Commit` re-broadcast
    /// (DESIGN.md Open Question 1 / spec §9).
    pub commit_sent: bool,

    /// Message fingerprints already applied at this height.
    dedup: HashSet<Fingerprint>,

    /// Monotone false -> true flag guarding the single commit action.
    pub done: bool,
}

impl HeightState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `fp` into the dedup set if absent. Returns `true` if this is
    /// the first time this fingerprint has been seen (i.e. the caller
    /// should proceed), `false` if it is a duplicate (caller must drop).
    pub fn insert_if_new(&mut self, fp: Fingerprint) -> bool {
        self.dedup.insert(fp)
    }

    pub fn set_proposal(&mut self, digest: Digest, tx: Vec<String>) {
        self.proposal_digest = Some(digest);
        self.proposal_tx = Some(tx);
    }
}
