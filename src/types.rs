//! Wire types and cluster parameters shared by every module.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Stable replica identifier, `1..=N`.
pub type NodeId = u32;
pub type Height = u64;
pub type View = u64;
/// Lowercase hex digest, matching the Go original's `encoding/hex` output.
pub type Digest = String;

/// Derived cluster thresholds (spec §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    /// Cluster size.
    pub n: u32,
    /// Commit quorum: `floor(2N/3) + 1`.
    pub t: u32,
    /// Client reply quorum: `floor(N/3) + 1`.
    pub q: u32,
}

impl Thresholds {
    pub fn new(n: u32) -> Self {
        Thresholds {
            n,
            t: (2 * n) / 3 + 1,
            q: n / 3 + 1,
        }
    }
}

/// The four protocol variants spec.md §1 names. Variant identity is a
/// runtime parameter (chosen by CLI flag), not a compile-time feature: a
/// cluster could in principle mix processes configured for different algs,
/// though nothing here assumes that happens.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Classic three-phase (PrePrepare / Prepare / Commit), leader fixed to
    /// node 1.
    #[display("three-phase")]
    ThreePhase,
    /// Chained, single-vote, leader-rotated.
    #[display("chained")]
    Chained,
    /// Fast, single-vote, leader-rotated.
    #[display("fast")]
    Fast,
    /// Hybrid prepare-only, single-vote, leader-rotated.
    #[display("hybrid")]
    Hybrid,
}

/// Tag triple `(proposal, vote, qc)` used by the single-vote family
/// (spec §4.3.2); unused (and absent) for `ThreePhase`, whose three tags are
/// handled by a dedicated function instead (spec §4.3.1).
pub struct VoteTags {
    pub proposal: &'static str,
    pub vote: &'static str,
    pub qc: &'static str,
}

impl Algorithm {
    /// URL path segment this variant's inbound endpoint is mounted at
    /// (spec §6: `POST /{alg}/message`). Kept distinct from the `Display`
    /// form (which is prose) since the wire path is an API detail the two
    /// need not share.
    pub fn path_segment(self) -> &'static str {
        match self {
            Algorithm::ThreePhase => "pbft",
            Algorithm::Chained => "hotstuff",
            Algorithm::Fast => "fast-hotstuff",
            Algorithm::Hybrid => "hpbft",
        }
    }

    pub fn all() -> [Algorithm; 4] {
        [
            Algorithm::ThreePhase,
            Algorithm::Chained,
            Algorithm::Fast,
            Algorithm::Hybrid,
        ]
    }

    /// Single-vote family's tag triple. Panics on `ThreePhase`, which has no
    /// triple; callers must check `is_single_vote` first.
    pub fn vote_tags(self) -> VoteTags {
        match self {
            Algorithm::ThreePhase => unreachable!("three-phase has no vote tag triple"),
            Algorithm::Chained => VoteTags {
                proposal: "HSProposal",
                vote: "HSVote",
                qc: "HSQC",
            },
            Algorithm::Fast => VoteTags {
                proposal: "FHSProposal",
                vote: "FHSVote",
                qc: "FHSCommitQC",
            },
            Algorithm::Hybrid => VoteTags {
                proposal: "HPProposal",
                vote: "HPPrepareVote",
                qc: "HPQC",
            },
        }
    }

    pub fn is_single_vote(self) -> bool {
        !matches!(self, Algorithm::ThreePhase)
    }
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pbft" | "three-phase" => Ok(Algorithm::ThreePhase),
            "hotstuff" | "chained" => Ok(Algorithm::Chained),
            "fast-hotstuff" | "fast" => Ok(Algorithm::Fast),
            "hpbft" | "hybrid" => Ok(Algorithm::Hybrid),
            other => Err(format!("invalid alg: {other}")),
        }
    }
}

/// The sole wire record (spec §3). Optional fields are omitted from the
/// serialized form exactly when absent, matching the Go original's
/// `omitempty` struct tags byte-for-byte so replicas speak a compatible
/// wire format.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConsensusMessage {
    #[serde(rename = "type")]
    pub ty: String,
    pub view: View,
    pub height: Height,
    pub from: NodeId,
    pub digest: Digest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_share: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_full: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_agg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig_agg_full: Option<String>,
}

impl ConsensusMessage {
    /// Builds a message with every optional field absent.
    pub fn new(ty: impl Into<String>, view: View, height: Height, from: NodeId, digest: Digest) -> Self {
        ConsensusMessage {
            ty: ty.into(),
            view,
            height,
            from,
            digest,
            tx: None,
            sig_share: None,
            sig_full: None,
            qc: None,
            sig_agg: None,
            sig_agg_full: None,
        }
    }

    pub fn with_tx(mut self, tx: Vec<String>) -> Self {
        self.tx = Some(tx);
        self
    }

    pub fn with_sig_share(mut self, share: String) -> Self {
        self.sig_share = Some(share);
        self
    }

    pub fn with_qc(mut self, qc: String) -> Self {
        self.qc = Some(qc);
        self
    }

    /// Fingerprint used for dedup (spec §3): `(view, height, digest, from, type)`.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            view: self.view,
            height: self.height,
            digest: self.digest.clone(),
            from: self.from,
            ty: self.ty.clone(),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct Fingerprint {
    pub view: View,
    pub height: Height,
    pub digest: Digest,
    pub from: NodeId,
    pub ty: String,
}

/// Latency-sink request shapes (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartRequest {
    pub height: Height,
    pub start: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndRequest {
    pub height: Height,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<i64>,
    pub from: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
}
