//! Integration tests driving `Engine` directly (no HTTP) for the six
//! concrete scenarios spec.md §8 seeds the test suite with, plus the
//! quorum-safety and dedup properties they exercise (P1–P4).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use bft_testbed::crypto;
use bft_testbed::digest;
use bft_testbed::engine::{OutboundSink, Replica};
use bft_testbed::types::{Algorithm, ConsensusMessage, Height, NodeId, Thresholds, View};

fn keys(n: u32) -> HashMap<NodeId, String> {
    (1..=n).map(|i| (i, format!("node-{i}-secret"))).collect()
}

/// Routes sends between every replica in a cluster, standing in for the
/// real HTTP transport (spec §4.6): `broadcast` fans out to `1..N`
/// (including the sender's own copy, per `Engine::build_proposal`'s doc
/// comment), `unicast` delivers to exactly one.
#[derive(Default)]
struct Router {
    replicas: RwLock<HashMap<NodeId, Arc<Replica>>>,
    starts: Mutex<Vec<(Height, View)>>,
    ends: Mutex<Vec<(Height, View, NodeId)>>,
    broadcasts: Mutex<Vec<ConsensusMessage>>,
    unicasts: Mutex<Vec<(NodeId, ConsensusMessage)>>,
}

impl Router {
    fn new() -> Arc<Self> {
        Arc::new(Router::default())
    }

    fn register(&self, id: NodeId, replica: Arc<Replica>) {
        self.replicas.write().unwrap().insert(id, replica);
    }

    fn replica(&self, id: NodeId) -> Arc<Replica> {
        self.replicas.read().unwrap()[&id].clone()
    }

    /// Delivers `msg` to every registered replica.
    fn deliver_to_all(&self, msg: ConsensusMessage) {
        let all: Vec<Arc<Replica>> = self.replicas.read().unwrap().values().cloned().collect();
        for r in all {
            r.deliver(msg.clone());
        }
    }
}

impl OutboundSink for Router {
    fn unicast(&self, to: NodeId, msg: ConsensusMessage) {
        self.unicasts.lock().unwrap().push((to, msg.clone()));
        if let Some(r) = self.replicas.read().unwrap().get(&to).cloned() {
            r.deliver(msg);
        }
    }

    fn broadcast(&self, msg: ConsensusMessage) {
        self.broadcasts.lock().unwrap().push(msg.clone());
        self.deliver_to_all(msg);
    }

    fn report_start(&self, height: Height, view: View) {
        self.starts.lock().unwrap().push((height, view));
    }

    fn report_end(&self, height: Height, view: View, from: NodeId) {
        self.ends.lock().unwrap().push((height, view, from));
    }
}

fn build_cluster(alg: Algorithm, n: u32) -> Arc<Router> {
    let router = Router::new();
    let thresholds = Thresholds::new(n);
    for id in 1..=n {
        let replica = Replica::new(id, alg, thresholds, keys(n), router.clone() as Arc<dyn OutboundSink>);
        router.register(id, replica);
    }
    router
}

/// A single replica whose own broadcasts are looped back to itself (as the
/// real `HttpTransport` does — `broadcast` fans out over `1..N` including
/// the sender, spec §4.6), for scenarios that probe one node's tally
/// behavior without a full cluster. `attach` is called once, right after
/// the `Replica` it drives is constructed.
#[derive(Default)]
struct SelfLoop {
    replica: RwLock<Option<Arc<Replica>>>,
    broadcasts: Mutex<Vec<ConsensusMessage>>,
    ends: Mutex<Vec<(Height, View, NodeId)>>,
}

impl SelfLoop {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn attach(&self, replica: Arc<Replica>) {
        *self.replica.write().unwrap() = Some(replica);
    }
}

impl OutboundSink for SelfLoop {
    fn unicast(&self, _to: NodeId, _msg: ConsensusMessage) {}
    fn broadcast(&self, msg: ConsensusMessage) {
        self.broadcasts.lock().unwrap().push(msg.clone());
        if let Some(r) = self.replica.read().unwrap().clone() {
            r.deliver(msg);
        }
    }
    fn report_start(&self, _height: Height, _view: View) {}
    fn report_end(&self, height: Height, view: View, from: NodeId) {
        self.ends.lock().unwrap().push((height, view, from));
    }
}

fn signed_prepare(ty: &str, view: View, height: Height, d: &str, from: NodeId, sk: &str) -> ConsensusMessage {
    let vote_msg = crypto::vote_message(ty, view, height, &d.to_string(), from);
    let share = crypto::sign(sk, &vote_msg);
    ConsensusMessage::new(ty, view, height, from, d.to_string()).with_sig_share(share)
}

/// Scenario 1 (spec §8): three-phase happy path. Node 1 broadcasts
/// `PrePrepare`; every replica independently reaches 3 prepares then 3
/// commits and advances to `(height=2, view=2)`; `end` is posted 4 times.
#[tokio::test]
async fn scenario_1_three_phase_happy_path() {
    let n = 4;
    let router = build_cluster(Algorithm::ThreePhase, n);

    let tx = vec!["12 34 5".to_string()];
    let d = digest::digest(1, 1, &tx);
    let pre_prepare = ConsensusMessage::new("PrePrepare", 1, 1, 1, d).with_tx(tx);
    router.deliver_to_all(pre_prepare);

    assert_eq!(router.ends.lock().unwrap().len(), n as usize);
    for id in 1..=n {
        assert_eq!(router.replica(id).position(), (2, 2));
    }
}

/// Scenario 2 (spec §8): node 2's `Prepare` arrives twice. The duplicate is
/// dropped before any tally mutation, so the commit threshold (self + node
/// 2 + node 3 = t=3) is reached exactly once — the `Commit` broadcast
/// fires once, not once per extra `Prepare` beyond threshold (the
/// `commit_sent` guard, DESIGN.md Open Question 1).
#[tokio::test]
async fn scenario_2_duplicate_vote_ignored_no_double_commit() {
    let n = 4;
    let sink = SelfLoop::new();
    let replica = Replica::new(1, Algorithm::ThreePhase, Thresholds::new(n), keys(n), sink.clone());
    sink.attach(replica.clone());

    let tx = vec!["12 34 5".to_string()];
    let d = digest::digest(1, 1, &tx);
    replica.deliver(ConsensusMessage::new("PrePrepare", 1, 1, 1, d.clone()).with_tx(tx));
    assert_eq!(sink.broadcasts.lock().unwrap().len(), 1, "self Prepare, looped back and tallied");

    let prepare_2 = signed_prepare("Prepare", 1, 1, &d, 2, "node-2-secret");
    replica.deliver(prepare_2.clone());
    replica.deliver(prepare_2); // duplicate fingerprint, must be dropped
    assert_eq!(
        sink.broadcasts.lock().unwrap().len(),
        1,
        "still below threshold (self + 2 < t=3), no Commit yet"
    );

    replica.deliver(signed_prepare("Prepare", 1, 1, &d, 3, "node-3-secret"));
    assert_eq!(
        sink.broadcasts.lock().unwrap().len(),
        2,
        "threshold reached (self, 2, 3), Commit broadcast exactly once"
    );

    replica.deliver(signed_prepare("Prepare", 1, 1, &d, 4, "node-4-secret"));
    assert_eq!(
        sink.broadcasts.lock().unwrap().len(),
        2,
        "extra Prepare past threshold must not re-trigger Commit"
    );
}

/// Scenario 3 (spec §8): node 3's `Prepare` carries a share that fails to
/// verify under `keys[3]`. The share is never recorded; with only 2 valid
/// shares (self + node 2) the threshold (t=3) is not reached and no
/// `Commit` is broadcast.
#[tokio::test]
async fn scenario_3_signature_mismatch_not_recorded() {
    let n = 4;
    let sink = SelfLoop::new();
    let replica = Replica::new(1, Algorithm::ThreePhase, Thresholds::new(n), keys(n), sink.clone());
    sink.attach(replica.clone());

    let tx = vec!["12 34 5".to_string()];
    let d = digest::digest(1, 1, &tx);
    replica.deliver(ConsensusMessage::new("PrePrepare", 1, 1, 1, d.clone()).with_tx(tx));

    replica.deliver(signed_prepare("Prepare", 1, 1, &d, 2, "node-2-secret"));

    // Signed under the wrong key: verification must fail under keys[3].
    let bad_share = crypto::sign("not-node-3-secret", &crypto::vote_message("Prepare", 1, 1, &d, 3));
    replica.deliver(ConsensusMessage::new("Prepare", 1, 1, 3, d.clone()).with_sig_share(bad_share));

    assert_eq!(
        sink.broadcasts.lock().unwrap().len(),
        1,
        "only the self-Prepare; the bad share never counted toward quorum"
    );
    assert!(sink.ends.lock().unwrap().is_empty());
}

/// Scenario 4 (spec §8): a `Prepare` at a stale view arrives while the
/// replica sits at `(height=1, view=1)`. Dropped by the common frame's
/// height/view gate before any per-height state is touched.
#[tokio::test]
async fn scenario_4_stale_view_drop() {
    let n = 4;
    let sink = SelfLoop::new();
    let replica = Replica::new(1, Algorithm::ThreePhase, Thresholds::new(n), keys(n), sink.clone());
    sink.attach(replica.clone());
    assert_eq!(replica.position(), (1, 1));

    let stale = signed_prepare("Prepare", 0, 1, "d", 2, "node-2-secret");
    replica.deliver(stale);

    assert!(sink.broadcasts.lock().unwrap().is_empty());
    assert_eq!(replica.position(), (1, 1));
}

/// Scenario 5 (spec §8): chained single-vote happy path. Leader of view 1
/// is node 1; every replica (including the leader itself) votes by
/// unicasting to it; on the third valid vote the leader broadcasts a QC,
/// and every replica observing it commits and advances.
#[tokio::test]
async fn scenario_5_single_vote_happy_path_chained() {
    let n = 4;
    let router = build_cluster(Algorithm::Chained, n);

    let tx = vec!["9 8 1".to_string()];
    let d = digest::digest(1, 1, &tx);
    let proposal = ConsensusMessage::new("HSProposal", 1, 1, 1, d).with_tx(tx);
    router.deliver_to_all(proposal);

    assert_eq!(router.ends.lock().unwrap().len(), n as usize);
    for id in 1..=n {
        assert_eq!(router.replica(id).position(), (2, 2));
    }
    assert!(router.broadcasts.lock().unwrap().iter().any(|m| m.ty == "HSQC"));
}

/// Scenario 6 (spec §8): under the chained variant with leader node 1, node
/// 2 receives a stray `Vote` meant for the leader. Dropped (not-leader
/// rule); no state change.
#[tokio::test]
async fn scenario_6_non_leader_vote_receipt_is_dropped() {
    let n = 4;
    let router = build_cluster(Algorithm::Chained, n);
    let replica_2 = router.replica(2);

    let stray = signed_prepare("HSVote", 1, 1, "d", 3, "node-3-secret");
    replica_2.deliver(stray);

    assert!(router.broadcasts.lock().unwrap().is_empty());
    assert!(router.unicasts.lock().unwrap().is_empty());
    assert_eq!(replica_2.position(), (1, 1));
}
